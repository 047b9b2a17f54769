use serde::Deserialize;
use serde::Serialize;

/// One field's precedence when two captures of the same entry are merged.
pub struct FieldRule<T> {
    pub field: &'static str,
    pub merge: fn(&mut T, &T),
}

/// Entries the reconciler can align: identity is the fingerprint, refinement is driven by
/// the type's own rule table.
pub trait Reconcilable: Clone + 'static {
    fn fingerprint(&self) -> &str;

    fn field_rules() -> &'static [FieldRule<Self>];

    fn refine(&mut self, later: &Self) {
        for rule in Self::field_rules() {
            (rule.merge)(self, later);
        }
    }
}

pub fn prefer_longer(current: &mut String, later: &str) {
    if later.chars().count() > current.chars().count() {
        *current = later.to_string();
    }
}

pub fn prefer_true(current: &mut bool, later: bool) {
    *current = *current || later;
}

pub fn prefer_some<V: Clone>(current: &mut Option<V>, later: &Option<V>) {
    if current.is_none() {
        current.clone_from(later);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlap {
    pub upper_start: usize,
    pub lower_end: usize,
    pub len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Confirmed(Overlap),
    /// Both sides had entries but no shared run could be verified. The entries were
    /// concatenated; `candidate_end` is the last index in `lower` matching `upper`'s tail.
    Unresolved { candidate_end: Option<usize> },
    Disjoint,
}

impl MergeOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    pub fn overlap(&self) -> Option<Overlap> {
        match self {
            Self::Confirmed(overlap) => Some(*overlap),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed(_) => "confirmed",
            Self::Unresolved { .. } => "unresolved",
            Self::Disjoint => "disjoint",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult<T> {
    pub entries: Vec<T>,
    pub outcome: MergeOutcome,
}

/// Locates the shared run between the tail of `upper` and the head of `lower`.
pub fn find_overlap<T: Reconcilable>(upper: &[T], lower: &[T]) -> Result<Overlap, Option<usize>> {
    let (Some(upper_last), Some(lower_first)) = (upper.last(), lower.first()) else {
        return Err(None);
    };
    let ends: Vec<usize> = lower
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.fingerprint() == upper_last.fingerprint())
        .map(|(idx, _)| idx)
        .collect();
    let starts: Vec<usize> = upper
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.fingerprint() == lower_first.fingerprint())
        .map(|(idx, _)| idx)
        .collect();

    let mut best: Option<Overlap> = None;
    for &start in &starts {
        for &end in &ends {
            let len = upper.len() - start;
            if len != end + 1 {
                continue;
            }
            let shared = upper[start..]
                .iter()
                .zip(&lower[..=end])
                .all(|(a, b)| a.fingerprint() == b.fingerprint());
            if !shared {
                continue;
            }
            let candidate = Overlap {
                upper_start: start,
                lower_end: end,
                len,
            };
            if best.map_or(true, |current| outranks(&candidate, &current)) {
                best = Some(candidate);
            }
        }
    }
    best.ok_or_else(|| ends.last().copied())
}

fn outranks(candidate: &Overlap, current: &Overlap) -> bool {
    let span = |o: &Overlap| o.lower_end as i64 - o.upper_start as i64;
    (span(candidate), candidate.lower_end) > (span(current), current.lower_end)
}

/// Aligns `lower` after `upper`. Never drops entries from either side and never shortens
/// `upper`; shared entries are refined in place.
pub fn merge<T: Reconcilable>(upper: &[T], lower: &[T]) -> MergeResult<T> {
    if upper.is_empty() || lower.is_empty() {
        return MergeResult {
            entries: upper.iter().chain(lower).cloned().collect(),
            outcome: MergeOutcome::Disjoint,
        };
    }
    match find_overlap(upper, lower) {
        Ok(overlap) => {
            let mut entries = upper.to_vec();
            for (offset, later) in lower[..=overlap.lower_end].iter().enumerate() {
                entries[overlap.upper_start + offset].refine(later);
            }
            entries.extend(lower[overlap.lower_end + 1..].iter().cloned());
            MergeResult {
                entries,
                outcome: MergeOutcome::Confirmed(overlap),
            }
        }
        Err(candidate_end) => MergeResult {
            entries: upper.iter().chain(lower).cloned().collect(),
            outcome: MergeOutcome::Unresolved { candidate_end },
        },
    }
}

/// Refines `outer` in place when `inner` appears in it as one contiguous run, taking the run
/// that ends last. Returns false, leaving `outer` untouched, when there is no such run.
pub fn absorb<T: Reconcilable>(inner: &[T], outer: &mut [T]) -> bool {
    if inner.is_empty() || inner.len() > outer.len() {
        return false;
    }
    let found = (0..=outer.len() - inner.len()).rev().find(|&start| {
        outer[start..start + inner.len()]
            .iter()
            .zip(inner)
            .all(|(a, b)| a.fingerprint() == b.fingerprint())
    });
    let Some(start) = found else {
        return false;
    };
    for (slot, later) in outer[start..].iter_mut().zip(inner) {
        slot.refine(later);
    }
    true
}

/// Per-sweep state: the durable `history`, the transient `cache` of the current sweep and
/// the page budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationState<T> {
    pub history: Vec<T>,
    pub cache: Vec<T>,
    pub page: usize,
    pub ceiling: usize,
}

impl<T: Reconcilable> ReconciliationState<T> {
    pub fn new(history: Vec<T>, ceiling: usize) -> Self {
        Self {
            history,
            cache: Vec::new(),
            page: 0,
            ceiling,
        }
    }

    pub fn ceiling_reached(&self) -> bool {
        self.page >= self.ceiling
    }

    /// Folds the cache into history and starts a fresh cache.
    pub fn commit(&mut self) -> MergeOutcome {
        let merged = merge(&self.history, &self.cache);
        self.history = merged.entries;
        self.cache.clear();
        merged.outcome
    }

    /// Drops the cache but keeps the page count, so the ceiling still bounds the sweep.
    pub fn reset_cache(&mut self) {
        self.cache.clear();
    }
}
