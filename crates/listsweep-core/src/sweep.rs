use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::config::SweepConfig;
use crate::container::MessageEntry;
use crate::geometry::Point;
use crate::geometry::Rect;
use crate::reconcile::absorb;
use crate::reconcile::merge;
use crate::reconcile::MergeOutcome;
use crate::reconcile::ReconciliationState;
use crate::reconcile::Reconcilable;

/// What the external driver should do next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision<R> {
    ScrollOlder,
    ScrollNewer,
    Process(R),
    Done,
}

impl<R> Decision<R> {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ScrollOlder => "scroll-older",
            Self::ScrollNewer => "scroll-newer",
            Self::Process(_) => "process",
            Self::Done => "done",
        }
    }

    pub fn is_scroll(&self) -> bool {
        matches!(self, Self::ScrollOlder | Self::ScrollNewer)
    }
}

/// A row the driver should act on, identified by content and located by its last position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub fingerprint: String,
    pub click_point: Point,
    pub bounds: Rect,
}

impl From<&MessageEntry> for RowRef {
    fn from(entry: &MessageEntry) -> Self {
        Self {
            fingerprint: entry.fingerprint.clone(),
            click_point: entry.click_point,
            bounds: entry.bounds,
        }
    }
}

pub(crate) fn fingerprints<T: Reconcilable>(entries: &[T]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| entry.fingerprint().to_string())
        .collect()
}

/// Drives one sweep of a conversation from the newest screen toward older content until
/// known history is met, the list top is reached or the page budget runs out.
#[derive(Debug, Clone)]
pub struct MessageSweep {
    state: ReconciliationState<MessageEntry>,
    attempted: HashSet<String>,
    on_page: Vec<String>,
    resolve_media: bool,
    awaiting_scroll: bool,
    finished: bool,
}

impl MessageSweep {
    pub fn new(history: Vec<MessageEntry>, config: &SweepConfig) -> Self {
        Self {
            state: ReconciliationState::new(history, config.page_ceiling),
            attempted: HashSet::new(),
            on_page: Vec::new(),
            resolve_media: config.resolve_media,
            awaiting_scroll: false,
            finished: false,
        }
    }

    /// True until the first `ScrollOlder`. Every capture of the starting screen, including
    /// those taken between side-channel steps, keeps its top cell exempt from the overflow
    /// check.
    pub fn on_first_screen(&self) -> bool {
        self.state.page == 0
    }

    pub fn history(&self) -> &[MessageEntry] {
        &self.state.history
    }

    pub fn cache(&self) -> &[MessageEntry] {
        &self.state.cache
    }

    pub fn page(&self) -> usize {
        self.state.page
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn into_history(self) -> Vec<MessageEntry> {
        self.state.history
    }

    /// Folds one capture into the sweep and decides the next move. The page ceiling counts
    /// `ScrollOlder` decisions only; `Process` steps for side-channel work come on top of it,
    /// at most one per entry.
    pub fn step(&mut self, page: Vec<MessageEntry>) -> Decision<RowRef> {
        if self.finished {
            return Decision::Done;
        }

        let before = fingerprints(&self.state.cache);
        // A page already inside the cache adds nothing, even when it lost a clipped edge cell.
        if !absorb(&page, &mut self.state.cache) {
            self.state.cache = merge(&page, &self.state.cache).entries;
        }
        let changed = fingerprints(&self.state.cache) != before;
        let list_end = self.awaiting_scroll && !changed && !page.is_empty();
        self.awaiting_scroll = false;
        self.on_page = fingerprints(&page);

        let known = merge(&self.state.history, &self.state.cache);
        if let MergeOutcome::Confirmed(overlap) = known.outcome {
            for entry in self.state.cache.iter_mut().take(overlap.lower_end + 1) {
                entry.handled = true;
            }
        }
        log::debug!(
            "page {}: {} on screen, cache {}, history overlap {}",
            self.state.page,
            page.len(),
            self.state.cache.len(),
            known.outcome.label()
        );

        let pending = self.next_pending();
        if pending.is_none()
            && (known.outcome.is_confirmed() || self.state.ceiling_reached() || list_end)
        {
            return self.finish();
        }
        if let Some(row) = pending {
            self.attempted.insert(row.fingerprint.clone());
            log::info!("side channel for {} at {:?}", row.fingerprint, row.click_point);
            return Decision::Process(row);
        }

        self.state.page += 1;
        if self.state.ceiling_reached() {
            log::info!("page ceiling {} reached", self.state.ceiling);
            return self.finish();
        }
        self.awaiting_scroll = true;
        Decision::ScrollOlder
    }

    /// Reports the outcome of a `Process` decision. `media` is the saved reference, if any.
    pub fn resolve(&mut self, fingerprint: &str, media: Option<String>) -> bool {
        self.attempted.insert(fingerprint.to_string());
        let Some(entry) = self
            .state
            .cache
            .iter_mut()
            .find(|entry| entry.fingerprint == fingerprint)
        else {
            return false;
        };
        entry.handled = true;
        if media.is_some() {
            entry.media_path = media;
        }
        true
    }

    fn next_pending(&self) -> Option<RowRef> {
        if !self.resolve_media {
            return None;
        }
        self.on_page
            .iter()
            .filter(|fingerprint| !self.attempted.contains(*fingerprint))
            .filter_map(|fingerprint| {
                self.state
                    .cache
                    .iter()
                    .find(|entry| &entry.fingerprint == fingerprint)
            })
            .find(|entry| entry.needs_side_channel())
            .map(RowRef::from)
    }

    fn finish(&mut self) -> Decision<RowRef> {
        let added = self.state.cache.len();
        let outcome = self.state.commit();
        if matches!(outcome, MergeOutcome::Unresolved { .. }) {
            log::warn!("committed {added} cached entries without a verified overlap");
        }
        log::info!(
            "sweep done after {} pages, history now {} entries",
            self.state.page,
            self.state.history.len()
        );
        self.finished = true;
        Decision::Done
    }
}

#[cfg(test)]
mod tests;
