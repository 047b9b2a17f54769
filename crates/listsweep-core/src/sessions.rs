use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::container::SessionEntry;
use crate::reconcile::merge;
use crate::reconcile::ReconciliationState;
use crate::sweep::fingerprints;
use crate::sweep::Decision;
use crate::sweep::RowRef;

/// The last session row that was processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCursor {
    pub name: String,
    pub subtitle: String,
    pub time: String,
    pub unread: u32,
}

impl SessionCursor {
    pub fn from_entry(entry: &SessionEntry) -> Self {
        Self {
            name: entry.name.clone(),
            subtitle: entry.subtitle.clone(),
            time: entry.time.clone(),
            unread: entry.unread,
        }
    }

    /// Opening a session clears its badge, so the unread count is not part of the match.
    pub fn matches(&self, entry: &SessionEntry) -> bool {
        self.name == entry.name && self.subtitle == entry.subtitle && self.time == entry.time
    }
}

impl From<&SessionEntry> for RowRef {
    fn from(entry: &SessionEntry) -> Self {
        Self {
            fingerprint: entry.fingerprint.clone(),
            click_point: entry.click_point,
            bounds: entry.bounds,
        }
    }
}

/// Picks the next row to open. `rows` are newest first; "below" means older.
pub fn select_row(
    rows: &[SessionEntry],
    cursor: Option<&SessionCursor>,
    at_list_end: bool,
) -> Decision<RowRef> {
    let Some(bottom) = rows.last() else {
        return Decision::Done;
    };
    let position = cursor.and_then(|cursor| rows.iter().position(|row| cursor.matches(row)));
    let candidates = match position {
        Some(position) => &rows[position + 1..],
        None if bottom.flags.is_today => return Decision::ScrollNewer,
        None => rows,
    };

    let eligible: Vec<&SessionEntry> = candidates
        .iter()
        .filter(|row| row.is_valid() && row.flags.is_today)
        .collect();
    if let Some(row) = eligible.iter().find(|row| row.group_code.is_some()) {
        return Decision::Process(RowRef::from(*row));
    }
    if let Some(row) = eligible.last() {
        return Decision::Process(RowRef::from(*row));
    }
    if at_list_end {
        Decision::Done
    } else {
        Decision::ScrollOlder
    }
}

/// Reconciles session-list pages and applies [`select_row`] to everything seen so far.
#[derive(Debug, Clone)]
pub struct SessionSweep {
    state: ReconciliationState<SessionEntry>,
    cursor: Option<SessionCursor>,
    awaiting_scroll: bool,
    finished: bool,
}

impl SessionSweep {
    pub fn new(cursor: Option<SessionCursor>, page_ceiling: usize) -> Self {
        Self {
            state: ReconciliationState::new(Vec::new(), page_ceiling),
            cursor,
            awaiting_scroll: false,
            finished: false,
        }
    }

    pub fn cursor(&self) -> Option<&SessionCursor> {
        self.cursor.as_ref()
    }

    pub fn rows(&self) -> &[SessionEntry] {
        &self.state.cache
    }

    pub fn row(&self, fingerprint: &str) -> Option<&SessionEntry> {
        self.state
            .cache
            .iter()
            .find(|row| row.fingerprint == fingerprint)
    }

    pub fn page(&self) -> usize {
        self.state.page
    }

    pub fn step(&mut self, page: Vec<SessionEntry>) -> Decision<RowRef> {
        if self.finished {
            return Decision::Done;
        }
        let before = fingerprints(&self.state.cache);
        self.state.cache = merge(&self.state.cache, &page).entries;
        refresh_positions(&mut self.state.cache, &page);
        let changed = fingerprints(&self.state.cache) != before;
        let at_list_end = self.awaiting_scroll && !changed && !page.is_empty();
        self.awaiting_scroll = false;

        let decision = select_row(&self.state.cache, self.cursor.as_ref(), at_list_end);
        log::debug!(
            "session page {}: {} rows seen, list end {at_list_end}, decision {}",
            self.state.page,
            self.state.cache.len(),
            decision.label()
        );
        match decision {
            Decision::Process(row) => {
                if let Some(entry) = self.row(&row.fingerprint) {
                    log::info!("opening session {:?}", entry.name);
                    self.cursor = Some(SessionCursor::from_entry(entry));
                }
                Decision::Process(row)
            }
            Decision::ScrollOlder | Decision::ScrollNewer => {
                self.state.page += 1;
                if self.state.ceiling_reached() {
                    log::info!("session page ceiling {} reached", self.state.ceiling);
                    self.finished = true;
                    return Decision::Done;
                }
                if decision == Decision::ScrollNewer {
                    self.state.reset_cache();
                } else {
                    self.awaiting_scroll = true;
                }
                decision
            }
            Decision::Done => {
                self.finished = true;
                Decision::Done
            }
        }
    }
}

/// Positions and viewport membership always come from the latest capture; rows that scrolled
/// away are no longer actionable.
fn refresh_positions(cache: &mut [SessionEntry], page: &[SessionEntry]) {
    let latest: HashMap<&str, &SessionEntry> = page
        .iter()
        .map(|row| (row.fingerprint.as_str(), row))
        .collect();
    for row in cache.iter_mut() {
        match latest.get(row.fingerprint.as_str()) {
            Some(seen) => {
                row.bounds = seen.bounds;
                row.click_point = seen.click_point;
                row.flags.in_viewport = seen.flags.in_viewport;
            }
            None => row.flags.in_viewport = false,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::container::SessionFlags;
    use crate::fingerprint::Fingerprinter;
    use crate::geometry::Rect;

    fn row(name: &str, time: &str, today: bool, slot: i32) -> SessionEntry {
        let bounds = Rect::new(0, 300 + slot * 150, 1080, 450 + slot * 150);
        SessionEntry {
            name: name.to_string(),
            subtitle: format!("last from {name}"),
            time: time.to_string(),
            unread: 0,
            bounds,
            click_point: bounds.center(),
            fingerprint: Fingerprinter::new().session(name, &format!("last from {name}"), time),
            flags: SessionFlags {
                in_viewport: true,
                is_today: today,
            },
            group_code: None,
        }
    }

    fn coded(mut entry: SessionEntry) -> SessionEntry {
        entry.group_code = Some("letters-dash-digits".to_string());
        entry
    }

    fn cursor_at(entry: &SessionEntry) -> SessionCursor {
        SessionCursor::from_entry(entry)
    }

    fn processed(decision: &Decision<RowRef>) -> Option<&str> {
        match decision {
            Decision::Process(row) => Some(row.fingerprint.as_str()),
            _ => None,
        }
    }

    #[test]
    fn empty_list_is_done() {
        assert_eq!(select_row(&[], None, false), Decision::Done);
    }

    #[test]
    fn topmost_today_cursor_with_nothing_older_scrolls_older() {
        let rows = vec![
            row("C", "09:00", true, 0),
            row("A", "昨天", false, 1),
            row("B", "昨天", false, 2),
        ];
        let cursor = cursor_at(&rows[0]);
        assert_eq!(select_row(&rows, Some(&cursor), false), Decision::ScrollOlder);
        assert_eq!(select_row(&rows, Some(&cursor), true), Decision::Done);
    }

    #[test]
    fn group_code_match_closest_below_cursor_wins() {
        let rows = vec![
            row("cursor", "11:00", true, 0),
            row("plain", "10:30", true, 1),
            coded(row("AB-1001", "10:00", true, 2)),
            coded(row("AB-1002", "09:00", true, 3)),
            row("old", "昨天", false, 4),
        ];
        let cursor = cursor_at(&rows[0]);
        let decision = select_row(&rows, Some(&cursor), false);
        assert_eq!(processed(&decision), Some(rows[2].fingerprint.as_str()));
    }

    #[test]
    fn without_codes_the_oldest_today_row_is_taken() {
        let rows = vec![
            row("cursor", "11:00", true, 0),
            row("newer", "10:30", true, 1),
            row("older", "10:00", true, 2),
            row("yesterday", "昨天", false, 3),
        ];
        let cursor = cursor_at(&rows[0]);
        let decision = select_row(&rows, Some(&cursor), false);
        assert_eq!(processed(&decision), Some(rows[2].fingerprint.as_str()));
    }

    #[test]
    fn rows_above_the_cursor_are_ignored() {
        let rows = vec![
            coded(row("AB-1001", "11:30", true, 0)),
            row("cursor", "11:00", true, 1),
            row("yesterday", "昨天", false, 2),
        ];
        let cursor = cursor_at(&rows[1]);
        assert_eq!(select_row(&rows, Some(&cursor), false), Decision::ScrollOlder);
    }

    #[test]
    fn missing_cursor_with_today_bottom_scrolls_newer() {
        let rows = vec![row("x", "11:00", true, 0), row("y", "10:00", true, 1)];
        assert_eq!(select_row(&rows, None, false), Decision::ScrollNewer);
        let stale = SessionCursor {
            name: "gone".to_string(),
            subtitle: String::new(),
            time: "08:00".to_string(),
            unread: 0,
        };
        assert_eq!(select_row(&rows, Some(&stale), false), Decision::ScrollNewer);
    }

    #[test]
    fn missing_cursor_filters_the_whole_list() {
        let rows = vec![
            row("x", "11:00", true, 0),
            coded(row("CD-2002", "10:00", true, 1)),
            row("old", "昨天", false, 2),
        ];
        let decision = select_row(&rows, None, false);
        assert_eq!(processed(&decision), Some(rows[1].fingerprint.as_str()));

        let stale_only = vec![row("old", "昨天", false, 0)];
        assert_eq!(select_row(&stale_only, None, false), Decision::ScrollOlder);
        assert_eq!(select_row(&stale_only, None, true), Decision::Done);
    }

    #[test]
    fn off_screen_and_nameless_rows_are_not_eligible() {
        let mut hidden = row("hidden", "10:00", true, 1);
        hidden.flags.in_viewport = false;
        let nameless = row("", "09:30", true, 2);
        let rows = vec![
            row("cursor", "11:00", true, 0),
            hidden,
            nameless,
            row("old", "昨天", false, 3),
        ];
        let cursor = cursor_at(&rows[0]);
        assert_eq!(select_row(&rows, Some(&cursor), false), Decision::ScrollOlder);
    }

    #[test]
    fn cursor_survives_cleared_badge() {
        let mut before = row("team", "10:00", true, 0);
        before.unread = 5;
        let cursor = cursor_at(&before);
        let after = row("team", "10:00", true, 0);
        assert!(cursor.matches(&after));
    }

    #[test]
    fn sweep_scrolls_until_a_today_row_appears_below_the_cursor() {
        let first_page = vec![
            row("cursor", "11:00", true, 0),
            row("yesterday", "昨天", false, 1),
        ];
        let cursor = cursor_at(&first_page[0]);
        let mut sweep = SessionSweep::new(Some(cursor), 10);
        assert_eq!(sweep.step(first_page.clone()), Decision::ScrollOlder);

        // Same content after a scroll: the list end.
        assert_eq!(sweep.step(first_page), Decision::Done);
        assert_eq!(sweep.page(), 1);
    }

    #[test]
    fn sweep_processes_and_advances_the_cursor() {
        let page = vec![
            row("cursor", "11:00", true, 0),
            row("next", "10:00", true, 1),
            row("after", "09:00", true, 2),
        ];
        let mut sweep = SessionSweep::new(Some(cursor_at(&page[0])), 10);

        let first = sweep.step(page.clone());
        assert_eq!(processed(&first), Some(page[2].fingerprint.as_str()));
        assert_eq!(sweep.cursor().map(|c| c.name.as_str()), Some("after"));

        // Nothing below the new cursor; the page has not moved since the last decision.
        assert_eq!(sweep.step(page), Decision::ScrollOlder);
    }

    #[test]
    fn scrolled_away_rows_cannot_be_processed() {
        let top = vec![row("cursor", "11:00", true, 0), row("a", "昨天", false, 1)];
        let mut sweep = SessionSweep::new(Some(cursor_at(&top[0])), 10);
        assert_eq!(sweep.step(top), Decision::ScrollOlder);

        let lower = vec![row("a", "昨天", false, 0), row("b", "昨天", false, 1)];
        assert_eq!(sweep.step(lower), Decision::ScrollOlder);
        assert!(!sweep.rows()[0].flags.in_viewport);
        assert_eq!(sweep.rows().len(), 3);
    }

    #[test]
    fn ceiling_stops_endless_scrolling() {
        let mut sweep = SessionSweep::new(None, 2);
        let today = vec![row("x", "11:00", true, 0)];
        assert_eq!(sweep.step(today.clone()), Decision::ScrollNewer);
        assert_eq!(sweep.step(today.clone()), Decision::Done);
        assert_eq!(sweep.step(today), Decision::Done);
    }
}
