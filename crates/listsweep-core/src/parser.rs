use crate::capture::list_capture;
use crate::capture::UiNode;
use crate::classifier::RoleTable;
use crate::classifier::Surface;
use crate::config::LayoutConfig;
use crate::container::build_message;
use crate::container::build_session;
use crate::container::BuildContext;
use crate::container::MessageEntry;
use crate::container::SessionContext;
use crate::container::SessionEntry;
use crate::fingerprint::Fingerprinter;
use crate::group_code::GroupCodePolicy;
use crate::group_code::RowSignals;
use crate::today::ClockLabelToday;
use crate::today::TodayPredicate;

/// Turns captures into ordered pages of entries. Owns every cache the pipeline uses, so one
/// parser serves exactly one automation session.
pub struct CaptureParser {
    layout: LayoutConfig,
    conversation: RoleTable,
    sessions: RoleTable,
    fingerprinter: Fingerprinter,
    today: Box<dyn TodayPredicate>,
    group_codes: GroupCodePolicy,
}

impl CaptureParser {
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            layout,
            conversation: RoleTable::new(Surface::Conversation),
            sessions: RoleTable::new(Surface::SessionList),
            fingerprinter: Fingerprinter::new(),
            today: Box::new(ClockLabelToday),
            group_codes: GroupCodePolicy::default(),
        }
    }

    pub fn with_today(mut self, today: impl TodayPredicate + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn with_group_codes(mut self, policy: GroupCodePolicy) -> Self {
        self.group_codes = policy;
        self
    }

    pub fn group_codes(&self) -> &GroupCodePolicy {
        &self.group_codes
    }

    /// Well-formed messages of one capture, oldest first. `exempt_first_cell` is set for the
    /// first capture of a sweep, whose top cell may legitimately touch the viewport edge.
    pub fn parse_messages(&mut self, root: &UiNode, exempt_first_cell: bool) -> Vec<MessageEntry> {
        let Some(capture) = list_capture(root, &self.layout.list_classes) else {
            log::debug!("no message list in capture");
            return Vec::new();
        };
        let mut ctx = BuildContext {
            viewport: capture.viewport,
            list_rect: capture.list.rect().unwrap_or(capture.viewport),
            exempt_first_cell: false,
            own_message_ratio: self.layout.own_message_ratio,
            oversized_ratio: self.layout.oversized_ratio,
            avatar_suffix: self.layout.avatar_suffix.clone(),
        };
        let mut entries = Vec::with_capacity(capture.cells.len());
        for (idx, cell) in capture.cells.iter().enumerate() {
            ctx.exempt_first_cell = exempt_first_cell && idx == 0;
            if let Some(entry) =
                build_message(cell, &self.conversation, &ctx, &mut self.fingerprinter)
            {
                entries.push(entry);
            }
        }
        log::debug!(
            "parsed {} of {} message cells",
            entries.len(),
            capture.cells.len()
        );
        entries
    }

    /// Session rows of one capture, newest first, with today and group-code flags applied.
    pub fn parse_sessions(&mut self, root: &UiNode) -> Vec<SessionEntry> {
        let Some(capture) = list_capture(root, &self.layout.list_classes) else {
            log::debug!("no session list in capture");
            return Vec::new();
        };
        let ctx = SessionContext {
            viewport: capture.viewport,
        };
        let mut rows = Vec::with_capacity(capture.cells.len());
        for cell in &capture.cells {
            let Some(mut row) = build_session(cell, &self.sessions, &ctx, &mut self.fingerprinter)
            else {
                continue;
            };
            row.flags.is_today = self.today.is_today(&row.time);
            row.group_code = self
                .group_codes
                .matching_rule(&RowSignals::from_entry(&row))
                .map(str::to_string);
            rows.push(row);
        }
        rows
    }
}
