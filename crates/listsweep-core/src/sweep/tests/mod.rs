use pretty_assertions::assert_eq;

pub(super) use super::Decision;
pub(super) use super::MessageSweep;
pub(super) use super::RowRef;
pub(super) use crate::config::SweepConfig;
pub(super) use crate::container::MessageEntry;
pub(super) use crate::container::MessageFlags;
pub(super) use crate::container::MessageKind;
pub(super) use crate::fingerprint::identity_key;
pub(super) use crate::fingerprint::stable_hash;
pub(super) use crate::geometry::Rect;
pub(super) use crate::reconcile::merge;
pub(super) use crate::reconcile::MergeOutcome;


fn entry(kind: MessageKind, speaker: &str, summary: &str) -> MessageEntry {
    let bounds = Rect::new(0, 400, 1080, 600);
    MessageEntry {
        speaker: speaker.to_string(),
        summary: summary.to_string(),
        kind,
        is_own: false,
        timestamp: None,
        voice_seconds: None,
        transcript: None,
        fingerprint: stable_hash(&identity_key(speaker, summary, None)),
        click_point: bounds.center(),
        bounds,
        flags: MessageFlags::default(),
        media_path: None,
        handled: false,
    }
}

fn text(n: usize) -> MessageEntry {
    entry(MessageKind::Text, "Alice", &format!("message {n}"))
}

fn image(n: usize) -> MessageEntry {
    entry(MessageKind::Image, "Bob", &format!("[shared an image {n}x{n}]"))
}

fn config(page_ceiling: usize, resolve_media: bool) -> SweepConfig {
    SweepConfig {
        page_ceiling,
        resolve_media,
    }
}

fn summaries(entries: &[MessageEntry]) -> Vec<String> {
    entries.iter().map(|entry| entry.summary.clone()).collect()
}

/// A scrolling conversation: `window` entries visible, `stride` entries per scroll, starting
/// at the newest end.
struct Conversation {
    entries: Vec<MessageEntry>,
    window: usize,
    stride: usize,
    bottom: usize,
}

impl Conversation {
    fn new(entries: Vec<MessageEntry>, window: usize, stride: usize) -> Self {
        let bottom = entries.len();
        Self {
            entries,
            window,
            stride,
            bottom,
        }
    }

    fn page(&self) -> Vec<MessageEntry> {
        let top = self.bottom.saturating_sub(self.window);
        self.entries[top..self.bottom].to_vec()
    }

    fn scroll_older(&mut self) {
        let floor = self.window.min(self.entries.len());
        self.bottom = self.bottom.saturating_sub(self.stride).max(floor);
    }
}

/// Runs the sweep to completion, resolving every side-channel request with `media/<n>.png`.
fn drive(sweep: &mut MessageSweep, conversation: &mut Conversation) -> Vec<&'static str> {
    let mut decisions = Vec::new();
    for _ in 0..200 {
        let decision = sweep.step(conversation.page());
        decisions.push(decision.label());
        match decision {
            Decision::ScrollOlder => conversation.scroll_older(),
            Decision::Process(row) => {
                let media = format!("media/{}.png", decisions.len());
                assert!(sweep.resolve(&row.fingerprint, Some(media)));
            }
            Decision::ScrollNewer => panic!("message sweeps never scroll newer"),
            Decision::Done => return decisions,
        }
    }
    panic!("sweep did not terminate: {decisions:?}");
}

#[test]
fn helpers_build_distinct_fingerprints() {
    assert_eq!(text(1).fingerprint, text(1).fingerprint);
    assert!(text(1).fingerprint != text(2).fingerprint);
    assert!(image(1).needs_side_channel());
}
