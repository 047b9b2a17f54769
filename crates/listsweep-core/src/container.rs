use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;

use crate::capture::flatten_cell;
use crate::capture::RawNode;
use crate::capture::UiNode;
use crate::classifier::ElementRole;
use crate::classifier::RoleSet;
use crate::classifier::RoleTable;
use crate::fingerprint::Fingerprinter;
use crate::geometry::Point;
use crate::geometry::Rect;
use crate::reconcile::prefer_longer;
use crate::reconcile::prefer_some;
use crate::reconcile::prefer_true;
use crate::reconcile::FieldRule;
use crate::reconcile::Reconcilable;
use crate::today::normalize_time_label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    Video,
    Transfer,
    RedPacket,
    MiniProgram,
    Article,
    Card,
    SystemNotice,
    Unknown,
}

impl MessageKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::Transfer => "transfer",
            Self::RedPacket => "red-packet",
            Self::MiniProgram => "miniprogram",
            Self::Article => "article",
            Self::Card => "card",
            Self::SystemNotice => "system-notice",
            Self::Unknown => "unknown",
        }
    }

    /// Kinds whose payload lives outside the tree dump and must be fetched separately.
    pub fn has_media(self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

/// Highest first. Incidental roles such as the avatar appear in almost every cell, so the
/// kind is decided by the most specific role present.
const KIND_PRIORITY: [(ElementRole, MessageKind); 13] = [
    (ElementRole::Transfer, MessageKind::Transfer),
    (ElementRole::RedPacket, MessageKind::RedPacket),
    (ElementRole::VoiceDescription, MessageKind::Voice),
    (ElementRole::MiniProgramFooter, MessageKind::MiniProgram),
    (ElementRole::ArticleTitle, MessageKind::Article),
    (ElementRole::ArticleDigest, MessageKind::Article),
    (ElementRole::VideoFile, MessageKind::Video),
    (ElementRole::ShortVideo, MessageKind::Video),
    (ElementRole::Image, MessageKind::Image),
    (ElementRole::BodyText, MessageKind::Text),
    (ElementRole::FileSize, MessageKind::Card),
    (ElementRole::VideoDuration, MessageKind::Video),
    (ElementRole::SystemNotice, MessageKind::SystemNotice),
];

pub fn infer_kind(roles: RoleSet) -> (MessageKind, Option<ElementRole>) {
    KIND_PRIORITY
        .iter()
        .find(|(role, _)| roles.contains(*role))
        .map_or((MessageKind::Unknown, None), |(role, kind)| (*kind, Some(*role)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub top_overflow: bool,
    pub bottom_overflow: bool,
    /// Recorded for consumers of the record; it does not make an entry malformed.
    pub oversized_non_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub speaker: String,
    pub summary: String,
    pub kind: MessageKind,
    pub is_own: bool,
    pub timestamp: Option<String>,
    pub voice_seconds: Option<u32>,
    pub transcript: Option<String>,
    pub fingerprint: String,
    pub click_point: Point,
    pub bounds: Rect,
    pub flags: MessageFlags,
    pub media_path: Option<String>,
    #[serde(skip)]
    pub handled: bool,
}

impl MessageEntry {
    pub fn is_well_formed(&self) -> bool {
        !self.speaker.is_empty()
            && !self.summary.is_empty()
            && !self.flags.top_overflow
            && !self.flags.bottom_overflow
    }

    /// Image and video entries whose media has not been saved yet.
    pub fn needs_side_channel(&self) -> bool {
        self.kind.has_media() && self.media_path.is_none() && !self.handled
    }
}

fn merge_summary(current: &mut MessageEntry, later: &MessageEntry) {
    prefer_longer(&mut current.summary, &later.summary);
}

fn merge_timestamp(current: &mut MessageEntry, later: &MessageEntry) {
    prefer_some(&mut current.timestamp, &later.timestamp);
}

fn merge_voice_seconds(current: &mut MessageEntry, later: &MessageEntry) {
    prefer_some(&mut current.voice_seconds, &later.voice_seconds);
}

fn merge_transcript(current: &mut MessageEntry, later: &MessageEntry) {
    prefer_some(&mut current.transcript, &later.transcript);
}

fn merge_media_path(current: &mut MessageEntry, later: &MessageEntry) {
    prefer_some(&mut current.media_path, &later.media_path);
}

fn merge_handled(current: &mut MessageEntry, later: &MessageEntry) {
    prefer_true(&mut current.handled, later.handled);
}

static MESSAGE_RULES: [FieldRule<MessageEntry>; 6] = [
    FieldRule {
        field: "summary",
        merge: merge_summary,
    },
    FieldRule {
        field: "timestamp",
        merge: merge_timestamp,
    },
    FieldRule {
        field: "voice_seconds",
        merge: merge_voice_seconds,
    },
    FieldRule {
        field: "transcript",
        merge: merge_transcript,
    },
    FieldRule {
        field: "media_path",
        merge: merge_media_path,
    },
    FieldRule {
        field: "handled",
        merge: merge_handled,
    },
];

impl Reconcilable for MessageEntry {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn field_rules() -> &'static [FieldRule<Self>] {
        &MESSAGE_RULES
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildContext {
    pub viewport: Rect,
    pub list_rect: Rect,
    /// Set only for the very first cell of the first capture of a sweep.
    pub exempt_first_cell: bool,
    pub own_message_ratio: f64,
    pub oversized_ratio: f64,
    pub avatar_suffix: String,
}

/// Nodes of one cell after classification, with repeated `(role, text)` pairs removed.
struct Classified {
    nodes: Vec<RawNode>,
    tagged: Vec<(ElementRole, usize)>,
    roles: RoleSet,
}

impl Classified {
    fn collect(cell: &UiNode, table: &RoleTable) -> Self {
        let nodes = flatten_cell(cell);
        let mut seen: HashSet<(ElementRole, String)> = HashSet::new();
        let mut tagged = Vec::new();
        let mut roles = RoleSet::default();
        for (idx, node) in nodes.iter().enumerate() {
            for role in table.classify(node).iter() {
                if seen.insert((role, node.label().to_string())) {
                    tagged.push((role, idx));
                    roles = roles.with(role);
                }
            }
        }
        Self {
            nodes,
            tagged,
            roles,
        }
    }

    fn first(&self, role: ElementRole) -> Option<&RawNode> {
        self.tagged
            .iter()
            .find(|(tagged, _)| *tagged == role)
            .map(|(_, idx)| &self.nodes[*idx])
    }

    fn label(&self, role: ElementRole) -> Option<&str> {
        self.first(role)
            .map(RawNode::label)
            .filter(|label| !label.is_empty())
    }

    fn extent(&self) -> Option<Rect> {
        self.nodes
            .iter()
            .filter_map(|node| node.bounds)
            .reduce(|acc, rect| acc.union(&rect))
    }
}

/// Builds a message from one list cell. `None` means the cell is incomplete or cut off and
/// must not be recorded from this capture.
pub fn build_message(
    cell: &UiNode,
    table: &RoleTable,
    ctx: &BuildContext,
    fingerprinter: &mut Fingerprinter,
) -> Option<MessageEntry> {
    let classified = Classified::collect(cell, table);
    let bounds = cell.rect().or_else(|| classified.extent())?;
    let (kind, kind_role) = infer_kind(classified.roles);

    let speaker = match kind {
        MessageKind::SystemNotice => "system".to_string(),
        _ => classified
            .label(ElementRole::Avatar)
            .map(|label| {
                label
                    .strip_suffix(ctx.avatar_suffix.as_str())
                    .unwrap_or(label)
                    .trim()
                    .to_string()
            })
            .unwrap_or_default(),
    };

    let own_threshold =
        ctx.list_rect.left as f64 + ctx.own_message_ratio * ctx.list_rect.width() as f64;
    let is_own = kind != MessageKind::SystemNotice
        && classified
            .nodes
            .iter()
            .filter_map(|node| node.bounds)
            .any(|rect| rect.right as f64 > own_threshold);

    let timestamp = classified
        .label(ElementRole::Timestamp)
        .map(normalize_time_label);
    let voice_label = classified.label(ElementRole::VoiceDescription);
    let voice_seconds = voice_label.and_then(leading_number);
    let transcript = classified
        .label(ElementRole::VoiceTranscript)
        .filter(|_| kind == MessageKind::Voice)
        .map(str::to_string);
    let summary = render_summary(kind, &classified, voice_seconds, transcript.as_deref());

    let flags = MessageFlags {
        top_overflow: bounds.top <= ctx.viewport.top && !ctx.exempt_first_cell,
        bottom_overflow: bounds.bottom >= ctx.viewport.bottom && kind != MessageKind::Text,
        oversized_non_text: kind != MessageKind::Text
            && bounds.height() as f64 >= ctx.oversized_ratio * ctx.viewport.height() as f64,
    };

    let discriminator = match kind {
        MessageKind::Voice => voice_seconds
            .map(|seconds| seconds.to_string())
            .or_else(|| voice_label.map(str::to_string))
            .unwrap_or_default(),
        _ => summary.clone(),
    };
    let fingerprint = fingerprinter.message(&speaker, &discriminator, timestamp.as_deref());

    let click_point = kind_role
        .and_then(|role| classified.first(role))
        .and_then(|node| node.bounds)
        .unwrap_or(bounds)
        .center();

    let entry = MessageEntry {
        speaker,
        summary,
        kind,
        is_own,
        timestamp,
        voice_seconds,
        transcript,
        fingerprint,
        click_point,
        bounds,
        flags,
        media_path: None,
        handled: false,
    };
    if !entry.is_well_formed() {
        log::debug!(
            "dropping {} cell at {:?}: speaker={:?} summary={:?} flags={:?}",
            kind.label(),
            bounds,
            entry.speaker,
            entry.summary,
            entry.flags
        );
        return None;
    }
    Some(entry)
}

fn render_summary(
    kind: MessageKind,
    classified: &Classified,
    voice_seconds: Option<u32>,
    transcript: Option<&str>,
) -> String {
    let label = |role| classified.label(role).unwrap_or("");
    match kind {
        MessageKind::Text => label(ElementRole::BodyText).to_string(),
        MessageKind::Image => match classified.first(ElementRole::Image).and_then(|n| n.bounds) {
            Some(rect) => format!("[shared an image {}x{}]", rect.width(), rect.height()),
            None => "[shared an image]".to_string(),
        },
        MessageKind::Voice => {
            let head = match voice_seconds {
                Some(seconds) => format!("[sent a {seconds}s voice]"),
                None => "[sent a voice]".to_string(),
            };
            match transcript {
                Some(text) => format!("{head} {text}"),
                None => head,
            }
        }
        MessageKind::Video => bracketed("shared a video", &[label(ElementRole::VideoDuration)]),
        MessageKind::Transfer => bracketed("transfer", &[label(ElementRole::Transfer)]),
        MessageKind::RedPacket => bracketed("red packet", &[label(ElementRole::RedPacket)]),
        MessageKind::MiniProgram => {
            let title = classified
                .label(ElementRole::ArticleTitle)
                .unwrap_or(label(ElementRole::MiniProgramFooter));
            bracketed("mini program", &[title])
        }
        MessageKind::Article => {
            let title = classified
                .label(ElementRole::ArticleTitle)
                .unwrap_or(label(ElementRole::ArticleDigest));
            bracketed("shared an article", &[title])
        }
        MessageKind::Card => bracketed(
            "shared a file",
            &[label(ElementRole::FileName), label(ElementRole::FileSize)],
        ),
        MessageKind::SystemNotice => label(ElementRole::SystemNotice).to_string(),
        MessageKind::Unknown => String::new(),
    }
}

fn bracketed(head: &str, parts: &[&str]) -> String {
    let mut out = format!("[{head}");
    for part in parts.iter().filter(|part| !part.is_empty()) {
        out.push(' ');
        out.push_str(part);
    }
    out.push(']');
    out
}

/// First run of ASCII digits in a label: `12"` -> 12, `99+` -> 99.
fn leading_number(label: &str) -> Option<u32> {
    let digits: String = label
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFlags {
    pub in_viewport: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    pub name: String,
    pub subtitle: String,
    /// Relative-time label, 24-hour `HH:MM` when it was a clock time.
    pub time: String,
    pub unread: u32,
    pub bounds: Rect,
    pub click_point: Point,
    pub fingerprint: String,
    pub flags: SessionFlags,
    /// Id of the group-code rule that matched this row, if any.
    pub group_code: Option<String>,
}

impl SessionEntry {
    pub fn is_valid(&self) -> bool {
        self.flags.in_viewport && !self.name.is_empty()
    }
}

fn merge_unread(current: &mut SessionEntry, later: &SessionEntry) {
    current.unread = current.unread.max(later.unread);
}

fn merge_group_code(current: &mut SessionEntry, later: &SessionEntry) {
    prefer_some(&mut current.group_code, &later.group_code);
}

static SESSION_RULES: [FieldRule<SessionEntry>; 2] = [
    FieldRule {
        field: "unread",
        merge: merge_unread,
    },
    FieldRule {
        field: "group_code",
        merge: merge_group_code,
    },
];

impl Reconcilable for SessionEntry {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn field_rules() -> &'static [FieldRule<Self>] {
        &SESSION_RULES
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionContext {
    pub viewport: Rect,
}

/// Reads one session-list row. Today and group-code flags are left unset; the parser owns
/// those decisions.
pub fn build_session(
    cell: &UiNode,
    table: &RoleTable,
    ctx: &SessionContext,
    fingerprinter: &mut Fingerprinter,
) -> Option<SessionEntry> {
    let classified = Classified::collect(cell, table);
    let bounds = cell.rect().or_else(|| classified.extent())?;
    let text = |role| classified.label(role).unwrap_or("").to_string();

    let name = text(ElementRole::SessionTitle);
    let subtitle = text(ElementRole::SessionPreview);
    let time = normalize_time_label(&text(ElementRole::SessionTime));
    let unread = classified
        .first(ElementRole::UnreadBadge)
        .map_or(0, |badge| leading_number(badge.label()).unwrap_or(1));
    let in_viewport = bounds.top >= ctx.viewport.top && bounds.bottom <= ctx.viewport.bottom;
    let fingerprint = fingerprinter.session(&name, &subtitle, &time);

    Some(SessionEntry {
        name,
        subtitle,
        time,
        unread,
        bounds,
        click_point: bounds.center(),
        fingerprint,
        flags: SessionFlags {
            in_viewport,
            is_today: false,
        },
        group_code: None,
    })
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::samples::*;
    use super::*;
    use crate::capture::fixtures::layout;
    use crate::capture::fixtures::node;
    use crate::classifier::Surface;

    fn ctx() -> BuildContext {
        BuildContext {
            viewport: Rect::new(0, 200, 1080, 1800),
            list_rect: Rect::new(0, 200, 1080, 1800),
            exempt_first_cell: false,
            own_message_ratio: 0.95,
            oversized_ratio: 0.4,
            avatar_suffix: "头像".to_string(),
        }
    }

    fn build(cell: &UiNode) -> Option<MessageEntry> {
        let table = RoleTable::new(Surface::Conversation);
        build_message(cell, &table, &ctx(), &mut Fingerprinter::new())
    }

    #[test]
    fn text_message_from_received_row() {
        let entry = build(&text_row(400, "Alice", "hello there")).expect("well formed");
        assert_eq!(entry.kind, MessageKind::Text);
        assert_eq!(entry.speaker, "Alice");
        assert_eq!(entry.summary, "hello there");
        assert!(!entry.is_own);
        assert_eq!(entry.click_point, Point { x: 420, y: 470 });
    }

    #[test]
    fn own_message_detected_by_right_extent() {
        let entry = build(&own(400, "Me", text_bubble(400, "ok"))).expect("well formed");
        assert!(entry.is_own);
        assert_eq!(entry.speaker, "Me");
    }

    #[test]
    fn voice_with_transcript() {
        let bubble = vec![
            layout(
                "FrameLayout",
                "[140,420][400,520]",
                vec![node("TextView", "5\"", "", "[150,430][200,510]", Vec::new())],
            ),
            node("TextView", "see you at noon", "", "[140,530][700,580]", Vec::new()),
        ];
        let entry = build(&received(400, "Bob", bubble)).expect("well formed");
        assert_eq!(entry.kind, MessageKind::Voice);
        assert!(!entry.is_own);
        assert_eq!(entry.voice_seconds, Some(5));
        assert_eq!(entry.summary, "[sent a 5s voice] see you at noon");
        assert_eq!(entry.transcript.as_deref(), Some("see you at noon"));
    }

    #[test]
    fn voice_identity_ignores_late_transcript() {
        let voice = |with_transcript: bool| {
            let mut bubble = vec![layout(
                "FrameLayout",
                "[140,420][400,520]",
                vec![node("TextView", "5\"", "", "[150,430][200,510]", Vec::new())],
            )];
            if with_transcript {
                bubble.push(node("TextView", "later text", "", "[140,530][700,580]", Vec::new()));
            }
            received(400, "Bob", bubble)
        };
        let before = build(&voice(false)).expect("well formed");
        let after = build(&voice(true)).expect("well formed");
        assert_eq!(before.fingerprint, after.fingerprint);
        assert_eq!(before.summary, "[sent a 5s voice]");
    }

    #[test]
    fn image_summary_uses_rendered_size() {
        let entry = build(&image_row(400, "Carol")).expect("well formed");
        assert_eq!(entry.kind, MessageKind::Image);
        assert_eq!(entry.summary, "[shared an image 300x150]");
        assert!(entry.needs_side_channel());
    }

    fn tall_row(content: UiNode) -> UiNode {
        layout(
            "LinearLayout",
            "[0,300][1080,1000]",
            vec![layout(
                "RelativeLayout",
                "[0,300][1080,1000]",
                vec![
                    node("ImageView", "", "Eve头像", "[20,310][120,410]", Vec::new()),
                    layout("LinearLayout", "[130,310][800,990]", vec![content]),
                ],
            )],
        )
    }

    #[test]
    fn tall_media_is_flagged_oversized_but_tall_text_is_not() {
        let image = node("ImageView", "", "", "[140,320][440,980]", Vec::new());
        let entry = build(&tall_row(image)).expect("well formed");
        assert_eq!(entry.kind, MessageKind::Image);
        assert!(entry.flags.oversized_non_text);

        let text = node("TextView", "a long letter", "", "[140,320][700,980]", Vec::new());
        let entry = build(&tall_row(text)).expect("well formed");
        assert_eq!(entry.kind, MessageKind::Text);
        assert!(!entry.flags.oversized_non_text);

        let short = build(&image_row(400, "Carol")).expect("well formed");
        assert!(!short.flags.oversized_non_text);
    }

    #[test]
    fn transfer_outranks_body_text() {
        let bubble = vec![
            node("TextView", "thanks", "", "[140,420][500,460]", Vec::new()),
            layout(
                "RelativeLayout",
                "[140,470][600,560]",
                vec![node("TextView", "¥20.00", "", "[150,505][400,550]", Vec::new())],
            ),
        ];
        let entry = build(&received(400, "Dan", bubble)).expect("well formed");
        assert_eq!(entry.kind, MessageKind::Transfer);
        assert_eq!(entry.summary, "[transfer ¥20.00]");
        assert_eq!(entry.click_point, Point { x: 275, y: 527 });
    }

    #[test]
    fn system_notice_gets_system_speaker() {
        let cell = layout(
            "LinearLayout",
            "[0,400][1080,480]",
            vec![layout(
                "FrameLayout",
                "[0,400][1080,480]",
                vec![node("TextView", "Alice joined the group", "", "[200,410][880,470]", Vec::new())],
            )],
        );
        let entry = build(&cell).expect("well formed");
        assert_eq!(entry.kind, MessageKind::SystemNotice);
        assert_eq!(entry.speaker, "system");
        assert_eq!(entry.summary, "Alice joined the group");
    }

    #[test]
    fn overflowing_cells_are_dropped() {
        // Cut off at the top of the viewport.
        assert_eq!(build(&text_row(150, "Alice", "hi")), None);
        // Non-text cut off at the bottom.
        assert_eq!(build(&image_row(1700, "Alice")), None);
        // Text at the bottom is kept.
        assert!(build(&text_row(1700, "Alice", "hi")).is_some());
    }

    #[test]
    fn first_cell_of_sweep_is_exempt_from_top_overflow() {
        let table = RoleTable::new(Surface::Conversation);
        let mut context = ctx();
        context.exempt_first_cell = true;
        let entry = build_message(&text_row(150, "Alice", "hi"), &table, &context, &mut Fingerprinter::new());
        assert!(entry.is_some());
    }

    #[test]
    fn missing_avatar_leaves_cell_incomplete() {
        let cell = layout(
            "LinearLayout",
            "[0,400][1080,600]",
            vec![layout(
                "RelativeLayout",
                "[0,400][1080,600]",
                vec![layout("LinearLayout", "[130,410][800,590]", text_bubble(400, "orphan"))],
            )],
        );
        assert_eq!(build(&cell), None);
    }

    #[test]
    fn identical_cells_get_identical_fingerprints() {
        let a = build(&text_row(400, "Alice", "hi")).expect("well formed");
        let b = build(&text_row(900, "Alice", "hi")).expect("well formed");
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.bounds, b.bounds);
    }

    #[test]
    fn session_row_fields() {
        let table = RoleTable::new(Surface::SessionList);
        let ctx = SessionContext {
            viewport: Rect::new(0, 200, 1080, 1800),
        };
        let row = session_row(300, "Project AB-1234 (12)", "see attached", "下午3:05", Some("3"));
        let entry = build_session(&row, &table, &ctx, &mut Fingerprinter::new()).expect("row");
        assert_eq!(entry.name, "Project AB-1234 (12)");
        assert_eq!(entry.subtitle, "see attached");
        assert_eq!(entry.time, "15:05");
        assert_eq!(entry.unread, 3);
        assert!(entry.is_valid());

        let clipped = session_row(1700, "Later", "", "昨天", None);
        let entry = build_session(&clipped, &table, &ctx, &mut Fingerprinter::new()).expect("row");
        assert_eq!(entry.unread, 0);
        assert!(!entry.flags.in_viewport);
        assert!(!entry.is_valid());
    }
}
