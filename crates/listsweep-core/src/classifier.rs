use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use crate::capture::RawNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementRole {
    Avatar,
    BodyText,
    Timestamp,
    VoiceDescription,
    VoiceTranscript,
    Image,
    RedPacket,
    Transfer,
    ArticleTitle,
    ArticleDigest,
    MiniProgramFooter,
    SystemNotice,
    FileName,
    FileSize,
    VideoFile,
    ShortVideo,
    VideoDuration,
    SessionTitle,
    SessionPreview,
    SessionTime,
    UnreadBadge,
}

impl ElementRole {
    pub const ALL: [ElementRole; 21] = [
        Self::Avatar,
        Self::BodyText,
        Self::Timestamp,
        Self::VoiceDescription,
        Self::VoiceTranscript,
        Self::Image,
        Self::RedPacket,
        Self::Transfer,
        Self::ArticleTitle,
        Self::ArticleDigest,
        Self::MiniProgramFooter,
        Self::SystemNotice,
        Self::FileName,
        Self::FileSize,
        Self::VideoFile,
        Self::ShortVideo,
        Self::VideoDuration,
        Self::SessionTitle,
        Self::SessionPreview,
        Self::SessionTime,
        Self::UnreadBadge,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Avatar => "avatar",
            Self::BodyText => "body-text",
            Self::Timestamp => "timestamp",
            Self::VoiceDescription => "voice-description",
            Self::VoiceTranscript => "voice-transcript",
            Self::Image => "image",
            Self::RedPacket => "red-packet",
            Self::Transfer => "transfer",
            Self::ArticleTitle => "article-title",
            Self::ArticleDigest => "article-digest",
            Self::MiniProgramFooter => "mini-program-footer",
            Self::SystemNotice => "system-notice",
            Self::FileName => "file-name",
            Self::FileSize => "file-size",
            Self::VideoFile => "video-file",
            Self::ShortVideo => "short-video",
            Self::VideoDuration => "video-duration",
            Self::SessionTitle => "session-title",
            Self::SessionPreview => "session-preview",
            Self::SessionTime => "session-time",
            Self::UnreadBadge => "unread-badge",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Zero or more roles attached to one node. Empty means `unknown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u32);

impl RoleSet {
    pub fn of(roles: &[ElementRole]) -> Self {
        roles.iter().fold(Self::default(), |set, role| set.with(*role))
    }

    pub fn with(self, role: ElementRole) -> Self {
        Self(self.0 | role.bit())
    }

    pub fn union(self, other: RoleSet) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, role: ElementRole) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_unknown(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = ElementRole> {
        ElementRole::ALL
            .into_iter()
            .filter(move |role| self.contains(*role))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Surface {
    Conversation,
    SessionList,
}

impl Surface {
    pub fn label(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::SessionList => "sessions",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRule {
    pub path: &'static str,
    pub roles: &'static [ElementRole],
}

const fn rule(path: &'static str, roles: &'static [ElementRole]) -> RoleRule {
    RoleRule { path, roles }
}

use ElementRole::*;

/// Layout variants: `{row}` is the message row, shifted by one when a time header precedes it;
/// `{bubble}` is the content column, left of the avatar for own messages and right of it
/// otherwise.
const ROW_VARIANTS: [&str; 2] = ["RelativeLayout[0]", "RelativeLayout[1]"];
const BUBBLE_VARIANTS: [&str; 2] = ["LinearLayout[0]", "LinearLayout[1]"];

const CONVERSATION_RULES: [RoleRule; 22] = [
    rule("TextView[0]", &[Timestamp]),
    rule("FrameLayout[0]/TextView[0]", &[SystemNotice]),
    rule("FrameLayout[1]/TextView[0]", &[SystemNotice]),
    rule("{row}/ImageView[0]", &[Avatar]),
    rule("{row}/ImageView[1]", &[Avatar]),
    rule("{row}/{bubble}/TextView[0]", &[BodyText]),
    rule("{row}/{bubble}/TextView[1]", &[VoiceTranscript]),
    rule("{row}/{bubble}/ImageView[0]", &[Image]),
    rule("{row}/{bubble}/FrameLayout[0]/TextView[0]", &[VoiceDescription]),
    rule("{row}/{bubble}/FrameLayout[1]/ImageView[0]", &[VideoFile, Image]),
    rule("{row}/{bubble}/FrameLayout[1]/TextView[1]", &[VideoDuration]),
    rule("{row}/{bubble}/FrameLayout[2]/ImageView[0]", &[ShortVideo, Image]),
    rule("{row}/{bubble}/FrameLayout[2]/TextView[1]", &[VideoDuration]),
    rule("{row}/{bubble}/RelativeLayout[0]/TextView[0]", &[RedPacket]),
    rule("{row}/{bubble}/RelativeLayout[0]/TextView[1]", &[RedPacket]),
    rule("{row}/{bubble}/RelativeLayout[1]/TextView[0]", &[Transfer]),
    rule("{row}/{bubble}/LinearLayout[0]/TextView[0]", &[ArticleTitle]),
    rule("{row}/{bubble}/LinearLayout[0]/TextView[1]", &[ArticleDigest]),
    rule("{row}/{bubble}/LinearLayout[0]/ImageView[2]", &[Image]),
    rule("{row}/{bubble}/LinearLayout[0]/TextView[3]", &[MiniProgramFooter]),
    rule("{row}/{bubble}/RelativeLayout[2]/TextView[0]", &[FileName]),
    rule("{row}/{bubble}/RelativeLayout[2]/TextView[1]", &[FileSize]),
];

const SESSION_RULES: [RoleRule; 7] = [
    rule("RelativeLayout[0]/ImageView[0]", &[Avatar]),
    rule("RelativeLayout[0]/TextView[1]", &[UnreadBadge]),
    rule("LinearLayout[1]/LinearLayout[0]/TextView[0]", &[SessionTitle]),
    rule("LinearLayout[1]/LinearLayout[0]/TextView[1]", &[SessionTime]),
    rule("LinearLayout[1]/LinearLayout[1]/TextView[0]", &[SessionPreview]),
    rule("ImageView[0]", &[Avatar]),
    rule("TextView[2]", &[UnreadBadge]),
];

pub fn rules_for(surface: Surface) -> &'static [RoleRule] {
    match surface {
        Surface::Conversation => &CONVERSATION_RULES,
        Surface::SessionList => &SESSION_RULES,
    }
}

/// Exact-match lookup from normalized structural path to roles, owned per parser instance.
#[derive(Debug, Clone)]
pub struct RoleTable {
    surface: Surface,
    entries: HashMap<String, RoleSet>,
}

impl RoleTable {
    pub fn new(surface: Surface) -> Self {
        let mut entries: HashMap<String, RoleSet> = HashMap::new();
        for rule in rules_for(surface) {
            let roles = RoleSet::of(rule.roles);
            for path in expand(rule.path) {
                let slot = entries.entry(path).or_default();
                *slot = slot.union(roles);
            }
        }
        Self { surface, entries }
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn classify(&self, node: &RawNode) -> RoleSet {
        self.lookup(&node.path.normalized())
    }

    pub fn lookup(&self, normalized_path: &str) -> RoleSet {
        self.entries
            .get(normalized_path)
            .copied()
            .unwrap_or_default()
    }
}

fn expand(template: &str) -> Vec<String> {
    let rows: &[&str] = if template.contains("{row}") {
        &ROW_VARIANTS
    } else {
        &[""]
    };
    let bubbles: &[&str] = if template.contains("{bubble}") {
        &BUBBLE_VARIANTS
    } else {
        &[""]
    };
    let mut out = Vec::with_capacity(rows.len() * bubbles.len());
    for row in rows {
        for bubble in bubbles {
            out.push(template.replace("{row}", row).replace("{bubble}", bubble));
        }
    }
    out
}
