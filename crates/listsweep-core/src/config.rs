use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sweep: SweepConfig,
    pub layout: LayoutConfig,
    pub sessions: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep: SweepConfig::default(),
            layout: LayoutConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    /// Pages scrolled before a message sweep gives up looking for known history.
    pub page_ceiling: usize,
    /// Whether image and video entries are handed to the side channel.
    pub resolve_media: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            page_ceiling: 20,
            resolve_media: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LayoutConfig {
    pub own_message_ratio: f64,
    pub oversized_ratio: f64,
    pub avatar_suffix: String,
    pub list_classes: Vec<String>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            own_message_ratio: 0.95,
            oversized_ratio: 0.4,
            avatar_suffix: "头像".to_string(),
            list_classes: vec!["RecyclerView".to_string(), "ListView".to_string()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub page_ceiling: usize,
    pub group_code_policy: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            page_ceiling: 10,
            group_code_policy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"sweep":{"page_ceiling":3},"layout":{"avatar_suffix":"'s avatar"}}"#)
                .expect("parse config");
        assert_eq!(config.sweep.page_ceiling, 3);
        assert!(config.sweep.resolve_media);
        assert_eq!(config.layout.avatar_suffix, "'s avatar");
        assert_eq!(config.layout.own_message_ratio, 0.95);
        assert_eq!(config.sessions, SessionConfig::default());
    }
}
