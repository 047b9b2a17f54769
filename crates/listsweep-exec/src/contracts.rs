use listsweep_core::Point;
use listsweep_core::UiNode;
use serde::Deserialize;
use serde::Serialize;

/// Gestures the engine asks a device to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DeviceCommand {
    ScrollOlder,
    ScrollNewer,
    Tap(Point),
}

impl DeviceCommand {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ScrollOlder => "scroll-older",
            Self::ScrollNewer => "scroll-newer",
            Self::Tap(_) => "tap",
        }
    }
}

/// One observation of the device: the accessibility tree and, when available, a PNG
/// screenshot of the same moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFrame {
    pub dump: UiNode,
    pub screenshot: Option<Vec<u8>>,
}
