use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use listsweep_core::Point;
use listsweep_core::UiNode;

use crate::contracts::CaptureFrame;
use crate::contracts::DeviceCommand;

/// The device boundary. Every capture is a blocking round trip.
pub trait DeviceDriver {
    fn capture(&mut self) -> Result<CaptureFrame>;

    fn perform(&mut self, command: DeviceCommand) -> Result<()>;
}

/// A simulated device replaying recorded frames from a directory.
///
/// Frames are `frame-000.json`, `frame-001.json`, ... with an optional PNG of the same stem.
/// `frame-000` is the starting screen; each `ScrollOlder` moves one frame forward and each
/// `ScrollNewer` one frame back, clamped at both ends. Taps are recorded, not replayed.
#[derive(Debug, Clone)]
pub struct ReplayDriver {
    frames: Vec<PathBuf>,
    position: usize,
    performed: Vec<DeviceCommand>,
}

impl ReplayDriver {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut indexed: Vec<(u64, PathBuf)> = Vec::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("reading capture directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if let Some(index) = frame_index(&path) {
                indexed.push((index, path));
            }
        }
        if indexed.is_empty() {
            bail!("no frame-*.json captures in {}", dir.display());
        }
        indexed.sort_by_key(|(index, _)| *index);
        let frames: Vec<PathBuf> = indexed.into_iter().map(|(_, path)| path).collect();
        log::debug!("replaying {} frames from {}", frames.len(), dir.display());
        Ok(Self {
            frames,
            position: 0,
            performed: Vec::new(),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn performed(&self) -> &[DeviceCommand] {
        &self.performed
    }

    pub fn taps(&self) -> Vec<Point> {
        self.performed
            .iter()
            .filter_map(|command| match command {
                DeviceCommand::Tap(point) => Some(*point),
                _ => None,
            })
            .collect()
    }
}

impl DeviceDriver for ReplayDriver {
    fn capture(&mut self) -> Result<CaptureFrame> {
        let path = &self.frames[self.position];
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let dump: UiNode = serde_json::from_str(&raw)
            .with_context(|| format!("parsing tree dump {}", path.display()))?;
        let png = path.with_extension("png");
        let screenshot = if png.exists() {
            Some(std::fs::read(&png).with_context(|| format!("reading {}", png.display()))?)
        } else {
            None
        };
        Ok(CaptureFrame { dump, screenshot })
    }

    fn perform(&mut self, command: DeviceCommand) -> Result<()> {
        match command {
            DeviceCommand::ScrollOlder => {
                self.position = (self.position + 1).min(self.frames.len() - 1);
            }
            DeviceCommand::ScrollNewer => {
                self.position = self.position.saturating_sub(1);
            }
            DeviceCommand::Tap(_) => {}
        }
        self.performed.push(command);
        Ok(())
    }
}

/// Numeric index of a `frame-<n>.json` file name.
fn frame_index(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix("frame-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}
