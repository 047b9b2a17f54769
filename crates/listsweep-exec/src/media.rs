use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use image::ImageFormat;
use listsweep_core::Rect;
use listsweep_core::RowRef;

use crate::contracts::CaptureFrame;

/// Fetches the payload of an entry the tree dump cannot describe, such as an image.
/// Returns the saved reference, or `None` when nothing could be saved.
pub trait SideChannelHandler {
    fn handle(&mut self, row: &RowRef, frame: &CaptureFrame) -> Result<Option<String>>;
}

/// Leaves media unresolved. Entries are still marked handled so the sweep moves on.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipMedia;

impl SideChannelHandler for SkipMedia {
    fn handle(&mut self, _row: &RowRef, _frame: &CaptureFrame) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Crops an entry's on-screen bounds out of the frame screenshot and saves it as
/// `<out_dir>/<fingerprint>.png`.
#[derive(Debug, Clone)]
pub struct ScreenshotCropper {
    out_dir: PathBuf,
}

impl ScreenshotCropper {
    pub fn new(out_dir: impl AsRef<Path>) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }
}

impl SideChannelHandler for ScreenshotCropper {
    fn handle(&mut self, row: &RowRef, frame: &CaptureFrame) -> Result<Option<String>> {
        let Some(png) = frame.screenshot.as_deref() else {
            log::debug!("no screenshot for {}", row.fingerprint);
            return Ok(None);
        };
        let img = image::load_from_memory_with_format(png, ImageFormat::Png)
            .context("decoding screenshot")?;
        let Some((x, y, width, height)) = clamp(row.bounds, img.width(), img.height()) else {
            log::debug!("bounds {:?} fall outside the screenshot", row.bounds);
            return Ok(None);
        };
        let cropped = img.crop_imm(x, y, width, height);
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("creating {}", self.out_dir.display()))?;
        let path = self.out_dir.join(format!("{}.png", row.fingerprint));
        cropped
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("saving {}", path.display()))?;
        Ok(Some(path.display().to_string()))
    }
}

fn clamp(bounds: Rect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let left = bounds.left.clamp(0, width as i32) as u32;
    let top = bounds.top.clamp(0, height as i32) as u32;
    let right = bounds.right.clamp(0, width as i32) as u32;
    let bottom = bounds.bottom.clamp(0, height as i32) as u32;
    if right <= left || bottom <= top {
        return None;
    }
    Some((left, top, right - left, bottom - top))
}
