use anyhow::Result;
use listsweep_core::CaptureParser;
use listsweep_core::Decision;
use listsweep_core::MessageEntry;
use listsweep_core::MessageSweep;
use listsweep_core::SessionCursor;
use listsweep_core::SessionEntry;
use listsweep_core::SessionSweep;
use listsweep_core::SweepConfig;
use serde::Serialize;

use crate::contracts::DeviceCommand;
use crate::driver::DeviceDriver;
use crate::media::SideChannelHandler;

#[derive(Debug, Clone, Serialize)]
pub struct MessageSweepReport {
    pub history: Vec<MessageEntry>,
    pub decisions: Vec<String>,
    pub captures: usize,
    pub media_saved: usize,
}

/// Runs one message sweep to completion against a device, starting from `history`.
pub fn run_message_sweep(
    driver: &mut dyn DeviceDriver,
    parser: &mut CaptureParser,
    handler: &mut dyn SideChannelHandler,
    history: Vec<MessageEntry>,
    config: &SweepConfig,
) -> Result<MessageSweepReport> {
    let mut sweep = MessageSweep::new(history, config);
    let mut decisions = Vec::new();
    let mut captures = 0;
    let mut media_saved = 0;
    loop {
        let frame = driver.capture()?;
        captures += 1;
        let page = parser.parse_messages(&frame.dump, sweep.on_first_screen());
        let decision = sweep.step(page);
        decisions.push(decision.label().to_string());
        match decision {
            Decision::ScrollOlder => driver.perform(DeviceCommand::ScrollOlder)?,
            Decision::ScrollNewer => driver.perform(DeviceCommand::ScrollNewer)?,
            Decision::Process(row) => {
                let media = match handler.handle(&row, &frame) {
                    Ok(media) => media,
                    Err(err) => {
                        log::warn!("side channel failed for {}: {err:#}", row.fingerprint);
                        None
                    }
                };
                if media.is_some() {
                    media_saved += 1;
                }
                sweep.resolve(&row.fingerprint, media);
            }
            Decision::Done => break,
        }
    }
    log::info!(
        "message sweep finished: {captures} captures, {} entries, {media_saved} media saved",
        sweep.history().len()
    );
    Ok(MessageSweepReport {
        history: sweep.into_history(),
        decisions,
        captures,
        media_saved,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPassReport {
    pub opened: Option<SessionEntry>,
    pub cursor: Option<SessionCursor>,
    pub decisions: Vec<String>,
}

/// Finds and opens the next session after `cursor`, or stops when none qualifies.
pub fn run_session_pass(
    driver: &mut dyn DeviceDriver,
    parser: &mut CaptureParser,
    cursor: Option<SessionCursor>,
    page_ceiling: usize,
) -> Result<SessionPassReport> {
    let mut sweep = SessionSweep::new(cursor, page_ceiling);
    let mut decisions = Vec::new();
    loop {
        let frame = driver.capture()?;
        let rows = parser.parse_sessions(&frame.dump);
        let decision = sweep.step(rows);
        decisions.push(decision.label().to_string());
        match decision {
            Decision::ScrollOlder => driver.perform(DeviceCommand::ScrollOlder)?,
            Decision::ScrollNewer => driver.perform(DeviceCommand::ScrollNewer)?,
            Decision::Process(row) => {
                driver.perform(DeviceCommand::Tap(row.click_point))?;
                let opened = sweep.row(&row.fingerprint).cloned();
                return Ok(SessionPassReport {
                    opened,
                    cursor: sweep.cursor().cloned(),
                    decisions,
                });
            }
            Decision::Done => {
                log::info!("no session qualifies after {} pages", sweep.page());
                return Ok(SessionPassReport {
                    opened: None,
                    cursor: sweep.cursor().cloned(),
                    decisions,
                });
            }
        }
    }
}
