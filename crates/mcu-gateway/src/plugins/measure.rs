//! `measure_pcb`, `measure_label`, `measure_assembly`: start a measurement on
//! the robot and report its result once the robot answers.
//!
//! The command itself only sends the trigger and suppresses its report.
//! The robot replies later with a `RESULT|...` frame on the same link; the
//! link callback then reports `<keyword>_info` for the measurement that was
//! pending.
//!
//! ```text
//! execute("measure_pcb", {"prog": "pcb_v2"})
//!   ──► RUN|pcb_v2
//!   ──► IAC|MEASURE_PCB            result = ""   (suppressed)
//!                    ... robot works ...
//!   ◄── RESULT|PASS|12.5           update("measure_pcb_info", "PASS|12.5")
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use mcu_core::{encode_frame, Message, MessageKind};
use serde_json::Value;
use tracing::{debug, info};

use super::{DiscoveryError, Plugin, PluginContext};
use crate::application::command::{Command, ResultSlot};
use crate::application::reporter::AttributeReporter;
use crate::infrastructure::link::{EventKind, Link, LinkEvent, LinkExt};

pub const NAME: &str = "measure";

pub const MEASURE_PCB: &str = "measure_pcb";
pub const MEASURE_LABEL: &str = "measure_label";
pub const MEASURE_ASSEMBLY: &str = "measure_assembly";

const NOT_CONNECTED: &str = "ERROR Robot not connected";

type Pending = Arc<Mutex<Option<String>>>;

pub struct MeasureCommand {
    robot: Arc<dyn Link>,
    /// Keyword of the measurement awaiting a `RESULT` frame.
    pending: Pending,
}

impl MeasureCommand {
    /// Creates the command and subscribes it to `robot`.
    pub fn new(robot: Arc<dyn Link>, reporter: Arc<dyn AttributeReporter>) -> Self {
        let pending: Pending = Arc::default();

        robot.on(EventKind::Connected, |event| {
            if let LinkEvent::Connected { peer } = event {
                info!("measurement station connected: {peer}");
            }
        });
        robot.on(EventKind::Lost, |_| info!("measurement station disconnected"));

        let waiting = Arc::clone(&pending);
        robot.on_received(move |message| on_robot_message(message, &waiting, reporter.as_ref()));

        Self { robot, pending }
    }

    /// Keyword of the measurement still waiting for its result.
    pub fn pending(&self) -> Option<String> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn on_robot_message(message: &Message, pending: &Pending, reporter: &dyn AttributeReporter) {
    if message.kind != MessageKind::Result {
        return;
    }

    let keyword = pending.lock().unwrap_or_else(PoisonError::into_inner).take();
    match keyword {
        Some(keyword) => {
            let value = message.data.join("|");
            info!("{keyword} finished: {value}");
            reporter.update(&format!("{keyword}_info"), value.into());
        }
        None => debug!("RESULT with no measurement pending: {message}"),
    }
}

/// `measure_pcb` → `MEASURE_PCB`.
fn trigger_for(keyword: &str) -> String {
    keyword.to_ascii_uppercase()
}

pub(super) fn build(ctx: &mut PluginContext<'_>) -> Result<Plugin, DiscoveryError> {
    let robot = ctx.robot_link();
    Ok(Plugin::Command(Arc::new(MeasureCommand::new(
        robot,
        Arc::clone(&ctx.reporter),
    ))))
}

#[async_trait]
impl Command for MeasureCommand {
    fn keywords(&self) -> &[&str] {
        &[MEASURE_ASSEMBLY, MEASURE_LABEL, MEASURE_PCB]
    }

    async fn target(&self, payload: Value, keyword: &str, result: &ResultSlot) -> anyhow::Result<()> {
        if let Some(prog) = payload.get("prog").and_then(Value::as_str) {
            if self.robot.send(&encode_frame(MessageKind::Run, &[prog])).await.is_err() {
                result.set(NOT_CONNECTED);
                return Ok(());
            }
        }

        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(keyword.to_string());

        let trigger = encode_frame(MessageKind::Iac, &[trigger_for(keyword)]);
        if self.robot.send(&trigger).await.is_err() {
            self.pending.lock().unwrap_or_else(PoisonError::into_inner).take();
            result.set(NOT_CONNECTED);
            return Ok(());
        }

        info!("{keyword} triggered");
        result.suppress();
        Ok(())
    }
}
