//! `pause`: toggle the robot between paused and running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mcu_core::{encode_frame, MessageKind};
use serde_json::Value;

use super::{DiscoveryError, Plugin, PluginContext};
use crate::application::command::{Command, ResultSlot};
use crate::infrastructure::link::Link;

pub const NAME: &str = "pause";

pub struct PauseCommand {
    robot: Arc<dyn Link>,
    paused: AtomicBool,
}

impl PauseCommand {
    pub fn new(robot: Arc<dyn Link>) -> Self {
        Self {
            robot,
            paused: AtomicBool::new(false),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

pub(super) fn build(ctx: &mut PluginContext<'_>) -> Result<Plugin, DiscoveryError> {
    Ok(Plugin::Command(Arc::new(PauseCommand::new(ctx.robot_link()))))
}

#[async_trait]
impl Command for PauseCommand {
    fn keywords(&self) -> &[&str] {
        &["pause"]
    }

    async fn target(&self, _payload: Value, _keyword: &str, result: &ResultSlot) -> anyhow::Result<()> {
        // The robot firmware toggles on every PAUSE, so our flag only flips
        // when the frame actually went out.
        if let Err(e) = self.robot.send(&encode_frame(MessageKind::Iac, &["PAUSE"])).await {
            result.set(format!("ERROR {e}"));
            return Ok(());
        }

        let paused = !self.paused.fetch_xor(true, Ordering::AcqRel);
        result.set(if paused { "PAUSED" } else { "RESUMED" });
        Ok(())
    }
}
