//! `home`: drive the robot to its home position.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcu_core::{encode_frame, MessageKind};
use serde_json::Value;
use tracing::info;

use super::{DiscoveryError, Plugin, PluginContext};
use crate::application::command::{Command, ResultSlot};
use crate::infrastructure::link::Link;

pub const NAME: &str = "home";

/// How long the robot needs before it accepts the next motion command.
const SETTLE_TIME: Duration = Duration::from_secs(3);

pub struct HomeCommand {
    robot: Arc<dyn Link>,
    settle_time: Duration,
}

impl HomeCommand {
    pub fn new(robot: Arc<dyn Link>) -> Self {
        Self {
            robot,
            settle_time: SETTLE_TIME,
        }
    }

    /// Overrides the wait after the home frame is sent.
    pub fn with_settle_time(mut self, settle_time: Duration) -> Self {
        self.settle_time = settle_time;
        self
    }
}

pub(super) fn build(ctx: &mut PluginContext<'_>) -> Result<Plugin, DiscoveryError> {
    Ok(Plugin::Command(Arc::new(HomeCommand::new(ctx.robot_link()))))
}

#[async_trait]
impl Command for HomeCommand {
    fn keywords(&self) -> &[&str] {
        &["home"]
    }

    async fn target(&self, _payload: Value, _keyword: &str, result: &ResultSlot) -> anyhow::Result<()> {
        info!("homing robot");
        if let Err(e) = self.robot.send(&encode_frame(MessageKind::Iac, &["HOME"])).await {
            result.set(format!("ERROR {e}"));
            return Ok(());
        }

        tokio::time::sleep(self.settle_time).await;
        result.set("OK");
        Ok(())
    }
}
