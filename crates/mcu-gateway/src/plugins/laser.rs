//! `start_laser_cut`: drive the laser controller over its serial link.
//!
//! The payload is an object with any of these keys:
//!
//! ```text
//! "pwm":     bool    → pwm|on|      or pwm|off|
//! "duty":    number  → duty|<n>|
//! "shutter": bool    → shutter|on|  or shutter|off|
//! ```
//!
//! Frames go out in the order pwm, duty, shutter.  A payload with none of the
//! keys, or with a value of the wrong type, is rejected before anything is
//! sent.

use std::sync::Arc;

use async_trait::async_trait;
use mcu_core::{encode_frame, MessageKind};
use serde_json::Value;
use tracing::info;

use super::{DiscoveryError, Plugin, PluginContext};
use crate::application::command::{Command, ResultSlot};
use crate::infrastructure::link::{Link, LinkExt};

pub const NAME: &str = "start_laser_cut";

const KEY_PWM: &str = "pwm";
const KEY_DUTY: &str = "duty";
const KEY_SHUTTER: &str = "shutter";

const INVALID: &str = "Invalid command";

pub struct LaserCommand {
    controller: Arc<dyn Link>,
}

impl LaserCommand {
    pub fn new(controller: Arc<dyn Link>) -> Self {
        let endpoint = controller.endpoint().to_string();
        controller.on_received(move |message| info!("laser controller {endpoint}: {message}"));
        Self { controller }
    }
}

pub(super) fn build(ctx: &mut PluginContext<'_>) -> Result<Plugin, DiscoveryError> {
    let laser = &ctx.config.laser;
    let path = laser
        .path
        .as_deref()
        .ok_or(DiscoveryError::MissingSetting("laser.path"))?;
    if laser.baud_rate == 0 {
        return Err(DiscoveryError::InvalidSetting {
            setting: "laser.baud_rate",
            reason: "must be greater than zero".into(),
        });
    }

    let controller = ctx.links.get_or_create_serial_link(path, laser.baud_rate);
    Ok(Plugin::Command(Arc::new(LaserCommand::new(controller))))
}

/// Converts the payload into frames, or `None` if it is not a valid laser
/// command.
fn frames_for(payload: &Value) -> Option<Vec<Vec<u8>>> {
    let args = payload.as_object()?;
    let mut frames = Vec::new();

    if let Some(pwm) = args.get(KEY_PWM) {
        frames.push(switch_frame(KEY_PWM, pwm.as_bool()?));
    }
    if let Some(duty) = args.get(KEY_DUTY) {
        let Value::Number(duty) = duty else {
            return None;
        };
        let duty = duty.to_string();
        frames.push(encode_frame(MessageKind::KeyValue, &[KEY_DUTY, duty.as_str(), ""]));
    }
    if let Some(shutter) = args.get(KEY_SHUTTER) {
        frames.push(switch_frame(KEY_SHUTTER, shutter.as_bool()?));
    }

    (!frames.is_empty()).then_some(frames)
}

fn switch_frame(key: &str, on: bool) -> Vec<u8> {
    encode_frame(MessageKind::KeyValue, &[key, if on { "on" } else { "off" }, ""])
}

#[async_trait]
impl Command for LaserCommand {
    fn keywords(&self) -> &[&str] {
        &["start_laser_cut"]
    }

    async fn target(&self, payload: Value, _keyword: &str, result: &ResultSlot) -> anyhow::Result<()> {
        let Some(frames) = frames_for(&payload) else {
            result.set(INVALID);
            return Ok(());
        };

        for frame in frames {
            if let Err(e) = self.controller.send(&frame).await {
                result.set(format!("ERROR {e}"));
                return Ok(());
            }
        }

        result.set("OK");
        Ok(())
    }
}
