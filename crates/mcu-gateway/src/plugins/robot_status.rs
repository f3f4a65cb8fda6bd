//! `robot_status`: mirror the robot's status flags as attributes.
//!
//! The robot pushes status frames whenever it feels like it:
//!
//! ```text
//! STATUS| TRUE | TRUE | TRUE | FALSE
//!         power  running waiting error
//! ```
//!
//! All four attributes are reported `false` at construction.  After that an
//! attribute is reported only when its value changes.

use std::sync::{Arc, Mutex, PoisonError};

use mcu_core::{Message, MessageKind};
use tracing::{info, warn};

use super::{DiscoveryError, Plugin, PluginContext};
use crate::application::reporter::{AttributeReporter, AttributeValue};
use crate::application::service::Service;
use crate::infrastructure::link::{Link, LinkExt};

pub const NAME: &str = "robot_status";

pub const ROBOT_POWER: &str = "robotPower";
pub const ROBOT_RUNNING: &str = "robotRunning";
pub const ROBOT_WAITING: &str = "robotWaiting";
pub const ROBOT_ERROR: &str = "robotError";

const ATTRIBUTES: [&str; 4] = [ROBOT_POWER, ROBOT_RUNNING, ROBOT_WAITING, ROBOT_ERROR];

type Flags = [bool; 4];

pub struct RobotStatusService {
    last: Arc<Mutex<Flags>>,
}

impl RobotStatusService {
    /// Reports the initial flags and subscribes to `robot`.
    pub fn new(robot: &dyn Link, reporter: Arc<dyn AttributeReporter>) -> Self {
        let initial: Flags = [false; 4];
        let attributes: Vec<(&str, AttributeValue)> = ATTRIBUTES
            .iter()
            .zip(initial)
            .map(|(name, value)| (*name, value.into()))
            .collect();
        reporter.update_attributes(&attributes);

        let last = Arc::new(Mutex::new(initial));
        let state = Arc::clone(&last);
        robot.on_received(move |message| on_status(message, &state, reporter.as_ref()));

        Self { last }
    }

    /// Flags as last reported, in `[power, running, waiting, error]` order.
    pub fn flags(&self) -> Flags {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Service for RobotStatusService {
    fn name(&self) -> &str {
        NAME
    }
}

pub(super) fn build(ctx: &mut PluginContext<'_>) -> Result<Plugin, DiscoveryError> {
    let robot = ctx.robot_link();
    Ok(Plugin::Service(Arc::new(RobotStatusService::new(
        robot.as_ref(),
        Arc::clone(&ctx.reporter),
    ))))
}

fn decode(message: &Message) -> Option<Flags> {
    let field = |i: usize| message.field(i).map(|f| f.trim() == "TRUE");
    Some([field(0)?, field(1)?, field(2)?, field(3)?])
}

fn on_status(message: &Message, last: &Mutex<Flags>, reporter: &dyn AttributeReporter) {
    if message.kind != MessageKind::Status {
        return;
    }
    let Some(flags) = decode(message) else {
        warn!("invalid status message: {message}");
        return;
    };

    let changed: Vec<(&str, AttributeValue)> = {
        let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = ATTRIBUTES
            .iter()
            .zip(flags.iter().zip(last.iter()))
            .filter(|(_, (new, old))| new != old)
            .map(|(name, (new, _))| (*name, (*new).into()))
            .collect();
        *last = flags;
        changed
    };

    if !changed.is_empty() {
        info!("robot status changed: {changed:?}");
        reporter.update_attributes(&changed);
    }
}
