//! Device plugins and their discovery.
//!
//! # How plugins are found (for beginners)
//!
//! Every plugin is listed once in [`catalog`] as a [`PluginFactory`]: a name
//! and a constructor function.  At start-up [`discover`] calls each
//! constructor with a [`PluginContext`], which gives it:
//!
//! - `links`: the [`LinkRegistry`], to obtain (or share) TCP and serial links;
//! - `reporter`: the upstream attribute sink;
//! - `config`: the loaded [`GatewayConfig`].
//!
//! A constructor returns either a [`Plugin::Command`] (invocable by keyword)
//! or a [`Plugin::Service`] (passive, reports from link callbacks).  A
//! constructor that fails, for instance because a required setting is
//! missing, is logged and skipped; the remaining plugins still load.
//!
//! Plugins must subscribe to their links inside the constructor: the
//! registry starts the links only after discovery has finished.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::command::Command;
use crate::application::dispatch::Dispatcher;
use crate::application::reporter::AttributeReporter;
use crate::application::service::Service;
use crate::infrastructure::link::Link;
use crate::infrastructure::registry::LinkRegistry;
use crate::infrastructure::storage::config::GatewayConfig;

pub mod home;
pub mod laser;
pub mod measure;
pub mod pause;
pub mod robot_status;

/// Why a plugin could not be constructed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("required setting '{0}' is not configured")]
    MissingSetting(&'static str),

    #[error("setting '{setting}' is invalid: {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: String,
    },

    #[error("plugin is disabled in the configuration")]
    Disabled,
}

/// A constructed plugin, classified by capability.
pub enum Plugin {
    Command(Arc<dyn Command>),
    Service(Arc<dyn Service>),
}

impl Plugin {
    /// Hands the plugin to the dispatcher.
    pub fn install(self, dispatcher: &mut Dispatcher) {
        match self {
            Plugin::Command(command) => dispatcher.register_command(command),
            Plugin::Service(service) => dispatcher.register_service(service),
        }
    }
}

/// Everything a plugin constructor may use.
pub struct PluginContext<'a> {
    pub links: &'a mut LinkRegistry,
    pub reporter: Arc<dyn AttributeReporter>,
    pub config: &'a GatewayConfig,
}

impl PluginContext<'_> {
    /// The shared TCP link the robot controller connects to.
    pub fn robot_link(&mut self) -> Arc<dyn Link> {
        let robot = &self.config.robot;
        self.links.get_or_create_tcp_link(&robot.host, robot.port)
    }
}

/// Constructor signature for catalog entries.
pub type BuildFn = fn(&mut PluginContext<'_>) -> Result<Plugin, DiscoveryError>;

/// One catalog entry.
#[derive(Clone, Copy)]
pub struct PluginFactory {
    pub name: &'static str,
    pub build: BuildFn,
}

/// All built-in plugins, in construction order.
pub fn catalog() -> Vec<PluginFactory> {
    vec![
        PluginFactory {
            name: home::NAME,
            build: home::build,
        },
        PluginFactory {
            name: pause::NAME,
            build: pause::build,
        },
        PluginFactory {
            name: measure::NAME,
            build: measure::build,
        },
        PluginFactory {
            name: laser::NAME,
            build: laser::build,
        },
        PluginFactory {
            name: robot_status::NAME,
            build: robot_status::build,
        },
    ]
}

/// Constructs every factory that is not disabled.
///
/// Construction errors are logged and the plugin skipped.
pub fn discover(factories: &[PluginFactory], ctx: &mut PluginContext<'_>) -> Vec<Plugin> {
    let mut plugins = Vec::with_capacity(factories.len());

    for factory in factories {
        if ctx.config.plugins.is_disabled(factory.name) {
            info!("plugin '{}' skipped: {}", factory.name, DiscoveryError::Disabled);
            continue;
        }

        match (factory.build)(ctx) {
            Ok(plugin) => {
                info!("plugin '{}' loaded", factory.name);
                plugins.push(plugin);
            }
            Err(e) => warn!("plugin '{}' skipped: {e}", factory.name),
        }
    }

    info!("discovered {} plugin(s)", plugins.len());
    plugins
}

// ── Test doubles ──────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    //! A link that records writes and lets tests inject events.

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use mcu_core::{parse_str, Endpoint};

    use crate::application::reporter::{AttributeReporter, AttributeValue};
    use crate::infrastructure::link::{
        EventKind, Link, LinkCallback, LinkError, LinkEvent, LinkState, Subscribers,
    };

    pub struct FakeLink {
        endpoint: Endpoint,
        connected: AtomicBool,
        subscribers: Subscribers,
        sent: Mutex<Vec<String>>,
    }

    impl FakeLink {
        pub fn connected() -> Arc<Self> {
            Arc::new(Self {
                endpoint: Endpoint::tcp("fake", 1),
                connected: AtomicBool::new(true),
                subscribers: Subscribers::new(),
                sent: Mutex::new(Vec::new()),
            })
        }

        pub fn disconnected() -> Arc<Self> {
            let link = Self::connected();
            link.connected.store(false, Ordering::SeqCst);
            link
        }

        /// Frames written so far, as text.
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        /// Delivers `frame` to `Received` subscribers.
        pub fn receive(&self, frame: &str) {
            self.subscribers.emit(&LinkEvent::Received(parse_str(frame)));
        }

        pub fn subscriber_count(&self, kind: EventKind) -> usize {
            self.subscribers.count(kind)
        }
    }

    #[async_trait]
    impl Link for FakeLink {
        fn endpoint(&self) -> &Endpoint {
            &self.endpoint
        }

        fn state(&self) -> LinkState {
            if self.connected.load(Ordering::SeqCst) {
                LinkState::Connected
            } else {
                LinkState::Connecting
            }
        }

        fn start(self: Arc<Self>) {}

        fn stop(&self) {}

        fn subscribe(&self, kind: EventKind, callback: LinkCallback) {
            self.subscribers.add(kind, callback);
        }

        async fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(LinkError::NotConnected(self.endpoint.clone()));
            }
            self.sent
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        }
    }

    /// Collects every attribute update.
    #[derive(Default)]
    pub struct Recorder(Mutex<Vec<(String, AttributeValue)>>);

    impl Recorder {
        pub fn updates(&self) -> Vec<(String, AttributeValue)> {
            self.0.lock().unwrap().clone()
        }
    }

    impl AttributeReporter for Recorder {
        fn update(&self, name: &str, value: AttributeValue) {
            self.0.lock().unwrap().push((name.to_string(), value));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
