//! Link registry: the single owner of every link in the process.
//!
//! Plugins receive `&mut LinkRegistry` while they are being constructed and
//! ask it for the links they need.  Two plugins asking for the same endpoint
//! get the same `Arc`, so a robot controller on `0.0.0.0:65432` is served by
//! exactly one listener no matter how many plugins talk to it.
//!
//! # Phases
//!
//! ```text
//! startup (single task, &mut self)      running (&self, shared)
//! ───────────────────────────────      ───────────────────────
//! get_or_create_tcp_link    ─┐
//! get_or_create_serial_link ─┤──► start_all() ──► links() / len()
//! ```
//!
//! Mutation needs `&mut self`, so once the registry is shared behind an `Arc`
//! no more links can be added and readers need no lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcu_core::Endpoint;
use tracing::info;

use super::link::serial::DEFAULT_POLL_INTERVAL;
use super::link::{Link, SerialLink, SerialOpener, TcpLink, TokioSerialOpener};

/// Owns and deduplicates links by [`Endpoint`].  Links are never removed.
pub struct LinkRegistry {
    tcp: HashMap<Endpoint, Arc<TcpLink>>,
    serial: HashMap<Endpoint, Arc<SerialLink>>,
    /// Creation order, so `start_all` and `links` are deterministic.
    order: Vec<Arc<dyn Link>>,
    serial_poll_interval: Duration,
    serial_opener: Arc<dyn SerialOpener>,
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl LinkRegistry {
    /// Creates an empty registry whose serial links poll every
    /// `serial_poll_interval` and open real ports.
    pub fn new(serial_poll_interval: Duration) -> Self {
        Self {
            tcp: HashMap::new(),
            serial: HashMap::new(),
            order: Vec::new(),
            serial_poll_interval,
            serial_opener: Arc::new(TokioSerialOpener),
        }
    }

    /// Replaces the serial port opener.  Affects links created afterwards.
    pub fn with_serial_opener(mut self, opener: Arc<dyn SerialOpener>) -> Self {
        self.serial_opener = opener;
        self
    }

    /// Returns the TCP link listening on `host:port`, creating it on first
    /// request.
    pub fn get_or_create_tcp_link(&mut self, host: &str, port: u16) -> Arc<TcpLink> {
        let endpoint = Endpoint::tcp(host, port);
        if let Some(link) = self.tcp.get(&endpoint) {
            return Arc::clone(link);
        }

        info!("registering link {endpoint}");
        let link = Arc::new(TcpLink::new(host, port));
        self.order.push(link.clone());
        self.tcp.insert(endpoint, Arc::clone(&link));
        link
    }

    /// Returns the serial link on `path` at `baud_rate`, creating it on first
    /// request.
    pub fn get_or_create_serial_link(&mut self, path: &str, baud_rate: u32) -> Arc<SerialLink> {
        let endpoint = Endpoint::serial(path, baud_rate);
        if let Some(link) = self.serial.get(&endpoint) {
            return Arc::clone(link);
        }

        info!("registering link {endpoint}");
        let link = Arc::new(SerialLink::new(
            path,
            baud_rate,
            self.serial_poll_interval,
            Arc::clone(&self.serial_opener),
        ));
        self.order.push(link.clone());
        self.serial.insert(endpoint, Arc::clone(&link));
        link
    }

    /// Starts the receive loop of every registered link, in creation order.
    ///
    /// Call once, after every plugin has been constructed.  Must run inside a
    /// Tokio runtime.
    pub fn start_all(&self) {
        info!("starting {} link(s)", self.order.len());
        for link in &self.order {
            Arc::clone(link).start();
        }
    }

    /// Asks every link's receive loop to finish.
    pub fn stop_all(&self) {
        for link in &self.order {
            link.stop();
        }
    }

    /// All links in creation order.
    pub fn links(&self) -> &[Arc<dyn Link>] {
        &self.order
    }

    /// Number of distinct endpoints registered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// `true` when no plugin has requested a link yet.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
