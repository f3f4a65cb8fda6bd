//! Links: one live connection per physical endpoint.
//!
//! A link owns a receive loop running on its own Tokio task, a transport
//! handle that only that loop assigns, and an ordered list of subscribers per
//! event kind.
//!
//! # Event fan-out
//!
//! ```text
//! receive loop ──► LinkEvent ──► Subscribers::emit
//!                                   ├─ callback #1 (registered first)
//!                                   ├─ callback #2
//!                                   └─ ...
//! ```
//!
//! Every subscriber of a kind sees every event of that kind, in the order the
//! subscribers were registered.  Callbacks run on the receive loop's task, so
//! they must not block; anything slow (like writing back to a link) should be
//! spawned.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──► Connecting ──► Connected ──lost──► Connecting
//!                                    │
//!                                    └──stop──► Closed
//! (any) ──transport fault──► Errored   (terminal; no restart)
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use mcu_core::{Endpoint, Message};
use thiserror::Error;
use tracing::warn;

pub mod serial;
pub mod tcp;

pub use serial::{SerialLink, SerialOpener, SerialTransport, TokioSerialOpener};
pub use tcp::TcpLink;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Transport-level faults.
///
/// Returned from [`Link::send`] and delivered to [`EventKind::Error`]
/// subscribers; never raised across task boundaries.
#[derive(Debug, Error)]
pub enum LinkError {
    /// `send` was called while no peer or device is attached.
    #[error("link {0} has no transport attached")]
    NotConnected(Endpoint),

    /// Reading or writing the attached transport failed.
    #[error("I/O error on link {endpoint}: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// The TCP listener could not be bound.
    #[error("failed to listen on {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// The serial device could not be opened.
    #[error("failed to open {endpoint}: {source}")]
    Open {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },
}

// ── Events ────────────────────────────────────────────────────────────────────

/// The four kinds of event a link publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Lost,
    Received,
    Error,
}

/// An event published by a link's receive loop.
#[derive(Debug)]
pub enum LinkEvent {
    /// A peer attached.  `peer` is the remote socket address for TCP and the
    /// endpoint description for serial.
    Connected { peer: String },
    /// The TCP peer went away; the link is accepting again.
    Lost,
    /// One decoded frame (TCP) or one drained buffer (serial).
    Received(Message),
    /// A transport fault.
    Error(LinkError),
}

impl LinkEvent {
    /// The subscriber list this event is delivered to.
    pub fn kind(&self) -> EventKind {
        match self {
            LinkEvent::Connected { .. } => EventKind::Connected,
            LinkEvent::Lost => EventKind::Lost,
            LinkEvent::Received(_) => EventKind::Received,
            LinkEvent::Error(_) => EventKind::Error,
        }
    }
}

/// A subscriber callback.
pub type LinkCallback = Arc<dyn Fn(&LinkEvent) + Send + Sync>;

/// Ordered subscriber lists, one per [`EventKind`].
#[derive(Default)]
pub struct Subscribers {
    lists: RwLock<HashMap<EventKind, Vec<LinkCallback>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `callback` to the list for `kind`.
    pub fn add(&self, kind: EventKind, callback: LinkCallback) {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        lists.entry(kind).or_default().push(callback);
    }

    /// Number of subscribers registered for `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        lists.get(&kind).map_or(0, Vec::len)
    }

    /// Invokes every subscriber of `event.kind()` in registration order.
    ///
    /// The list is snapshotted before the first call so a callback may itself
    /// subscribe without deadlocking.  A panicking callback is logged and
    /// does not stop delivery to the remaining subscribers.
    pub fn emit(&self, event: &LinkEvent) {
        let snapshot: Vec<LinkCallback> = {
            let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
            lists.get(&event.kind()).cloned().unwrap_or_default()
        };

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!("link subscriber panicked while handling {:?} event", event.kind());
            }
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Lifecycle state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Idle = 0,
    Connecting = 1,
    Connected = 2,
    Closed = 3,
    Errored = 4,
}

impl TryFrom<u8> for LinkState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LinkState::Idle),
            1 => Ok(LinkState::Connecting),
            2 => Ok(LinkState::Connected),
            3 => Ok(LinkState::Closed),
            4 => Ok(LinkState::Errored),
            _ => Err(()),
        }
    }
}

/// Lock-free holder for a [`LinkState`], readable from any task.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(LinkState::Idle as u8))
    }

    pub(crate) fn get(&self) -> LinkState {
        LinkState::try_from(self.0.load(Ordering::Acquire)).unwrap_or(LinkState::Errored)
    }

    pub(crate) fn set(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

// ── Link contract ─────────────────────────────────────────────────────────────

/// Capability shared by TCP and serial links.
///
/// Plugins hold `Arc<dyn Link>` handles obtained from the registry; the
/// registry owns the links for the lifetime of the process.
#[async_trait]
pub trait Link: Send + Sync {
    /// The endpoint this link is attached to.
    fn endpoint(&self) -> &Endpoint;

    /// Current lifecycle state.
    fn state(&self) -> LinkState;

    /// Spawns the receive loop.  Only the first call has any effect; a loop
    /// that ends in [`LinkState::Errored`] is not restarted.
    fn start(self: Arc<Self>);

    /// Asks the receive loop to finish.  Observed at the loop's next
    /// iteration, so a loop blocked in I/O notices it late.
    fn stop(&self);

    /// Registers `callback` for events of `kind`.
    fn subscribe(&self, kind: EventKind, callback: LinkCallback);

    /// Writes `bytes` to the attached transport.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotConnected`] when no transport is attached yet
    /// and [`LinkError::Io`] when the write fails.
    async fn send(&self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Closure-friendly helpers available on every [`Link`], including
/// `dyn Link`.
pub trait LinkExt: Link {
    /// Subscribes a closure without wrapping it in an `Arc` first.
    fn on<F>(&self, kind: EventKind, f: F)
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(f));
    }

    /// Subscribes to [`EventKind::Received`] and hands the closure the
    /// decoded frame directly.
    fn on_received<F>(&self, f: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.on(EventKind::Received, move |event| {
            if let LinkEvent::Received(message) = event {
                f(message);
            }
        });
    }
}

impl<T: Link + ?Sized> LinkExt for T {}

// ── Tests ─────────────────────────────────────────────────────────────────────
