//! Serial link: a polled device such as a laser controller on `/dev/ttyUSB0`.
//!
//! Serial drivers do not give us a dependable "data ready" notification on
//! every platform, so the receive loop polls instead: every
//! `poll_interval` it asks the port how many bytes are waiting and, if any,
//! drains them all in one read.  The drained buffer is decoded as a single
//! frame and published as one [`LinkEvent::Received`] per poll cycle; serial
//! reads are not split per line.
//!
//! Any transport fault (device unplugged, permission denied) is published as
//! [`LinkEvent::Error`] and ends the loop in [`LinkState::Errored`].
//!
//! # Testability
//!
//! The port is opened through a [`SerialOpener`], so tests can substitute an
//! in-memory [`SerialTransport`] for real hardware.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcu_core::protocol::is_blank_frame;
use mcu_core::{parse, Endpoint, Message};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::{EventKind, Link, LinkCallback, LinkError, LinkEvent, LinkState, StateCell, Subscribers};

/// Default interval between two polls of the port.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A byte stream that can also report how many bytes are buffered.
pub trait SerialTransport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Bytes currently waiting in the driver's input buffer.
    fn bytes_to_read(&self) -> io::Result<u32>;
}

impl SerialTransport for tokio_serial::SerialStream {
    fn bytes_to_read(&self) -> io::Result<u32> {
        tokio_serial::SerialPort::bytes_to_read(self).map_err(io::Error::from)
    }
}

/// Opens the transport for a serial endpoint.
pub trait SerialOpener: Send + Sync {
    /// # Errors
    ///
    /// Returns the underlying I/O error when the device cannot be opened.
    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Box<dyn SerialTransport>>;
}

/// Opens real ports through `tokio-serial`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSerialOpener;

impl SerialOpener for TokioSerialOpener {
    fn open(&self, path: &str, baud_rate: u32) -> io::Result<Box<dyn SerialTransport>> {
        let stream = tokio_serial::SerialStream::open(&tokio_serial::new(path, baud_rate))?;
        Ok(Box::new(stream))
    }
}

/// A polled serial link.  Created only through the link registry.
pub struct SerialLink {
    endpoint: Endpoint,
    path: String,
    baud_rate: u32,
    poll_interval: Duration,
    opener: Arc<dyn SerialOpener>,
    state: StateCell,
    subscribers: Subscribers,
    /// The open port.  Assigned only by the receive loop.
    port: tokio::sync::Mutex<Option<Box<dyn SerialTransport>>>,
    started: AtomicBool,
    running: AtomicBool,
}

impl SerialLink {
    pub(crate) fn new(
        path: impl Into<String>,
        baud_rate: u32,
        poll_interval: Duration,
        opener: Arc<dyn SerialOpener>,
    ) -> Self {
        let path = path.into();
        Self {
            endpoint: Endpoint::serial(path.clone(), baud_rate),
            path,
            baud_rate,
            poll_interval,
            opener,
            state: StateCell::new(),
            subscribers: Subscribers::new(),
            port: tokio::sync::Mutex::new(None),
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    async fn run(self: Arc<Self>) {
        self.state.set(LinkState::Connecting);

        let transport = match self.opener.open(&self.path, self.baud_rate) {
            Ok(transport) => transport,
            Err(source) => {
                warn!("{}: open failed: {source}", self.endpoint);
                self.fail(LinkError::Open {
                    endpoint: self.endpoint.clone(),
                    source,
                });
                return;
            }
        };

        *self.port.lock().await = Some(transport);
        self.state.set(LinkState::Connected);
        info!("{}: opened, polling every {:?}", self.endpoint, self.poll_interval);
        self.subscribers.emit(&LinkEvent::Connected {
            peer: self.endpoint.to_string(),
        });

        while self.running.load(Ordering::Acquire) {
            match self.poll_once().await {
                Ok(Some(message)) => {
                    debug!("{}: received {message}", self.endpoint);
                    self.subscribers.emit(&LinkEvent::Received(message));
                }
                Ok(None) => {}
                Err(source) => {
                    warn!("{}: transport fault: {source}", self.endpoint);
                    *self.port.lock().await = None;
                    self.fail(LinkError::Io {
                        endpoint: self.endpoint.clone(),
                        source,
                    });
                    return;
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        *self.port.lock().await = None;
        self.state.set(LinkState::Closed);
        info!("{}: stopped", self.endpoint);
    }

    /// Drains whatever the port has buffered.
    ///
    /// Returns `Ok(None)` when nothing is waiting or the drained bytes are a
    /// bare line ending.
    async fn poll_once(&self) -> io::Result<Option<Message>> {
        let mut guard = self.port.lock().await;
        let Some(port) = guard.as_mut() else {
            return Ok(None);
        };

        let waiting = port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(None);
        }

        // A single read may come back short; the whole count is one frame.
        let mut buf = vec![0u8; waiting];
        port.read_exact(&mut buf).await?;

        if is_blank_frame(&buf) {
            return Ok(None);
        }
        Ok(Some(parse(&buf)))
    }

    fn fail(&self, error: LinkError) {
        self.state.set(LinkState::Errored);
        self.subscribers.emit(&LinkEvent::Error(error));
    }
}

#[async_trait]
impl Link for SerialLink {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn state(&self) -> LinkState {
        self.state.get()
    }

    fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!("{}: start() called again; ignoring", self.endpoint);
            return;
        }
        self.running.store(true, Ordering::Release);
        tokio::spawn(self.run());
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    fn subscribe(&self, kind: EventKind, callback: LinkCallback) {
        self.subscribers.add(kind, callback);
    }

    async fn send(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut guard = self.port.lock().await;
        let port = guard
            .as_mut()
            .ok_or_else(|| LinkError::NotConnected(self.endpoint.clone()))?;

        let io_err = |source| LinkError::Io {
            endpoint: self.endpoint.clone(),
            source,
        };
        port.write_all(bytes).await.map_err(io_err)?;
        port.flush().await.map_err(io_err)
    }
}

// ── Test doubles ──────────────────────────────────────────────────────────────

/// In-memory serial port used by unit and integration tests.
///
/// Bytes pushed with [`LoopbackPort::inject`] become readable by the link;
/// bytes the link writes are collected in [`LoopbackPort::written`].
#[doc(hidden)]
pub mod loopback {
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::task::{Context, Poll};

    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    use super::{SerialOpener, SerialTransport};

    #[derive(Default)]
    struct Shared {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
        fail_next_poll: bool,
        refuse_open: bool,
        max_read: Option<usize>,
    }

    /// Handle shared between the test and the opened transport.
    #[derive(Clone, Default)]
    pub struct LoopbackPort {
        shared: Arc<Mutex<Shared>>,
    }

    impl LoopbackPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes `bytes` available to the next poll.
        pub fn inject(&self, bytes: &[u8]) {
            self.lock().inbound.extend(bytes.iter().copied());
        }

        /// Everything the link has written so far.
        pub fn written(&self) -> Vec<u8> {
            self.lock().outbound.clone()
        }

        /// Simulates the device disappearing at the next poll.
        pub fn unplug(&self) {
            self.lock().fail_next_poll = true;
        }

        /// Caps every read at `n` bytes, like a driver handing data over in
        /// small chunks.
        pub fn fragment_reads(&self, n: usize) {
            self.lock().max_read = Some(n);
        }

        /// Makes `open` fail, as for a missing device path.
        pub fn refuse_open(&self) {
            self.lock().refuse_open = true;
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
            self.shared.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl SerialOpener for LoopbackPort {
        fn open(&self, path: &str, _baud_rate: u32) -> io::Result<Box<dyn SerialTransport>> {
            if self.lock().refuse_open {
                return Err(io::Error::new(io::ErrorKind::NotFound, format!("{path}: no such device")));
            }
            Ok(Box::new(self.clone()))
        }
    }

    impl SerialTransport for LoopbackPort {
        fn bytes_to_read(&self) -> io::Result<u32> {
            let mut shared = self.lock();
            if shared.fail_next_poll {
                shared.fail_next_poll = false;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            Ok(shared.inbound.len() as u32)
        }
    }

    impl AsyncRead for LoopbackPort {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let mut shared = self.lock();
            let cap = shared.max_read.unwrap_or(usize::MAX);
            let n = buf.remaining().min(shared.inbound.len()).min(cap);
            let chunk: Vec<u8> = shared.inbound.drain(..n).collect();
            buf.put_slice(&chunk);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for LoopbackPort {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            data: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.lock().outbound.extend_from_slice(data);
            Poll::Ready(Ok(data.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
