//! TCP link: a single-peer listening endpoint.
//!
//! Robots and measuring stations connect *to* the gateway.  The link binds
//! its endpoint, accepts one peer at a time, and serves it until the peer
//! disconnects; then it goes back to accepting.
//!
//! # Framing
//!
//! TCP is a stream protocol, so a single `read()` may carry several frames.
//! Each read is handed to [`mcu_core::split_frames`], which drops blank reads
//! (`\r`, `\n`, `\r\n`) and splits the rest on `\n`.  Every resulting frame is
//! decoded and published as its own [`LinkEvent::Received`], in order.
//! Bytes are not carried over between reads.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mcu_core::{parse, split_frames, Endpoint};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{Link, LinkCallback, LinkError, LinkEvent, LinkState, StateCell, Subscribers, EventKind};

const READ_BUFFER_SIZE: usize = 4096;

/// Upper bound on one `send`.  The writer lock is held for the whole write,
/// and the receive loop needs it to detach a lost peer.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A TCP listening link.  Created only through the link registry.
pub struct TcpLink {
    endpoint: Endpoint,
    host: String,
    port: u16,
    state: StateCell,
    subscribers: Subscribers,
    /// Write half of the current peer.  Assigned only by the receive loop.
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    local_addr: Mutex<Option<SocketAddr>>,
    write_timeout: Duration,
    started: AtomicBool,
    running: AtomicBool,
}

impl TcpLink {
    pub(crate) fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            endpoint: Endpoint::tcp(host.clone(), port),
            host,
            port,
            state: StateCell::new(),
            subscribers: Subscribers::new(),
            writer: tokio::sync::Mutex::new(None),
            local_addr: Mutex::new(None),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            started: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// The address actually bound, once the listener is up.
    ///
    /// Differs from the endpoint when it asked for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>) {
        self.state.set(LinkState::Connecting);

        let listener = match TcpListener::bind((self.host.as_str(), self.port)).await {
            Ok(listener) => listener,
            Err(source) => {
                warn!("{}: bind failed: {source}", self.endpoint);
                self.fail(LinkError::Bind {
                    endpoint: self.endpoint.clone(),
                    source,
                });
                return;
            }
        };

        let bound = listener.local_addr().ok();
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = bound;
        info!("{}: listening on {:?}", self.endpoint, bound);

        while self.running.load(Ordering::Acquire) {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(source) => {
                    warn!("{}: accept failed: {source}", self.endpoint);
                    self.fail(LinkError::Io {
                        endpoint: self.endpoint.clone(),
                        source,
                    });
                    return;
                }
            };

            let (reader, writer) = stream.into_split();
            *self.writer.lock().await = Some(writer);
            self.state.set(LinkState::Connected);
            info!("{}: peer {peer} connected", self.endpoint);
            self.subscribers.emit(&LinkEvent::Connected {
                peer: peer.to_string(),
            });

            self.read_loop(reader).await;

            *self.writer.lock().await = None;
            info!("{}: peer {peer} disconnected", self.endpoint);
            self.subscribers.emit(&LinkEvent::Lost);
            self.state.set(LinkState::Connecting);
        }

        self.state.set(LinkState::Closed);
        info!("{}: stopped", self.endpoint);
    }

    /// Reads until EOF, a read error, or `stop()`.
    async fn read_loop(&self, mut reader: OwnedReadHalf) {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        while self.running.load(Ordering::Acquire) {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("{}: read failed: {e}", self.endpoint);
                    break;
                }
            };

            for frame in split_frames(&buf[..n]) {
                let message = parse(frame);
                debug!("{}: received {message}", self.endpoint);
                self.subscribers.emit(&LinkEvent::Received(message));
            }
        }
    }

    fn fail(&self, error: LinkError) {
        self.state.set(LinkState::Errored);
        self.subscribers.emit(&LinkEvent::Error(error));
    }
}

#[async_trait]
impl Link for TcpLink {
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
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| LinkError::NotConnected(self.endpoint.clone()))?;

        let source = match tokio::time::timeout(self.write_timeout, writer.write_all(bytes)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => {
                warn!("{}: peer stopped reading; write timed out", self.endpoint);
                io::Error::new(io::ErrorKind::TimedOut, "write timed out")
            }
        };
        Err(LinkError::Io {
            endpoint: self.endpoint.clone(),
            source,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_new_link_is_idle() {
        let link = TcpLink::new("127.0.0.1", 0);
        assert_eq!(link.state(), LinkState::Idle);
        assert_eq!(link.endpoint(), &Endpoint::tcp("127.0.0.1", 0));
        assert!(link.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_send_without_peer_reports_not_connected() {
        // Arrange
        let link = TcpLink::new("127.0.0.1", 0);

        // Act
        let result = link.send(b"IAC|HOME\n").await;

        // Assert
        assert!(matches!(result, Err(LinkError::NotConnected(_))));
    }

    /// Starts `link` and returns the bound address.
    async fn listening(link: &Arc<TcpLink>) -> SocketAddr {
        Arc::clone(link).start();
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(addr) = link.local_addr() {
                    return addr;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("listener bound within timeout")
    }

    async fn wait_for_state(link: &TcpLink, state: LinkState) {
        tokio::time::timeout(WAIT, async {
            while link.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("link reached expected state");
    }

    #[tokio::test]
    async fn test_write_to_stalled_peer_times_out() {
        // Arrange: the peer connects but never reads.
        let link = Arc::new(TcpLink::new("127.0.0.1", 0).with_write_timeout(Duration::from_millis(100)));
        let addr = listening(&link).await;
        let _peer = TcpStream::connect(addr).await.unwrap();
        wait_for_state(&link, LinkState::Connected).await;
        let payload = vec![b'x'; 64 << 20];

        // Act
        let result = tokio::time::timeout(WAIT, link.send(&payload))
            .await
            .expect("send returned within timeout");

        // Assert
        assert!(matches!(
            result,
            Err(LinkError::Io { ref source, .. }) if source.kind() == io::ErrorKind::TimedOut
        ));
        assert_eq!(link.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_stop_closes_the_link_at_next_iteration() {
        // Arrange
        let link = Arc::new(TcpLink::new("127.0.0.1", 0));
        let addr = listening(&link).await;
        let mut peer = TcpStream::connect(addr).await.unwrap();
        wait_for_state(&link, LinkState::Connected).await;

        // Act: the flag is observed once the blocked read returns.
        link.stop();
        peer.write_all(b"OK\n").await.unwrap();

        // Assert
        wait_for_state(&link, LinkState::Closed).await;
        assert!(matches!(link.send(b"OK\n").await, Err(LinkError::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_bind_failure_moves_link_to_errored_and_emits_error() {
        // Arrange: occupy a port, then point a link at it.
        let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();
        let link = Arc::new(TcpLink::new("127.0.0.1", port));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        link.subscribe(
            EventKind::Error,
            Arc::new(move |event: &LinkEvent| {
                let _ = tx.send(matches!(event, LinkEvent::Error(LinkError::Bind { .. })));
            }),
        );

        // Act
        Arc::clone(&link).start();

        // Assert
        let was_bind_error = tokio::time::timeout(WAIT, rx.recv())
            .await
            .expect("error event within timeout")
            .expect("channel open");
        assert!(was_bind_error);
        assert_eq!(link.state(), LinkState::Errored);
    }
}
