//! Identity of a physical link.
//!
//! An [`Endpoint`] is the dedup key of the link registry: asking for a link to
//! an endpoint that already has one returns the existing link, mirroring the
//! fact that a physical cable or listening port can only be owned once.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a link is attached.
///
/// Immutable once created; equality covers every field, so two serial
/// endpoints on the same device path with different baud rates are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum Endpoint {
    /// A TCP listening endpoint.  Devices connect *to* the gateway.
    Tcp { host: String, port: u16 },
    /// A serial device such as `/dev/ttyUSB0` or `COM8`.
    Serial { path: String, baud_rate: u32 },
}

impl Endpoint {
    /// Convenience constructor for a TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Convenience constructor for a serial endpoint.
    pub fn serial(path: impl Into<String>, baud_rate: u32) -> Self {
        Endpoint::Serial {
            path: path.into(),
            baud_rate,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Endpoint::Serial { path, baud_rate } => write!(f, "serial://{path}@{baud_rate}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
