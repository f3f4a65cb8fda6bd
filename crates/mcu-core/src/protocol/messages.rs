//! Frame types exchanged with devices.
//!
//! Frames follow the line protocol spoken by the robot and laser firmware:
//!
//! ```text
//! KIND|field|field|...\n
//! ```
//!
//! The first field is one of the control keywords in [`MessageKind`].  When it
//! is not, the whole frame is read as alternating key/value pairs instead
//! (`M1|12.3|M2|4.5`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Separator between fields of a frame.
pub const FIELD_SEPARATOR: char = '|';

/// Terminator appended to every outbound frame.
pub const FRAME_TERMINATOR: char = '\n';

// ── Frame kinds ───────────────────────────────────────────────────────────────

/// Returned when a token is not one of the control keywords.
///
/// This is not a decoding failure: the codec falls back to
/// [`MessageKind::KeyValue`] whenever it sees one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown frame keyword: {0:?}")]
pub struct UnknownKeyword(pub String);

/// Classification of a frame, derived from its first field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// "Interpret as command": the gateway asks the device to do something.
    Iac,
    /// Select or run a named program on the device.
    Run,
    /// Result of a long-running operation (e.g. a measurement).
    Result,
    /// Periodic status report from the device.
    Status,
    /// Positive acknowledgement.
    Ok,
    /// The device cannot accept the request right now.
    Busy,
    /// The device rejected the request.
    Error,
    /// Synthetic kind for frames whose first field is not a keyword.
    KeyValue,
}

impl MessageKind {
    /// The control keywords in the order they are matched.
    pub const KEYWORDS: [MessageKind; 7] = [
        MessageKind::Iac,
        MessageKind::Run,
        MessageKind::Result,
        MessageKind::Status,
        MessageKind::Ok,
        MessageKind::Busy,
        MessageKind::Error,
    ];

    /// Returns the wire spelling of this kind.
    ///
    /// [`MessageKind::KeyValue`] has no keyword and returns an empty string.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Iac => "IAC",
            MessageKind::Run => "RUN",
            MessageKind::Result => "RESULT",
            MessageKind::Status => "STATUS",
            MessageKind::Ok => "OK",
            MessageKind::Busy => "BUSY",
            MessageKind::Error => "ERROR",
            MessageKind::KeyValue => "",
        }
    }

    /// `true` for the three acknowledgement kinds a device sends in reply to
    /// a request: `OK`, `BUSY` and `ERROR`.
    pub fn is_response(self) -> bool {
        matches!(self, MessageKind::Ok | MessageKind::Busy | MessageKind::Error)
    }
}

impl FromStr for MessageKind {
    type Err = UnknownKeyword;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::KEYWORDS
            .iter()
            .copied()
            .find(|kind| kind.as_str() == token)
            .ok_or_else(|| UnknownKeyword(token.to_string()))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::KeyValue => f.write_str("KeyValue"),
            kind => f.write_str(kind.as_str()),
        }
    }
}

// ── Decoded frame ─────────────────────────────────────────────────────────────

/// One decoded frame.
///
/// For keyword kinds `data` holds the fields after the keyword and `values`
/// is `None`.  For [`MessageKind::KeyValue`] `data` holds every field of the
/// frame and `values` holds the paired view of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub data: Vec<String>,
    pub values: Option<BTreeMap<String, String>>,
    /// The decoded source text, terminator removed.
    pub raw: String,
}

impl Message {
    /// Shorthand for [`MessageKind::is_response`] on this frame's kind.
    pub fn is_response(&self) -> bool {
        self.kind.is_response()
    }

    /// Returns the data field at `index`, if present.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.data.get(index).map(String::as_str)
    }

    /// Looks up `key` in the key/value view.  Always `None` for keyword kinds.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .as_ref()
            .and_then(|values| values.get(key))
            .map(String::as_str)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::codec::format(self.kind, &self.data))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_matches_every_keyword() {
        for kind in MessageKind::KEYWORDS {
            assert_eq!(kind.as_str().parse::<MessageKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_from_str_is_case_sensitive() {
        assert_eq!(
            "iac".parse::<MessageKind>(),
            Err(UnknownKeyword("iac".to_string()))
        );
    }

    #[test]
    fn test_from_str_never_yields_key_value() {
        // The empty spelling of KeyValue must not be matchable from the wire.
        assert!("".parse::<MessageKind>().is_err());
    }

    #[test]
    fn test_is_response_only_for_ok_busy_error() {
        let responses: Vec<MessageKind> = [
            MessageKind::Iac,
            MessageKind::Run,
            MessageKind::Result,
            MessageKind::Status,
            MessageKind::Ok,
            MessageKind::Busy,
            MessageKind::Error,
            MessageKind::KeyValue,
        ]
        .into_iter()
        .filter(|k| k.is_response())
        .collect();

        assert_eq!(
            responses,
            vec![MessageKind::Ok, MessageKind::Busy, MessageKind::Error]
        );
    }

    #[test]
    fn test_value_returns_none_for_keyword_frames() {
        let msg = Message {
            kind: MessageKind::Ok,
            data: vec!["1".to_string()],
            values: None,
            raw: "OK|1".to_string(),
        };
        assert_eq!(msg.value("OK"), None);
        assert_eq!(msg.field(0), Some("1"));
        assert_eq!(msg.field(1), None);
    }
}
