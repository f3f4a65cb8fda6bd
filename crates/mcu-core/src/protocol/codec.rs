//! Text codec for the device line protocol.
//!
//! Wire format:
//! ```text
//! FIELD[|FIELD...]\n
//! ```
//! ASCII text, fields separated by `|`, one frame per line.
//!
//! Decoding never fails.  A first field that is not a control keyword is not
//! an error; the frame is decoded as key/value pairs instead.

use std::collections::BTreeMap;

use tracing::trace;

use crate::protocol::messages::{Message, MessageKind, FIELD_SEPARATOR, FRAME_TERMINATOR};

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes raw bytes read from a link into a [`Message`].
///
/// Bytes that are not valid UTF-8 are replaced with `U+FFFD` rather than
/// rejected; devices occasionally emit line noise on power-up.
///
/// # Examples
///
/// ```rust
/// use mcu_core::protocol::{parse, MessageKind};
///
/// let msg = parse(b"IAC|HOME\n");
/// assert_eq!(msg.kind, MessageKind::Iac);
/// assert_eq!(msg.data, vec!["HOME".to_string()]);
/// ```
pub fn parse(raw: &[u8]) -> Message {
    parse_str(&String::from_utf8_lossy(raw))
}

/// Decodes one frame of text into a [`Message`].
///
/// One trailing terminator (`\n` or `\r\n`) is removed before splitting.
/// Empty input decodes to a [`MessageKind::KeyValue`] message with no tokens
/// and an empty map.
///
/// # Examples
///
/// ```rust
/// use mcu_core::protocol::{parse_str, MessageKind};
///
/// let msg = parse_str("M1|12.3|M2|4.5");
/// assert_eq!(msg.kind, MessageKind::KeyValue);
/// assert_eq!(msg.value("M2"), Some("4.5"));
/// ```
pub fn parse_str(raw: &str) -> Message {
    let text = strip_terminator(raw);

    if text.is_empty() {
        return Message {
            kind: MessageKind::KeyValue,
            data: Vec::new(),
            values: Some(BTreeMap::new()),
            raw: String::new(),
        };
    }

    let mut tokens: Vec<String> = text.split(FIELD_SEPARATOR).map(str::to_string).collect();

    match tokens[0].parse::<MessageKind>() {
        Ok(kind) => {
            tokens.remove(0);
            Message {
                kind,
                data: tokens,
                values: None,
                raw: text.to_string(),
            }
        }
        Err(unknown) => {
            trace!("{unknown}; decoding as key/value pairs");
            let values = pair_up(&tokens);
            Message {
                kind: MessageKind::KeyValue,
                data: tokens,
                values: Some(values),
                raw: text.to_string(),
            }
        }
    }
}

/// Joins a kind and its fields into frame text, without a terminator.
///
/// [`MessageKind::KeyValue`] has no keyword, so only the tokens are joined.
///
/// # Examples
///
/// ```rust
/// use mcu_core::protocol::{format, MessageKind};
///
/// assert_eq!(format(MessageKind::Iac, &["HOME"]), "IAC|HOME");
/// assert_eq!(format(MessageKind::KeyValue, &["pwm", "on"]), "pwm|on");
/// ```
pub fn format<S: AsRef<str>>(kind: MessageKind, tokens: &[S]) -> String {
    let mut out = String::from(kind.as_str());
    for (i, token) in tokens.iter().enumerate() {
        if kind != MessageKind::KeyValue || i > 0 {
            out.push(FIELD_SEPARATOR);
        }
        out.push_str(token.as_ref());
    }
    out
}

/// Formats a frame and appends the `\n` terminator, ready to be written to a
/// link.
pub fn encode_frame<S: AsRef<str>>(kind: MessageKind, tokens: &[S]) -> Vec<u8> {
    let mut text = format(kind, tokens);
    text.push(FRAME_TERMINATOR);
    text.into_bytes()
}

/// `true` when a read consists solely of a line ending (`\r`, `\n` or `\r\n`).
///
/// Links drop such reads before they reach any subscriber.
pub fn is_blank_frame(raw: &[u8]) -> bool {
    matches!(raw, b"\r" | b"\n" | b"\r\n")
}

/// Splits one read from a stream link into individual frames.
///
/// A device that answers twice in quick succession often lands both replies
/// in a single read (`OK|1\nOK|2\n`).  Splitting on `\n` restores the frame
/// boundaries in arrival order.  A trailing `\r` is removed from each piece
/// and empty pieces are dropped.  Blank reads yield no frames at all.
///
/// # Examples
///
/// ```rust
/// use mcu_core::protocol::split_frames;
///
/// let frames = split_frames(b"OK|1\nOK|2\n");
/// assert_eq!(frames, vec![&b"OK|1"[..], &b"OK|2"[..]]);
/// assert!(split_frames(b"\r\n").is_empty());
/// ```
pub fn split_frames(raw: &[u8]) -> Vec<&[u8]> {
    if is_blank_frame(raw) {
        return Vec::new();
    }

    raw.split(|b| *b == b'\n')
        .map(|segment| segment.strip_suffix(b"\r").unwrap_or(segment))
        .filter(|segment| !segment.is_empty())
        .collect()
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn strip_terminator(raw: &str) -> &str {
    match raw.strip_suffix(FRAME_TERMINATOR) {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => raw,
    }
}

/// token[0]→token[1], token[2]→token[3], …  An unpaired trailing token is
/// dropped.
fn pair_up(tokens: &[String]) -> BTreeMap<String, String> {
    tokens
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keyword_frame_moves_rest_into_data() {
        // Arrange / Act
        let msg = parse_str("RESULT|SUCCESS|12.5");

        // Assert
        assert_eq!(msg.kind, MessageKind::Result);
        assert_eq!(msg.data, vec!["SUCCESS", "12.5"]);
        assert!(msg.values.is_none());
        assert_eq!(msg.raw, "RESULT|SUCCESS|12.5");
    }

    #[test]
    fn test_parse_bare_keyword_has_no_data() {
        let msg = parse_str("OK");
        assert_eq!(msg.kind, MessageKind::Ok);
        assert!(msg.data.is_empty());
    }

    #[test]
    fn test_parse_strips_single_terminator() {
        assert_eq!(parse_str("OK|1\n").data, vec!["1"]);
        assert_eq!(parse_str("OK|1\r\n").data, vec!["1"]);
    }

    #[test]
    fn test_parse_keeps_inner_whitespace() {
        let msg = parse_str("STATUS| TRUE |FALSE");
        assert_eq!(msg.data, vec![" TRUE ", "FALSE"]);
    }

    #[test]
    fn test_parse_trailing_separator_yields_empty_field() {
        // Laser firmware terminates commands with `|`, e.g. `pwm|on|`.
        let msg = parse_str("RUN|prog_a|");
        assert_eq!(msg.kind, MessageKind::Run);
        assert_eq!(msg.data, vec!["prog_a", ""]);
    }

    #[test]
    fn test_parse_unknown_keyword_falls_back_to_key_value() {
        let msg = parse_str("M1|12.3|M2|4.5");

        assert_eq!(msg.kind, MessageKind::KeyValue);
        assert_eq!(msg.data.len(), 4);
        let values = msg.values.expect("key/value frames carry a map");
        assert_eq!(values.len(), 2);
        assert_eq!(values["M1"], "12.3");
        assert_eq!(values["M2"], "4.5");
    }

    #[test]
    fn test_parse_key_value_drops_unpaired_trailing_token() {
        let msg = parse_str("M1|12.3|M2");
        let values = msg.values.expect("map");
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("M1").map(String::as_str), Some("12.3"));
        assert!(!values.contains_key("M2"));
    }

    #[test]
    fn test_parse_empty_input_is_empty_key_value() {
        let msg = parse(b"");
        assert_eq!(msg.kind, MessageKind::KeyValue);
        assert!(msg.data.is_empty());
        assert_eq!(msg.values, Some(BTreeMap::new()));
    }

    #[test]
    fn test_parse_matches_whole_first_token_only() {
        // `OKAY` starts with `OK` but is not the OK keyword.
        let msg = parse_str("OKAY|1");
        assert_eq!(msg.kind, MessageKind::KeyValue);
    }

    #[test]
    fn test_parse_invalid_utf8_is_lossy() {
        let msg = parse(&[b'O', b'K', b'|', 0xFF]);
        assert_eq!(msg.kind, MessageKind::Ok);
        assert_eq!(msg.data, vec!["\u{FFFD}"]);
    }

    #[test]
    fn test_format_keyword_frame() {
        assert_eq!(format(MessageKind::Iac, &["HOME"]), "IAC|HOME");
        assert_eq!(format(MessageKind::Run, &["prog", ""]), "RUN|prog|");
        assert_eq!(format::<&str>(MessageKind::Ok, &[]), "OK");
    }

    #[test]
    fn test_format_key_value_frame_has_no_leading_separator() {
        assert_eq!(format(MessageKind::KeyValue, &["duty", "40", ""]), "duty|40|");
    }

    #[test]
    fn test_encode_frame_appends_newline() {
        assert_eq!(encode_frame(MessageKind::Iac, &["PAUSE"]), b"IAC|PAUSE\n".to_vec());
    }

    #[test]
    fn test_display_reproduces_frame_text() {
        let msg = parse_str("IAC|MEASURE_PCB");
        assert_eq!(msg.to_string(), "IAC|MEASURE_PCB");
    }

    #[test]
    fn test_is_blank_frame() {
        assert!(is_blank_frame(b"\r"));
        assert!(is_blank_frame(b"\n"));
        assert!(is_blank_frame(b"\r\n"));
        assert!(!is_blank_frame(b"\n\n"));
        assert!(!is_blank_frame(b"OK\n"));
    }

    #[test]
    fn test_split_frames_keeps_order_of_coalesced_replies() {
        let frames = split_frames(b"OK|1\nOK|2\n");
        assert_eq!(frames, vec![&b"OK|1"[..], &b"OK|2"[..]]);
    }

    #[test]
    fn test_split_frames_without_terminator_yields_one_frame() {
        assert_eq!(split_frames(b"STATUS|TRUE"), vec![&b"STATUS|TRUE"[..]]);
    }

    #[test]
    fn test_split_frames_strips_carriage_returns() {
        let frames = split_frames(b"OK|1\r\n\r\nBUSY\r\n");
        assert_eq!(frames, vec![&b"OK|1"[..], &b"BUSY"[..]]);
    }

    #[test]
    fn test_split_frames_drops_blank_reads() {
        assert!(split_frames(b"\r").is_empty());
        assert!(split_frames(b"\n").is_empty());
        assert!(split_frames(b"\r\n").is_empty());
    }
}
