//! Protocol module containing the frame types and the text codec.

pub mod codec;
pub mod messages;

pub use codec::{encode_frame, format, is_blank_frame, parse, parse_str, split_frames};
pub use messages::*;
