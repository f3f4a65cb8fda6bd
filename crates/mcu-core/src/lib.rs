//! # mcu-core
//!
//! Shared library for the MCU gateway containing the device wire protocol
//! codec and the endpoint identities used to address physical links.
//!
//! It has zero dependencies on sockets, serial ports, or an async runtime,
//! so everything in here can be tested as plain functions.
//!
//! # Architecture overview (for beginners)
//!
//! The gateway sits between a cloud platform and a handful of physical
//! devices (robots, laser controllers, measuring stations).  The cloud sends
//! keyword-addressed intents such as `{"home": {}}`; the gateway turns them
//! into short text frames like `IAC|HOME\n` and writes them to the device over
//! TCP or a serial line.  Devices answer with frames of the same shape.
//!
//! This crate (`mcu-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How frames look on the wire.  A frame is ASCII text,
//!   fields separated by `|`, terminated by `\n`.  The first field names the
//!   frame kind; unknown first fields turn the whole frame into key/value
//!   pairs.
//!
//! - **`domain`** – The [`Endpoint`] identity of a physical link
//!   (`host:port` for TCP, `path@baud` for serial).

pub mod domain;
pub mod protocol;

pub use domain::endpoint::Endpoint;
pub use protocol::codec::{encode_frame, format, parse, parse_str, split_frames};
pub use protocol::messages::{Message, MessageKind, UnknownKeyword};
