//! Application layer for the gateway.
//!
//! Contains the contracts plugins implement and the invocation machinery
//! around them:
//!
//! - `reporter`: the upstream attribute sink contract.
//! - `command`: invocable commands and their busy/result state machine.
//! - `service`: passive, self-subscribing handlers.
//! - `dispatch`: keyword routing and request replies.
//!
//! Nothing here opens sockets or devices; links are handed to plugins by the
//! infrastructure layer.

pub mod command;
pub mod dispatch;
pub mod reporter;
pub mod service;
