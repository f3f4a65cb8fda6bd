//! Infrastructure layer for the gateway.
//!
//! Contains OS-facing adapters: TCP and serial links, the link registry,
//! configuration storage, and the log-backed attribute reporter.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mcu_core`, but MUST NOT be imported by the `application` layer.

pub mod link;
pub mod registry;
pub mod reporter;
pub mod storage;
