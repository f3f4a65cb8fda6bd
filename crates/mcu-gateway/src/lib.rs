//! mcu-gateway library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the gateway do? (for beginners)
//!
//! The gateway receives intents from the cloud, each addressed by a keyword
//! (`home`, `pause`, `measure_pcb`, ...), and turns them into frames for the
//! physical devices wired to it:
//!
//! 1. At start-up every plugin is constructed once.  Plugins ask the
//!    [`LinkRegistry`](infrastructure::registry::LinkRegistry) for the TCP or
//!    serial links they need and subscribe to their events.
//! 2. The registry starts every link's receive loop.
//! 3. An inbound request is routed by the
//!    [`Dispatcher`](application::dispatch::Dispatcher) to the command owning
//!    the keyword; the command runs on its own task and writes frames to its
//!    links.
//! 4. Device replies arrive on the link's receive loop, are decoded with the
//!    `mcu-core` codec, and are fanned out to every subscriber.
//! 5. Results flow upstream through the
//!    [`AttributeReporter`](application::reporter::AttributeReporter).

/// Application layer: reporting contract, commands, services and dispatch.
pub mod application;

/// Infrastructure layer: links, link registry, configuration, reporters.
pub mod infrastructure;

/// Device plugins and their discovery.
pub mod plugins;
