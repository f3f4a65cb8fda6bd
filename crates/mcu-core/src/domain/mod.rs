//! Domain layer: pure types with no I/O.
//!
//! - **`endpoint`** – identity of a physical connection target.  Two links
//!   with equal endpoints are the same link; the registry in the gateway
//!   crate relies on `Endpoint: Eq + Hash` to deduplicate them.

pub mod endpoint;
