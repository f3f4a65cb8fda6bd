//! Passive services.
//!
//! A service has no keyword and is never executed.  It does all its work in
//! the link callbacks it registers while being constructed, reporting
//! attributes directly whenever a qualifying event arrives.  The dispatcher
//! keeps services alive for the process lifetime and nothing else.

/// Marker contract for a passive, self-subscribing handler.
pub trait Service: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;
}
