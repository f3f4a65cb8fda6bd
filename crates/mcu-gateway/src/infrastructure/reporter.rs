//! Attribute reporter that writes updates to the structured log.
//!
//! The network sink that forwards attributes to the cloud is deployed
//! separately; the binary uses this reporter so every update is still
//! observable on stdout under the `attribute` target.

use tracing::info;

use crate::application::reporter::{AttributeReporter, AttributeValue};

/// Logs each update at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl AttributeReporter for LogReporter {
    fn update(&self, name: &str, value: AttributeValue) {
        let json = serde_json::to_string(&value).unwrap_or_else(|_| value.to_string());
        info!(target: "attribute", name, value = %json, "attribute update");
    }
}
