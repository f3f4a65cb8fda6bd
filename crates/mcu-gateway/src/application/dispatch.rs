//! Keyword routing.
//!
//! The [`Dispatcher`] owns one [`CommandHandle`] per discovered command and
//! maps every declared keyword to it.  It is also the boundary that turns an
//! inbound request body into a status code and JSON reply:
//!
//! | Outcome      | Status | Body                       |
//! |--------------|--------|----------------------------|
//! | accepted     | 200    | `{"<kw>": "RECEIVED"}`     |
//! | busy         | 503    | `{"<kw>": "BUSY"}`         |
//! | no command   | 400    | `{"": "BAD_COMMAND"}`      |
//! | bad shape    | 400    | `{"": "BAD_REQUEST"}`      |
//!
//! A request body is a JSON object with exactly one key; the key is the
//! keyword and its value is the command payload.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::command::{Command, CommandHandle, Outcome};
use super::reporter::AttributeReporter;
use super::service::Service;

/// Why a request body could not be routed at all.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("request body is not valid JSON")]
    InvalidJson,
    #[error("request body is not a JSON object")]
    NotAnObject,
    #[error("request must name exactly one keyword, found {0}")]
    KeyCount(usize),
}

/// Result of routing one request.
#[derive(Debug)]
pub enum RequestOutcome {
    /// The command was started.  The receiver resolves after finalize.
    Accepted {
        keyword: String,
        done: oneshot::Receiver<Outcome>,
    },
    /// The command owning the keyword is still running.
    Busy { keyword: String },
    /// No command declares the keyword.
    BadCommand { keyword: String },
    /// The body was malformed.
    BadRequest(RequestError),
}

/// Status code and JSON body for the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

impl From<&RequestOutcome> for ApiReply {
    fn from(outcome: &RequestOutcome) -> Self {
        match outcome {
            RequestOutcome::Accepted { keyword, .. } => Self {
                status: 200,
                body: json!({ keyword.as_str(): "RECEIVED" }),
            },
            RequestOutcome::Busy { keyword } => Self {
                status: 503,
                body: json!({ keyword.as_str(): "BUSY" }),
            },
            RequestOutcome::BadCommand { .. } => Self {
                status: 400,
                body: json!({ "": "BAD_COMMAND" }),
            },
            RequestOutcome::BadRequest(_) => Self {
                status: 400,
                body: json!({ "": "BAD_REQUEST" }),
            },
        }
    }
}

/// Routes keywords to commands and keeps services alive.
pub struct Dispatcher {
    reporter: Arc<dyn AttributeReporter>,
    by_keyword: HashMap<String, Arc<CommandHandle>>,
    commands: Vec<Arc<CommandHandle>>,
    services: Vec<Arc<dyn Service>>,
}

impl Dispatcher {
    pub fn new(reporter: Arc<dyn AttributeReporter>) -> Self {
        Self {
            reporter,
            by_keyword: HashMap::new(),
            commands: Vec::new(),
            services: Vec::new(),
        }
    }

    /// Wraps `command` in a handle and maps each of its keywords to it.
    ///
    /// A keyword already claimed by an earlier command stays with that
    /// command; the clash is logged.
    pub fn register_command(&mut self, command: Arc<dyn Command>) {
        let handle = Arc::new(CommandHandle::new(command, Arc::clone(&self.reporter)));

        for keyword in handle.keywords() {
            if self.by_keyword.contains_key(*keyword) {
                warn!("keyword '{keyword}' is already registered; keeping the first command");
                continue;
            }
            self.by_keyword.insert((*keyword).to_string(), Arc::clone(&handle));
        }
        self.commands.push(handle);
    }

    pub fn register_service(&mut self, service: Arc<dyn Service>) {
        info!("service '{}' active", service.name());
        self.services.push(service);
    }

    /// The command handle owning `keyword`.
    pub fn command(&self, keyword: &str) -> Option<&Arc<CommandHandle>> {
        self.by_keyword.get(keyword)
    }

    /// Every registered keyword, sorted.
    pub fn keywords(&self) -> Vec<&str> {
        let mut keywords: Vec<&str> = self.by_keyword.keys().map(String::as_str).collect();
        keywords.sort_unstable();
        keywords
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Starts the command owning `keyword` unless it is already running.
    pub fn dispatch(&self, keyword: &str, payload: Value) -> RequestOutcome {
        let Some(handle) = self.by_keyword.get(keyword) else {
            return RequestOutcome::BadCommand {
                keyword: keyword.to_string(),
            };
        };

        if handle.is_running() {
            return RequestOutcome::Busy {
                keyword: keyword.to_string(),
            };
        }

        RequestOutcome::Accepted {
            keyword: keyword.to_string(),
            done: handle.execute(payload, keyword),
        }
    }

    /// Routes a decoded request body.
    pub fn route(&self, body: Value) -> RequestOutcome {
        let Value::Object(map) = body else {
            return RequestOutcome::BadRequest(RequestError::NotAnObject);
        };
        match single_entry(map) {
            Ok((keyword, payload)) => self.dispatch(&keyword, payload),
            Err(e) => RequestOutcome::BadRequest(e),
        }
    }

    /// Routes a raw request body and produces the reply for the HTTP layer.
    pub fn handle_request(&self, body: &[u8]) -> ApiReply {
        let outcome = match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.route(value),
            Err(_) => RequestOutcome::BadRequest(RequestError::InvalidJson),
        };

        match &outcome {
            RequestOutcome::Accepted { keyword, .. } => info!("request '{keyword}' accepted"),
            RequestOutcome::Busy { keyword } => info!("request '{keyword}' rejected: busy"),
            RequestOutcome::BadCommand { keyword } => warn!("request '{keyword}' matches no command"),
            RequestOutcome::BadRequest(e) => warn!("bad request: {e}"),
        }

        ApiReply::from(&outcome)
    }
}

fn single_entry(map: Map<String, Value>) -> Result<(String, Value), RequestError> {
    if map.len() != 1 {
        return Err(RequestError::KeyCount(map.len()));
    }
    map.into_iter().next().ok_or(RequestError::KeyCount(0))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::command::ResultSlot;
    use crate::application::reporter::AttributeValue;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, AttributeValue)>>);

    impl AttributeReporter for Recorder {
        fn update(&self, name: &str, value: AttributeValue) {
            self.0.lock().unwrap().push((name.to_string(), value));
        }
    }

    struct Echo(&'static [&'static str]);

    #[async_trait]
    impl Command for Echo {
        fn keywords(&self) -> &[&str] {
            self.0
        }

        async fn target(&self, payload: Value, _: &str, result: &ResultSlot) -> anyhow::Result<()> {
            result.set(payload.as_str().unwrap_or("OK"));
            Ok(())
        }
    }

    struct Waits(Arc<Notify>);

    #[async_trait]
    impl Command for Waits {
        fn keywords(&self) -> &[&str] {
            &["slow"]
        }

        async fn target(&self, _: Value, _: &str, result: &ResultSlot) -> anyhow::Result<()> {
            self.0.notified().await;
            result.set("OK");
            Ok(())
        }
    }

    struct Quiet;

    impl Service for Quiet {
        fn name(&self) -> &str {
            "quiet"
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let mut d = Dispatcher::new(recorder.clone());
        d.register_command(Arc::new(Echo(&["echo", "echo2"])));
        (d, recorder)
    }

    #[tokio::test]
    async fn test_accepted_request_replies_received() {
        // Arrange
        let (d, recorder) = dispatcher();

        // Act
        let reply = d.handle_request(br#"{"echo": "hi"}"#);

        // Assert
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, json!({"echo": "RECEIVED"}));

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while d.command("echo").is_some_and(|h| h.is_running()) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![("echo_info".to_string(), AttributeValue::from("hi"))]
        );
    }

    #[tokio::test]
    async fn test_unknown_keyword_is_bad_command() {
        let (d, _) = dispatcher();
        let reply = d.handle_request(br#"{"fly": {}}"#);
        assert_eq!(reply.status, 400);
        assert_eq!(reply.body, json!({"": "BAD_COMMAND"}));
    }

    #[test]
    fn test_shape_errors_are_bad_request() {
        let (d, _) = dispatcher();

        let bodies: [&[u8]; 4] = [b"{}", br#"{"echo": 1, "echo2": 2}"#, b"[1]", b"not json"];
        for body in bodies {
            let reply = d.handle_request(body);
            assert_eq!(reply.status, 400);
            assert_eq!(reply.body, json!({"": "BAD_REQUEST"}));
        }
    }

    #[test]
    fn test_route_reports_shape_error_kind() {
        let (d, _) = dispatcher();
        assert!(matches!(
            d.route(json!({})),
            RequestOutcome::BadRequest(RequestError::KeyCount(0))
        ));
        assert!(matches!(
            d.route(json!("echo")),
            RequestOutcome::BadRequest(RequestError::NotAnObject)
        ));
    }

    #[tokio::test]
    async fn test_running_command_replies_busy() {
        // Arrange
        let gate = Arc::new(Notify::new());
        let mut d = Dispatcher::new(Arc::new(Recorder::default()));
        d.register_command(Arc::new(Waits(Arc::clone(&gate))));
        let first = d.dispatch("slow", Value::Null);

        // Act
        let reply = d.handle_request(br#"{"slow": null}"#);

        // Assert
        assert_eq!(reply.status, 503);
        assert_eq!(reply.body, json!({"slow": "BUSY"}));

        gate.notify_one();
        let RequestOutcome::Accepted { done, .. } = first else {
            panic!("first request should be accepted");
        };
        done.await.unwrap();
        assert_eq!(d.handle_request(br#"{"slow": null}"#).status, 200);
        gate.notify_one();
    }

    #[test]
    fn test_every_keyword_maps_to_the_same_handle() {
        let (d, _) = dispatcher();

        let a = d.command("echo").unwrap();
        let b = d.command("echo2").unwrap();

        assert!(Arc::ptr_eq(a, b));
        assert_eq!(d.keywords(), vec!["echo", "echo2"]);
        assert_eq!(d.command_count(), 1);
    }

    #[test]
    fn test_duplicate_keyword_keeps_first_command() {
        let (mut d, _) = dispatcher();
        let original = Arc::clone(d.command("echo").unwrap());

        d.register_command(Arc::new(Echo(&["echo"])));

        assert!(Arc::ptr_eq(d.command("echo").unwrap(), &original));
        assert_eq!(d.command_count(), 2);
    }

    #[test]
    fn test_keyword_match_is_case_sensitive() {
        let (d, _) = dispatcher();
        assert!(d.command("ECHO").is_none());
    }

    #[test]
    fn test_services_are_retained() {
        let (mut d, _) = dispatcher();
        d.register_service(Arc::new(Quiet));
        assert_eq!(d.service_count(), 1);
    }
}
