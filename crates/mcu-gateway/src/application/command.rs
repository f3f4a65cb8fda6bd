//! Commands: keyword-addressed units of work with busy and result tracking.
//!
//! # Invocation lifecycle
//!
//! ```text
//!            execute(payload, kw)
//!   Idle ─────────────────────────► Running
//!    ▲                                 │ worker task:
//!    │                                 │   target(payload, kw, slot)
//!    │                                 │   (Err / panic caught here)
//!    │                                 ▼
//!    └──────── running = false ◄── finalize (reporter panic caught here)
//!                                    ├─ slot unset  → warn, no report
//!                                    ├─ slot == ""  → suppressed
//!                                    └─ otherwise   → update("<kw>_info", result)
//! ```
//!
//! The `running` flag is advisory.  [`CommandHandle::execute`] does not check
//! it; the caller (the dispatcher) refuses requests for a running command.
//!
//! Each invocation hands back a single-use channel that resolves with the
//! [`Outcome`] once finalize has run and `running` is false again.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::reporter::AttributeReporter;

/// Where a command leaves its result.
///
/// `None` means the command never set one; `Some("")` means it asked for the
/// report to be suppressed (it will report later from a link callback).
#[derive(Debug, Clone, Default)]
pub struct ResultSlot(Arc<Mutex<Option<String>>>);

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, result: impl Into<String>) {
        *self.lock() = Some(result.into());
    }

    /// Marks the invocation as reporting asynchronously.
    pub fn suppress(&self) {
        self.set("");
    }

    pub fn get(&self) -> Option<String> {
        self.lock().clone()
    }

    fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Device logic invocable by keyword.
#[async_trait]
pub trait Command: Send + Sync {
    /// Keywords that select this command.  Exact, case-sensitive match.
    fn keywords(&self) -> &[&str];

    /// Runs one invocation.
    ///
    /// `keyword` is the keyword that selected the command.  Implementations
    /// must set `result` before returning; an empty string suppresses the
    /// report.  Returning `Err` is logged and otherwise treated like
    /// returning without a result (unless one was already set).
    async fn target(&self, payload: Value, keyword: &str, result: &ResultSlot) -> anyhow::Result<()>;
}

/// How an invocation was finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `update("<kw>_info", result)` was called.
    Reported(String),
    /// The command set `""`; nothing was reported.
    Suppressed,
    /// The command never set a result; a warning was logged.
    NoResult,
}

/// Invocation state wrapped around one [`Command`].
///
/// Lives for the process lifetime; `running`, `result` and
/// `current_keyword` are overwritten by every invocation.
pub struct CommandHandle {
    command: Arc<dyn Command>,
    reporter: Arc<dyn AttributeReporter>,
    running: AtomicBool,
    result: ResultSlot,
    current_keyword: Mutex<Option<String>>,
}

impl CommandHandle {
    pub fn new(command: Arc<dyn Command>, reporter: Arc<dyn AttributeReporter>) -> Self {
        Self {
            command,
            reporter,
            running: AtomicBool::new(false),
            result: ResultSlot::new(),
            current_keyword: Mutex::new(None),
        }
    }

    pub fn keywords(&self) -> &[&str] {
        self.command.keywords()
    }

    /// `true` from `execute` until the worker has finalized.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Result of the current or most recent invocation.
    pub fn result(&self) -> Option<String> {
        self.result.get()
    }

    /// Keyword of the current or most recent invocation.
    pub fn current_keyword(&self) -> Option<String> {
        self.current_keyword
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Starts an invocation on a fresh Tokio task and returns immediately.
    ///
    /// The caller must have checked [`is_running`](Self::is_running); this
    /// method does not.  The returned receiver resolves after finalize; it
    /// may be dropped if the caller does not care.
    pub fn execute(self: &Arc<Self>, payload: Value, keyword: &str) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let invocation = Uuid::new_v4();

        self.result.clear();
        *self
            .current_keyword
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(keyword.to_string());
        self.running.store(true, Ordering::Release);

        info!("[{invocation}] executing '{keyword}'");

        let this = Arc::clone(self);
        let keyword = keyword.to_string();
        tokio::spawn(async move {
            let outcome = {
                let _running = RunningGuard(&this.running);
                this.run_target(invocation, payload, &keyword).await;
                this.finalize(invocation, &keyword)
            };
            debug!("[{invocation}] '{keyword}' finished: {outcome:?}");
            let _ = tx.send(outcome);
        });

        rx
    }

    /// Runs `target` on its own task so a panic is contained at this
    /// boundary.
    async fn run_target(&self, invocation: Uuid, payload: Value, keyword: &str) {
        let command = Arc::clone(&self.command);
        let slot = self.result.clone();
        let kw = keyword.to_string();
        let inner = tokio::spawn(async move { command.target(payload, &kw, &slot).await });

        match inner.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("[{invocation}] '{keyword}' failed: {e:#}"),
            Err(join) if join.is_panic() => error!("[{invocation}] '{keyword}' panicked"),
            Err(join) => error!("[{invocation}] '{keyword}' was cancelled: {join}"),
        }
    }

    fn finalize(&self, invocation: Uuid, keyword: &str) -> Outcome {
        match self.result.get() {
            None => {
                warn!("[{invocation}] '{keyword}' finished without setting a result; nothing reported");
                Outcome::NoResult
            }
            Some(result) if result.is_empty() => Outcome::Suppressed,
            Some(result) => {
                let name = format!("{keyword}_info");
                let value = result.as_str().into();
                let reported =
                    panic::catch_unwind(AssertUnwindSafe(|| self.reporter.update(&name, value)));
                if reported.is_err() {
                    error!("[{invocation}] reporter panicked on '{name}'; update dropped");
                }
                Outcome::Reported(result)
            }
        }
    }
}

/// Clears the `running` flag when dropped, whichever way the worker ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
