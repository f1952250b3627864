//! Test doubles for the client core.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::instrument::{CallOutcome, Logger, MetricsSink};
use super::request::{RawResponse, RequestSpec};
use super::{ApiError, Fields};

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn child(&self, _context: Fields) -> Arc<dyn Logger> {
        Arc::new(NullLogger)
    }

    fn log(&self, _level: log::Level, _message: &str, _context: &Fields) {}
}

/// Keeps every recorded outcome in order.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    outcomes: Mutex<Vec<CallOutcome>>,
}

impl RecordingMetrics {
    pub fn outcomes(&self) -> Vec<CallOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record(&self, outcome: &CallOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

type Scripted = Box<dyn Fn() -> Result<RawResponse, ApiError> + Send + Sync>;

/// Transport that replays a fixed script of results, one per attempt.
///
/// Once the script runs out the last entry repeats.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<RequestSpec>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn then<F>(self, step: F) -> Self
    where
        F: Fn() -> Result<RawResponse, ApiError> + Send + Sync + 'static,
    {
        self.script.lock().unwrap().push_back(Box::new(step));
        self
    }

    pub fn then_ok(self, status: u16, body: &str) -> Self {
        let body = body.to_string();
        self.then(move || Ok(RawResponse::new(status, body.clone())))
    }

    pub fn then_status(self, status: u16) -> Self {
        self.then(move || Err(ApiError::from_status(status, "")))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl super::transport::Transport for ScriptedTransport {
    async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(spec.clone());

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = next {
            *last = Some(step);
        }
        match last.as_ref() {
            Some(step) => step(),
            None => Err(ApiError::system("script is empty")),
        }
    }
}

/// Core over a scripted transport: three attempts, 1 ms backoff, 5 s timeout.
pub fn scripted_core(
    transport: Arc<ScriptedTransport>,
    metrics: Arc<RecordingMetrics>,
) -> super::ApiCore {
    super::ApiCore::new(
        transport,
        super::RetryPolicy::new(3, std::time::Duration::from_millis(1)),
        std::time::Duration::from_secs(5),
        Arc::new(NullLogger),
        metrics,
    )
}
