//! Outcome and latency reporting for logical operations.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::error::ApiError;
use super::{fields, Fields};

/// Structured logger consumed by the client core.
pub trait Logger: Send + Sync {
    /// Returns a logger whose lines also carry `context`.
    fn child(&self, context: Fields) -> Arc<dyn Logger>;

    fn log(&self, level: log::Level, message: &str, context: &Fields);

    fn debug(&self, message: &str, context: &Fields) {
        self.log(log::Level::Debug, message, context);
    }

    fn info(&self, message: &str, context: &Fields) {
        self.log(log::Level::Info, message, context);
    }

    fn warn(&self, message: &str, context: &Fields) {
        self.log(log::Level::Warn, message, context);
    }

    fn error(&self, message: &str, context: &Fields) {
        self.log(log::Level::Error, message, context);
    }
}

/// [`Logger`] backed by the `log` facade.
///
/// Context is rendered as `key=value` pairs after the message, inherited
/// context first.
#[derive(Debug, Clone, Default)]
pub struct LogLogger {
    context: Fields,
}

impl LogLogger {
    pub fn new() -> Self {
        Self::default()
    }

    fn render(&self, message: &str, extra: &Fields) -> String {
        let mut line = message.to_string();
        for (key, value) in self.context.iter().chain(extra.iter()) {
            match value {
                serde_json::Value::String(s) => line.push_str(&format!(" {key}={s}")),
                other => line.push_str(&format!(" {key}={other}")),
            }
        }
        line
    }
}

impl Logger for LogLogger {
    fn child(&self, context: Fields) -> Arc<dyn Logger> {
        let mut merged = self.context.clone();
        merged.extend(context);
        Arc::new(LogLogger { context: merged })
    }

    fn log(&self, level: log::Level, message: &str, context: &Fields) {
        if log::log_enabled!(target: "api_client", level) {
            log::log!(target: "api_client", level, "{}", self.render(message, context));
        }
    }
}

/// Outcome of one logical operation, retries included.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub operation: String,
    pub duration: Duration,
    pub success: bool,
}

impl CallOutcome {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

/// Fire-and-forget metrics destination.
pub trait MetricsSink: Send + Sync {
    fn record(&self, outcome: &CallOutcome);
}

/// Debug-logs every outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn record(&self, outcome: &CallOutcome) {
        log::debug!(
            target: "api_metrics",
            "operation={} success={} duration_ms={:.1}",
            outcome.operation,
            outcome.success,
            outcome.duration_ms()
        );
    }
}

/// Forwards each outcome to several sinks.
#[derive(Default)]
pub struct FanoutMetrics {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutMetrics {
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self { sinks }
    }
}

impl MetricsSink for FanoutMetrics {
    fn record(&self, outcome: &CallOutcome) {
        for sink in &self.sinks {
            sink.record(outcome);
        }
    }
}

/// Aggregated counters for one operation name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationStats {
    pub calls: u64,
    pub failures: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
}

impl OperationStats {
    pub fn mean_duration(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_duration.as_nanos() / u128::from(self.calls);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// In-process aggregate of call outcomes, keyed by operation name.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    stats: Mutex<BTreeMap<String, OperationStats>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, OperationStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record(&self, outcome: &CallOutcome) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(outcome.operation.clone()).or_default();
        entry.calls += 1;
        if !outcome.success {
            entry.failures += 1;
        }
        entry.total_duration += outcome.duration;
        entry.max_duration = entry.max_duration.max(outcome.duration);
    }
}

/// Records the outcome of an operation that is dropped before it finishes.
struct CancelGuard<'a> {
    operation: &'a str,
    metrics: &'a dyn MetricsSink,
    logger: &'a dyn Logger,
    started: Instant,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let outcome = CallOutcome {
            operation: self.operation.to_string(),
            duration: self.started.elapsed(),
            success: false,
        };
        record_outcome(self.metrics, self.logger, &outcome);
        self.logger.warn(
            "operation cancelled",
            &fields! { "duration_ms" => outcome.duration.as_millis() as u64 },
        );
    }
}

fn record_outcome(metrics: &dyn MetricsSink, logger: &dyn Logger, outcome: &CallOutcome) {
    if catch_unwind(AssertUnwindSafe(|| metrics.record(outcome))).is_err() {
        logger.warn("metrics sink panicked", &Fields::new());
    }
}

/// Runs `work` as one logical operation, reporting exactly one
/// [`CallOutcome`] and returning the work's result untouched.
///
/// If the returned future is dropped before `work` completes, a failed
/// outcome is recorded on drop.
pub async fn instrumented<T, F, Fut>(
    operation: &str,
    metrics: &dyn MetricsSink,
    logger: &dyn Logger,
    work: F,
) -> Result<T, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    logger.debug("operation started", &Fields::new());
    let mut guard = CancelGuard {
        operation,
        metrics,
        logger,
        started: Instant::now(),
        armed: true,
    };

    let result = work().await;
    guard.armed = false;

    let outcome = CallOutcome {
        operation: operation.to_string(),
        duration: guard.started.elapsed(),
        success: result.is_ok(),
    };
    record_outcome(metrics, logger, &outcome);

    let duration_ms = outcome.duration.as_millis() as u64;
    match &result {
        Ok(_) => logger.info("operation succeeded", &fields! { "duration_ms" => duration_ms }),
        Err(err) => logger.warn(
            "operation failed",
            &fields! {
                "duration_ms" => duration_ms,
                "kind" => err.kind().as_str(),
                "http_status" => err.http_status(),
                "detail" => err.diagnostic(),
            },
        ),
    }

    result
}
