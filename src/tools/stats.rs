use std::sync::Arc;

use super::{NoArgs, Tool};
use crate::client::{ApiError, InMemoryMetrics};

/// Per-operation call counts and latency since startup.
pub struct ClientStats {
    metrics: Arc<InMemoryMetrics>,
}

impl ClientStats {
    pub fn new(metrics: Arc<InMemoryMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait::async_trait]
impl Tool for ClientStats {
    type Input = NoArgs;

    fn name(&self) -> &'static str {
        "client_stats"
    }

    async fn run(&self, _input: NoArgs) -> Result<String, ApiError> {
        let snapshot = self.metrics.snapshot();
        if snapshot.is_empty() {
            return Ok("No API calls recorded yet.".to_string());
        }

        let lines: Vec<String> = snapshot
            .iter()
            .map(|(operation, stats)| {
                format!(
                    "{}: {} call(s), {} failed, mean {} ms, max {} ms",
                    operation,
                    stats.calls,
                    stats.failures,
                    stats.mean_duration().as_millis(),
                    stats.max_duration.as_millis(),
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CallOutcome, MetricsSink};
    use std::time::Duration;

    #[tokio::test]
    async fn test_reports_recorded_operations() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let tool = ClientStats::new(metrics.clone());
        assert_eq!(tool.run(NoArgs {}).await.unwrap(), "No API calls recorded yet.");

        metrics.record(&CallOutcome {
            operation: "weather.alerts".to_string(),
            duration: Duration::from_millis(120),
            success: false,
        });
        assert_eq!(
            tool.run(NoArgs {}).await.unwrap(),
            "weather.alerts: 1 call(s), 1 failed, mean 120 ms, max 120 ms"
        );
    }
}
