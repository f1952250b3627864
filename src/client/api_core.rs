//! Composition of transport, retry and instrumentation shared by the facades.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

use super::error::ApiError;
use super::instrument::{instrumented, Logger, MetricsSink};
use super::request::{RawResponse, RequestSpec};
use super::retry::RetryPolicy;
use super::transport::Transport;
use super::fields;

/// Everything a facade needs to run one logical operation.
///
/// Configuration is fixed at construction; nothing here is mutated per call,
/// so one `ApiCore` serves any number of concurrent operations.
#[derive(Clone)]
pub struct ApiCore {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    timeout: Duration,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn MetricsSink>,
}

/// Handle passed to the body of an [`ApiCore::operation`].
///
/// Requests sent through it are retried but not instrumented on their own;
/// they belong to the enclosing operation.
#[derive(Clone)]
pub struct CallScope {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    logger: Arc<dyn Logger>,
}

impl CallScope {
    /// Sends `spec` through the retry loop and returns the final 2xx response.
    pub async fn send(&self, spec: RequestSpec) -> Result<RawResponse, ApiError> {
        self.logger.debug(
            "sending request",
            &fields! { "method" => spec.method().as_str(), "url" => spec.url().as_str() },
        );
        self.policy
            .run(self.logger.as_ref(), || self.transport.execute(&spec))
            .await
    }

    pub async fn send_json<T: DeserializeOwned>(&self, spec: RequestSpec) -> Result<T, ApiError> {
        self.send(spec).await?.json()
    }
}

impl ApiCore {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        timeout: Duration,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            transport,
            policy,
            timeout,
            logger,
            metrics,
        }
    }

    /// Starts a request carrying the configured per-attempt timeout.
    pub fn request(&self, method: Method, url: Url) -> RequestSpec {
        RequestSpec::new(method, url, self.timeout)
    }

    /// Runs `body` as the logical operation `operation`.
    ///
    /// Everything inside `body` counts toward the single recorded outcome:
    /// input validation, request building, every request sent through the
    /// scope, and decoding. Decoding is never retried.
    pub async fn operation<T, F, Fut>(&self, operation: &str, body: F) -> Result<T, ApiError>
    where
        F: FnOnce(CallScope) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let logger = self.logger.child(fields! {
            "operation" => operation,
            "call_id" => uuid::Uuid::new_v4().to_string(),
        });
        let scope = CallScope {
            transport: Arc::clone(&self.transport),
            policy: self.policy,
            logger: Arc::clone(&logger),
        };

        instrumented(operation, self.metrics.as_ref(), logger.as_ref(), || body(scope)).await
    }
}
