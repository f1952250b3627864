//! Resilient outbound API client core.
//!
//! Layers, innermost first:
//! - [`transport`] performs exactly one HTTP attempt under a timeout and
//!   converts every transport outcome into an [`ApiError`].
//! - [`retry`] wraps attempts in a bounded, linearly backed-off loop.
//! - [`instrument`] times a whole logical operation and reports it to a
//!   [`MetricsSink`].
//! - [`api_core`] composes the three for the vault and weather facades.

use std::collections::BTreeMap;

/// Structured context attached to log lines and error metadata.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Builds a [`Fields`] map from `"key" => value` pairs.
macro_rules! fields {
    () => { $crate::client::Fields::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::client::Fields::new();
        $( map.insert(($key).to_string(), ::serde_json::Value::from($value)); )+
        map
    }};
}
pub(crate) use fields;

pub mod api_core;
pub mod error;
pub mod instrument;
pub mod request;
pub mod retry;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use api_core::{ApiCore, CallScope};
pub use error::{ApiError, ErrorKind};
pub use instrument::{
    instrumented, CallOutcome, FanoutMetrics, InMemoryMetrics, LogLogger, LogMetrics, Logger,
    MetricsSink, OperationStats,
};
pub use request::{RawResponse, RequestBody, RequestSpec};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Transport};
