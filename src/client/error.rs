//! Closed error taxonomy shared by the client core and the tool handlers.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::Fields;

/// Maximum number of response-body characters copied into error metadata.
const BODY_SNIPPET_CHARS: usize = 300;

/// Every failure shape a caller needs to switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local precondition failed before any network call.
    Validation,
    /// Non-2xx response other than 404.
    ApiRequestFailed,
    /// HTTP 404.
    ApiNotFound,
    /// No response was received (refused, DNS, reset).
    ApiConnectionError,
    /// The per-attempt timeout elapsed before a response arrived.
    ApiTimeout,
    /// Failure inside the client itself, e.g. an undecodable body.
    SystemError,
    /// Domain rule enforced by a handler. Never produced by the client.
    Business,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::ApiRequestFailed => "api_request_failed",
            ErrorKind::ApiNotFound => "api_not_found",
            ErrorKind::ApiConnectionError => "api_connection_error",
            ErrorKind::ApiTimeout => "api_timeout",
            ErrorKind::SystemError => "system_error",
            ErrorKind::Business => "business",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical failure value of the client core.
///
/// `message` is safe to show to an end user. `cause` is for logs only and is
/// reachable through [`std::error::Error::source`]; handlers never read it.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    http_status: Option<u16>,
    #[source]
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
    metadata: Fields,
}

impl ApiError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: None,
            cause: None,
            metadata: Fields::new(),
        }
    }

    /// Malformed caller input, raised before any request is built.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// HTTP 404. The body snippet, if any, goes to metadata.
    pub fn not_found(body: &str) -> Self {
        let mut err = Self::new(ErrorKind::ApiNotFound, "The requested resource was not found");
        err.http_status = Some(404);
        err.with_body_snippet(body)
    }

    /// Any other non-2xx response.
    pub fn request_failed(status: u16, body: &str) -> Self {
        let reason = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown status");
        let mut err = Self::new(
            ErrorKind::ApiRequestFailed,
            format!("Request failed with HTTP {status} ({reason})"),
        );
        err.http_status = Some(status);
        err.with_body_snippet(body)
    }

    /// Builds the error for a non-2xx status, routing 404 to `ApiNotFound`.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 404 {
            Self::not_found(body)
        } else {
            Self::request_failed(status, body)
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ApiConnectionError, message)
    }

    pub fn timeout(timeout: Duration) -> Self {
        let millis = timeout.as_millis() as u64;
        Self::new(
            ErrorKind::ApiTimeout,
            format!("Request timed out after {millis} ms"),
        )
        .with_metadata("timeout_ms", millis)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SystemError, message)
    }

    pub fn business(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Business, message)
    }

    /// Attaches the underlying error. Ignored for `Validation`, which never
    /// wraps a network cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        if self.kind != ErrorKind::Validation {
            self.cause = Some(Box::new(cause));
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn with_body_snippet(self, body: &str) -> Self {
        if body.is_empty() {
            return self;
        }
        let snippet: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
        self.with_metadata("body", snippet)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn metadata(&self) -> &Fields {
        &self.metadata
    }

    /// Whether another attempt of the same operation may succeed.
    ///
    /// Client errors (4xx) are final except 429. Timeouts, connection
    /// failures, 5xx and unclassified system failures are retried.
    /// `Validation` and `Business` never reach the network and are final.
    pub fn is_retry_eligible(&self) -> bool {
        match self.kind {
            ErrorKind::Validation | ErrorKind::Business => false,
            ErrorKind::ApiRequestFailed | ErrorKind::ApiNotFound => match self.http_status {
                Some(status) if (400..500).contains(&status) => status == 429,
                _ => true,
            },
            ErrorKind::ApiConnectionError | ErrorKind::ApiTimeout | ErrorKind::SystemError => true,
        }
    }

    /// Log-oriented rendering: kind, status, message, metadata and the full
    /// cause chain.
    pub fn diagnostic(&self) -> String {
        let mut out = format!("[{}]", self.kind);
        if let Some(status) = self.http_status {
            out.push_str(&format!(" status={status}"));
        }
        out.push(' ');
        out.push_str(&self.message);
        for (key, value) in &self.metadata {
            out.push_str(&format!(" {key}={value}"));
        }
        let mut source = StdError::source(self);
        while let Some(err) = source {
            out.push_str(&format!(" caused by: {err}"));
            source = err.source();
        }
        out
    }
}
