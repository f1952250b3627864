//! Single-attempt HTTP execution.
//!
//! This is the only place where `reqwest` errors are turned into
//! [`ApiError`]s. It performs no retries and emits no metrics.

use std::error::Error as StdError;

use async_trait::async_trait;

use super::error::ApiError;
use super::request::{RawResponse, RequestBody, RequestSpec};

/// Body text used when a non-2xx response body cannot be read.
const BODY_UNAVAILABLE: &str = "<body unavailable>";

/// Low-level error-chain fragments that identify a failure where no response
/// arrived. reqwest prefixes every send failure with "error sending request",
/// so only the inner causes are matched.
const NETWORK_SIGNATURES: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection aborted",
    "connection closed",
    "broken pipe",
    "dns error",
    "failed to lookup address",
    "no such host",
    "name or service not known",
    "network is unreachable",
    "host is unreachable",
];

/// Executes exactly one attempt of a request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse, ApiError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a transport, optionally accepting self-signed certificates.
    pub fn with_tls_verification(verify_tls: bool) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| ApiError::system("Failed to initialise the HTTP client").with_cause(e))?;
        Ok(Self::new(client))
    }

    async fn attempt(&self, spec: &RequestSpec) -> Result<RawResponse, ApiError> {
        let mut request = self
            .client
            .request(spec.method().clone(), spec.url().clone())
            .headers(spec.headers().clone());

        request = match spec.body() {
            Some(RequestBody::Text(text)) => request.body(text.clone()),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(e, spec))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    log::debug!("Failed to read error body from {}: {}", spec.url(), e);
                    BODY_UNAVAILABLE.to_string()
                }
            };
            return Err(ApiError::from_status(status.as_u16(), &body)
                .with_metadata("method", spec.method().as_str())
                .with_metadata("url", spec.url().as_str()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_transport_error(e, spec))?;

        Ok(RawResponse::new(status.as_u16(), body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    /// Runs one attempt under `spec.timeout()`.
    ///
    /// The timer lives inside the `timeout` future, so it is dropped on every
    /// exit path: completion, error, elapsed deadline, or the caller dropping
    /// this future.
    async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse, ApiError> {
        match tokio::time::timeout(spec.timeout(), self.attempt(spec)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ApiError::timeout(spec.timeout())
                .with_metadata("method", spec.method().as_str())
                .with_metadata("url", spec.url().as_str())),
        }
    }
}

/// Maps a `reqwest` failure onto the taxonomy.
fn classify_transport_error(err: reqwest::Error, spec: &RequestSpec) -> ApiError {
    let classified = if err.is_timeout() {
        ApiError::timeout(spec.timeout())
    } else if err.is_connect() || is_network_failure(&error_chain_text(&err)) {
        let host = spec.url().host_str().unwrap_or("the remote service");
        ApiError::connection(format!("Could not connect to {host}"))
    } else {
        ApiError::system("Unexpected failure while calling the remote service")
    };

    classified
        .with_metadata("method", spec.method().as_str())
        .with_metadata("url", spec.url().as_str())
        .with_cause(err)
}

/// Lower-cased concatenation of an error and all of its sources.
fn error_chain_text(err: &(dyn StdError + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text.to_lowercase()
}

fn is_network_failure(chain: &str) -> bool {
    NETWORK_SIGNATURES.iter().any(|sig| chain.contains(sig))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ErrorKind;
    use reqwest::Method;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::with_tls_verification(true).unwrap()
    }

    /// Accepts one connection, reads the request, writes `reply` verbatim
    /// and closes the socket.
    async fn raw_server(reply: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.ok();
        });
        Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap()
    }

    fn get(server: &MockServer, route: &str, timeout: Duration) -> RequestSpec {
        let url = Url::parse(&format!("{}{}", server.uri(), route)).unwrap();
        RequestSpec::new(Method::GET, url, timeout)
    }

    #[tokio::test]
    async fn test_success_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let response = transport()
            .execute(&get(&server, "/ok", Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(response, RawResponse::new(200, "hello"));
    }

    #[tokio::test]
    async fn test_headers_and_text_body_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/vault/note.md"))
            .and(header("authorization", "Bearer key"))
            .and(header("content-type", "text/markdown"))
            .and(body_string("# Note"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/vault/note.md", server.uri())).unwrap();
        let spec = RequestSpec::new(Method::PUT, url, Duration::from_secs(5))
            .header("Authorization", "Bearer key")
            .unwrap()
            .text_body("text/markdown", "# Note");

        let response = transport().execute(&spec).await.unwrap();
        assert_eq!(response.status, 204);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("File not found"))
            .mount(&server)
            .await;

        let err = transport()
            .execute(&get(&server, "/missing", Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ApiNotFound);
        assert_eq!(err.http_status(), Some(404));
        assert_eq!(err.metadata()["body"], "File not found");
        assert!(err.metadata()["url"].as_str().unwrap().ends_with("/missing"));
    }

    #[tokio::test]
    async fn test_unreadable_error_body_degrades_to_placeholder() {
        let url = raw_server(
            b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 500\r\n\r\npartial",
        )
        .await;
        let spec = RequestSpec::new(Method::GET, url, Duration::from_secs(5));

        let err = transport().execute(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ApiRequestFailed);
        assert_eq!(err.http_status(), Some(502));
        assert_eq!(err.metadata()["body"], BODY_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_non_http_reply_is_system_error() {
        let url = raw_server(b"THIS IS NOT HTTP AT ALL\r\n\r\n").await;
        let spec = RequestSpec::new(Method::GET, url, Duration::from_secs(5));

        let err = transport().execute(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SystemError);
        assert!(err.http_status().is_none());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_non_2xx_statuses_are_request_failed() {
        for status in [400u16, 401, 403, 429, 500, 503] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;

            let err = transport()
                .execute(&get(&server, "/any", Duration::from_secs(5)))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ApiRequestFailed, "status {status}");
            assert_eq!(err.http_status(), Some(status));
        }
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string("should never be read")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = transport()
            .execute(&get(&server, "/slow", Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ApiTimeout);
        assert_eq!(err.metadata()["timeout_ms"], 50);
        assert!(err.http_status().is_none());
        assert!(!err.metadata().contains_key("body"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_error() {
        // Bind then drop a listener to get a local port with nothing behind it.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let spec = RequestSpec::new(Method::GET, url, Duration::from_secs(5));

        let err = transport().execute(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ApiConnectionError);
        assert!(err.http_status().is_none());
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.message(), "Could not connect to 127.0.0.1");
    }

    #[test]
    fn test_network_signatures() {
        assert!(is_network_failure(
            "error sending request for url: tcp connect error: connection refused (os error 111)"
        ));
        assert!(is_network_failure("dns error: failed to lookup address information"));
        assert!(!is_network_failure(
            "error sending request for url (http://127.0.0.1:8080/): invalid http version parsed"
        ));
    }
}
