pub mod commands;
pub mod note_writer;
pub mod notes_reader;
pub mod stats;
pub mod weather;

pub use commands::{ListCommands, RunCommand};
pub use note_writer::{AppendNote, CreateNote, DeleteNote, PatchNote};
pub use notes_reader::{ActiveNote, ListFiles, PeriodicNote, ReadNote, SearchVault, VaultStatus};
pub use stats::ClientStats;
pub use weather::{GetAlerts, GetForecast};

use serde::de::DeserializeOwned;

use crate::client::{ApiError, ErrorKind};

/// Tool trait for operations exposed to the dispatcher.
///
/// Not object-safe (associated types). The dispatcher calls tools by
/// concrete type, not `dyn Tool`.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    type Input: DeserializeOwned + Send;

    fn name(&self) -> &'static str;
    async fn run(&self, input: Self::Input) -> Result<String, ApiError>;
}

/// Arguments for tools that take none.
#[derive(Debug, Default, serde::Deserialize)]
pub struct NoArgs {}

/// User-facing text for a failed tool call. Reads only `kind`, `message`
/// and `http_status`.
pub fn describe_error(err: &ApiError) -> String {
    match err.kind() {
        ErrorKind::Validation => format!("Invalid input: {}", err.message()),
        ErrorKind::Business => err.message().to_string(),
        ErrorKind::ApiNotFound => "Not found: the requested resource does not exist.".to_string(),
        ErrorKind::ApiTimeout => {
            "The request timed out. The service may be slow or unavailable; try again shortly."
                .to_string()
        }
        ErrorKind::ApiConnectionError => format!(
            "{}. Check that the service is running and reachable.",
            err.message()
        ),
        ErrorKind::ApiRequestFailed => match err.http_status() {
            Some(401) | Some(403) => {
                "The service rejected the credentials. Check the configured API key.".to_string()
            }
            Some(429) => "The service is rate limiting requests; try again later.".to_string(),
            Some(status) if status >= 500 => {
                format!("The service failed to handle the request (HTTP {status}).")
            }
            _ => err.message().to_string(),
        },
        ErrorKind::SystemError => format!("Internal error: {}", err.message()),
    }
}
