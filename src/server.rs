//! Line-delimited JSON tool dispatcher.
//!
//! Each input line is `{"id": .., "tool": "..", "arguments": {..}}`. Each
//! output line is `{"id": .., "ok": true, "text": ".."}` on success or
//! `{"id": .., "ok": false, "kind": "..", "http_status": .., "text": ".."}`
//! on failure. Requests run concurrently; replies are written in completion
//! order.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::client::{ApiError, InMemoryMetrics};
use crate::obsidian::ObsidianClient;
use crate::tools::{
    describe_error, ActiveNote, AppendNote, ClientStats, CreateNote, DeleteNote, GetAlerts,
    GetForecast, ListCommands, ListFiles, PatchNote, PeriodicNote, ReadNote, RunCommand,
    SearchVault, Tool, VaultStatus,
};
use crate::weather::WeatherClient;

pub const TOOL_NAMES: &[&str] = &[
    "get_alerts",
    "get_forecast",
    "vault_status",
    "list_files",
    "read_note",
    "create_note",
    "append_note",
    "patch_note",
    "delete_note",
    "search_vault",
    "active_note",
    "periodic_note",
    "list_commands",
    "run_command",
    "client_stats",
];

#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Value,
    tool: String,
    #[serde(default)]
    arguments: Value,
}

/// Routes tool calls to their handlers.
pub struct ToolServer {
    vault: Arc<ObsidianClient>,
    weather: Arc<WeatherClient>,
    stats: Arc<InMemoryMetrics>,
}

impl ToolServer {
    pub fn new(
        vault: Arc<ObsidianClient>,
        weather: Arc<WeatherClient>,
        stats: Arc<InMemoryMetrics>,
    ) -> Self {
        Self {
            vault,
            weather,
            stats,
        }
    }

    /// Runs one tool by name.
    pub async fn call(&self, tool: &str, arguments: Value) -> Result<String, ApiError> {
        let vault = &self.vault;
        match tool {
            "get_alerts" => invoke(&GetAlerts::new(self.weather.clone()), arguments).await,
            "get_forecast" => invoke(&GetForecast::new(self.weather.clone()), arguments).await,
            "vault_status" => invoke(&VaultStatus::new(vault.clone()), arguments).await,
            "list_files" => invoke(&ListFiles::new(vault.clone()), arguments).await,
            "read_note" => invoke(&ReadNote::new(vault.clone()), arguments).await,
            "create_note" => invoke(&CreateNote::new(vault.clone()), arguments).await,
            "append_note" => invoke(&AppendNote::new(vault.clone()), arguments).await,
            "patch_note" => invoke(&PatchNote::new(vault.clone()), arguments).await,
            "delete_note" => invoke(&DeleteNote::new(vault.clone()), arguments).await,
            "search_vault" => invoke(&SearchVault::new(vault.clone()), arguments).await,
            "active_note" => invoke(&ActiveNote::new(vault.clone()), arguments).await,
            "periodic_note" => invoke(&PeriodicNote::new(vault.clone()), arguments).await,
            "list_commands" => invoke(&ListCommands::new(vault.clone()), arguments).await,
            "run_command" => invoke(&RunCommand::new(vault.clone()), arguments).await,
            "client_stats" => invoke(&ClientStats::new(self.stats.clone()), arguments).await,
            other => Err(ApiError::validation(format!(
                "Unknown tool {other:?}. Available tools: {}",
                TOOL_NAMES.join(", ")
            ))),
        }
    }

    /// Handles one request line and returns the reply line (without newline).
    pub async fn handle_line(&self, line: &str) -> String {
        let request: ToolRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                let err = ApiError::validation(format!("Malformed request: {e}"));
                return reply(Value::Null, Err(err));
            }
        };

        log::debug!("Dispatching tool {} (id {})", request.tool, request.id);
        let result = self.call(&request.tool, request.arguments).await;
        if let Err(err) = &result {
            log::warn!("Tool {} failed: {}", request.tool, err.diagnostic());
        }
        reply(request.id, result)
    }

    /// Reads requests until EOF, answering each on its own task.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));
        let mut lines = reader.lines();
        let mut tasks = JoinSet::new();

        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read request line")?
        {
            if line.trim().is_empty() {
                continue;
            }
            let server = Arc::clone(&self);
            let writer = Arc::clone(&writer);
            tasks.spawn(async move {
                let mut reply = server.handle_line(&line).await;
                reply.push('\n');
                let mut out = writer.lock().await;
                if let Err(e) = out.write_all(reply.as_bytes()).await {
                    log::error!("Failed to write reply: {}", e);
                    return;
                }
                if let Err(e) = out.flush().await {
                    log::error!("Failed to flush reply: {}", e);
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                log::error!("Request task failed: {}", e);
            }
        }
        Ok(())
    }
}

async fn invoke<T: Tool>(tool: &T, arguments: Value) -> Result<String, ApiError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    let input: T::Input = serde_json::from_value(arguments).map_err(|e| {
        ApiError::validation(format!("Invalid arguments for {}: {}", tool.name(), e))
    })?;
    tool.run(input).await
}

fn reply(id: Value, result: Result<String, ApiError>) -> String {
    match result {
        Ok(text) => json!({ "id": id, "ok": true, "text": text }),
        Err(err) => json!({
            "id": id,
            "ok": false,
            "kind": err.kind(),
            "http_status": err.http_status(),
            "text": describe_error(&err),
        }),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{scripted_core, RecordingMetrics, ScriptedTransport};
    use tokio::io::{AsyncReadExt, BufReader};
    use url::Url;

    struct Harness {
        server: Arc<ToolServer>,
        vault: Arc<ScriptedTransport>,
        weather: Arc<ScriptedTransport>,
    }

    fn harness(vault: ScriptedTransport, weather: ScriptedTransport) -> Harness {
        let vault = Arc::new(vault);
        let weather = Arc::new(weather);
        let metrics = Arc::new(RecordingMetrics::default());
        let obsidian = ObsidianClient::new(
            scripted_core(vault.clone(), metrics.clone()),
            Url::parse("http://127.0.0.1:27123").unwrap(),
            "key",
        );
        let nws = WeatherClient::new(
            scripted_core(weather.clone(), metrics),
            Url::parse("https://api.weather.gov").unwrap(),
            "agent",
        );
        let server = ToolServer::new(
            Arc::new(obsidian),
            Arc::new(nws),
            Arc::new(InMemoryMetrics::new()),
        );
        Harness {
            server: Arc::new(server),
            vault,
            weather,
        }
    }

    fn parse(line: &str) -> Value {
        serde_json::from_str(line).unwrap()
    }

    #[tokio::test]
    async fn test_successful_call_reply() {
        let h = harness(
            ScriptedTransport::new(),
            ScriptedTransport::new().then_ok(200, r#"{"features":[]}"#),
        );
        let reply = parse(
            &h.server
                .handle_line(r#"{"id":7,"tool":"get_alerts","arguments":{"state":"tx"}}"#)
                .await,
        );

        assert_eq!(reply["id"], 7);
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["text"], "No active alerts for TX.");
        assert_eq!(h.weather.calls(), 1);
        assert_eq!(h.vault.calls(), 0);
    }

    #[tokio::test]
    async fn test_error_reply_carries_kind_and_status() {
        let h = harness(ScriptedTransport::new().then_status(403), ScriptedTransport::new());
        let reply = parse(
            &h.server
                .handle_line(r#"{"id":"a","tool":"read_note","arguments":{"path":"x.md"}}"#)
                .await,
        );

        assert_eq!(reply["ok"], false);
        assert_eq!(reply["kind"], "api_request_failed");
        assert_eq!(reply["http_status"], 403);
        assert!(reply["text"].as_str().unwrap().contains("API key"));
        assert_eq!(h.vault.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments_are_validation_errors() {
        let h = harness(ScriptedTransport::new(), ScriptedTransport::new());

        let reply = parse(&h.server.handle_line(r#"{"id":1,"tool":"launch_rockets"}"#).await);
        assert_eq!(reply["kind"], "validation");
        assert!(reply["text"].as_str().unwrap().contains("get_alerts"));

        let reply = parse(
            &h.server
                .handle_line(r#"{"id":2,"tool":"get_forecast","arguments":{"latitude":"north"}}"#)
                .await,
        );
        assert_eq!(reply["kind"], "validation");

        let reply = parse(&h.server.handle_line("not json").await);
        assert_eq!(reply["kind"], "validation");
        assert!(reply["id"].is_null());

        assert_eq!(h.vault.calls() + h.weather.calls(), 0);
    }

    #[tokio::test]
    async fn test_tools_without_arguments_accept_missing_field() {
        let h = harness(ScriptedTransport::new(), ScriptedTransport::new());
        let reply = parse(&h.server.handle_line(r#"{"id":1,"tool":"client_stats"}"#).await);
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["text"], "No API calls recorded yet.");
    }

    #[tokio::test]
    async fn test_serve_answers_every_line() {
        let h = harness(
            ScriptedTransport::new().then_ok(200, r#"{"files":["a.md"]}"#),
            ScriptedTransport::new(),
        );
        let input = concat!(
            r#"{"id":1,"tool":"list_files"}"#,
            "\n\n",
            r#"{"id":2,"tool":"nope"}"#,
            "\n",
        );
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);

        h.server
            .clone()
            .serve(BufReader::new(input.as_bytes()), server_end)
            .await
            .unwrap();

        let mut output = String::new();
        let mut client_end = client_end;
        client_end.read_to_string(&mut output).await.unwrap();

        let mut replies: Vec<Value> = output.lines().map(parse).collect();
        replies.sort_by_key(|r| r["id"].as_i64());
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["text"], "a.md");
        assert_eq!(replies[1]["ok"], false);
    }
}
