use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{NoArgs, Tool};
use crate::client::ApiError;
use crate::obsidian::{NoteJson, ObsidianClient, Period, SearchHit};

/// Default characters of context around each search match.
const DEFAULT_CONTEXT_LENGTH: u32 = 100;

/// Renders a note with a short metadata header above its content.
pub fn format_note(note: &NoteJson) -> String {
    let mut text = format!("Path: {}\n", note.path);

    if let Some(title) = note.frontmatter.get("title").and_then(|v| v.as_str()) {
        text.push_str(&format!("Title: {}\n", title));
    }
    if !note.tags.is_empty() {
        text.push_str(&format!("Tags: {}\n", note.tags.join(", ")));
    }
    if let Some(modified) = note
        .stat
        .as_ref()
        .and_then(|s| DateTime::<Utc>::from_timestamp_millis(s.mtime))
    {
        text.push_str(&format!("Modified: {}\n", modified.format("%Y-%m-%d %H:%M UTC")));
    }

    text.push('\n');
    text.push_str(&note.content);
    text
}

/// Reports whether the vault API is reachable and authenticated.
pub struct VaultStatus {
    vault: Arc<ObsidianClient>,
}

impl VaultStatus {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for VaultStatus {
    type Input = NoArgs;

    fn name(&self) -> &'static str {
        "vault_status"
    }

    async fn run(&self, _input: NoArgs) -> Result<String, ApiError> {
        let status = self.vault.server_status().await?;
        Ok(format!(
            "Service: {}\nStatus: {}\nAuthenticated: {}\nObsidian: {}\nPlugin: {}",
            status.service.as_deref().unwrap_or("Obsidian Local REST API"),
            status.status,
            if status.authenticated { "yes" } else { "no" },
            status.versions.obsidian.as_deref().unwrap_or("unknown"),
            status.versions.plugin.as_deref().unwrap_or("unknown"),
        ))
    }
}

/// Lists files in the vault root or a directory.
pub struct ListFiles {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListFilesInput {
    #[serde(default)]
    pub directory: Option<String>,
}

impl ListFiles {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for ListFiles {
    type Input = ListFilesInput;

    fn name(&self) -> &'static str {
        "list_files"
    }

    async fn run(&self, input: ListFilesInput) -> Result<String, ApiError> {
        let files = self.vault.list_files(input.directory.as_deref()).await?;
        let location = input.directory.as_deref().unwrap_or("vault root");
        log::info!("ListFiles: {} entries in {}", files.len(), location);

        if files.is_empty() {
            return Ok(format!("No files in {}.", location));
        }
        Ok(files.join("\n"))
    }
}

/// Reads one note.
pub struct ReadNote {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Deserialize)]
pub struct ReadNoteInput {
    pub path: String,
}

impl ReadNote {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for ReadNote {
    type Input = ReadNoteInput;

    fn name(&self) -> &'static str {
        "read_note"
    }

    async fn run(&self, input: ReadNoteInput) -> Result<String, ApiError> {
        let note = self.vault.get_note(&input.path).await?;
        log::info!("ReadNote: {} ({} chars)", note.path, note.content.len());
        Ok(format_note(&note))
    }
}

/// Full-text search across the vault.
pub struct SearchVault {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Deserialize)]
pub struct SearchInput {
    pub query: String,
    #[serde(default)]
    pub context_length: Option<u32>,
}

impl SearchVault {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }

    fn format_hit(hit: &SearchHit) -> String {
        let mut text = format!("{} ({} match(es))", hit.filename, hit.matches.len());
        for m in &hit.matches {
            let context = m.context.split_whitespace().collect::<Vec<_>>().join(" ");
            text.push_str(&format!("\n  ... {} ...", context));
        }
        text
    }
}

#[async_trait::async_trait]
impl Tool for SearchVault {
    type Input = SearchInput;

    fn name(&self) -> &'static str {
        "search_vault"
    }

    async fn run(&self, input: SearchInput) -> Result<String, ApiError> {
        let context_length = input.context_length.unwrap_or(DEFAULT_CONTEXT_LENGTH);
        let hits = self.vault.search_simple(&input.query, context_length).await?;
        log::info!("SearchVault: {} hit(s) for {:?}", hits.len(), input.query);

        if hits.is_empty() {
            return Ok(format!("No notes match {:?}.", input.query.trim()));
        }
        Ok(hits
            .iter()
            .map(Self::format_hit)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Reads the note currently open in Obsidian.
pub struct ActiveNote {
    vault: Arc<ObsidianClient>,
}

impl ActiveNote {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for ActiveNote {
    type Input = NoArgs;

    fn name(&self) -> &'static str {
        "active_note"
    }

    async fn run(&self, _input: NoArgs) -> Result<String, ApiError> {
        let note = self.vault.get_active_note().await?;
        Ok(format_note(&note))
    }
}

/// Reads the current daily/weekly/... note.
pub struct PeriodicNote {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Deserialize)]
pub struct PeriodicInput {
    pub period: Period,
}

impl PeriodicNote {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for PeriodicNote {
    type Input = PeriodicInput;

    fn name(&self) -> &'static str {
        "periodic_note"
    }

    async fn run(&self, input: PeriodicInput) -> Result<String, ApiError> {
        let note = self.vault.get_periodic_note(input.period).await?;
        log::info!("PeriodicNote: {} note is {}", input.period.as_str(), note.path);
        Ok(format_note(&note))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{scripted_core, RecordingMetrics, ScriptedTransport};
    use crate::client::ErrorKind;
    use crate::obsidian::NoteStat;
    use url::Url;

    fn vault(transport: Arc<ScriptedTransport>) -> Arc<ObsidianClient> {
        let core = scripted_core(transport, Arc::new(RecordingMetrics::default()));
        Arc::new(ObsidianClient::new(
            core,
            Url::parse("http://127.0.0.1:27123").unwrap(),
            "key",
        ))
    }

    #[test]
    fn test_format_note() {
        let mut frontmatter = serde_json::Map::new();
        frontmatter.insert("title".to_string(), serde_json::json!("Weekly Plan"));
        let note = NoteJson {
            path: "plans/week.md".to_string(),
            content: "- [ ] write tests".to_string(),
            tags: vec!["planning".to_string(), "work".to_string()],
            frontmatter,
            stat: Some(NoteStat {
                ctime: 0,
                mtime: 1_705_314_600_000,
                size: 17,
            }),
        };

        let text = format_note(&note);
        assert!(text.starts_with("Path: plans/week.md\nTitle: Weekly Plan\n"));
        assert!(text.contains("Tags: planning, work"));
        assert!(text.contains("Modified: 2024-01-15 10:30 UTC"));
        assert!(text.ends_with("\n\n- [ ] write tests"));
    }

    #[tokio::test]
    async fn test_read_note_formats_content() {
        let transport = Arc::new(ScriptedTransport::new().then_ok(
            200,
            r#"{"path":"inbox.md","content":"hello","tags":[],"frontmatter":{}}"#,
        ));
        let text = ReadNote::new(vault(transport.clone()))
            .run(ReadNoteInput {
                path: "inbox.md".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(text, "Path: inbox.md\n\nhello");
        assert_eq!(transport.requests()[0].url().path(), "/vault/inbox.md");
    }

    #[tokio::test]
    async fn test_search_formats_hits() {
        let transport = Arc::new(ScriptedTransport::new().then_ok(
            200,
            r#"[{"filename":"a.md","score":-1.0,"matches":[{"match":{"start":0,"end":4},"context":"rust\nis   fun"}]}]"#,
        ));
        let text = SearchVault::new(vault(transport.clone()))
            .run(SearchInput {
                query: "rust".to_string(),
                context_length: None,
            })
            .await
            .unwrap();

        assert_eq!(text, "a.md (1 match(es))\n  ... rust is fun ...");
        let query = transport.requests()[0].url().query().unwrap().to_string();
        assert!(query.contains("contextLength=100"));
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let transport = Arc::new(ScriptedTransport::new().then_ok(200, r#"{"files":[]}"#));
        let text = ListFiles::new(vault(transport))
            .run(ListFilesInput {
                directory: Some("Archive".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(text, "No files in Archive.");
    }

    #[tokio::test]
    async fn test_missing_note_propagates_not_found() {
        let transport = Arc::new(ScriptedTransport::new().then_status(404));
        let err = ReadNote::new(vault(transport.clone()))
            .run(ReadNoteInput {
                path: "gone.md".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ApiNotFound);
        assert_eq!(transport.calls(), 1);
    }
}
