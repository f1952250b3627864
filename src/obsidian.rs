//! Client for the Obsidian Local REST API plugin.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::{
    ApiCore, ApiError, CallScope, HttpTransport, Logger, MetricsSink, RawResponse, RequestSpec,
};
use crate::config::Config;

const NOTE_JSON: &str = "application/vnd.olrapi.note+json";
const MARKDOWN: &str = "text/markdown";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerStatus {
    pub status: String,
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub versions: Versions,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Versions {
    pub obsidian: Option<String>,
    #[serde(rename = "self")]
    pub plugin: Option<String>,
}

/// A note as returned with the `note+json` representation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NoteJson {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub frontmatter: serde_json::Map<String, serde_json::Value>,
    pub stat: Option<NoteStat>,
}

/// File timestamps are milliseconds since the epoch.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NoteStat {
    pub ctime: i64,
    pub mtime: i64,
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchHit {
    pub filename: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SearchMatch {
    #[serde(rename = "match")]
    pub span: MatchSpan,
    pub context: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct VaultCommand {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    files: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CommandList {
    commands: Vec<VaultCommand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    Append,
    Prepend,
    Replace,
}

impl PatchOperation {
    fn as_str(&self) -> &'static str {
        match self {
            PatchOperation::Append => "append",
            PatchOperation::Prepend => "prepend",
            PatchOperation::Replace => "replace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Heading,
    Block,
    Frontmatter,
}

impl TargetType {
    fn as_str(&self) -> &'static str {
        match self {
            TargetType::Heading => "heading",
            TargetType::Block => "block",
            TargetType::Frontmatter => "frontmatter",
        }
    }
}

/// Where and how a PATCH applies inside a note.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchTarget {
    pub operation: PatchOperation,
    pub target_type: TargetType,
    /// Heading path (`Parent::Child`), block id, or frontmatter key.
    pub target: String,
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
            Period::Quarterly => "quarterly",
            Period::Yearly => "yearly",
        }
    }
}

/// Checks a vault-relative path and returns it without a trailing slash.
///
/// Rejects empty paths, absolute paths, backslashes, empty segments and
/// `.`/`..` segments.
pub fn validate_vault_path(path: &str) -> Result<&str, ApiError> {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ApiError::validation("A vault path is required"));
    }
    if trimmed.starts_with('/') || trimmed.contains('\\') {
        return Err(ApiError::validation(format!(
            "Vault paths must be relative and use '/': {path}"
        )));
    }
    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(ApiError::validation(format!("Invalid vault path: {path}")));
    }
    Ok(trimmed)
}

/// Facade over the vault REST API. One method per endpoint.
pub struct ObsidianClient {
    core: ApiCore,
    base_url: Url,
    api_key: String,
}

impl ObsidianClient {
    pub fn new(core: ApiCore, base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            core,
            base_url,
            api_key: api_key.into(),
        }
    }

    pub fn from_config(
        config: &Config,
        logger: Arc<dyn Logger>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ApiError> {
        let base_url = config
            .obsidian_url()
            .map_err(|e| ApiError::validation(e.to_string()))?;
        let transport = HttpTransport::with_tls_verification(config.obsidian.verify_tls)?;
        let core = ApiCore::new(
            Arc::new(transport),
            config.retry_policy(),
            config.request_timeout(),
            logger.child(crate::client::fields! { "service" => "obsidian" }),
            metrics,
        );
        Ok(Self::new(core, base_url, config.obsidian.api_key.clone()))
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str], trailing_slash: bool) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ApiError::validation("The vault base URL cannot carry a path"))?;
            path.pop_if_empty();
            path.extend(segments.iter().flat_map(|s| s.split('/')));
            if trailing_slash {
                path.push("");
            }
        }
        Ok(url)
    }

    fn vault_url(&self, path: &str) -> Result<Url, ApiError> {
        self.url(&["vault", path], false)
    }

    fn request(&self, method: Method, url: Url) -> Result<RequestSpec, ApiError> {
        self.core
            .request(method, url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
    }

    pub async fn server_status(&self) -> Result<ServerStatus, ApiError> {
        self.core
            .operation("vault.status", |scope| async move {
                let spec = self.request(Method::GET, self.url(&[], true)?)?;
                scope.send_json::<ServerStatus>(spec).await
            })
            .await
    }

    /// Lists the vault root, or `dir` when given. Directories end in `/`.
    pub async fn list_files(&self, dir: Option<&str>) -> Result<Vec<String>, ApiError> {
        self.core
            .operation("vault.list_files", |scope| async move {
                let url = match dir {
                    Some(dir) => {
                        let dir = validate_vault_path(dir)?;
                        self.url(&["vault", dir], true)?
                    }
                    None => self.url(&["vault"], true)?,
                };
                let spec = self.request(Method::GET, url)?;
                scope
                    .send_json::<FileList>(spec)
                    .await
                    .map(|list| list.files)
                    .map_err(|e| e.with_metadata("path", dir.unwrap_or("/")))
            })
            .await
    }

    pub async fn get_note(&self, path: &str) -> Result<NoteJson, ApiError> {
        self.core
            .operation("vault.get_note", |scope| async move {
                let path = validate_vault_path(path)?;
                let spec = self
                    .request(Method::GET, self.vault_url(path)?)?
                    .header("Accept", NOTE_JSON)?;
                scope
                    .send_json::<NoteJson>(spec)
                    .await
                    .map_err(|e| e.with_metadata("path", path))
            })
            .await
    }

    /// Creates the note or replaces its whole content.
    pub async fn put_note(&self, path: &str, content: &str) -> Result<(), ApiError> {
        self.write_note("vault.put_note", Method::PUT, path, content)
            .await
    }

    /// Appends to the end of the note, creating it if needed.
    pub async fn append_note(&self, path: &str, content: &str) -> Result<(), ApiError> {
        self.write_note("vault.append_note", Method::POST, path, content)
            .await
    }

    async fn write_note(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        content: &str,
    ) -> Result<(), ApiError> {
        self.core
            .operation(operation, |scope| async move {
                let path = validate_vault_path(path)?;
                let spec = self
                    .request(method, self.vault_url(path)?)?
                    .text_body(MARKDOWN, content);
                send_unit(&scope, spec, "path", path).await
            })
            .await
    }

    /// Inserts or replaces content relative to a heading, block or
    /// frontmatter key.
    pub async fn patch_note(
        &self,
        path: &str,
        target: &PatchTarget,
        content: &str,
    ) -> Result<(), ApiError> {
        self.core
            .operation("vault.patch_note", |scope| async move {
                let path = validate_vault_path(path)?;
                if target.target.trim().is_empty() {
                    return Err(ApiError::validation("A patch target is required"));
                }
                let delimiter = target.delimiter.as_deref().unwrap_or("::");
                let spec = self
                    .request(Method::PATCH, self.vault_url(path)?)?
                    .header("Operation", target.operation.as_str())?
                    .header("Target-Type", target.target_type.as_str())?
                    .header("Target", &urlencoding::encode(&target.target))?
                    .header("Target-Delimiter", delimiter)?
                    .text_body(MARKDOWN, content);
                scope.send(spec).await.map(|_| ()).map_err(|e| {
                    e.with_metadata("path", path)
                        .with_metadata("target", target.target.as_str())
                })
            })
            .await
    }

    pub async fn delete_note(&self, path: &str) -> Result<(), ApiError> {
        self.core
            .operation("vault.delete_note", |scope| async move {
                let path = validate_vault_path(path)?;
                let spec = self.request(Method::DELETE, self.vault_url(path)?)?;
                send_unit(&scope, spec, "path", path).await
            })
            .await
    }

    pub async fn search_simple(
        &self,
        query: &str,
        context_length: u32,
    ) -> Result<Vec<SearchHit>, ApiError> {
        self.core
            .operation("vault.search", |scope| async move {
                let query = query.trim();
                if query.is_empty() {
                    return Err(ApiError::validation("A search query is required"));
                }
                let mut url = self.url(&["search", "simple"], true)?;
                url.query_pairs_mut()
                    .append_pair("query", query)
                    .append_pair("contextLength", &context_length.to_string());
                let spec = self.request(Method::POST, url)?;
                scope
                    .send_json::<Vec<SearchHit>>(spec)
                    .await
                    .map_err(|e| e.with_metadata("query", query))
            })
            .await
    }

    pub async fn get_active_note(&self) -> Result<NoteJson, ApiError> {
        self.core
            .operation("vault.active_note", |scope| async move {
                let spec = self
                    .request(Method::GET, self.url(&["active"], true)?)?
                    .header("Accept", NOTE_JSON)?;
                scope.send_json::<NoteJson>(spec).await
            })
            .await
    }

    pub async fn get_periodic_note(&self, period: Period) -> Result<NoteJson, ApiError> {
        self.core
            .operation("vault.periodic_note", |scope| async move {
                let spec = self
                    .request(Method::GET, self.url(&["periodic", period.as_str()], true)?)?
                    .header("Accept", NOTE_JSON)?;
                scope
                    .send_json::<NoteJson>(spec)
                    .await
                    .map_err(|e| e.with_metadata("period", period.as_str()))
            })
            .await
    }

    pub async fn list_commands(&self) -> Result<Vec<VaultCommand>, ApiError> {
        self.core
            .operation("vault.list_commands", |scope| async move {
                let spec = self.request(Method::GET, self.url(&["commands"], true)?)?;
                scope
                    .send_json::<CommandList>(spec)
                    .await
                    .map(|list| list.commands)
            })
            .await
    }

    pub async fn execute_command(&self, command_id: &str) -> Result<(), ApiError> {
        self.core
            .operation("vault.run_command", |scope| async move {
                let command_id = command_id.trim();
                if command_id.is_empty() || command_id.contains('/') {
                    return Err(ApiError::validation(format!(
                        "Invalid command id: {command_id:?}"
                    )));
                }
                let spec =
                    self.request(Method::POST, self.url(&["commands", command_id], true)?)?;
                send_unit(&scope, spec, "command_id", command_id).await
            })
            .await
    }
}

/// Sends a request whose response body is ignored.
async fn send_unit(
    scope: &CallScope,
    spec: RequestSpec,
    key: &str,
    value: &str,
) -> Result<(), ApiError> {
    scope
        .send(spec)
        .await
        .map(|_: RawResponse| ())
        .map_err(|e| e.with_metadata(key, value))
}
