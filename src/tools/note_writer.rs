use std::sync::Arc;

use serde::Deserialize;

use super::Tool;
use crate::client::{ApiError, ErrorKind};
use crate::obsidian::{ObsidianClient, PatchOperation, PatchTarget, TargetType};

/// Creates a note, refusing to clobber an existing one unless asked.
pub struct CreateNote {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteInput {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub overwrite: bool,
}

impl CreateNote {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }

    /// `Ok(true)` if the note exists, `Ok(false)` on a clean 404.
    async fn exists(&self, path: &str) -> Result<bool, ApiError> {
        match self.vault.get_note(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::ApiNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl Tool for CreateNote {
    type Input = CreateNoteInput;

    fn name(&self) -> &'static str {
        "create_note"
    }

    async fn run(&self, input: CreateNoteInput) -> Result<String, ApiError> {
        if !input.overwrite && self.exists(&input.path).await? {
            return Err(ApiError::business(format!(
                "A note already exists at {}. Pass overwrite=true to replace it.",
                input.path
            )));
        }

        self.vault.put_note(&input.path, &input.content).await?;
        log::info!("CreateNote: saved {} ({} chars)", input.path, input.content.len());

        Ok(format!("Saved {}.", input.path))
    }
}

/// Appends text to the end of a note.
pub struct AppendNote {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Deserialize)]
pub struct AppendNoteInput {
    pub path: String,
    pub content: String,
}

impl AppendNote {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for AppendNote {
    type Input = AppendNoteInput;

    fn name(&self) -> &'static str {
        "append_note"
    }

    async fn run(&self, input: AppendNoteInput) -> Result<String, ApiError> {
        if input.content.is_empty() {
            return Err(ApiError::validation("Nothing to append: content is empty"));
        }
        self.vault.append_note(&input.path, &input.content).await?;
        log::info!("AppendNote: appended {} chars to {}", input.content.len(), input.path);
        Ok(format!("Appended to {}.", input.path))
    }
}

/// Edits a note relative to a heading, block reference or frontmatter key.
pub struct PatchNote {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Deserialize)]
pub struct PatchNoteInput {
    pub path: String,
    pub operation: PatchOperation,
    pub target_type: TargetType,
    pub target: String,
    pub content: String,
    #[serde(default)]
    pub delimiter: Option<String>,
}

impl PatchNote {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for PatchNote {
    type Input = PatchNoteInput;

    fn name(&self) -> &'static str {
        "patch_note"
    }

    async fn run(&self, input: PatchNoteInput) -> Result<String, ApiError> {
        let target = PatchTarget {
            operation: input.operation,
            target_type: input.target_type,
            target: input.target,
            delimiter: input.delimiter,
        };
        self.vault
            .patch_note(&input.path, &target, &input.content)
            .await?;

        log::info!("PatchNote: {:?} {} in {}", target.operation, target.target, input.path);
        Ok(format!(
            "Updated {} ({:?} at {:?} {}).",
            input.path, target.operation, target.target_type, target.target
        ))
    }
}

/// Deletes a note. Requires an explicit confirmation flag.
pub struct DeleteNote {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteNoteInput {
    pub path: String,
    #[serde(default)]
    pub confirm: bool,
}

impl DeleteNote {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for DeleteNote {
    type Input = DeleteNoteInput;

    fn name(&self) -> &'static str {
        "delete_note"
    }

    async fn run(&self, input: DeleteNoteInput) -> Result<String, ApiError> {
        if !input.confirm {
            return Err(ApiError::business(format!(
                "Deleting {} requires confirm=true.",
                input.path
            )));
        }
        self.vault.delete_note(&input.path).await?;
        log::info!("DeleteNote: deleted {}", input.path);
        Ok(format!("Deleted {}.", input.path))
    }
}
