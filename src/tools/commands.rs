use std::sync::Arc;

use serde::Deserialize;

use super::{NoArgs, Tool};
use crate::client::ApiError;
use crate::obsidian::ObsidianClient;

/// Lists the commands Obsidian can run.
pub struct ListCommands {
    vault: Arc<ObsidianClient>,
}

impl ListCommands {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for ListCommands {
    type Input = NoArgs;

    fn name(&self) -> &'static str {
        "list_commands"
    }

    async fn run(&self, _input: NoArgs) -> Result<String, ApiError> {
        let commands = self.vault.list_commands().await?;
        if commands.is_empty() {
            return Ok("No commands available.".to_string());
        }
        Ok(commands
            .iter()
            .map(|c| format!("{} - {}", c.id, c.name))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Runs one Obsidian command by id.
pub struct RunCommand {
    vault: Arc<ObsidianClient>,
}

#[derive(Debug, Deserialize)]
pub struct RunCommandInput {
    pub command_id: String,
}

impl RunCommand {
    pub fn new(vault: Arc<ObsidianClient>) -> Self {
        Self { vault }
    }
}

#[async_trait::async_trait]
impl Tool for RunCommand {
    type Input = RunCommandInput;

    fn name(&self) -> &'static str {
        "run_command"
    }

    async fn run(&self, input: RunCommandInput) -> Result<String, ApiError> {
        self.vault.execute_command(&input.command_id).await?;
        log::info!("RunCommand: executed {}", input.command_id);
        Ok(format!("Executed {}.", input.command_id))
    }
}
