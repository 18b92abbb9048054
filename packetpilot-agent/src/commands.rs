//! Server-issued command relay
//!
//! The collector may answer a report with commands. Only `block_app` and
//! `limit_app` are recognized; both are placeholders that log the intended
//! effect until an enforcement backend exists.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Command received in a collector response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub action: String,
}

/// What the dispatcher did with a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Block,
    Limit,
    Ignored,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommandDispatcher;

impl CommandDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Dispatch every command in the order received
    pub fn dispatch_all(&self, commands: &[Command]) -> Vec<Dispatched> {
        info!(count = commands.len(), "Received commands from server");
        commands.iter().map(|cmd| self.dispatch(cmd)).collect()
    }

    pub fn dispatch(&self, command: &Command) -> Dispatched {
        info!(command_type = %command.kind, app = %command.app_name, action = %command.action, "Processing command");

        match command.kind.as_str() {
            "block_app" => {
                self.block_app(&command.app_name, &command.action);
                Dispatched::Block
            }
            "limit_app" => {
                self.limit_app(&command.app_name, &command.action);
                Dispatched::Limit
            }
            other => {
                warn!(command_type = %other, "Unknown command type");
                Dispatched::Ignored
            }
        }
    }

    fn block_app(&self, app_name: &str, action: &str) {
        info!(app = %app_name, action = %action, "Block app command");
    }

    fn limit_app(&self, app_name: &str, action: &str) {
        info!(app = %app_name, action = %action, "Limit app command");
    }
}
