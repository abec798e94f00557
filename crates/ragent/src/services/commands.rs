use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    /// Prefix-only commands are never published as slash commands
    #[serde(default)]
    pub prefix_only: bool,
}

impl CommandSpec {
    fn slash(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            options: Vec::new(),
            prefix_only: false,
        }
    }
}

/// Commands the bot answers to
pub struct CommandCatalog;

impl CommandCatalog {
    pub fn builtin() -> Vec<CommandSpec> {
        let mut rag = CommandSpec::slash(
            "rag",
            "RAgent will answer question based on local data and current channel history and LLM knowledge and logical ability",
        );
        rag.options.push(CommandOption {
            name: "query".to_string(),
            description: "What you want to ask".to_string(),
            required: true,
        });

        vec![
            CommandSpec::slash(
                "listen",
                "RAgent will start listening to messages in this channel from now on.",
            ),
            CommandSpec::slash(
                "stop",
                "RAgent will stop listening to messages in this channel from now on",
            ),
            CommandSpec::slash(
                "forget",
                "RAgent will forget all messages in this channel from now on",
            ),
            CommandSpec::slash(
                "status",
                "RAgent will tell you if it's listening to messages in this channel",
            ),
            rag,
            CommandSpec {
                prefix_only: true,
                ..CommandSpec::slash("sync", "Publish the slash command tree (owner only)")
            },
        ]
    }

    /// The subset registered with the platform as slash commands
    pub fn slash_commands() -> Vec<CommandSpec> {
        Self::builtin().into_iter().filter(|c| !c.prefix_only).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishedCatalog {
    pub commands: Vec<CommandSpec>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// External command registry refreshed by `sync`
#[async_trait]
pub trait CommandRegistry: Send + Sync {
    /// Replace the published command tree; returns how many were published
    async fn publish(&self, commands: Vec<CommandSpec>) -> Result<usize>;

    fn published(&self) -> PublishedCatalog;
}

/// Keeps the last published tree in memory for the gateway to serve
pub struct CatalogRegistry {
    state: RwLock<PublishedCatalog>,
}

impl Default for CatalogRegistry {
    fn default() -> Self {
        Self {
            state: RwLock::new(PublishedCatalog {
                commands: Vec::new(),
                synced_at: None,
            }),
        }
    }
}

impl CatalogRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommandRegistry for CatalogRegistry {
    async fn publish(&self, commands: Vec<CommandSpec>) -> Result<usize> {
        let count = commands.len();
        *self.state.write() = PublishedCatalog {
            commands,
            synced_at: Some(Utc::now()),
        };
        info!("Published {} slash commands", count);
        Ok(count)
    }

    fn published(&self) -> PublishedCatalog {
        self.state.read().clone()
    }
}
