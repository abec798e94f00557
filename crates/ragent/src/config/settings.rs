use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub bot: BotConfig,
    pub persistence: PersistenceConfig,
    pub transport: TransportConfig,
    pub context: ContextConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub images: ImagesConfig,
    pub prompts: PromptsConfig,
    pub activity: ActivityConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct BotConfig {
    /// Display name the bot posts under (also the `author` of its log entries)
    pub name: String,
    /// Bot user snowflake, used to ignore own messages and detect mentions
    pub user_id: u64,
    /// Only this user may run `sync`
    pub owner_id: u64,
    pub command_prefix: String,
    /// Prefix of every fixed status reply
    pub system_prefix: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "RAgent".to_string(),
            user_id: 0,
            owner_id: 799_479_143_174_897_694,
            command_prefix: "/".to_string(),
            system_prefix: "**RAgent SYS**:".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PersistenceConfig {
    pub directory: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./.persist"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
    /// Discord's max message size
    pub max_message_chars: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ContextConfig {
    /// Size of the short-term buffer window (the newest entry is excluded for rag)
    pub last_n_messages: usize,
    /// Candidates kept after the recency re-rank
    pub recall_top_k: usize,
    /// Candidates fetched by similarity before the recency re-rank
    pub similarity_top_k: usize,
    /// Metadata field the recency policy sorts on
    pub date_field: String,
    /// Upper bound of recalled text put into one prompt
    pub max_context_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            last_n_messages: 10,
            recall_top_k: 8,
            similarity_top_k: 8,
            date_field: "posted_at".to_string(),
            max_context_chars: 12_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            model: "default".to_string(),
            timeout_seconds: 120,
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ImagesConfig {
    pub cache_dir: PathBuf,
    pub timeout_seconds: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./images"),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PromptsConfig {
    /// System message of the mention (chat) path
    pub chat_system_prompt: String,
    /// System message of the rag path
    pub rag_system_prompt: String,
    /// Placeholders: {{REPLIES}} {{USER_ASKING}} {{BOT_NAME}} {{CONTEXT}} {{QUERY}}
    pub rag_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            chat_system_prompt: "You are a helpful assistant. Your name is RAgent.".to_string(),
            rag_system_prompt: "You are RAgent, an assistant that answers questions about a \
                Discord server using its remembered conversations."
                .to_string(),
            rag_template: DEFAULT_RAG_TEMPLATE.to_string(),
        }
    }
}

const DEFAULT_RAG_TEMPLATE: &str = r#"Recent messages in this channel:
---------------------
{{REPLIES}}
---------------------

Messages recalled from the server history (newest first):
---------------------
{{CONTEXT}}
---------------------

You are {{BOT_NAME}}. {{USER_ASKING}} is asking you a question. Use the messages above
together with your own knowledge and reasoning to answer it.
Question: {{QUERY}}
Answer: "#;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ActivityConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./.persist/activity.jsonl"),
            queue_capacity: 10_000,
            batch_size: 100,
            batch_timeout_ms: 1000,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("RAGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}
