pub mod settings;

pub use settings::{
    ActivityConfig, BotConfig, ContextConfig, EmbeddingConfig, ImagesConfig, LlmConfig,
    PersistenceConfig, PromptsConfig, ServerConfig, Settings, TransportConfig,
};
