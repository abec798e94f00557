pub mod commands;
pub mod context_assembler;
pub mod dispatcher;
pub mod embedding_service;
pub mod image_ingestor;
pub mod llm_service;
pub mod recall_index;
pub mod segmenter;

pub use commands::{CatalogRegistry, CommandCatalog, CommandRegistry};
pub use context_assembler::ContextAssembler;
pub use dispatcher::{ChatTransport, RecordingTransport, ReplyDispatcher};
pub use embedding_service::{EmbeddingProvider, EmbeddingService};
pub use image_ingestor::ImageIngestor;
pub use llm_service::{LlmProvider, LlmService};
pub use recall_index::{EmbeddedRecallIndex, RecallIndex};
pub use segmenter::MessageSegmenter;
