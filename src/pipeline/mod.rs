//! Ingestion pipeline orchestration.

pub mod bootstrap;
pub mod chunking;
pub mod service;
pub mod supervisor;
pub mod types;

pub use bootstrap::build_from_config;
pub use chunking::{ChunkingError, TextChunk, TextChunker};
pub use service::{KnowledgeBase, KnowledgeBaseApi, KnowledgeBaseParts, REPAIR_CONCURRENCY};
pub use supervisor::TaskSupervisor;
pub use types::{IngestRequest, PipelineError, RepairReport, SYSTEM_UPLOADER};
