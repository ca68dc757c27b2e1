//! Citation resolution for chat threads.

pub mod chat;
pub mod resolver;
pub mod types;

pub use chat::{ChatMessage, ChatStore, ChatThread, JsonDirChatStore, MemoryChatStore, Role};
pub use resolver::{CitationResolver, DEFAULT_CITATION_TOP_K};
pub use types::{
    CitationRecord, CitationResolution, CitationSource, MISSING_CONTENT, ResolutionDiagnostics,
    UNKNOWN_FILE_LABEL,
};
