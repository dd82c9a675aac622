//! Customer-support RAG knowledge base.
//!
//! Historical chat transcripts are grouped into conversations, classified
//! into issue categories, checked for resolution, and indexed for semantic
//! retrieval. On top of that knowledge base the engine answers similarity
//! queries, proposes resolutions, reports per-category insights, and
//! enhances live agent responses.

pub mod config;
pub mod embeddings;
pub mod engine;
pub mod index;
pub mod kb;
pub mod llm;
pub mod processing;
pub mod store;
pub mod types;

// Re-export primary types for convenience
pub use config::RagConfig;
pub use engine::RagEngine;
pub use kb::KnowledgeBase;
pub use store::SnapshotError;
pub use types::{
    AgentAssistance, AgentPerformance, CategoryInsights, ChatMessage, Conversation,
    ConversationAnalysis, ConversationMessage, IngestStats, PerformanceInsights,
    ResolutionSuggestion, SimilarConversation, Speaker, Urgency,
};

// Re-export common types
pub use anyhow::{Error, Result};
