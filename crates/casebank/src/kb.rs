//! The knowledge-base aggregate: issue patterns, resolution templates,
//! conversation metadata, and the vector index over conversation digests.
//!
//! A `KnowledgeBase` is built once per ingestion run and never mutated
//! afterward; re-ingesting produces a new aggregate that callers swap in
//! whole. `conversations[i]` always corresponds to row `i` of `index` —
//! the two are only ever created together.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

use crate::embeddings::EmbeddingModel;
use crate::index::VectorIndex;
use crate::processing::patterns;
use crate::types::{
    AgentPerformance, Conversation, IndexedConversation, IssuePattern, ResolutionTemplate,
};

/// How many leading customer/agent messages go into the embedded digest.
const DIGEST_MESSAGES: usize = 3;

pub struct KnowledgeBase {
    pub issue_patterns: BTreeMap<String, Vec<IssuePattern>>,
    pub resolution_templates: BTreeMap<String, Vec<ResolutionTemplate>>,
    pub agent_performance: BTreeMap<String, AgentPerformance>,
    pub conversations: Vec<IndexedConversation>,
    pub index: VectorIndex,
}

impl KnowledgeBase {
    pub fn empty(dimension: usize) -> Self {
        Self {
            issue_patterns: BTreeMap::new(),
            resolution_templates: BTreeMap::new(),
            agent_performance: BTreeMap::new(),
            conversations: Vec::new(),
            index: VectorIndex::new(dimension),
        }
    }

    /// Build the complete aggregate from grouped conversations.
    ///
    /// All digests are embedded in one batch call. Any embedding or index
    /// failure aborts the build; no partial aggregate is returned.
    pub async fn build(
        conversations: &BTreeMap<String, Conversation>,
        embeddings: &dyn EmbeddingModel,
    ) -> Result<Self> {
        let extracted = patterns::extract_patterns(conversations);
        let agent_performance = patterns::analyze_agent_performance(conversations);

        let mut digests = Vec::with_capacity(conversations.len());
        let mut metadata = Vec::with_capacity(conversations.len());

        for conversation in conversations.values() {
            // The grouper never constructs empty conversations, but the
            // index invariant is cheap to restate here.
            if conversation.messages.is_empty() {
                continue;
            }
            digests.push(digest_text(conversation));
            metadata.push(IndexedConversation {
                contact_id: conversation.contact_id.clone(),
                resolved: conversation.resolved,
                duration_seconds: conversation.duration_seconds,
                full_conversation: conversation.messages.clone(),
            });
        }

        let vectors = embeddings
            .embed_documents(&digests)
            .await
            .context("Failed to embed conversation digests")?;
        let index = VectorIndex::from_vectors(embeddings.dimension(), vectors)
            .context("Failed to build conversation index")?;

        tracing::info!(entries = metadata.len(), "Built conversation index");

        Ok(Self {
            issue_patterns: extracted.issue_patterns,
            resolution_templates: extracted.resolution_templates,
            agent_performance,
            conversations: metadata,
            index,
        })
    }
}

/// Fixed-length excerpt of a conversation used as the embedded unit.
pub fn digest_text(conversation: &Conversation) -> String {
    let take_joined = |messages: &[String]| {
        messages
            .iter()
            .take(DIGEST_MESSAGES)
            .cloned()
            .collect::<Vec<_>>()
            .join(" ")
    };

    format!(
        "Customer: {} Agent: {}",
        take_joined(&conversation.customer_messages),
        take_joined(&conversation.agent_messages),
    )
}
