use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Who sent a chat message. Unknown speaker strings fail deserialization,
/// which is how malformed records get dropped during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Customer,
    Agent,
}

/// One raw message record as supplied by the ingestion source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub contact_id: String,
    /// Monotonic per contact; defines the total order within a conversation.
    pub message_number: u32,
    pub chat_text: String,
    pub chat_user_type: Speaker,
    /// Seconds offset from conversation start.
    #[serde(default)]
    pub chat_time_shift: i64,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// A message inside a grouped conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub text: String,
    pub user_type: Speaker,
    pub timestamp_offset: i64,
}

/// All messages sharing one contact id, ordered by message number.
/// Never constructed with zero messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub contact_id: String,
    pub messages: Vec<ConversationMessage>,
    pub customer_messages: Vec<String>,
    pub agent_messages: Vec<String>,
    pub duration_seconds: f64,
    pub resolved: bool,
}

/// One conversation's initial complaint, tagged with its resolution outcome.
/// Appended to its category's list at build time and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuePattern {
    pub contact_id: String,
    /// Lowercased first customer message.
    pub issue_text: String,
    pub resolved: bool,
    pub duration_seconds: f64,
}

/// Agent steps extracted from a resolved conversation, offered as a
/// reusable response pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionTemplate {
    pub contact_id: String,
    pub steps: Vec<String>,
    pub duration_seconds: f64,
}

/// Metadata row backing one vector-index entry. Row `i` of the metadata
/// list corresponds exactly to row `i` of the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedConversation {
    pub contact_id: String,
    pub resolved: bool,
    pub duration_seconds: f64,
    pub full_conversation: Vec<ConversationMessage>,
}

/// A retrieval hit: an indexed conversation plus its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarConversation {
    pub contact_id: String,
    pub resolved: bool,
    pub duration_seconds: f64,
    pub full_conversation: Vec<ConversationMessage>,
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// A candidate resolution offered to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolutionSuggestion {
    /// Drawn from the category's resolution templates.
    Template {
        steps: Vec<String>,
        duration_seconds: f64,
    },
    /// Drawn from a resolved similar conversation.
    SimilarCase {
        agent_responses: Vec<String>,
        duration_seconds: f64,
        score: f32,
    },
}

/// Aggregate statistics for one issue category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInsights {
    pub total_cases: usize,
    pub resolved_cases: usize,
    /// `resolved_cases / total_cases`, 0 when there are no cases.
    pub resolution_rate: f64,
    pub avg_duration_seconds: f64,
    /// Most frequent issue words; populated only for single-category queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_phrases: Option<Vec<String>>,
}

/// Aggregate handling statistics for one agent bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPerformance {
    pub total_conversations: usize,
    pub resolved_conversations: usize,
    /// `resolved_conversations / total_conversations`, 0 with no cases.
    pub resolution_rate: f64,
    /// Mean duration of the resolved conversations only.
    pub avg_resolution_time_seconds: f64,
}

/// A coaching recommendation derived from category statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub issue: String,
    pub recommendation: String,
}

/// Knowledge-base-wide performance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceInsights {
    pub generated_at: DateTime<Utc>,
    pub category_insights: BTreeMap<String, CategoryInsights>,
    pub recommendations: Vec<Recommendation>,
    pub total_categories: usize,
    pub avg_resolution_rate: f64,
}

/// Message urgency tiers used for agent assistance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    High,
    Medium,
    Low,
}

/// Everything the facade hands back for one live customer message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAssistance {
    pub enhanced_response: String,
    pub similar_cases: Vec<SimilarConversation>,
    pub suggestions: Vec<ResolutionSuggestion>,
    pub confidence_score: f32,
    pub urgency: Urgency,
    /// Heuristic sentiment in [-1, 1].
    pub sentiment: f32,
    pub recommended_actions: Vec<String>,
}

/// RAG-derived slice of a conversation analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagInsights {
    pub similar_conversations: Vec<SimilarConversation>,
    pub issue_category: String,
    pub suggestions: Vec<ResolutionSuggestion>,
    pub category_insights: Option<CategoryInsights>,
}

/// Merged result of the concurrent analysis fan-out. A failed analysis
/// contributes `None` for its field instead of failing the whole call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationAnalysis {
    pub conversation_id: Option<String>,
    pub analyzed_at: DateTime<Utc>,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
    pub compliance: Option<String>,
    pub rag_insights: Option<RagInsights>,
}

/// Counters reported after an ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub records: usize,
    pub skipped_records: usize,
    pub conversations: usize,
    pub indexed: usize,
}
