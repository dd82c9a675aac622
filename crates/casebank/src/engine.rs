//! The query/assist facade over the knowledge base.
//!
//! The engine owns the current [`KnowledgeBase`] behind a single swap
//! point: ingestion builds a complete new aggregate off to the side and
//! publishes it as one `Arc`, so a reader never observes a metadata list
//! paired with a mismatched index. Queries clone the `Arc` and run without
//! locks. There is no incremental update; new conversations mean a full
//! rebuild.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RagConfig;
use crate::embeddings::{self, EmbeddingModel};
use crate::kb::KnowledgeBase;
use crate::llm::{self, CompletionModel};
use crate::processing::{classifier, grouper, sentiment};
use crate::store::{self, SnapshotError};
use crate::types::{
    AgentAssistance, AgentPerformance, CategoryInsights, ChatMessage, ConversationAnalysis,
    ConversationMessage, IngestStats, IssuePattern, PerformanceInsights, RagInsights,
    Recommendation, ResolutionSuggestion, SimilarConversation, Speaker,
};

const FALLBACK_RESPONSE: &str =
    "I understand your concern and I'm here to help. Let me look into this for you right away.";

/// Clipped transcript length for analysis prompts.
const PROMPT_TRANSCRIPT_CHARS: usize = 3000;

/// Categories resolving below this rate get a coaching recommendation.
const REVIEW_RESOLUTION_RATE: f64 = 0.8;

pub struct RagEngine {
    config: RagConfig,
    /// `None` disables retrieval: similarity operations return empty
    /// results instead of erroring (null-object capability, decided at
    /// construction rather than checked feature-flag style at call sites).
    embeddings: Option<Arc<dyn EmbeddingModel>>,
    /// `None` disables generation: assist responses fall back to the
    /// agent's draft or a generic acknowledgment.
    completions: Option<Arc<dyn CompletionModel>>,
    kb: RwLock<Option<Arc<KnowledgeBase>>>,
}

impl RagEngine {
    /// Build an engine with collaborators selected by the configuration.
    pub fn new(config: RagConfig) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;
        let embeddings: Arc<dyn EmbeddingModel> =
            Arc::from(embeddings::create_embeddings(&config.embedding)?);
        let completions = llm::create_completions(&config.generation)?
            .map(|c| -> Arc<dyn CompletionModel> { Arc::from(c) });
        Ok(Self {
            config,
            embeddings: Some(embeddings),
            completions,
            kb: RwLock::new(None),
        })
    }

    /// Build an engine with explicitly injected collaborators. Passing
    /// `None` for `embeddings` yields a retrieval-disabled engine whose
    /// similarity operations return empty results.
    pub fn with_collaborators(
        config: RagConfig,
        embeddings: Option<Arc<dyn EmbeddingModel>>,
        completions: Option<Arc<dyn CompletionModel>>,
    ) -> Result<Self> {
        config.validate().map_err(|e| anyhow!(e))?;
        Ok(Self {
            config,
            embeddings,
            completions,
            kb: RwLock::new(None),
        })
    }

    fn current_kb(&self) -> Option<Arc<KnowledgeBase>> {
        self.kb.read().clone()
    }

    /// Whether a knowledge base has been built or loaded.
    pub fn is_ready(&self) -> bool {
        self.kb.read().is_some()
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Build the knowledge base from a batch of messages and swap it in.
    ///
    /// The new aggregate is constructed fully before publication; on any
    /// failure the previous knowledge base (or its absence) is left
    /// untouched.
    pub async fn ingest_messages(&self, messages: Vec<ChatMessage>) -> Result<IngestStats> {
        let embeddings = self
            .embeddings
            .as_ref()
            .ok_or_else(|| anyhow!("Retrieval is disabled; cannot build a knowledge base"))?;

        let records = messages.len();
        let conversations = grouper::group_conversations(messages);
        let grouped_records: usize = conversations.values().map(|c| c.messages.len()).sum();

        let kb = KnowledgeBase::build(&conversations, embeddings.as_ref()).await?;

        let stats = IngestStats {
            records,
            skipped_records: records - grouped_records,
            conversations: conversations.len(),
            indexed: kb.conversations.len(),
        };

        *self.kb.write() = Some(Arc::new(kb));

        tracing::info!(
            records = stats.records,
            skipped = stats.skipped_records,
            conversations = stats.conversations,
            "Ingested chat data"
        );
        Ok(stats)
    }

    /// Ingest a JSON file containing an array of message records.
    /// Records that fail to deserialize are skipped with a warning.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestStats> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read chat data from {}", path.display()))?;
        let raw: Vec<serde_json::Value> =
            serde_json::from_str(&content).context("Chat data is not a JSON array")?;

        let total = raw.len();
        let mut messages = Vec::with_capacity(total);
        for value in raw {
            match serde_json::from_value::<ChatMessage>(value) {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed chat record"),
            }
        }

        let parse_skipped = total - messages.len();
        let mut stats = self.ingest_messages(messages).await?;
        stats.records = total;
        stats.skipped_records += parse_skipped;
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn snapshot_exists(&self) -> bool {
        store::snapshot_exists(&self.config.knowledge_base_path)
    }

    /// Persist the current knowledge base to the configured snapshot path.
    pub fn save_knowledge_base(&self) -> Result<()> {
        let kb = self
            .current_kb()
            .ok_or_else(|| anyhow!("No knowledge base built yet"))?;
        store::save(&kb, &self.config.knowledge_base_path)?;
        Ok(())
    }

    /// Load the snapshot at the configured path and swap it in. Fails fast
    /// on a missing or inconsistent snapshot; the error taxonomy lets
    /// startup distinguish "absent, rebuild" from "corrupt, abort".
    pub fn load_knowledge_base(&self) -> Result<(), SnapshotError> {
        let kb = store::load(&self.config.knowledge_base_path)?;
        *self.kb.write() = Some(Arc::new(kb));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Semantic search over indexed conversations. Cold or
    /// retrieval-disabled states yield an empty list, never an error.
    pub async fn find_similar_conversations(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<SimilarConversation>> {
        let Some(embeddings) = &self.embeddings else {
            return Ok(Vec::new());
        };
        let Some(kb) = self.current_kb() else {
            return Ok(Vec::new());
        };
        if kb.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = embeddings
            .embed_query(query)
            .await
            .context("Failed to embed query")?;

        let hits = kb.index.search(&query_vector, k)?;
        let results = hits
            .into_iter()
            .enumerate()
            .map(|(i, (row, score))| {
                let meta = &kb.conversations[row];
                SimilarConversation {
                    contact_id: meta.contact_id.clone(),
                    resolved: meta.resolved,
                    duration_seconds: meta.duration_seconds,
                    full_conversation: meta.full_conversation.clone(),
                    score,
                    rank: i + 1,
                }
            })
            .collect();
        Ok(results)
    }

    /// Candidate resolutions for an issue: template suggestions for the
    /// category first (source order), then suggestions from resolved
    /// similar cases (descending score).
    pub async fn resolution_suggestions(
        &self,
        issue_text: &str,
        category: Option<&str>,
    ) -> Result<Vec<ResolutionSuggestion>> {
        let mut suggestions = Vec::new();

        if let (Some(category), Some(kb)) = (category, self.current_kb()) {
            if let Some(templates) = kb.resolution_templates.get(category) {
                for template in templates.iter().take(self.config.search.template_limit) {
                    suggestions.push(ResolutionSuggestion::Template {
                        steps: template.steps.clone(),
                        duration_seconds: template.duration_seconds,
                    });
                }
            }
        }

        let similar = self
            .find_similar_conversations(issue_text, self.config.search.suggestion_search_k)
            .await?;

        for case in similar
            .into_iter()
            .filter(|c| c.resolved)
            .take(self.config.search.similar_case_limit)
        {
            let agent_responses: Vec<String> = case
                .full_conversation
                .iter()
                .filter(|m| m.user_type == Speaker::Agent)
                .map(|m| m.text.clone())
                .collect();

            if !agent_responses.is_empty() {
                suggestions.push(ResolutionSuggestion::SimilarCase {
                    agent_responses,
                    duration_seconds: case.duration_seconds,
                    score: case.score,
                });
            }
        }

        Ok(suggestions)
    }

    /// Resolution-rate and duration statistics per issue category. A
    /// requested category with no recorded cases yields zeroed stats.
    pub fn issue_insights(&self, category: Option<&str>) -> BTreeMap<String, CategoryInsights> {
        let Some(kb) = self.current_kb() else {
            return BTreeMap::new();
        };

        let mut insights = BTreeMap::new();
        match category {
            Some(category) => {
                let patterns = kb
                    .issue_patterns
                    .get(category)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let mut stats = category_stats(patterns);
                stats.common_phrases = Some(common_phrases(patterns, 10));
                insights.insert(category.to_string(), stats);
            }
            None => {
                for (category, patterns) in &kb.issue_patterns {
                    insights.insert(category.clone(), category_stats(patterns));
                }
            }
        }
        insights
    }

    /// Per-agent handling aggregates from the current knowledge base.
    pub fn agent_performance(&self) -> BTreeMap<String, AgentPerformance> {
        self.current_kb()
            .map(|kb| kb.agent_performance.clone())
            .unwrap_or_default()
    }

    /// Category-level report with coaching recommendations for categories
    /// resolving below the review threshold.
    pub fn performance_insights(&self) -> PerformanceInsights {
        let category_insights = self.issue_insights(None);

        let mut recommendations = Vec::new();
        for (category, stats) in &category_insights {
            if stats.resolution_rate < REVIEW_RESOLUTION_RATE {
                recommendations.push(Recommendation {
                    category: category.clone(),
                    issue: "Low resolution rate".to_string(),
                    recommendation: format!("Improve {} resolution training", category),
                });
            }
        }

        let total_categories = category_insights.len();
        let avg_resolution_rate = if total_categories > 0 {
            category_insights
                .values()
                .map(|s| s.resolution_rate)
                .sum::<f64>()
                / total_categories as f64
        } else {
            0.0
        };

        PerformanceInsights {
            generated_at: Utc::now(),
            category_insights,
            recommendations,
            total_categories,
            avg_resolution_rate,
        }
    }

    // ------------------------------------------------------------------
    // Agent assistance
    // ------------------------------------------------------------------

    /// Assemble everything an agent needs to answer one live customer
    /// message. Generation failures are recovered with the caller's draft
    /// or a generic acknowledgment; this method never fails.
    pub async fn enhance_agent_response(
        &self,
        customer_message: &str,
        history: &[ConversationMessage],
        draft: Option<&str>,
    ) -> AgentAssistance {
        let similar = self
            .find_similar_conversations(customer_message, self.config.search.default_k)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Similarity search failed during assistance");
                Vec::new()
            });

        let category = classifier::classify_issue(customer_message);
        let suggestions = self
            .resolution_suggestions(customer_message, Some(category))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Suggestion lookup failed during assistance");
                Vec::new()
            });

        let confidence_score = confidence_score(&similar);
        let urgency = sentiment::detect_urgency(customer_message);
        let message_sentiment = sentiment::estimate_sentiment(customer_message);

        let enhanced_response = match &self.completions {
            Some(completions) => {
                let prompt =
                    assistance_prompt(customer_message, history, &similar, &suggestions, draft);
                match self.complete_with_deadline(completions, &prompt).await {
                    Ok(text) if !text.is_empty() => text,
                    Ok(_) => fallback_response(draft),
                    Err(e) => {
                        tracing::warn!(error = %e, "Response generation failed, using fallback");
                        fallback_response(draft)
                    }
                }
            }
            None => fallback_response(draft),
        };

        AgentAssistance {
            enhanced_response,
            similar_cases: similar,
            suggestions,
            confidence_score,
            urgency,
            sentiment: message_sentiment,
            recommended_actions: sentiment::recommended_actions(urgency, message_sentiment),
        }
    }

    /// Run the full analysis fan-out for one conversation: summary,
    /// sentiment, compliance, and RAG insights, concurrently. A failed
    /// task contributes `None` for its field rather than failing the call.
    pub async fn analyze_conversation(
        &self,
        conversation_id: Option<&str>,
        messages: &[ConversationMessage],
    ) -> ConversationAnalysis {
        let transcript = transcript_text(messages);

        let (summary, sentiment_analysis, compliance, rag_insights) = futures::join!(
            self.llm_analysis("summary", summary_prompt(&transcript)),
            self.llm_analysis("sentiment", sentiment_prompt(&transcript)),
            self.llm_analysis("compliance", compliance_prompt(&transcript)),
            self.rag_insights(&transcript),
        );

        ConversationAnalysis {
            conversation_id: conversation_id.map(str::to_string),
            analyzed_at: Utc::now(),
            summary,
            sentiment: sentiment_analysis,
            compliance,
            rag_insights,
        }
    }

    /// Analyze a batch of conversations concurrently. Each item is analyzed
    /// independently; one degraded analysis does not affect the others.
    pub async fn analyze_conversations(
        &self,
        conversations: &[(Option<String>, Vec<ConversationMessage>)],
    ) -> Vec<ConversationAnalysis> {
        tracing::info!(count = conversations.len(), "Batch analyzing conversations");
        let tasks = conversations
            .iter()
            .map(|(id, messages)| self.analyze_conversation(id.as_deref(), messages));
        futures::future::join_all(tasks).await
    }

    /// One isolated completion task for the analysis fan-out.
    async fn llm_analysis(&self, label: &str, prompt: String) -> Option<String> {
        let completions = self.completions.as_ref()?;
        match self.complete_with_deadline(completions, &prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(analysis = label, error = %e, "Analysis task failed");
                None
            }
        }
    }

    async fn rag_insights(&self, transcript: &str) -> Option<RagInsights> {
        self.embeddings.as_ref()?;
        self.current_kb()?;

        let category = classifier::classify_issue(transcript);
        let similar = self
            .find_similar_conversations(transcript, self.config.search.default_k)
            .await
            .map_err(|e| tracing::warn!(error = %e, "RAG insights search failed"))
            .ok()?;
        let suggestions = self
            .resolution_suggestions(transcript, Some(category))
            .await
            .map_err(|e| tracing::warn!(error = %e, "RAG insights suggestions failed"))
            .ok()?;
        let category_insights = self.issue_insights(Some(category)).remove(category);

        Some(RagInsights {
            similar_conversations: similar,
            issue_category: category.to_string(),
            suggestions,
            category_insights,
        })
    }

    async fn complete_with_deadline(
        &self,
        completions: &Arc<dyn CompletionModel>,
        prompt: &str,
    ) -> Result<String> {
        let generation = &self.config.generation;
        let deadline = Duration::from_secs(generation.timeout_secs);
        match tokio::time::timeout(
            deadline,
            completions.complete(prompt, generation.max_tokens, generation.temperature),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => bail!("Completion timed out after {}s", generation.timeout_secs),
        }
    }

    /// Summary counters about the current engine state.
    pub fn statistics(&self) -> BTreeMap<String, String> {
        let mut stats = BTreeMap::new();
        let kb = self.current_kb();

        stats.insert(
            "conversations".to_string(),
            kb.as_ref()
                .map(|kb| kb.conversations.len())
                .unwrap_or(0)
                .to_string(),
        );
        stats.insert(
            "issue_categories".to_string(),
            kb.as_ref()
                .map(|kb| kb.issue_patterns.len())
                .unwrap_or(0)
                .to_string(),
        );
        stats.insert(
            "template_categories".to_string(),
            kb.as_ref()
                .map(|kb| kb.resolution_templates.len())
                .unwrap_or(0)
                .to_string(),
        );
        stats.insert(
            "embedding_dimension".to_string(),
            self.embeddings
                .as_ref()
                .map(|e| e.dimension())
                .unwrap_or(0)
                .to_string(),
        );
        stats.insert(
            "knowledge_base_path".to_string(),
            self.config.knowledge_base_path.display().to_string(),
        );
        stats
    }
}

/// Weighted confidence over the retrieved cases: each case contributes
/// `(similarity + 0.2 if resolved)` weighted by its similarity. Empty or
/// non-positive-weight inputs score 0.0. Range is [0, 1.2].
pub fn confidence_score(similar_cases: &[SimilarConversation]) -> f32 {
    if similar_cases.is_empty() {
        return 0.0;
    }

    let mut total = 0.0f32;
    let mut weight_sum = 0.0f32;
    for case in similar_cases {
        let bonus = if case.resolved { 0.2 } else { 0.0 };
        total += (case.score + bonus) * case.score;
        weight_sum += case.score;
    }

    if weight_sum > f32::EPSILON {
        total / weight_sum
    } else {
        0.0
    }
}

fn category_stats(patterns: &[IssuePattern]) -> CategoryInsights {
    let total_cases = patterns.len();
    let resolved_cases = patterns.iter().filter(|p| p.resolved).count();
    let resolution_rate = if total_cases > 0 {
        resolved_cases as f64 / total_cases as f64
    } else {
        0.0
    };
    let avg_duration_seconds = if total_cases > 0 {
        patterns.iter().map(|p| p.duration_seconds).sum::<f64>() / total_cases as f64
    } else {
        0.0
    };

    CategoryInsights {
        total_cases,
        resolved_cases,
        resolution_rate,
        avg_duration_seconds,
        common_phrases: None,
    }
}

/// Most frequent issue words (longer than 3 characters) across a
/// category's patterns; ties broken alphabetically for determinism.
fn common_phrases(patterns: &[IssuePattern], top_k: usize) -> Vec<String> {
    let word_re = regex::Regex::new(r"\b\w+\b").expect("static regex");
    let mut frequencies: BTreeMap<String, usize> = BTreeMap::new();

    for pattern in patterns {
        for word in word_re.find_iter(&pattern.issue_text) {
            let word = word.as_str();
            if word.len() > 3 {
                *frequencies.entry(word.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut words: Vec<(String, usize)> = frequencies.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.into_iter().take(top_k).map(|(word, _)| word).collect()
}

fn fallback_response(draft: Option<&str>) -> String {
    match draft {
        Some(draft) if !draft.is_empty() => draft.to_string(),
        _ => FALLBACK_RESPONSE.to_string(),
    }
}

/// Role-labelled transcript for analysis prompts.
fn transcript_text(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.user_type {
                Speaker::Customer => "Customer",
                Speaker::Agent => "Agent",
            };
            format!("{}: {}", role, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn assistance_prompt(
    customer_message: &str,
    history: &[ConversationMessage],
    similar: &[SimilarConversation],
    suggestions: &[ResolutionSuggestion],
    draft: Option<&str>,
) -> String {
    let history_tail = &history[history.len().saturating_sub(3)..];
    let history_json = serde_json::to_string_pretty(history_tail).unwrap_or_default();
    let similar_json =
        serde_json::to_string_pretty(&similar[..similar.len().min(3)]).unwrap_or_default();
    let suggestions_json =
        serde_json::to_string_pretty(&suggestions[..suggestions.len().min(2)]).unwrap_or_default();

    format!(
        "You are an expert customer service agent. Based on the following context, \
provide an enhanced response to the customer.\n\n\
Customer Message: {customer_message}\n\n\
Conversation History:\n{history_json}\n\n\
Similar Resolved Cases:\n{similar_json}\n\n\
Resolution Suggestions:\n{suggestions_json}\n\n\
Current Agent Draft: {draft}\n\n\
Provide an empathetic, professional, and solution-focused response that:\n\
1. Acknowledges the customer's concern\n\
2. Uses insights from similar resolved cases\n\
3. Provides clear next steps\n\
4. Maintains a helpful tone\n\n\
Enhanced Response:",
        draft = draft.unwrap_or("None"),
    )
}

fn summary_prompt(transcript: &str) -> String {
    format!(
        "Analyze this customer service conversation and provide a structured summary:\n\n\
1. ISSUE: What was the customer's main problem or request?\n\
2. RESOLUTION: How was the issue addressed?\n\
3. OUTCOME: Was the issue resolved? Customer satisfaction level?\n\
4. FOLLOW-UP: Any required follow-up actions?\n\
5. KEY_POINTS: Important details or context\n\n\
Conversation:\n{}\n\nSummary:",
        clip(transcript, PROMPT_TRANSCRIPT_CHARS)
    )
}

fn sentiment_prompt(transcript: &str) -> String {
    format!(
        "Analyze the sentiment and emotional journey in this conversation:\n\n\
1. CUSTOMER_SENTIMENT: Overall customer emotional state\n\
2. SENTIMENT_PROGRESSION: How did emotions change during the conversation?\n\
3. AGENT_EMPATHY: How well did the agent handle customer emotions?\n\
4. EMOTIONAL_TRIGGERS: What caused emotional reactions?\n\
5. SATISFACTION_LEVEL: Likely customer satisfaction (1-10)\n\n\
Conversation:\n{}\n\nSentiment Analysis:",
        clip(transcript, PROMPT_TRANSCRIPT_CHARS)
    )
}

fn compliance_prompt(transcript: &str) -> String {
    format!(
        "Review this customer service conversation for compliance and quality:\n\n\
Check for:\n\
1. GREETING: Proper professional greeting\n\
2. IDENTIFICATION: Agent identified themselves and company\n\
3. VERIFICATION: Customer identity verification (if applicable)\n\
4. INFORMATION_DISCLOSURE: Required disclosures made\n\
5. PROFESSIONALISM: Professional language and tone maintained\n\
6. RESOLUTION_PROCESS: Proper problem-solving approach\n\
7. CLOSING: Appropriate conversation closing\n\
8. VIOLATIONS: Any potential compliance issues\n\n\
Rate each area as: EXCELLENT / GOOD / NEEDS_IMPROVEMENT / POOR\n\n\
Conversation:\n{}\n\nCompliance Review:",
        clip(transcript, PROMPT_TRANSCRIPT_CHARS)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddings;
    use async_trait::async_trait;

    struct StubCompletions(&'static str);

    #[async_trait]
    impl CompletionModel for StubCompletions {
        async fn complete(&self, _: &str, _: usize, _: f32) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct FailingCompletions;

    #[async_trait]
    impl CompletionModel for FailingCompletions {
        async fn complete(&self, _: &str, _: usize, _: f32) -> Result<String> {
            bail!("completions unavailable")
        }
    }

    fn message(contact_id: &str, number: u32, text: &str, speaker: Speaker) -> ChatMessage {
        ChatMessage {
            contact_id: contact_id.to_string(),
            message_number: number,
            chat_text: text.to_string(),
            chat_user_type: speaker,
            chat_time_shift: 0,
            start_date: "2024-03-01T10:00:00+10:00".to_string(),
            end_date: "2024-03-01T10:04:00+10:00".to_string(),
            phone_number: None,
        }
    }

    fn engine_with(completions: Option<Arc<dyn CompletionModel>>) -> RagEngine {
        let config = RagConfig::default();
        let embeddings: Arc<dyn EmbeddingModel> = Arc::new(HashEmbeddings::new(128));
        RagEngine::with_collaborators(config, Some(embeddings), completions).unwrap()
    }

    fn case(resolved: bool, score: f32) -> SimilarConversation {
        SimilarConversation {
            contact_id: "c".to_string(),
            resolved,
            duration_seconds: 60.0,
            full_conversation: Vec::new(),
            score,
            rank: 1,
        }
    }

    /// Three messages for one contact: grouped into one conversation,
    /// classified as technical, detected as resolved, with a template
    /// recording the agent's action step.
    #[tokio::test]
    async fn ingest_single_resolved_technical_conversation() {
        let engine = engine_with(None);
        let stats = engine
            .ingest_messages(vec![
                message("X", 1, "my internet is broken", Speaker::Customer),
                message("X", 2, "let me check that", Speaker::Agent),
                message("X", 3, "thanks, fixed now!", Speaker::Customer),
            ])
            .await
            .unwrap();

        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.skipped_records, 0);

        let insights = engine.issue_insights(Some("technical"));
        let technical = &insights["technical"];
        assert_eq!(technical.total_cases, 1);
        assert_eq!(technical.resolved_cases, 1);

        let suggestions = engine
            .resolution_suggestions("broken internet", Some("technical"))
            .await
            .unwrap();
        assert!(suggestions.iter().any(|s| matches!(
            s,
            ResolutionSuggestion::Template { steps, .. } if steps == &vec!["let me check that".to_string()]
        )));
    }

    #[tokio::test]
    async fn billing_insights_resolution_rate() {
        let engine = engine_with(None);
        let mut messages = Vec::new();
        for (i, resolved) in [true, true, true, false].iter().enumerate() {
            let id = format!("b{}", i);
            messages.push(message(&id, 1, "there is a wrong charge on my bill", Speaker::Customer));
            messages.push(message(&id, 2, "let me review the account", Speaker::Agent));
            let closing = if *resolved {
                "thanks, that fixed it"
            } else {
                "this is still not working"
            };
            messages.push(message(&id, 3, closing, Speaker::Customer));
        }
        engine.ingest_messages(messages).await.unwrap();

        let insights = engine.issue_insights(Some("billing"));
        let billing = &insights["billing"];
        assert_eq!(billing.total_cases, 4);
        assert_eq!(billing.resolved_cases, 3);
        assert!((billing.resolution_rate - 0.75).abs() < f64::EPSILON);
        assert!(billing.common_phrases.is_some());
    }

    #[tokio::test]
    async fn cold_engine_returns_empty_results() {
        let engine = engine_with(None);
        let similar = engine
            .find_similar_conversations("I can't access my account", 5)
            .await
            .unwrap();
        assert!(similar.is_empty());

        let suggestions = engine
            .resolution_suggestions("I can't access my account", Some("account"))
            .await
            .unwrap();
        assert!(suggestions.is_empty());

        assert!(engine.issue_insights(None).is_empty());
    }

    #[tokio::test]
    async fn retrieval_disabled_engine_returns_empty_results() {
        let engine =
            RagEngine::with_collaborators(RagConfig::default(), None, None).unwrap();
        let similar = engine.find_similar_conversations("anything", 5).await.unwrap();
        assert!(similar.is_empty());
        assert!(engine.ingest_messages(Vec::new()).await.is_err());
    }

    #[tokio::test]
    async fn similar_conversations_are_ranked() {
        let engine = engine_with(None);
        engine
            .ingest_messages(vec![
                message("net", 1, "my internet connection is slow", Speaker::Customer),
                message("net", 2, "i will reset the line", Speaker::Agent),
                message("bill", 1, "please explain this invoice fee", Speaker::Customer),
                message("bill", 2, "i can walk you through the charges", Speaker::Agent),
            ])
            .await
            .unwrap();

        let similar = engine
            .find_similar_conversations("slow internet connection", 2)
            .await
            .unwrap();
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].contact_id, "net");
        assert_eq!(similar[0].rank, 1);
        assert!(similar[0].score >= similar[1].score);
    }

    #[tokio::test]
    async fn reingest_replaces_knowledge_base() {
        let engine = engine_with(None);
        engine
            .ingest_messages(vec![
                message("old", 1, "my internet is broken", Speaker::Customer),
                message("old", 2, "let me check", Speaker::Agent),
            ])
            .await
            .unwrap();
        engine
            .ingest_messages(vec![
                message("new", 1, "question about roaming overseas", Speaker::Customer),
                message("new", 2, "i will enable roaming", Speaker::Agent),
            ])
            .await
            .unwrap();

        let similar = engine
            .find_similar_conversations("roaming overseas", 5)
            .await
            .unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].contact_id, "new");
        assert!(engine.issue_insights(None).contains_key("roaming"));
        assert!(!engine.issue_insights(None).contains_key("technical"));
    }

    #[tokio::test]
    async fn snapshot_roundtrip_through_engine() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::default();
        config.knowledge_base_path = dir.path().join("kb");

        let embeddings: Arc<dyn EmbeddingModel> = Arc::new(HashEmbeddings::new(128));
        let engine =
            RagEngine::with_collaborators(config.clone(), Some(embeddings.clone()), None).unwrap();
        engine
            .ingest_messages(vec![
                message("a", 1, "my internet is broken", Speaker::Customer),
                message("a", 2, "let me check that", Speaker::Agent),
                message("a", 3, "thanks, fixed now!", Speaker::Customer),
                message("b", 1, "dispute a fee on my invoice", Speaker::Customer),
                message("b", 2, "i will raise a ticket", Speaker::Agent),
            ])
            .await
            .unwrap();
        engine.save_knowledge_base().unwrap();

        let restored =
            RagEngine::with_collaborators(config, Some(embeddings), None).unwrap();
        assert!(restored.snapshot_exists());
        restored.load_knowledge_base().unwrap();

        let query = "broken internet connection";
        let before = engine.find_similar_conversations(query, 2).await.unwrap();
        let after = restored.find_similar_conversations(query, 2).await.unwrap();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(&after) {
            assert_eq!(b.contact_id, a.contact_id);
            assert!((b.score - a.score).abs() < 1e-5);
        }
    }

    #[test]
    fn confidence_of_no_cases_is_zero() {
        assert_eq!(confidence_score(&[]), 0.0);
    }

    #[test]
    fn confidence_stays_within_bounds() {
        let cases = vec![case(true, 1.0), case(true, 0.9), case(false, 0.5)];
        let score = confidence_score(&cases);
        assert!(score > 0.0 && score <= 1.2);

        // All resolved at maximum similarity gives the ceiling.
        let ceiling = confidence_score(&[case(true, 1.0)]);
        assert!((ceiling - 1.2).abs() < 1e-6);
    }

    #[test]
    fn confidence_with_zero_weights_is_zero() {
        assert_eq!(confidence_score(&[case(true, 0.0)]), 0.0);
    }

    #[tokio::test]
    async fn assistance_uses_generated_response() {
        let engine = engine_with(Some(Arc::new(StubCompletions(
            "Thanks for your patience, resetting the line now.",
        ))));
        engine
            .ingest_messages(vec![
                message("a", 1, "my internet is broken", Speaker::Customer),
                message("a", 2, "let me check that", Speaker::Agent),
                message("a", 3, "thanks, fixed now!", Speaker::Customer),
            ])
            .await
            .unwrap();

        let assistance = engine
            .enhance_agent_response("my internet is broken again", &[], None)
            .await;
        assert_eq!(
            assistance.enhanced_response,
            "Thanks for your patience, resetting the line now."
        );
        assert!(!assistance.similar_cases.is_empty());
        assert!(assistance.confidence_score > 0.0);
        assert_eq!(assistance.urgency, crate::types::Urgency::Low);
    }

    #[tokio::test]
    async fn assistance_falls_back_on_generation_failure() {
        let engine = engine_with(Some(Arc::new(FailingCompletions)));
        let assistance = engine
            .enhance_agent_response("hello", &[], Some("Happy to help with that."))
            .await;
        assert_eq!(assistance.enhanced_response, "Happy to help with that.");

        let assistance = engine.enhance_agent_response("hello", &[], None).await;
        assert_eq!(assistance.enhanced_response, FALLBACK_RESPONSE);
        assert_eq!(assistance.confidence_score, 0.0);
    }

    #[tokio::test]
    async fn analysis_isolates_failed_tasks() {
        let engine = engine_with(Some(Arc::new(FailingCompletions)));
        engine
            .ingest_messages(vec![
                message("a", 1, "my internet is broken", Speaker::Customer),
                message("a", 2, "let me check that", Speaker::Agent),
                message("a", 3, "thanks, fixed now!", Speaker::Customer),
            ])
            .await
            .unwrap();

        let transcript = vec![ConversationMessage {
            text: "my internet is broken".to_string(),
            user_type: Speaker::Customer,
            timestamp_offset: 0,
        }];
        let analysis = engine.analyze_conversation(Some("call-1"), &transcript).await;

        // Generation tasks fail; the RAG task still contributes.
        assert!(analysis.summary.is_none());
        assert!(analysis.sentiment.is_none());
        assert!(analysis.compliance.is_none());
        let rag = analysis.rag_insights.expect("rag insights present");
        assert_eq!(rag.issue_category, "technical");
        assert!(!rag.similar_conversations.is_empty());
    }

    #[tokio::test]
    async fn analysis_merges_successful_tasks() {
        let engine = engine_with(Some(Arc::new(StubCompletions("ok"))));
        let transcript = vec![ConversationMessage {
            text: "hello".to_string(),
            user_type: Speaker::Customer,
            timestamp_offset: 0,
        }];
        let analysis = engine.analyze_conversation(None, &transcript).await;
        assert_eq!(analysis.summary.as_deref(), Some("ok"));
        assert_eq!(analysis.sentiment.as_deref(), Some("ok"));
        assert_eq!(analysis.compliance.as_deref(), Some("ok"));
        // No knowledge base built, so no RAG insights.
        assert!(analysis.rag_insights.is_none());
    }

    #[tokio::test]
    async fn performance_insights_flag_low_resolution_categories() {
        let engine = engine_with(None);
        engine
            .ingest_messages(vec![
                message("t", 1, "my internet is broken", Speaker::Customer),
                message("t", 2, "let me check that", Speaker::Agent),
                message("t", 3, "thanks, fixed now!", Speaker::Customer),
                message("b", 1, "wrong charge on my bill", Speaker::Customer),
                message("b", 2, "i will look into it", Speaker::Agent),
                message("b", 3, "this is still not working", Speaker::Customer),
            ])
            .await
            .unwrap();

        let insights = engine.performance_insights();
        assert_eq!(insights.total_categories, 2);
        assert!((insights.avg_resolution_rate - 0.5).abs() < 1e-9);
        assert_eq!(insights.recommendations.len(), 1);
        assert_eq!(insights.recommendations[0].category, "billing");
        assert_eq!(insights.recommendations[0].issue, "Low resolution rate");

        let performance = engine.agent_performance();
        let general = &performance[crate::processing::patterns::GENERAL_AGENT];
        assert_eq!(general.total_conversations, 2);
        assert_eq!(general.resolved_conversations, 1);
        assert!((general.resolution_rate - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn performance_insights_of_cold_engine_are_empty() {
        let engine = engine_with(None);
        let insights = engine.performance_insights();
        assert_eq!(insights.total_categories, 0);
        assert_eq!(insights.avg_resolution_rate, 0.0);
        assert!(insights.recommendations.is_empty());
        assert!(engine.agent_performance().is_empty());
    }

    #[tokio::test]
    async fn batch_analysis_covers_every_conversation() {
        let engine = engine_with(Some(Arc::new(StubCompletions("ok"))));
        let batch = vec![
            (
                Some("call-1".to_string()),
                vec![ConversationMessage {
                    text: "my internet is broken".to_string(),
                    user_type: Speaker::Customer,
                    timestamp_offset: 0,
                }],
            ),
            (
                None,
                vec![ConversationMessage {
                    text: "wrong charge on my bill".to_string(),
                    user_type: Speaker::Customer,
                    timestamp_offset: 0,
                }],
            ),
        ];

        let analyses = engine.analyze_conversations(&batch).await;
        assert_eq!(analyses.len(), 2);
        assert_eq!(analyses[0].conversation_id.as_deref(), Some("call-1"));
        assert!(analyses[1].conversation_id.is_none());
        for analysis in &analyses {
            assert_eq!(analysis.summary.as_deref(), Some("ok"));
        }
    }

    #[tokio::test]
    async fn malformed_records_are_counted_not_fatal() {
        let engine = engine_with(None);
        let stats = engine
            .ingest_messages(vec![
                message("", 1, "no contact id", Speaker::Customer),
                message("ok", 1, "my plan is too expensive, cancel it", Speaker::Customer),
                message("ok", 2, "i can downgrade your plan", Speaker::Agent),
            ])
            .await
            .unwrap();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.skipped_records, 1);
        assert_eq!(stats.conversations, 1);
    }
}
