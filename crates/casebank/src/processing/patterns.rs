//! Extracts issue-pattern and resolution-template records from grouped
//! conversations.

use std::collections::BTreeMap;

use crate::processing::classifier;
use crate::types::{AgentPerformance, Conversation, IssuePattern, ResolutionTemplate};

/// Chat records carry no agent identity, so all agent activity rolls up
/// under this single bucket until the feed provides one.
pub const GENERAL_AGENT: &str = "agent_general";

/// Knowledge artifacts derived from one pass over the conversations.
#[derive(Debug, Default)]
pub struct ExtractedPatterns {
    pub issue_patterns: BTreeMap<String, Vec<IssuePattern>>,
    pub resolution_templates: BTreeMap<String, Vec<ResolutionTemplate>>,
}

/// Build issue patterns and resolution templates from classified
/// conversations.
///
/// Conversations are visited in map order (sorted by `contact_id`), so list
/// order within a category is deterministic across rebuilds. Records are
/// appended once per conversation and never mutated afterward.
pub fn extract_patterns(conversations: &BTreeMap<String, Conversation>) -> ExtractedPatterns {
    let mut extracted = ExtractedPatterns::default();

    for conversation in conversations.values() {
        let Some(first_message) = conversation.customer_messages.first() else {
            continue;
        };
        let issue_text = first_message.to_lowercase();
        let category = classifier::classify_issue(&issue_text);

        extracted
            .issue_patterns
            .entry(category.to_string())
            .or_default()
            .push(IssuePattern {
                contact_id: conversation.contact_id.clone(),
                issue_text,
                resolved: conversation.resolved,
                duration_seconds: conversation.duration_seconds,
            });

        if !conversation.resolved || conversation.agent_messages.is_empty() {
            continue;
        }

        let steps: Vec<String> = conversation
            .agent_messages
            .iter()
            .filter(|message| classifier::is_action_step(message))
            .cloned()
            .collect();

        if !steps.is_empty() {
            extracted
                .resolution_templates
                .entry(category.to_string())
                .or_default()
                .push(ResolutionTemplate {
                    contact_id: conversation.contact_id.clone(),
                    steps,
                    duration_seconds: conversation.duration_seconds,
                });
        }
    }

    tracing::info!(
        categories = extracted.issue_patterns.len(),
        template_categories = extracted.resolution_templates.len(),
        "Extracted issue patterns and resolution templates"
    );

    extracted
}

/// Per-agent performance aggregates over conversations with agent activity.
///
/// Resolution time averages over resolved conversations only; a bucket that
/// resolved nothing reports 0 for both rate and time.
pub fn analyze_agent_performance(
    conversations: &BTreeMap<String, Conversation>,
) -> BTreeMap<String, AgentPerformance> {
    let mut performance: BTreeMap<String, AgentPerformance> = BTreeMap::new();

    for conversation in conversations.values() {
        if conversation.agent_messages.is_empty() {
            continue;
        }

        let stats = performance.entry(GENERAL_AGENT.to_string()).or_default();
        stats.total_conversations += 1;
        if conversation.resolved {
            let resolved = stats.resolved_conversations as f64;
            stats.avg_resolution_time_seconds = (stats.avg_resolution_time_seconds * resolved
                + conversation.duration_seconds)
                / (resolved + 1.0);
            stats.resolved_conversations += 1;
        }
    }

    for stats in performance.values_mut() {
        if stats.total_conversations > 0 {
            stats.resolution_rate =
                stats.resolved_conversations as f64 / stats.total_conversations as f64;
        }
    }

    performance
}
