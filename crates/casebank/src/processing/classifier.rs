//! Keyword-driven issue classification and resolution detection.

use crate::types::ConversationMessage;

/// Ordered category table. Precedence is part of the contract: the first
/// category with any substring match wins, so reordering this table changes
/// classification results.
pub const ISSUE_CATEGORIES: &[(&str, &[&str])] = &[
    ("billing", &["bill", "charge", "payment", "cost", "fee", "invoice"]),
    (
        "technical",
        &["not working", "broken", "issue", "problem", "error", "bug", "fault"],
    ),
    ("account", &["account", "login", "password", "access", "profile"]),
    ("service", &["cancel", "upgrade", "downgrade", "plan", "change"]),
    ("roaming", &["roaming", "overseas", "international", "abroad", "travel"]),
    ("data", &["data", "internet", "wifi", "connection", "slow", "speed"]),
];

/// Fallback category when no keyword matches.
pub const OTHER_CATEGORY: &str = "other";

const POSITIVE_INDICATORS: &[&str] = &[
    "resolved", "fixed", "sorted", "done", "complete", "thank you", "thanks", "perfect",
    "great", "excellent", "helped",
];

const NEGATIVE_INDICATORS: &[&str] = &[
    "still not working",
    "not resolved",
    "still have the problem",
    "not fixed",
    "disappointed",
    "frustrated",
    "angry",
];

/// Messages that indicate the agent took a concrete action. A smaller set
/// than the resolution indicators; used to extract resolution templates.
const ACTION_INDICATORS: &[&str] = &["let me", "i will", "i can", "processed", "updated", "fixed"];

/// Classify issue text into one of the fixed categories.
///
/// First-match over [`ISSUE_CATEGORIES`]; no match yields
/// [`OTHER_CATEGORY`]. Pure and deterministic for identical input.
pub fn classify_issue(text: &str) -> &'static str {
    let text = text.to_lowercase();
    for (category, keywords) in ISSUE_CATEGORIES {
        if keywords.iter().any(|keyword| text.contains(keyword)) {
            return category;
        }
    }
    OTHER_CATEGORY
}

/// Decide whether a conversation's outcome counts as resolved.
///
/// Inspects the last 3 messages (fewer if the conversation is shorter) and
/// weighs positive resolution indicators against negative ones; resolved
/// when positives strictly outnumber negatives. Conversations with fewer
/// than 2 messages are never resolved.
pub fn detect_resolution(messages: &[ConversationMessage]) -> bool {
    if messages.len() < 2 {
        return false;
    }

    let window = messages.len().saturating_sub(3);
    let closing = messages[window..]
        .iter()
        .map(|m| m.text.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let positive = POSITIVE_INDICATORS
        .iter()
        .filter(|indicator| closing.contains(*indicator))
        .count();
    let negative = NEGATIVE_INDICATORS
        .iter()
        .filter(|indicator| closing.contains(*indicator))
        .count();

    positive > negative
}

/// Whether an agent message describes a concrete resolution step.
pub fn is_action_step(message: &str) -> bool {
    let message = message.to_lowercase();
    ACTION_INDICATORS
        .iter()
        .any(|indicator| message.contains(indicator))
}
