//! Quick keyword heuristics for message sentiment and urgency. These back
//! real-time agent assistance where a full analysis call would be too slow.

use crate::types::Urgency;

const POSITIVE_WORDS: &[&str] = &["thank", "great", "good", "excellent", "satisfied"];
const NEGATIVE_WORDS: &[&str] = &["frustrated", "angry", "terrible", "worst", "cancel"];

/// Heuristic sentiment in [-1, 1]: +0.3 per positive indicator, -0.4 per
/// negative indicator, clamped.
pub fn estimate_sentiment(text: &str) -> f32 {
    let text = text.to_lowercase();
    let mut score = 0.0f32;
    for word in POSITIVE_WORDS {
        if text.contains(word) {
            score += 0.3;
        }
    }
    for word in NEGATIVE_WORDS {
        if text.contains(word) {
            score -= 0.4;
        }
    }
    score.clamp(-1.0, 1.0)
}

/// Urgency tier of a single customer message.
pub fn detect_urgency(message: &str) -> Urgency {
    let message = message.to_lowercase();
    let contains_any = |words: &[&str]| words.iter().any(|w| message.contains(w));

    if contains_any(&["emergency", "urgent", "asap", "immediately"]) {
        Urgency::Critical
    } else if contains_any(&["frustrated", "angry", "unacceptable"]) {
        Urgency::High
    } else if contains_any(&["problem", "issue", "concerned"]) {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

/// Suggested handling actions for the given urgency and sentiment.
pub fn recommended_actions(urgency: Urgency, sentiment: f32) -> Vec<String> {
    let mut actions = Vec::new();

    match urgency {
        Urgency::Critical => actions.push("Escalate to supervisor immediately".to_string()),
        Urgency::High => actions.push("Prioritize this customer".to_string()),
        _ => {}
    }

    if sentiment < 0.0 {
        actions.push("Use empathetic language".to_string());
        actions.push("Acknowledge frustration".to_string());
    }

    if actions.is_empty() {
        actions.push("Provide clear information".to_string());
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_is_clamped() {
        assert_eq!(
            estimate_sentiment("frustrated angry terrible worst cancel"),
            -1.0
        );
        assert!(estimate_sentiment("thank you, great service") > 0.0);
        assert_eq!(estimate_sentiment("plain statement"), 0.0);
    }

    #[test]
    fn urgency_tiers() {
        assert_eq!(detect_urgency("this is URGENT"), Urgency::Critical);
        assert_eq!(detect_urgency("I am frustrated"), Urgency::High);
        assert_eq!(detect_urgency("I have a problem"), Urgency::Medium);
        assert_eq!(detect_urgency("hello"), Urgency::Low);
    }

    #[test]
    fn default_action_when_calm() {
        let actions = recommended_actions(Urgency::Low, 0.2);
        assert_eq!(actions, vec!["Provide clear information"]);
    }

    #[test]
    fn negative_sentiment_adds_empathy_actions() {
        let actions = recommended_actions(Urgency::Critical, -0.5);
        assert!(actions.contains(&"Escalate to supervisor immediately".to_string()));
        assert!(actions.contains(&"Acknowledge frustration".to_string()));
    }
}
