//! Groups flat message records into ordered per-conversation transcripts.

use chrono::{DateTime, NaiveDateTime};
use std::collections::BTreeMap;

use crate::processing::classifier;
use crate::types::{ChatMessage, Conversation, ConversationMessage, Speaker};

/// Group raw messages by `contact_id` into complete conversations.
///
/// Within each conversation, messages are sorted by `message_number`
/// ascending (stable on ties). Records with an empty `contact_id` are
/// dropped with a warning rather than failing the batch. The returned map
/// is ordered by `contact_id`; downstream build steps rely on this as the
/// conversation-processing order.
pub fn group_conversations(messages: Vec<ChatMessage>) -> BTreeMap<String, Conversation> {
    let mut partitions: BTreeMap<String, Vec<ChatMessage>> = BTreeMap::new();

    for message in messages {
        if message.contact_id.is_empty() {
            tracing::warn!(
                message_number = message.message_number,
                "Skipping record with empty contact_id"
            );
            continue;
        }
        partitions
            .entry(message.contact_id.clone())
            .or_default()
            .push(message);
    }

    let mut conversations = BTreeMap::new();

    for (contact_id, mut records) in partitions {
        records.sort_by_key(|m| m.message_number);

        let duration_seconds = conversation_duration(&records[0].start_date, &records[0].end_date);

        let mut messages = Vec::with_capacity(records.len());
        let mut customer_messages = Vec::new();
        let mut agent_messages = Vec::new();

        for record in records {
            match record.chat_user_type {
                Speaker::Customer => customer_messages.push(record.chat_text.clone()),
                Speaker::Agent => agent_messages.push(record.chat_text.clone()),
            }
            messages.push(ConversationMessage {
                text: record.chat_text,
                user_type: record.chat_user_type,
                timestamp_offset: record.chat_time_shift,
            });
        }

        let resolved = classifier::detect_resolution(&messages);

        conversations.insert(
            contact_id.clone(),
            Conversation {
                contact_id,
                messages,
                customer_messages,
                agent_messages,
                duration_seconds,
                resolved,
            },
        );
    }

    conversations
}

/// Seconds between the conversation's start and end timestamps.
/// Unparseable timestamps yield 0 rather than failing the batch.
fn conversation_duration(start: &str, end: &str) -> f64 {
    match (parse_timestamp(start), parse_timestamp(end)) {
        (Some(s), Some(e)) => (e - s).num_seconds() as f64,
        _ => {
            tracing::debug!(start, end, "Unparseable conversation timestamps");
            0.0
        }
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
}
