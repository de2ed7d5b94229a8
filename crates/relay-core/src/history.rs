//! Dialogue history mapper.
//!
//! Turns the helpdesk's raw message list into an ordered sequence of
//! [`DialogueTurn`]s, oldest first, ready to follow the system prompt.
//!
//! # Algorithm
//!
//! 1. Stable sort by numeric id ascending (missing id sorts as `0`).
//! 2. Drop private notes and records whose trimmed content is empty.
//! 3. `user` when the sender is a contact or the message type is incoming
//!    (`0` / `"incoming"`), otherwise `assistant`.
//! 4. Append the triggering content as a final `user` turn, unless the
//!    history already ends with exactly that user turn.
//!
//! Consecutive identical turns are collapsed so the sequence never repeats
//! the same role and content twice in a row.

use serde_json::Value;

use crate::models::{DialogueTurn, HistoryRecord, Role};

/// Map prior messages plus the current content to dialogue turns.
pub fn map_history(records: &[HistoryRecord], current_content: &str) -> Vec<DialogueTurn> {
    let mut ordered: Vec<&HistoryRecord> = records.iter().collect();
    // `sort_by_key` is stable: equal ids keep their fetch order.
    ordered.sort_by_key(|r| r.id.unwrap_or(0));

    let mut turns: Vec<DialogueTurn> = Vec::with_capacity(ordered.len() + 1);

    for record in ordered {
        if record.private == Some(true) {
            continue;
        }
        let content = record.content.as_deref().unwrap_or("").trim();
        if content.is_empty() {
            continue;
        }
        push_turn(&mut turns, role_of(record), content);
    }

    let current = current_content.trim();
    if !current.is_empty() {
        push_turn(&mut turns, Role::User, current);
    }

    turns
}

/// Keep only the most recent `limit` records by id, preserving fetch order
/// among equal ids.
pub fn last_n(mut records: Vec<HistoryRecord>, limit: usize) -> Vec<HistoryRecord> {
    if records.len() <= limit {
        return records;
    }
    records.sort_by_key(|r| r.id.unwrap_or(0));
    records.split_off(records.len() - limit)
}

fn role_of(record: &HistoryRecord) -> Role {
    let from_contact = record.sender_type.as_deref() == Some("contact");
    let incoming_type = match &record.message_type {
        Some(Value::String(s)) => s == "incoming",
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        _ => false,
    };
    if from_contact || incoming_type {
        Role::User
    } else {
        Role::Assistant
    }
}

fn push_turn(turns: &mut Vec<DialogueTurn>, role: Role, content: &str) {
    if let Some(last) = turns.last() {
        if last.role == role && last.content == content {
            return;
        }
    }
    turns.push(DialogueTurn {
        role,
        content: content.to_string(),
    });
}
