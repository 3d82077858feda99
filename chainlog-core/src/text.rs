use serde_json::Value;

use crate::model::{MessageRole, StoredMessage};

pub const LABEL_MAX_CHARS: usize = 50;
pub const FALLBACK_LABEL: &str = "Untitled session";

const REMINDER_OPEN: &str = "<system-reminder>";
const REMINDER_CLOSE: &str = "</system-reminder>";
const TOOL_RESULT_TYPE: &str = "tool_result";

// Removes every `<system-reminder>...</system-reminder>` span. An unclosed
// opening tag drops the rest of the text.
pub fn strip_system_reminders(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(REMINDER_OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + REMINDER_OPEN.len()..];
        match after_open.find(REMINDER_CLOSE) {
            Some(end) => rest = &after_open[end + REMINDER_CLOSE.len()..],
            None => return output,
        }
    }

    output.push_str(rest);
    output
}

pub fn truncate_label(input: &str, max_chars: usize) -> String {
    let mut chars = input.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}...", &input[..cut]),
        None => input.to_string(),
    }
}

pub fn label_from_text(text: &str) -> Option<String> {
    let stripped = strip_system_reminders(text);
    stripped
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| truncate_label(line, LABEL_MAX_CHARS))
}

fn text_blocks(content: &Value) -> Vec<&str> {
    if let Some(text) = content.as_str() {
        return vec![text];
    }

    content
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| {
            if let Some(text) = item.as_str() {
                return Some(text);
            }
            if item.get("type").and_then(Value::as_str) != Some("text") {
                return None;
            }
            item.get("text").and_then(Value::as_str)
        })
        .collect()
}

pub fn message_label(message: &StoredMessage) -> Option<String> {
    if message.role != MessageRole::User {
        return None;
    }
    text_blocks(&message.content)
        .into_iter()
        .next()
        .and_then(label_from_text)
}

pub fn is_tool_result_only(content: &Value) -> bool {
    match content {
        Value::String(_) => false,
        Value::Array(items) => items
            .iter()
            .all(|item| item.get("type").and_then(Value::as_str) == Some(TOOL_RESULT_TYPE)),
        _ => true,
    }
}

pub fn is_genuine_request(message: &StoredMessage) -> bool {
    message.role == MessageRole::User && !is_tool_result_only(&message.content)
}
