use serde::Serialize;
use serde_json::Value;

use crate::error::{ChainlogError, Result};
use crate::model::{MessageRole, Session, SessionListing, StoredMessage, SubagentSession};
use crate::store::SessionLoad;
use crate::uri::SessionUri;

const TOOL_TYPES: &[&str] = &["tool_use", "tool_result", "server_tool_use"];

pub fn to_raw_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|err| ChainlogError::Serialization(err.to_string()))
}

pub fn message_text(content: &Value) -> String {
    if let Some(text) = content.as_str() {
        return text.trim().to_string();
    }

    let Some(items) = content.as_array() else {
        return String::new();
    };

    let mut chunks = Vec::new();
    for item in items {
        if let Some(text) = item.as_str()
            && !text.trim().is_empty()
        {
            chunks.push(text.trim().to_string());
            continue;
        }

        if let Some(item_type) = item.get("type").and_then(Value::as_str)
            && TOOL_TYPES.contains(&item_type)
        {
            continue;
        }

        for key in ["text", "thinking"] {
            if let Some(text) = item.get(key).and_then(Value::as_str)
                && !text.trim().is_empty()
            {
                chunks.push(text.trim().to_string());
                break;
            }
        }
    }

    chunks.join("\n\n")
}

fn role_title(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "User",
        MessageRole::Assistant => "Assistant",
        MessageRole::System => "System",
    }
}

fn push_messages(output: &mut String, messages: &[StoredMessage], heading: &str) {
    let mut index = 0;
    for message in messages {
        let text = message_text(&message.content);
        if text.is_empty() {
            continue;
        }
        index += 1;
        output.push_str(&format!("{heading} {index}. {}\n\n", role_title(message.role)));
        output.push_str(&text);
        output.push_str("\n\n");
    }

    if index == 0 {
        output.push_str("_No text messages found._\n\n");
    }
}

pub fn render_listing_markdown(listings: &[SessionListing]) -> String {
    let mut output = String::new();
    output.push_str("# Sessions\n\n");

    if listings.is_empty() {
        output.push_str("_No sessions found._\n");
        return output;
    }

    for (index, listing) in listings.iter().enumerate() {
        output.push_str(&format!("## {}. {}\n\n", index + 1, listing.metadata.label));
        output.push_str(&format!("- URI: `{}`\n", listing.uri));
        output.push_str(&format!("- Path: `{}`\n", listing.path.display()));
        output.push_str(&format!("- Created: `{}`\n", listing.metadata.created));
        if let Some(started) = &listing.metadata.last_request_started {
            output.push_str(&format!("- Last Request Started: `{started}`\n"));
        }
        output.push_str(&format!(
            "- Last Request Ended: `{}`\n\n",
            listing.metadata.last_request_ended
        ));
    }

    output
}

fn push_session(output: &mut String, uri: &SessionUri, session: &Session) {
    output.push_str(&format!("## {}\n\n", session.label));
    output.push_str(&format!("- Session ID: `{}`\n", session.id));
    output.push_str(&format!("- Created: `{}`\n", session.created));
    output.push_str(&format!(
        "- Last Request Ended: `{}`\n\n",
        session.last_request_ended
    ));

    push_messages(output, &session.messages, "###");

    if session.subagents.is_empty() {
        return;
    }
    output.push_str("### Subagents\n\n");
    for subagent in &session.subagents {
        let subagent_uri = SessionUri {
            session_id: uri.session_id.clone(),
            agent_id: Some(subagent.agent_id.clone()),
        };
        output.push_str(&format!(
            "- `{subagent_uri}` ({} messages, started `{}`)\n",
            subagent.messages.len(),
            subagent.timestamp
        ));
    }
    output.push('\n');
}

fn push_diagnostics(output: &mut String, load: &SessionLoad) {
    let stats = &load.stats;
    output.push_str("## Diagnostics\n\n");
    output.push_str(&format!("- Total Lines: {}\n", stats.total_lines));
    output.push_str(&format!("- Chain Nodes: {}\n", stats.chain_nodes));
    output.push_str(&format!("- Duplicate Nodes: {}\n", stats.duplicate_nodes));
    output.push_str(&format!("- Summaries: {}\n", stats.summaries));
    output.push_str(&format!("- Custom Titles: {}\n", stats.custom_titles));
    output.push_str(&format!("- Queue Operations: {}\n", stats.queue_operations));
    output.push_str(&format!("- Blank Lines: {}\n", stats.blank_lines));
    output.push_str(&format!("- Errors: {}\n\n", stats.errors));

    for error in &load.errors {
        let record_type = error.record_type.as_deref().unwrap_or("unknown");
        output.push_str(&format!(
            "- line {} (`{record_type}`): {}\n",
            error.line_number, error.message
        ));
    }
    for failure in &load.failures {
        output.push_str(&format!(
            "- leaf `{}` skipped: {}\n",
            failure.leaf_id, failure.reason
        ));
    }
    if !load.errors.is_empty() || !load.failures.is_empty() {
        output.push('\n');
    }
}

pub fn render_session_markdown(uri: &SessionUri, load: &SessionLoad, diagnostics: bool) -> String {
    let mut output = String::new();
    output.push_str("# Session\n\n");
    output.push_str(&format!("- URI: `{uri}`\n"));
    output.push_str(&format!("- Source: `{}`\n\n", load.path.display()));

    if load.sessions.is_empty() {
        output.push_str("_No sessions found in this file._\n\n");
    }
    for session in &load.sessions {
        push_session(&mut output, uri, session);
    }

    if diagnostics {
        push_diagnostics(&mut output, load);
    }

    output
}

pub fn render_subagent_list_markdown(uri: &SessionUri, subagents: &[SubagentSession]) -> String {
    let main_uri = uri.main_session();
    let mut output = String::new();
    output.push_str("# Subagents\n\n");
    output.push_str(&format!("- Main Session: `{main_uri}`\n\n"));

    if subagents.is_empty() {
        output.push_str("_No subagents found for this session._\n");
        return output;
    }

    for (index, subagent) in subagents.iter().enumerate() {
        output.push_str(&format!(
            "## {}. `{main_uri}/{}`\n\n",
            index + 1,
            subagent.agent_id
        ));
        output.push_str(&format!("- Started: `{}`\n", subagent.timestamp));
        output.push_str(&format!("- Messages: {}\n\n", subagent.messages.len()));
    }

    output
}

pub fn render_subagent_markdown(uri: &SessionUri, subagent: &SubagentSession) -> String {
    let mut output = String::new();
    output.push_str("# Subagent Session\n\n");
    output.push_str(&format!("- URI: `{uri}`\n"));
    output.push_str(&format!("- Main Session: `{}`\n", uri.main_session()));
    output.push_str(&format!("- Started: `{}`\n\n", subagent.timestamp));
    push_messages(&mut output, &subagent.messages, "##");
    output
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use crate::chain::parse_chain;
    use crate::render::{
        message_text, render_listing_markdown, render_session_markdown, to_raw_json,
    };
    use crate::session::build_sessions;
    use crate::store::SessionLoad;
    use crate::uri::SessionUri;

    const RAW: &str = r#"{"type":"user","uuid":"u1","parentUuid":null,"sessionId":"s1","timestamp":"2026-02-23T00:00:00Z","message":{"role":"user","content":[{"type":"text","text":"hello"}]}}
{"type":"assistant","uuid":"a1","parentUuid":"u1","sessionId":"s1","timestamp":"2026-02-23T00:00:01Z","message":{"role":"assistant","content":[{"type":"tool_use","name":"search"},{"type":"text","text":"done"}]}}
{"type":"user","uuid":"u2","parentUuid":"a1","sessionId":"s1","timestamp":"2026-02-23T00:00:02Z","message":{"role":"user","content":[{"type":"tool_result","content":"ok"}]}}
garbage"#;

    fn load() -> SessionLoad {
        let parsed = parse_chain(RAW, None);
        let built = build_sessions(&parsed);
        SessionLoad {
            uri: "chainlog://s1".to_string(),
            path: PathBuf::from("/tmp/s1.jsonl"),
            sessions: built.sessions,
            errors: parsed.errors,
            stats: parsed.stats,
            failures: built.failures,
        }
    }

    #[test]
    fn message_text_skips_tool_blocks() {
        let content = json!([
            {"type": "thinking", "thinking": "step by step"},
            {"type": "tool_use", "name": "search"},
            {"type": "text", "text": " done "}
        ]);
        assert_eq!(message_text(&content), "step by step\n\ndone");
        assert_eq!(message_text(&json!([{"type": "tool_result"}])), "");
    }

    #[test]
    fn session_markdown_numbers_text_messages() {
        let uri = SessionUri::parse("chainlog://s1").expect("uri");
        let markdown = render_session_markdown(&uri, &load(), false);

        assert!(markdown.starts_with("# Session\n\n- URI: `chainlog://s1`"));
        assert!(markdown.contains("## hello\n\n"));
        assert!(markdown.contains("### 1. User\n\nhello"));
        assert!(markdown.contains("### 2. Assistant\n\ndone"));
        assert!(!markdown.contains("### 3."));
        assert!(!markdown.contains("## Diagnostics"));
    }

    #[test]
    fn diagnostics_list_parse_errors() {
        let uri = SessionUri::parse("chainlog://s1").expect("uri");
        let markdown = render_session_markdown(&uri, &load(), true);
        assert!(markdown.contains("## Diagnostics"));
        assert!(markdown.contains("- Errors: 1"));
        assert!(markdown.contains("- line 4 (`unknown`):"));
    }

    #[test]
    fn empty_listing_has_placeholder() {
        assert!(render_listing_markdown(&[]).contains("_No sessions found._"));
    }

    #[test]
    fn raw_json_includes_stats() {
        let raw = to_raw_json(&load()).expect("json");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        assert_eq!(value["stats"]["chain_nodes"], 3);
        assert_eq!(value["sessions"][0]["label"], "hello");
    }
}
