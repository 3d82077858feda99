use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::chain::{ParsedChain, SummaryEntry};
use crate::model::{MessageRole, Session, StoredMessage, SubagentSession};
use crate::record::{self, ASSISTANT_TYPE, USER_TYPE};
use crate::text::{self, FALLBACK_LABEL};

const HIDING_FLAGS: &[&str] = &["isCompactSummary", "isMeta", "isVisibleInTranscriptOnly"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeafFailure {
    pub leaf_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuiltSessions {
    pub sessions: Vec<Session>,
    pub failures: Vec<LeafFailure>,
}

pub fn is_visible(raw: &Value) -> bool {
    let hidden = HIDING_FLAGS
        .iter()
        .any(|flag| raw.get(*flag).and_then(Value::as_bool).unwrap_or(false));
    if hidden {
        return false;
    }

    match record::record_type(raw) {
        Some(USER_TYPE | ASSISTANT_TYPE) => raw.get("message").is_some_and(Value::is_object),
        _ => raw
            .get("content")
            .and_then(Value::as_str)
            .is_some_and(|content| !content.is_empty()),
    }
}

pub fn find_leaves(chain: &ParsedChain) -> Vec<&str> {
    let referenced = chain
        .nodes
        .values()
        .filter_map(|node| node.parent_id.as_deref())
        .collect::<HashSet<_>>();

    chain
        .order
        .iter()
        .map(String::as_str)
        .filter(|id| !referenced.contains(id))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct WalkedChain<'a> {
    pub messages: Vec<StoredMessage>,
    pub visited: HashSet<String>,
    pub summary: Option<&'a SummaryEntry>,
    pub session_id: Option<String>,
}

pub fn walk_chain<'a>(chain: &'a ParsedChain, leaf_id: &str) -> WalkedChain<'a> {
    let mut walked = WalkedChain::default();
    let mut current = Some(leaf_id.to_string());

    while let Some(id) = current {
        if !walked.visited.insert(id.clone()) {
            debug!(node_id = %id, "cycle detected while walking chain");
            break;
        }

        let Some(node) = chain.node(&id) else {
            break;
        };

        // The latest summary written for any node on the chain labels it.
        if let Some(summary) = chain.summaries.get(&id)
            && walked
                .summary
                .is_none_or(|current| summary.line_number > current.line_number)
        {
            walked.summary = Some(summary);
        }

        if is_visible(&node.raw)
            && let Some(message) = record::revive(&node.raw, node.parent_id.as_deref())
        {
            if walked.session_id.is_none() {
                walked.session_id = Some(message.session_id.clone());
            }
            walked.messages.push(message);
        }

        current = node.parent_id.clone();
    }

    walked.messages.reverse();
    walked
}

fn merge_parallel_siblings(chain: &ParsedChain, walked: &mut WalkedChain<'_>) {
    let assistant_ids = walked
        .messages
        .iter()
        .filter(|message| message.role == MessageRole::Assistant)
        .map(|message| message.id.clone())
        .collect::<HashSet<_>>();

    let mut siblings = HashMap::<String, Vec<StoredMessage>>::new();
    for node in chain.iter_nodes() {
        if walked.visited.contains(&node.id) {
            continue;
        }
        let Some(parent_id) = node.parent_id.as_deref() else {
            continue;
        };
        if !assistant_ids.contains(parent_id) || !is_visible(&node.raw) {
            continue;
        }
        let Some(message) = record::revive(&node.raw, Some(parent_id)) else {
            continue;
        };
        if message.role != MessageRole::User {
            continue;
        }

        walked.visited.insert(node.id.clone());
        siblings
            .entry(parent_id.to_string())
            .or_default()
            .push(message);
    }

    if siblings.is_empty() {
        return;
    }

    let mut merged = Vec::with_capacity(walked.messages.len());
    for message in walked.messages.drain(..) {
        let extra = siblings.remove(&message.id);
        merged.push(message);
        merged.extend(extra.into_iter().flatten());
    }
    walked.messages = merged;
}

fn derive_label(chain: &ParsedChain, walked: &WalkedChain<'_>) -> String {
    if let Some(title) = chain
        .custom_title
        .as_ref()
        .map(|title| title.title.trim())
        .filter(|title| !title.is_empty())
    {
        return title.to_string();
    }

    if let Some(summary) = walked
        .summary
        .map(|summary| summary.summary_text.trim())
        .filter(|summary| !summary.is_empty())
    {
        return summary.to_string();
    }

    walked
        .messages
        .iter()
        .find(|message| message.role == MessageRole::User)
        .and_then(text::message_label)
        .unwrap_or_else(|| FALLBACK_LABEL.to_string())
}

fn last_request_started(messages: &[StoredMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|message| text::is_genuine_request(message))
        .map(|message| message.timestamp.clone())
}

fn build_from_leaf(chain: &ParsedChain, leaf_id: &str) -> Result<Session, LeafFailure> {
    let mut walked = walk_chain(chain, leaf_id);
    let Some(session_id) = walked.session_id.clone() else {
        return Err(LeafFailure {
            leaf_id: leaf_id.to_string(),
            reason: "chain has no visible messages".to_string(),
        });
    };

    merge_parallel_siblings(chain, &mut walked);
    let label = derive_label(chain, &walked);
    let messages = walked.messages;
    let created = messages
        .first()
        .map(|message| message.timestamp.clone())
        .unwrap_or_default();
    let last_request_ended = messages
        .last()
        .map(|message| message.timestamp.clone())
        .unwrap_or_default();

    Ok(Session {
        id: session_id,
        label,
        last_request_started: last_request_started(&messages),
        created,
        last_request_ended,
        messages,
        subagents: Vec::new(),
    })
}

// Builds one session per leaf and keeps, per session id, the candidate with
// the most messages. Ties keep the earlier leaf.
pub fn build_sessions(chain: &ParsedChain) -> BuiltSessions {
    let mut built = BuiltSessions::default();
    let mut index_by_id = HashMap::<String, usize>::new();

    for leaf_id in find_leaves(chain) {
        let session = match build_from_leaf(chain, leaf_id) {
            Ok(session) => session,
            Err(failure) => {
                debug!(leaf_id, reason = %failure.reason, "leaf produced no session");
                built.failures.push(failure);
                continue;
            }
        };

        match index_by_id.get(&session.id) {
            Some(&index) => {
                if session.messages.len() > built.sessions[index].messages.len() {
                    built.sessions[index] = session;
                }
            }
            None => {
                index_by_id.insert(session.id.clone(), built.sessions.len());
                built.sessions.push(session);
            }
        }
    }

    built
}

pub fn build_subagent_session(chain: &ParsedChain, agent_id: &str) -> Option<SubagentSession> {
    let messages = find_leaves(chain)
        .into_iter()
        .map(|leaf_id| walk_chain(chain, leaf_id).messages)
        .fold(Vec::new(), |best, candidate| {
            if candidate.len() > best.len() {
                candidate
            } else {
                best
            }
        });

    let timestamp = messages.first()?.timestamp.clone();
    Some(SubagentSession {
        agent_id: agent_id.to_string(),
        messages,
        timestamp,
    })
}
