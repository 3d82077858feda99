use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;

use crate::uri::SessionUri;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub session_id: String,
    pub timestamp: String,
    pub parent_id: Option<String>,
    pub role: MessageRole,
    pub content: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result_agent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubagentSession {
    pub agent_id: String,
    pub messages: Vec<StoredMessage>,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub label: String,
    pub messages: Vec<StoredMessage>,
    pub created: String,
    pub last_request_started: Option<String>,
    pub last_request_ended: String,
    pub subagents: Vec<SubagentSession>,
}

impl Session {
    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            label: self.label.clone(),
            created: self.created.clone(),
            last_request_started: self.last_request_started.clone(),
            last_request_ended: self.last_request_ended.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMetadata {
    pub label: String,
    pub created: String,
    pub last_request_started: Option<String>,
    pub last_request_ended: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionListing {
    pub uri: String,
    pub session_id: String,
    pub path: PathBuf,
    #[serde(skip_serializing)]
    pub modified: SystemTime,
    #[serde(flatten)]
    pub metadata: SessionMetadata,
}

impl SessionListing {
    pub fn new(
        uri: &SessionUri,
        path: PathBuf,
        modified: SystemTime,
        metadata: SessionMetadata,
    ) -> Self {
        Self {
            uri: uri.as_string(),
            session_id: uri.session_id.clone(),
            path,
            modified,
            metadata,
        }
    }
}
