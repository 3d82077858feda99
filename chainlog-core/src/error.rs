use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainlogError {
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cannot determine home directory")]
    HomeDirectoryNotFound,

    #[error("session not found for session_id={session_id}")]
    SessionNotFound {
        session_id: String,
        searched_roots: Vec<PathBuf>,
    },

    #[error("subagent not found for session_id={session_id} agent_id={agent_id}")]
    SubagentNotFound {
        session_id: String,
        agent_id: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ChainlogError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ChainlogError>;
