use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ChainlogError, Result};

pub const SCHEME: &str = "chainlog";

static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionUri {
    pub session_id: String,
    pub agent_id: Option<String>,
}

impl SessionUri {
    pub fn parse(input: &str) -> Result<Self> {
        input.parse()
    }

    pub fn for_session(session_id: &str) -> Result<Self> {
        if !is_valid_id(session_id) {
            return Err(ChainlogError::InvalidSessionId(session_id.to_string()));
        }
        Ok(Self {
            session_id: session_id.to_string(),
            agent_id: None,
        })
    }

    pub fn main_session(&self) -> Self {
        Self {
            session_id: self.session_id.clone(),
            agent_id: None,
        }
    }

    pub fn as_string(&self) -> String {
        match &self.agent_id {
            Some(agent_id) => format!("{SCHEME}://{}/{agent_id}", self.session_id),
            None => format!("{SCHEME}://{}", self.session_id),
        }
    }
}

impl fmt::Display for SessionUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl FromStr for SessionUri {
    type Err = ChainlogError;

    fn from_str(input: &str) -> Result<Self> {
        let (scheme, target) = input
            .split_once("://")
            .ok_or_else(|| ChainlogError::InvalidUri(input.to_string()))?;

        if scheme != SCHEME {
            return Err(ChainlogError::InvalidUri(input.to_string()));
        }

        let mut segments = target.split('/');
        let session_id = segments.next().unwrap_or_default();
        let agent_id = segments.next();

        if segments.next().is_some() {
            return Err(ChainlogError::InvalidUri(input.to_string()));
        }

        if !is_valid_id(session_id) {
            return Err(ChainlogError::InvalidSessionId(session_id.to_string()));
        }

        let agent_id = match agent_id {
            Some(agent_id) => {
                let normalized = normalize_agent_id(agent_id);
                if !is_valid_id(normalized) {
                    return Err(ChainlogError::InvalidSessionId(agent_id.to_string()));
                }
                Some(normalized.to_string())
            }
            None => None,
        };

        Ok(Self {
            session_id: session_id.to_string(),
            agent_id,
        })
    }
}

pub fn is_valid_id(id: &str) -> bool {
    ID_RE.is_match(id)
}

pub fn normalize_agent_id(agent_id: &str) -> &str {
    agent_id.strip_prefix("agent-").unwrap_or(agent_id)
}
