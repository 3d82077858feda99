use std::collections::HashSet;
use std::path::Path;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::chain::is_api_error_summary;
use crate::error::{ChainlogError, Result};
use crate::model::{MessageRole, SessionMetadata};
use crate::record::{self, Record};
use crate::session::is_visible;
use crate::text::{self, FALLBACK_LABEL};

const CANDIDATE_MARKERS: &[&str] = &[
    "\"user\"",
    "\"assistant\"",
    "\"system\"",
    "\"summary\"",
    "\"custom-title\"",
    "\"content\"",
    "\"uuid\"",
];

fn is_candidate(line: &str) -> bool {
    CANDIDATE_MARKERS.iter().any(|marker| line.contains(marker))
}

#[derive(Debug, Clone, Default)]
pub struct MetadataScan {
    custom_title: Option<String>,
    summaries: Vec<(String, String)>,
    seen_ids: HashSet<String>,
    created: Option<String>,
    last_message: Option<String>,
    first_user_seen: bool,
    first_user_label: Option<String>,
    last_request_started: Option<String>,
}

impl MetadataScan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || !is_candidate(trimmed) {
            return;
        }

        let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
            return;
        };

        match record::classify(&value) {
            Ok(Record::CustomTitle(title)) => self.custom_title = Some(title.custom_title),
            Ok(Record::Summary(summary)) => {
                if !is_api_error_summary(&summary.summary) {
                    self.summaries.push((summary.leaf_uuid, summary.summary));
                }
            }
            Ok(Record::ChainNode(fields)) => {
                if !self.seen_ids.insert(fields.uuid.clone()) {
                    return;
                }
                if !is_visible(&value) {
                    return;
                }
                let Some(message) = record::revive(&value, fields.resolved_parent()) else {
                    return;
                };

                if self.created.is_none() {
                    self.created = Some(message.timestamp.clone());
                }
                if !self.first_user_seen && message.role == MessageRole::User {
                    self.first_user_seen = true;
                    self.first_user_label = text::message_label(&message);
                }
                if text::is_genuine_request(&message) {
                    self.last_request_started = Some(message.timestamp.clone());
                }
                self.last_message = Some(message.timestamp);
            }
            Ok(Record::QueueOperation) | Err(_) => {}
        }
    }

    pub fn finish(self) -> Option<SessionMetadata> {
        let created = self.created?;
        let last_request_ended = self.last_message.unwrap_or_else(|| created.clone());

        let title = self
            .custom_title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(ToString::to_string);
        let summary = self
            .summaries
            .iter()
            .rev()
            .find(|(leaf_id, _)| self.seen_ids.contains(leaf_id))
            .map(|(_, summary)| summary.trim())
            .filter(|summary| !summary.is_empty())
            .map(ToString::to_string);

        let label = title
            .or(summary)
            .or(self.first_user_label)
            .unwrap_or_else(|| FALLBACK_LABEL.to_string());

        Some(SessionMetadata {
            label,
            created,
            last_request_started: self.last_request_started,
            last_request_ended,
        })
    }
}

pub fn extract_metadata(content: &str) -> Option<SessionMetadata> {
    let mut scan = MetadataScan::new();
    for line in content.lines() {
        scan.push_line(line);
    }
    scan.finish()
}

/// Scans a live stream line by line. The token is checked after every line
/// and raced against every read, so an abort mid-scan returns
/// [`ChainlogError::Cancelled`] even while a read is pending. `path` only
/// labels I/O errors.
pub async fn extract_metadata_stream<R>(
    reader: R,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<Option<SessionMetadata>>
where
    R: AsyncBufRead + Unpin,
{
    let mut segments = reader.split(b'\n');
    let mut scan = MetadataScan::new();

    loop {
        if cancel.is_cancelled() {
            return Err(ChainlogError::Cancelled);
        }

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ChainlogError::Cancelled),
            next = segments.next_segment() => next,
        };

        let segment = next.map_err(|source| ChainlogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let Some(bytes) = segment else {
            break;
        };
        scan.push_line(&String::from_utf8_lossy(&bytes));
    }

    Ok(scan.finish())
}

pub async fn extract_metadata_from_file(
    path: &Path,
    cancel: &CancellationToken,
) -> Result<Option<SessionMetadata>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| ChainlogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    extract_metadata_stream(BufReader::new(file), path, cancel).await
}
