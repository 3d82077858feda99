use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::record::{self, Record};

const ERROR_LINE_MAX_CHARS: usize = 200;

// Summaries starting with one of these are failed summarization attempts and
// must never become a label.
const API_ERROR_PREFIXES: &[&str] = &[
    "API Error",
    "Invalid API key",
    "Please run /login",
    "Credit balance is too low",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ChainNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub raw: Value,
    pub line_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub summary_text: String,
    pub leaf_id: String,
    pub line_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomTitleEntry {
    pub title: String,
    pub line_number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub line_number: usize,
    pub message: String,
    pub line: String,
    pub record_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub total_lines: usize,
    pub chain_nodes: usize,
    pub duplicate_nodes: usize,
    pub summaries: usize,
    pub custom_titles: usize,
    pub queue_operations: usize,
    pub errors: usize,
    pub blank_lines: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedChain {
    pub nodes: HashMap<String, ChainNode>,
    pub order: Vec<String>,
    pub summaries: HashMap<String, SummaryEntry>,
    pub custom_title: Option<CustomTitleEntry>,
    pub errors: Vec<ParseError>,
    pub stats: ParseStats,
}

impl ParsedChain {
    pub fn node(&self, id: &str) -> Option<&ChainNode> {
        self.nodes.get(id)
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &ChainNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }
}

pub fn is_api_error_summary(summary: &str) -> bool {
    let trimmed = summary.trim_start();
    API_ERROR_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

fn truncate_line(line: &str) -> String {
    match line.char_indices().nth(ERROR_LINE_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

pub fn parse_chain(content: &str, source: Option<&str>) -> ParsedChain {
    let mut parsed = ParsedChain::default();
    let source = source.unwrap_or("<memory>");

    for (line_idx, line) in content.lines().enumerate() {
        let line_number = line_idx + 1;
        parsed.stats.total_lines += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            parsed.stats.blank_lines += 1;
            continue;
        }

        let value = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => value,
            Err(err) => {
                push_error(&mut parsed, source, line_number, err.to_string(), trimmed, None);
                continue;
            }
        };

        match record::classify(&value) {
            Ok(Record::CustomTitle(title)) => {
                parsed.stats.custom_titles += 1;
                parsed.custom_title = Some(CustomTitleEntry {
                    title: title.custom_title,
                    line_number,
                });
            }
            Ok(Record::Summary(summary)) => {
                parsed.stats.summaries += 1;
                if is_api_error_summary(&summary.summary) {
                    debug!(source, line_number, "dropping api error summary");
                    continue;
                }
                parsed.summaries.insert(
                    summary.leaf_uuid.clone(),
                    SummaryEntry {
                        summary_text: summary.summary,
                        leaf_id: summary.leaf_uuid,
                        line_number,
                    },
                );
            }
            Ok(Record::ChainNode(fields)) => {
                if parsed.nodes.contains_key(&fields.uuid) {
                    parsed.stats.duplicate_nodes += 1;
                    continue;
                }
                parsed.stats.chain_nodes += 1;
                let parent_id = fields.resolved_parent().map(ToString::to_string);
                parsed.order.push(fields.uuid.clone());
                parsed.nodes.insert(
                    fields.uuid.clone(),
                    ChainNode {
                        id: fields.uuid,
                        parent_id,
                        raw: value,
                        line_number,
                    },
                );
            }
            Ok(Record::QueueOperation) => {
                parsed.stats.queue_operations += 1;
            }
            Err(err) => {
                push_error(
                    &mut parsed,
                    source,
                    line_number,
                    err.message,
                    trimmed,
                    err.record_type,
                );
            }
        }
    }

    parsed
}

fn push_error(
    parsed: &mut ParsedChain,
    source: &str,
    line_number: usize,
    message: String,
    line: &str,
    record_type: Option<String>,
) {
    debug!(source, line_number, error = %message, "skipping unparseable line");
    parsed.stats.errors += 1;
    parsed.errors.push(ParseError {
        line_number,
        message,
        line: truncate_line(line),
        record_type,
    });
}
