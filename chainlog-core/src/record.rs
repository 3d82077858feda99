use serde::Deserialize;
use serde_json::Value;

use crate::model::{MessageRole, StoredMessage};

pub const CUSTOM_TITLE_TYPE: &str = "custom-title";
pub const SUMMARY_TYPE: &str = "summary";
pub const USER_TYPE: &str = "user";
pub const ASSISTANT_TYPE: &str = "assistant";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTitleRecord {
    pub custom_title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub summary: String,
    pub leaf_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainNodeFields {
    pub uuid: String,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub logical_parent_uuid: Option<String>,
}

impl ChainNodeFields {
    // `logicalParentUuid` wins over `parentUuid` so a compaction boundary can
    // point past itself to the pre-compaction message.
    pub fn resolved_parent(&self) -> Option<&str> {
        self.logical_parent_uuid
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| self.parent_uuid.as_deref().filter(|id| !id.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    CustomTitle(CustomTitleRecord),
    Summary(SummaryRecord),
    ChainNode(ChainNodeFields),
    QueueOperation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub message: String,
    pub record_type: Option<String>,
}

pub fn record_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

pub fn classify(value: &Value) -> Result<Record, RecordError> {
    if !value.is_object() {
        return Err(RecordError {
            message: "record is not a JSON object".to_string(),
            record_type: None,
        });
    }

    let kind = record_type(value);
    let invalid = |err: serde_json::Error| RecordError {
        message: err.to_string(),
        record_type: kind.map(ToString::to_string),
    };

    match kind {
        Some(CUSTOM_TITLE_TYPE) => {
            return CustomTitleRecord::deserialize(value)
                .map(Record::CustomTitle)
                .map_err(invalid);
        }
        Some(SUMMARY_TYPE) => {
            return SummaryRecord::deserialize(value)
                .map(Record::Summary)
                .map_err(invalid);
        }
        _ => {}
    }

    if value.get("uuid").is_none() {
        return Ok(Record::QueueOperation);
    }

    let fields = ChainNodeFields::deserialize(value).map_err(invalid)?;
    if fields.uuid.is_empty() {
        return Err(RecordError {
            message: "chain node has an empty uuid".to_string(),
            record_type: kind.map(ToString::to_string),
        });
    }
    Ok(Record::ChainNode(fields))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeContext {
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    uuid: String,
    session_id: String,
    timestamp: String,
    message: UserPayload,
    #[serde(default)]
    tool_use_result: Option<Value>,
    #[serde(flatten)]
    context: NodeContext,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    #[serde(default)]
    content: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssistantRecord {
    uuid: String,
    session_id: String,
    timestamp: String,
    message: AssistantPayload,
    #[serde(flatten)]
    context: NodeContext,
}

#[derive(Debug, Deserialize)]
struct AssistantPayload {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    #[allow(dead_code)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_creation_input_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
    pub cache_creation: Option<CacheCreation>,
    pub service_tier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheCreation {
    pub ephemeral_5m_input_tokens: Option<u64>,
    pub ephemeral_1h_input_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentRecord {
    uuid: String,
    session_id: String,
    timestamp: String,
    content: String,
    #[serde(flatten)]
    context: NodeContext,
}

pub fn revive(raw: &Value, parent_id: Option<&str>) -> Option<StoredMessage> {
    let parent_id = parent_id.map(ToString::to_string);

    match record_type(raw) {
        Some(USER_TYPE) => {
            let record = UserRecord::deserialize(raw).ok()?;
            let tool_result_agent_id = record
                .tool_use_result
                .as_ref()
                .and_then(|result| result.get("agentId"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
            Some(StoredMessage {
                id: record.uuid,
                session_id: record.session_id,
                timestamp: record.timestamp,
                parent_id,
                role: MessageRole::User,
                content: record.message.content,
                cwd: record.context.cwd,
                git_branch: record.context.git_branch,
                slug: record.context.slug,
                agent_id: record.context.agent_id,
                tool_result_agent_id,
            })
        }
        Some(ASSISTANT_TYPE) => {
            let record = AssistantRecord::deserialize(raw).ok()?;
            Some(StoredMessage {
                id: record.uuid,
                session_id: record.session_id,
                timestamp: record.timestamp,
                parent_id,
                role: MessageRole::Assistant,
                content: record.message.content,
                cwd: record.context.cwd,
                git_branch: record.context.git_branch,
                slug: record.context.slug,
                agent_id: record.context.agent_id,
                tool_result_agent_id: None,
            })
        }
        _ => {
            let record = ContentRecord::deserialize(raw).ok()?;
            Some(StoredMessage {
                id: record.uuid,
                session_id: record.session_id,
                timestamp: record.timestamp,
                parent_id,
                role: MessageRole::System,
                content: Value::String(record.content),
                cwd: record.context.cwd,
                git_branch: record.context.git_branch,
                slug: record.context.slug,
                agent_id: record.context.agent_id,
                tool_result_agent_id: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::model::MessageRole;
    use crate::record::{Record, classify, revive};

    #[test]
    fn custom_title_takes_precedence_over_chain_fields() {
        let value = json!({"type": "custom-title", "customTitle": "Refactor", "uuid": "u1"});
        let record = classify(&value).expect("classify");
        assert!(matches!(record, Record::CustomTitle(title) if title.custom_title == "Refactor"));
    }

    #[test]
    fn summary_requires_leaf_uuid() {
        let value = json!({"type": "summary", "summary": "Fix the parser"});
        let err = classify(&value).expect_err("must fail");
        assert_eq!(err.record_type.as_deref(), Some("summary"));
    }

    #[test]
    fn records_without_uuid_are_queue_operations() {
        let value = json!({"type": "queue-operation", "operation": "enqueue"});
        assert_eq!(classify(&value).expect("classify"), Record::QueueOperation);
    }

    #[test]
    fn non_object_values_are_rejected() {
        let err = classify(&json!([1, 2, 3])).expect_err("must fail");
        assert!(err.message.contains("not a JSON object"));
    }

    #[test]
    fn logical_parent_overrides_parent() {
        let value = json!({
            "type": "system",
            "uuid": "b",
            "parentUuid": null,
            "logicalParentUuid": "a"
        });
        let Record::ChainNode(fields) = classify(&value).expect("classify") else {
            panic!("expected chain node");
        };
        assert_eq!(fields.resolved_parent(), Some("a"));
    }

    #[test]
    fn assistant_with_null_usage_counters_validates() {
        let value = json!({
            "type": "assistant",
            "uuid": "a1",
            "parentUuid": "u1",
            "sessionId": "s1",
            "timestamp": "2026-02-23T00:00:01Z",
            "message": {
                "role": "assistant",
                "content": [{"type": "text", "text": "done"}],
                "usage": {
                    "input_tokens": 12,
                    "output_tokens": null,
                    "cache_read_input_tokens": null,
                    "cache_creation": {"ephemeral_5m_input_tokens": null}
                }
            }
        });
        let message = revive(&value, Some("u1")).expect("revive");
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.parent_id.as_deref(), Some("u1"));
    }

    #[test]
    fn user_tool_result_agent_id_is_lifted() {
        let value = json!({
            "type": "user",
            "uuid": "u2",
            "sessionId": "s1",
            "timestamp": "2026-02-23T00:00:02Z",
            "gitBranch": "main",
            "message": {"role": "user", "content": [{"type": "tool_result", "content": "ok"}]},
            "toolUseResult": {"agentId": "a4f21c7", "status": "completed"}
        });
        let message = revive(&value, None).expect("revive");
        assert_eq!(message.tool_result_agent_id.as_deref(), Some("a4f21c7"));
        assert_eq!(message.git_branch.as_deref(), Some("main"));
    }

    #[test]
    fn system_record_needs_string_content() {
        let value = json!({
            "type": "system",
            "subtype": "compact_boundary",
            "uuid": "c1",
            "sessionId": "s1",
            "timestamp": "2026-02-23T00:00:03Z"
        });
        assert!(revive(&value, None).is_none());
    }
}
