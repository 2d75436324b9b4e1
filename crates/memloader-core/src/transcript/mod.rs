//! ChatGPT export parsing.
//!
//! Reads the `conversations.json` file from a ChatGPT data export. Each
//! conversation stores its messages as a `mapping` of message id to node;
//! nodes without a message, system messages and empty messages are skipped.
//!
//! A single malformed conversation does not fail the import: it is logged
//! and left out. Only a file that is not a JSON array of objects is an error.

mod chunk;

pub use chunk::*;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

const UNTITLED: &str = "Untitled Conversation";

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    /// Author role as exported (`user`, `assistant`, `tool`, ...).
    pub role: String,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A parsed conversation with messages in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub messages: Vec<ChatMessage>,
}

/// Parse an export file from disk.
pub fn parse_export(path: impl AsRef<Path>) -> Result<Vec<Conversation>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(format!("Export file not found: {}", path.display())));
    }
    let content = std::fs::read_to_string(path)?;
    let conversations = parse_export_str(&content)?;
    info!("Parsed {} conversations from {}", conversations.len(), path.display());
    Ok(conversations)
}

/// Parse export JSON held in memory.
pub fn parse_export_str(json: &str) -> Result<Vec<Conversation>> {
    let data: Value =
        serde_json::from_str(json).map_err(|e| Error::Transcript(format!("Invalid JSON format: {}", e)))?;
    let Value::Array(items) = data else {
        return Err(Error::Transcript("Export must be a JSON array of conversations".into()));
    };

    let mut conversations = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match parse_conversation(item) {
            Some(conversation) => conversations.push(conversation),
            None => warn!("Skipping malformed conversation at index {}", index),
        }
    }
    Ok(conversations)
}

fn parse_conversation(data: &Value) -> Option<Conversation> {
    let obj = data.as_object()?;

    let id = obj.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    let mut messages: Vec<ChatMessage> = match obj.get("mapping") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(mapping)) => mapping
            .iter()
            .filter_map(|(message_id, node)| parse_message(message_id, node))
            .collect(),
        Some(_) => return None,
    };

    // Untimestamped messages first, ties broken by id
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    debug!("Conversation {} has {} messages", id, messages.len());

    Some(Conversation {
        id,
        title,
        created_at: obj.get("create_time").and_then(parse_timestamp),
        updated_at: obj.get("update_time").and_then(parse_timestamp),
        messages,
    })
}

fn parse_message(message_id: &str, node: &Value) -> Option<ChatMessage> {
    let message = node.get("message").filter(|m| m.is_object())?;

    let role = message
        .pointer("/author/role")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    if role == "system" {
        return None;
    }

    let parts = message.pointer("/content/parts").and_then(Value::as_array)?;
    let content = parts
        .iter()
        .filter_map(|part| match part {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null | Value::String(_) => None,
            // Non-text parts (images, attachments) keep their JSON form
            other => Some(other.to_string()),
        })
        .collect::<Vec<_>>()
        .join("\n");
    if content.trim().is_empty() {
        return None;
    }

    Some(ChatMessage {
        id: message_id.to_string(),
        role: role.to_string(),
        content,
        timestamp: message.get("create_time").and_then(parse_timestamp),
    })
}

/// Epoch seconds (possibly fractional) or an RFC 3339 string.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() {
                return None;
            }
            let whole = secs.trunc();
            let nanos = ((secs - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
            DateTime::from_timestamp(whole as i64, nanos)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn sample_export() -> Value {
        json!([
            {
                "id": "conv-1",
                "title": "Trip planning",
                "create_time": 1700000000.5,
                "update_time": "2023-11-15T10:00:00Z",
                "mapping": {
                    "root": { "message": null },
                    "sys": {
                        "message": {
                            "author": { "role": "system" },
                            "content": { "parts": ["You are a helpful assistant"] },
                            "create_time": 1700000000.0
                        }
                    },
                    "b": {
                        "message": {
                            "author": { "role": "assistant" },
                            "content": { "parts": ["Kyoto is lovely in spring."] },
                            "create_time": 1700000020.0
                        }
                    },
                    "a": {
                        "message": {
                            "author": { "role": "user" },
                            "content": { "parts": ["I want to visit Japan", ""] },
                            "create_time": 1700000010.0
                        }
                    },
                    "empty": {
                        "message": {
                            "author": { "role": "user" },
                            "content": { "parts": ["   "] }
                        }
                    }
                }
            },
            { "id": "conv-2", "title": null, "mapping": {} },
            "not a conversation"
        ])
    }

    #[test]
    fn test_parse_export_str() {
        let conversations = parse_export_str(&sample_export().to_string()).unwrap();
        assert_eq!(conversations.len(), 2);

        let trip = &conversations[0];
        assert_eq!(trip.id, "conv-1");
        assert_eq!(trip.title, "Trip planning");
        assert_eq!(trip.messages.len(), 2);
        assert_eq!(trip.messages[0].role, "user");
        assert_eq!(trip.messages[0].content, "I want to visit Japan");
        assert_eq!(trip.messages[1].role, "assistant");
        assert!(trip.created_at.is_some());
        assert_eq!(trip.updated_at.unwrap().to_rfc3339(), "2023-11-15T10:00:00+00:00");

        assert_eq!(conversations[1].title, UNTITLED);
        assert!(conversations[1].messages.is_empty());
    }

    #[test]
    fn test_messages_without_timestamp_sort_first() {
        let export = json!([{
            "id": "c",
            "mapping": {
                "late": { "message": { "author": { "role": "user" }, "content": { "parts": ["second"] }, "create_time": 5.0 } },
                "none": { "message": { "author": { "role": "user" }, "content": { "parts": ["first"] } } }
            }
        }]);
        let conversations = parse_export_str(&export.to_string()).unwrap();
        let contents: Vec<_> = conversations[0].messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(parse_export_str("{not json"), Err(Error::Transcript(_))));
        assert!(matches!(parse_export_str("{}"), Err(Error::Transcript(_))));
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp(&json!(1700000000.25)).unwrap();
        assert_eq!(ts.timestamp(), 1700000000);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
        assert!(parse_timestamp(&json!("2024-02-01T08:30:00+02:00")).is_some());
        assert!(parse_timestamp(&json!("yesterday")).is_none());
        assert!(parse_timestamp(&json!(null)).is_none());
    }

    #[test]
    fn test_parse_export_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample_export()).unwrap();

        let conversations = parse_export(file.path()).unwrap();
        assert_eq!(conversations.len(), 2);
    }

    #[test]
    fn test_parse_export_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_export(dir.path().join("conversations.json")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
