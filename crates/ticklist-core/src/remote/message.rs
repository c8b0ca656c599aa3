//! Realtime channel message types
//!
//! Frames exchanged with the change-notification websocket. The channel
//! speaks Phoenix-style JSON frames: a client joins one topic per
//! (table, user) pair and receives INSERT/UPDATE/DELETE events carrying the
//! full updated row. A heartbeat frame keeps the socket alive.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chrono::{DateTime, Utc};

/// Join acknowledgement / lifecycle event name
pub const EVENT_JOIN: &str = "phx_join";
/// Heartbeat event name
pub const EVENT_HEARTBEAT: &str = "heartbeat";
/// Topic used for heartbeat frames
pub const TOPIC_PHOENIX: &str = "phoenix";

/// Row change event names delivered on a joined topic
pub const CHANGE_EVENTS: [&str; 3] = ["INSERT", "UPDATE", "DELETE"];

/// One websocket frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    /// Join a change topic
    pub fn join(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// Keep-alive frame
    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: TOPIC_PHOENIX.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// Serialize for the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a frame off the wire
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Whether this frame carries a row change
    pub fn is_change(&self) -> bool {
        CHANGE_EVENTS.contains(&self.event.as_str())
    }
}

/// Payload of a row change frame
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePayload {
    /// The row after the change (insert/update)
    #[serde(default)]
    pub record: Option<Value>,
    /// The row before the change (delete)
    #[serde(default)]
    pub old_record: Option<Value>,
    #[serde(default)]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangePayload {
    /// The row this change is about: the new row when present, otherwise
    /// the old one (deletes deliver only the prior row)
    pub fn row(&self) -> Option<&Value> {
        self.record.as_ref().or(self.old_record.as_ref())
    }
}

/// Build the change topic for one (table, user) pair
pub fn change_topic(table: &str, user_id: &str) -> String {
    format!("realtime:public:{}:user_id=eq.{}", table, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_frame_round_trip() {
        let frame = Frame::join("realtime:public:todos:user_id=eq.u-1", 1);
        let encoded = frame.encode().unwrap();
        let decoded = Frame::decode(&encoded).unwrap();

        assert_eq!(decoded.topic, "realtime:public:todos:user_id=eq.u-1");
        assert_eq!(decoded.event, EVENT_JOIN);
        assert_eq!(decoded.reference.as_deref(), Some("1"));
    }

    #[test]
    fn test_change_detection() {
        let mut frame = Frame::heartbeat(2);
        assert!(!frame.is_change());

        frame.event = "UPDATE".to_string();
        assert!(frame.is_change());
    }

    #[test]
    fn test_change_payload_prefers_new_row() {
        let payload: ChangePayload = serde_json::from_value(serde_json::json!({
            "record": {"user_id": "u-1", "data": []},
            "old_record": {"user_id": "u-1", "data": [{"id": "t-1"}]}
        }))
        .unwrap();

        let row = payload.row().unwrap();
        assert_eq!(row["data"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_change_payload_falls_back_to_old_row() {
        let payload: ChangePayload = serde_json::from_value(serde_json::json!({
            "old_record": {"user_id": "u-1"}
        }))
        .unwrap();
        assert!(payload.row().is_some());

        let empty: ChangePayload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.row().is_none());
    }

    #[test]
    fn test_change_topic() {
        assert_eq!(
            change_topic("todos", "u-1"),
            "realtime:public:todos:user_id=eq.u-1"
        );
    }
}
