//! Message records exchanged on the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Delivery priority; higher pulls first from an inbox.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Lane index, lowest first.
    pub(crate) fn lane(&self) -> usize {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

/// Kind of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
    Task,
    TaskResult,
    Query,
    Inform,
    System,
    Error,
    DebateTurn,
}

/// Message payload: opaque text plus optional structured fields.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessagePayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl MessagePayload {
    /// Text-only payload.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: None,
        }
    }

    /// Payload with structured data attached.
    pub fn with_data(content: impl Into<String>, data: Value) -> Self {
        Self {
            content: content.into(),
            data: Some(data),
        }
    }
}

/// A single record on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: String,
    /// Empty for broadcast and topic delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub kind: MessageKind,
    pub payload: MessagePayload,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message of the given kind.
    pub fn new(kind: MessageKind, sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            receiver: None,
            topic: None,
            kind,
            payload: MessagePayload::text(content),
            priority: Priority::Normal,
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Point-to-point request.
    pub fn request(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::Request, sender, content).to(receiver)
    }

    /// Task assignment.
    pub fn task(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(MessageKind::Task, sender, content).to(receiver)
    }

    /// Notification, typically for broadcast or topic delivery.
    pub fn inform(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(MessageKind::Inform, sender, content)
    }

    /// Set the receiver.
    pub fn to(mut self, receiver: impl Into<String>) -> Self {
        self.receiver = Some(receiver.into());
        self
    }

    /// Set the topic.
    pub fn on_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach structured data to the payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.payload.data = Some(data);
        self
    }

    /// Build a reply: endpoints flipped, correlation id carried over.
    pub fn reply(&self, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: self.receiver.clone().unwrap_or_default(),
            receiver: Some(self.sender.clone()),
            topic: None,
            kind: MessageKind::Response,
            payload: MessagePayload::text(content),
            priority: self.priority,
            correlation_id: self.correlation_id.or(Some(self.id)),
            timestamp: Utc::now(),
        }
    }

    /// Build an error reply.
    pub fn error_reply(&self, content: impl Into<String>) -> Self {
        let mut reply = self.reply(content);
        reply.kind = MessageKind::Error;
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn request_has_receiver_and_fresh_id() {
        let a = Message::request("alice", "bob", "ping");
        let b = Message::request("alice", "bob", "ping");
        assert_ne!(a.id, b.id);
        assert_eq!(a.receiver.as_deref(), Some("bob"));
        assert_eq!(a.kind, MessageKind::Request);
    }

    #[test]
    fn reply_flips_endpoints_and_correlates() {
        let request = Message::request("alice", "bob", "ping");
        let reply = request.reply("pong");

        assert_eq!(reply.sender, "bob");
        assert_eq!(reply.receiver.as_deref(), Some("alice"));
        assert_eq!(reply.kind, MessageKind::Response);
        assert_eq!(reply.correlation_id, Some(request.id));
    }

    #[test]
    fn reply_preserves_explicit_correlation() {
        let mut request = Message::request("alice", "bob", "ping");
        let corr = Uuid::new_v4();
        request.correlation_id = Some(corr);

        assert_eq!(request.reply("pong").correlation_id, Some(corr));
    }

    #[test]
    fn error_reply_kind() {
        let request = Message::request("alice", "bob", "ping");
        assert_eq!(request.error_reply("nope").kind, MessageKind::Error);
    }

    #[test]
    fn message_round_trips_through_json() {
        let msg = Message::inform("alice", "update")
            .on_topic("news")
            .with_priority(Priority::High)
            .with_data(json!({"k": 1}));

        let wire = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&wire).unwrap();

        assert_eq!(back.id, msg.id);
        assert_eq!(back.topic.as_deref(), Some("news"));
        assert_eq!(back.priority, Priority::High);
        assert_eq!(back.payload.data, Some(json!({"k": 1})));
    }
}
