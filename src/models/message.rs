use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    /// App-originated notices (greetings, toggles) rendered in the assistant
    /// column but never sent to the remote model.
    SystemNotice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Streaming,
    Complete,
    Errored,
}

/// A grounding source reference attached by the remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub uri: Option<String>,
    pub title: Option<String>,
}

/// What the transcript shows for an attached file: the name, plus a data URI
/// when the attachment is an inline image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub name: String,
    pub mime: String,
    pub image_data_uri: Option<String>,
}

/// One transcript entry. `content` holds the fragments in arrival order;
/// it only ever grows while the message is `Streaming` and is frozen after.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<String>,
    pub attachment: Option<AttachmentRef>,
    /// Set exactly once when streaming completes; never mutated after.
    pub citations: Option<Vec<Citation>>,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    fn new(role: Role, status: MessageStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: Vec::new(),
            attachment: None,
            citations: None,
            created_at: Utc::now(),
            status,
        }
    }

    /// A completed user message, optionally with an attachment reference.
    pub fn user(text: impl Into<String>, attachment: Option<AttachmentRef>) -> Self {
        let mut msg = Self::new(Role::User, MessageStatus::Complete);
        let text = text.into();
        if !text.is_empty() {
            msg.content.push(text);
        }
        msg.attachment = attachment;
        msg
    }

    /// An assistant message that will receive fragments while streaming.
    pub fn streaming_assistant() -> Self {
        Self::new(Role::Assistant, MessageStatus::Streaming)
    }

    /// An app-originated notice (greeting, toggle confirmation).
    pub fn notice(text: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::SystemNotice, MessageStatus::Complete);
        msg.content.push(text.into());
        msg
    }

    /// The display text: all fragments concatenated in arrival order.
    pub fn text(&self) -> String {
        self.content.concat()
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_complete() {
        let msg = Message::user("hello", None);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.status, MessageStatus::Complete);
        assert_eq!(msg.text(), "hello");
        assert!(msg.citations.is_none());
    }

    #[test]
    fn test_empty_user_text_yields_no_fragment() {
        let msg = Message::user("", None);
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_streaming_assistant_starts_empty() {
        let msg = Message::streaming_assistant();
        assert!(msg.is_streaming());
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn test_text_concatenates_in_order() {
        let mut msg = Message::streaming_assistant();
        msg.content.push("Hi".into());
        msg.content.push(" there!".into());
        assert_eq!(msg.text(), "Hi there!");
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Message::notice("a").id, Message::notice("a").id);
    }
}
