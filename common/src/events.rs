// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire format of the push channels
//!
//! Every conversation has two channels:
//!
//! * the public conversation channel carrying [`ConversationEvent`]s, and
//! * the private presence channel carrying ephemeral [`TypingEvent`]s which are triggered by the
//!   clients themselves and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    conversation::ConversationStatus,
    identifiers::{ConversationId, UserId},
    messages::ServerMessage,
};

pub const NEW_MESSAGE_EVENT: &str = "new-message";
pub const STATUS_CHANGED_EVENT: &str = "status-changed";
pub const CONVERSATION_DELETED_EVENT: &str = "conversation-deleted";
pub const CLIENT_TYPING_EVENT: &str = "client-typing";

pub fn conversation_channel(conversation_id: ConversationId) -> String {
    format!("conversation.{conversation_id}")
}

pub fn presence_channel(conversation_id: ConversationId) -> String {
    format!("private-conversation.{conversation_id}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    NewMessage(ServerMessage),
    StatusChanged(StatusChange),
    Deleted { conversation_id: ConversationId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub conversation_id: ConversationId,
    pub status: ConversationStatus,
    /// Time of the change on the backend; older backends don't send it.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedPayload {
    conversation_id: ConversationId,
}

impl ConversationEvent {
    /// Decodes an event received on the conversation channel.
    ///
    /// Returns `Ok(None)` for events this client does not know.
    pub fn decode(event: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match event {
            NEW_MESSAGE_EVENT => Self::NewMessage(serde_json::from_value(data)?),
            STATUS_CHANGED_EVENT => Self::StatusChanged(serde_json::from_value(data)?),
            CONVERSATION_DELETED_EVENT => {
                let DeletedPayload { conversation_id } = serde_json::from_value(data)?;
                Self::Deleted { conversation_id }
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn conversation_id(&self) -> ConversationId {
        match self {
            Self::NewMessage(message) => message.conversation_id,
            Self::StatusChanged(change) => change.conversation_id,
            Self::Deleted { conversation_id } => *conversation_id,
        }
    }
}

/// A participant started or stopped typing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub user_id: UserId,
    #[serde(default)]
    pub display_name: Option<String>,
    pub is_typing: bool,
}

impl TypingEvent {
    /// Decodes an event received on the presence channel.
    ///
    /// Returns `Ok(None)` for events other than typing events.
    pub fn decode(event: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        if event != CLIENT_TYPING_EVENT {
            return Ok(None);
        }
        serde_json::from_value(data).map(Some)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::identifiers::MessageId;

    use super::*;

    #[test]
    fn decode_new_message() {
        let event = ConversationEvent::decode(
            NEW_MESSAGE_EVENT,
            json!({
                "id": 501,
                "conversationId": 7,
                "senderId": 2,
                "content": "hello",
                "createdAt": "2026-01-02T10:00:00Z",
            }),
        )
        .unwrap()
        .unwrap();
        let ConversationEvent::NewMessage(message) = event else {
            panic!("unexpected event: {event:?}");
        };
        assert_eq!(message.id, MessageId::new(501));
        assert_eq!(message.message_type, crate::messages::MessageType::Text);
        assert_eq!(message.conversation_id, ConversationId::new(7));
    }

    #[test]
    fn decode_status_changed_without_timestamp() {
        let event = ConversationEvent::decode(
            STATUS_CHANGED_EVENT,
            json!({ "conversationId": 7, "status": "closed" }),
        )
        .unwrap();
        assert_eq!(
            event,
            Some(ConversationEvent::StatusChanged(StatusChange {
                conversation_id: ConversationId::new(7),
                status: ConversationStatus::Closed,
                updated_at: None,
            }))
        );
    }

    #[test]
    fn decode_deleted() {
        let event =
            ConversationEvent::decode(CONVERSATION_DELETED_EVENT, json!({ "conversationId": 7 }))
                .unwrap()
                .unwrap();
        assert_eq!(event.conversation_id(), ConversationId::new(7));
    }

    #[test]
    fn unknown_events_are_ignored() {
        assert_eq!(
            ConversationEvent::decode("pusher:subscription_succeeded", json!({})).unwrap(),
            None
        );
        assert_eq!(TypingEvent::decode(NEW_MESSAGE_EVENT, json!({})).unwrap(), None);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(ConversationEvent::decode(NEW_MESSAGE_EVENT, json!({ "id": "x" })).is_err());
    }

    #[test]
    fn typing_event_round_trip() {
        let event = TypingEvent {
            user_id: UserId::new(2),
            display_name: Some("Bob".to_owned()),
            is_typing: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({ "userId": 2, "displayName": "Bob", "isTyping": true })
        );
        assert_eq!(
            TypingEvent::decode(CLIENT_TYPING_EVENT, value).unwrap(),
            Some(event)
        );
    }

    #[test]
    fn channel_names() {
        let id = ConversationId::new(42);
        assert_eq!(conversation_channel(id), "conversation.42");
        assert_eq!(presence_channel(id), "private-conversation.42");
    }
}
