// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Messages as displayed in a conversation

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use gigcommon::{
    identifiers::{ConversationId, MessageId, UserId},
    messages::{MessageType, ServerMessage},
};
use uuid::Uuid;

mod store;

pub use store::{EchoOutcome, MessageStore, Reconciled};

/// Local key of a message that was not yet acknowledged by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display(fmt = "{}", _0)]
pub struct TempKey(Uuid);

impl TempKey {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

/// Delivery state of a locally pending message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message is being sent.
    InFlight,
    /// Sending failed with a transient error; the message can be retried.
    Failed,
}

/// Identity of a message
///
/// A locally sent message starts as [`MessageKey::LocalPending`] and is replaced by a
/// [`MessageKey::Confirmed`] message once its backend counterpart is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    LocalPending { temp_key: TempKey, delivery: Delivery },
    Confirmed { id: MessageId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    key: MessageKey,
    conversation_id: ConversationId,
    sender_id: UserId,
    content: String,
    message_type: MessageType,
    created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a new locally pending text message.
    pub fn pending(
        temp_key: TempKey,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: MessageKey::LocalPending {
                temp_key,
                delivery: Delivery::InFlight,
            },
            conversation_id,
            sender_id,
            content,
            message_type: MessageType::Text,
            created_at,
        }
    }

    pub fn key(&self) -> MessageKey {
        self.key
    }

    pub fn id(&self) -> Option<MessageId> {
        match self.key {
            MessageKey::Confirmed { id } => Some(id),
            MessageKey::LocalPending { .. } => None,
        }
    }

    pub fn temp_key(&self) -> Option<TempKey> {
        match self.key {
            MessageKey::LocalPending { temp_key, .. } => Some(temp_key),
            MessageKey::Confirmed { .. } => None,
        }
    }

    pub fn delivery(&self) -> Option<Delivery> {
        match self.key {
            MessageKey::LocalPending { delivery, .. } => Some(delivery),
            MessageKey::Confirmed { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.key, MessageKey::LocalPending { .. })
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn sender_id(&self) -> UserId {
        self.sender_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Display order: by creation time, confirmed before pending messages, then by id.
    ///
    /// Pending messages compare equal among each other, so a stable sort keeps them in the
    /// order they were sent.
    pub(crate) fn display_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.is_pending().cmp(&other.is_pending()))
            .then_with(|| self.id().cmp(&other.id()))
    }

    /// Whether `server` is the backend counterpart of this pending message.
    fn is_echoed_by(&self, server: &ServerMessage, window: chrono::TimeDelta) -> bool {
        self.is_pending()
            && self.conversation_id == server.conversation_id
            && self.sender_id == server.sender_id
            && self.content == server.content
            && (self.created_at - server.created_at).abs() <= window
    }
}

impl From<ServerMessage> for Message {
    fn from(message: ServerMessage) -> Self {
        Self {
            key: MessageKey::Confirmed { id: message.id },
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            created_at: message.created_at,
        }
    }
}
