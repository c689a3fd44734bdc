// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{ConversationId, OrderId, UserId};

/// Status of a conversation and its linked order
///
/// ```text
/// open -> in_progress -> { completed, cancelled, closed }
/// any  -> removed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// The order is published, specialists negotiate with the client.
    Open,
    /// A specialist was chosen and the job is being done.
    InProgress,
    Completed,
    Cancelled,
    /// The conversation was closed for the viewer, e.g. because another specialist was chosen.
    Closed,
    /// The conversation was deleted.
    Removed,
}

impl ConversationStatus {
    /// Position of the status in the lifecycle
    ///
    /// A conversation never moves to a status with a lower rank. The terminal states share a
    /// rank, and there is no transition between them.
    pub fn rank(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Cancelled | Self::Closed => 2,
            Self::Removed => 3,
        }
    }

    pub fn accepts_messages(self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }

    /// Whether the order is finished and a review can be given.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Closed)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Closed => "closed",
            Self::Removed => "removed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub status: ConversationStatus,
    pub participants: Vec<Participant>,
    pub order_id: OrderId,
    /// The client who published the order
    pub order_owner_id: UserId,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn participant(&self, user_id: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: UserId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn display_name(&self, user_id: UserId) -> Option<&str> {
        self.participant(user_id).map(|p| p.display_name.as_str())
    }

    pub fn is_order_owner(&self, user_id: UserId) -> bool {
        self.order_owner_id == user_id
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_ranks_are_monotonic_along_the_lifecycle() {
        use ConversationStatus::*;
        assert!(Open.rank() < InProgress.rank());
        for finished in [Completed, Cancelled, Closed] {
            assert!(InProgress.rank() < finished.rank());
            assert!(finished.rank() < Removed.rank());
            assert!(finished.is_finished());
            assert!(!finished.accepts_messages());
        }
        assert!(!Removed.accepts_messages());
        assert!(!Removed.is_finished());
    }

    #[test]
    fn status_wire_format() {
        let status: ConversationStatus = serde_json::from_str(r#""in_progress""#).unwrap();
        assert_eq!(status, ConversationStatus::InProgress);
        assert_eq!(
            serde_json::to_string(&ConversationStatus::Removed).unwrap(),
            r#""removed""#
        );
    }

    #[test]
    fn deserialize_conversation() {
        let json = r#"{
            "id": 7,
            "status": "open",
            "participants": [
                { "userId": 1, "displayName": "Alice", "isActive": true },
                { "userId": 2, "displayName": "Bob", "isActive": true }
            ],
            "orderId": 70,
            "orderOwnerId": 1,
            "updatedAt": "2026-01-02T10:00:00Z"
        }"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conversation.id, ConversationId::new(7));
        assert_eq!(conversation.display_name(UserId::new(2)), Some("Bob"));
        assert!(conversation.is_order_owner(UserId::new(1)));
        assert!(!conversation.is_order_owner(UserId::new(2)));
    }
}
