// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Order lifecycle actions and feedback

use serde::{Deserialize, Serialize};

use crate::identifiers::{OrderId, UserId};

/// An explicit lifecycle action on an order
///
/// All actions are idempotent on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderAction {
    /// The order owner chooses a specialist for the job.
    Choose { specialist_id: UserId },
    /// The order owner rejects a specialist.
    Reject { specialist_id: UserId },
    Cancel,
    Complete,
}

impl OrderAction {
    /// Path segment of the action endpoint
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Choose { .. } => "choose",
            Self::Reject { .. } => "reject",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
        }
    }

    pub fn specialist_id(&self) -> Option<UserId> {
        match self {
            Self::Choose { specialist_id } | Self::Reject { specialist_id } => Some(*specialist_id),
            Self::Cancel | Self::Complete => None,
        }
    }
}

/// Which review is asked for after an order finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// The job was completed; the review rates the work.
    Completion,
    /// The order was cancelled or closed; the review rates the interaction.
    Cancellation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub order_id: OrderId,
    pub rating: u8,
    pub comment: String,
    #[serde(rename = "type")]
    pub kind: FeedbackKind,
}
