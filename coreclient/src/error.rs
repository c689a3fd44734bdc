// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use gigapiclient::ApiError;
use gigcommon::conversation::ConversationStatus;

use crate::messages::TempKey;

/// Errors surfaced to the user by the synchronization engine.
///
/// None of these errors is fatal: the engine keeps working from its current state.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Conversation is not loaded yet")]
    NotLoaded,
    #[error("Conversation is {0}")]
    ConversationClosed(ConversationStatus),
    #[error("You are no longer a participant of this conversation")]
    ParticipantInactive,
    #[error("Conversation was removed")]
    ConversationRemoved,
    /// The message violates the content policy; nothing was sent.
    #[error("{0}")]
    PolicyRejected(String),
    /// The backend refused the message; the pending message was removed.
    #[error("Message was rejected: {0}")]
    SendRejected(String),
    /// Sending failed but can be retried with [`crate::SyncOrchestrator::retry_send`].
    #[error("Sending failed: {source}")]
    Transient {
        temp_key: TempKey,
        #[source]
        source: ApiError,
    },
    #[error(transparent)]
    Api(ApiError),
    #[error("No pending message {0}")]
    UnknownPendingMessage(TempKey),
    #[error("No feedback is pending")]
    NoFeedbackPending,
    #[error("Rating must be between 1 and 5")]
    InvalidRating,
    #[error("Conversation was closed by the app")]
    Unmounted,
}

impl SyncError {
    /// Classifies an error of a failed send.
    ///
    /// Transient errors keep the pending message for a retry. All other errors are final.
    pub(crate) fn from_send(temp_key: TempKey, error: ApiError) -> Self {
        match error {
            error if error.is_transient() => Self::Transient {
                temp_key,
                source: error,
            },
            ApiError::PolicyRejected(reason) => Self::PolicyRejected(reason),
            ApiError::Conflict(reason) => Self::SendRejected(reason),
            error => Self::SendRejected(error.to_string()),
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient { .. } => true,
            Self::Api(error) => error.is_transient(),
            _ => false,
        }
    }
}

impl From<ApiError> for SyncError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::PolicyRejected(reason) => Self::PolicyRejected(reason),
            error => Self::Api(error),
        }
    }
}
