// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Message types passed between the [`super::SyncOrchestrator`] handle, spawned REST calls and
//! the sync loop.

use gigapiclient::ApiError;
use gigcommon::{
    conversation::Conversation,
    identifiers::MessageId,
    messages::ServerMessage,
    order::OrderAction,
};

use crate::{
    messages::TempKey,
    pagination::FetchedPage,
};

use super::response::{Responder, Response, responder};

/// Operation requested by the UI
#[derive(Debug)]
pub(super) enum Command {
    Send {
        text: String,
        responder: Responder<MessageId>,
    },
    RetrySend {
        temp_key: TempKey,
        responder: Responder<MessageId>,
    },
    SetTyping {
        text: String,
    },
    OrderAction {
        action: OrderAction,
        responder: Responder<()>,
    },
    SubmitFeedback {
        rating: u8,
        comment: String,
        responder: Responder<()>,
    },
    DismissFeedback {
        responder: Responder<()>,
    },
    LoadOlder {
        responder: Responder<bool>,
    },
    Refresh {
        responder: Responder<()>,
    },
}

impl Command {
    pub(super) fn send(text: String) -> (Self, Response<MessageId>) {
        let (responder, response) = responder();
        (Self::Send { text, responder }, response)
    }

    pub(super) fn retry_send(temp_key: TempKey) -> (Self, Response<MessageId>) {
        let (responder, response) = responder();
        (
            Self::RetrySend {
                temp_key,
                responder,
            },
            response,
        )
    }

    pub(super) fn order_action(action: OrderAction) -> (Self, Response<()>) {
        let (responder, response) = responder();
        (Self::OrderAction { action, responder }, response)
    }

    pub(super) fn submit_feedback(rating: u8, comment: String) -> (Self, Response<()>) {
        let (responder, response) = responder();
        let command = Self::SubmitFeedback {
            rating,
            comment,
            responder,
        };
        (command, response)
    }

    pub(super) fn dismiss_feedback() -> (Self, Response<()>) {
        let (responder, response) = responder();
        (Self::DismissFeedback { responder }, response)
    }

    pub(super) fn load_older() -> (Self, Response<bool>) {
        let (responder, response) = responder();
        (Self::LoadOlder { responder }, response)
    }

    pub(super) fn refresh() -> (Self, Response<()>) {
        let (responder, response) = responder();
        (Self::Refresh { responder }, response)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum LoadMode {
    /// Replace all messages
    Initial,
    /// Merge into the current messages, keeping pending ones
    Preserving,
}

/// Result of a REST call spawned by the sync loop
#[derive(Debug)]
pub(super) enum Completion {
    Loaded {
        /// Number of the load; later loads have higher numbers.
        generation: u64,
        mode: LoadMode,
        result: Result<(Conversation, FetchedPage), ApiError>,
        responder: Option<Responder<()>>,
    },
    OlderLoaded {
        result: Result<FetchedPage, ApiError>,
        responder: Responder<bool>,
    },
    Sent {
        temp_key: TempKey,
        result: Result<ServerMessage, ApiError>,
        responder: Responder<MessageId>,
    },
    ActionDone {
        action: OrderAction,
        result: Result<(), ApiError>,
        responder: Responder<()>,
    },
    FeedbackSubmitted {
        result: Result<(), ApiError>,
        responder: Responder<()>,
    },
    MarkedAsRead {
        result: Result<(), ApiError>,
    },
}
