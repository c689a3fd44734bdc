// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! API client implementation for conversations and their messages

use gigcommon::{conversation::Conversation, identifiers::ConversationId, messages::ServerMessage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ApiClient, ApiError};

/// A page of messages
///
/// Pages are numbered from 1; page 1 contains the oldest messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<ServerMessage>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    /// Total number of messages in the conversation
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    content: &'a str,
}

impl ApiClient {
    /// Fetches a conversation including its participants and order status.
    pub async fn fetch_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, ApiError> {
        debug!(%conversation_id, "fetch conversation");
        let request = self.get(&format!("conversations/{conversation_id}"))?;
        Self::send_json(request).await
    }

    /// Fetches the `page`-th page of messages with `limit` messages per page.
    pub async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError> {
        debug!(%conversation_id, page, limit, "fetch messages");
        let request = self
            .get(&format!("conversations/{conversation_id}/messages"))?
            .query(&[("page", page), ("limit", limit)]);
        Self::send_json(request).await
    }

    /// Marks all messages of the conversation as read by the current user.
    pub async fn mark_as_read(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        debug!(%conversation_id, "mark as read");
        let request = self.post(&format!("conversations/{conversation_id}/read"))?;
        Self::send_empty(request).await
    }

    /// Sends a text message and returns the message as created by the backend.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<ServerMessage, ApiError> {
        debug!(%conversation_id, "send message");
        let request = self
            .post(&format!("conversations/{conversation_id}/messages"))?
            .json(&SendMessageRequest { content });
        Self::send_json(request).await
    }
}
