// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use gigapiclient::{ApiClient, ApiError, MessagePage};
use gigcommon::{
    conversation::Conversation,
    identifiers::{ConversationId, OrderId},
    messages::ServerMessage,
    order::{Feedback, OrderAction},
};

/// REST operations used by the synchronization engine
///
/// Implemented by [`ApiClient`]. Calls are spawned onto the runtime, therefore the returned
/// futures must be `Send`.
pub trait ConversationService: Clone + Send + Sync + 'static {
    fn fetch_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> impl Future<Output = Result<Conversation, ApiError>> + Send;

    fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = Result<MessagePage, ApiError>> + Send;

    fn send_message(
        &self,
        conversation_id: ConversationId,
        content: String,
    ) -> impl Future<Output = Result<ServerMessage, ApiError>> + Send;

    fn mark_as_read(
        &self,
        conversation_id: ConversationId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn order_action(
        &self,
        order_id: OrderId,
        action: OrderAction,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn submit_feedback(
        &self,
        feedback: Feedback,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

impl ConversationService for ApiClient {
    async fn fetch_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, ApiError> {
        ApiClient::fetch_conversation(self, conversation_id).await
    }

    async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError> {
        ApiClient::fetch_messages(self, conversation_id, page, limit).await
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: String,
    ) -> Result<ServerMessage, ApiError> {
        ApiClient::send_message(self, conversation_id, &content).await
    }

    async fn mark_as_read(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        ApiClient::mark_as_read(self, conversation_id).await
    }

    async fn order_action(&self, order_id: OrderId, action: OrderAction) -> Result<(), ApiError> {
        ApiClient::order_action(self, order_id, action).await
    }

    async fn submit_feedback(&self, feedback: Feedback) -> Result<(), ApiError> {
        ApiClient::submit_feedback(self, &feedback).await
    }
}
