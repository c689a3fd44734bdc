// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use gigcommon::{
    identifiers::{ConversationId, MessageId},
    order::OrderAction,
};
use tokio::sync::watch;

use crate::{error::SyncError, messages::TempKey};

use super::{ConversationView, SyncOrchestrator, event::Command, response::Response};

impl SyncOrchestrator {
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Current state of the conversation
    pub fn state(&self) -> ConversationView {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationView> {
        self.state_rx.clone()
    }

    /// Sends a text message.
    ///
    /// The message is shown as pending right away and replaced by the confirmed message once
    /// the backend accepted it. Returns the id assigned by the backend.
    ///
    /// If sending fails with [`SyncError::Transient`], the message stays in the view as failed
    /// and can be retried with [`Self::retry_send`].
    pub async fn send(&self, text: impl Into<String>) -> Result<MessageId, SyncError> {
        self.request(Command::send(text.into())).await
    }

    /// Sends a failed message again.
    pub async fn retry_send(&self, temp_key: TempKey) -> Result<MessageId, SyncError> {
        self.request(Command::retry_send(temp_key)).await
    }

    /// The composer text changed.
    pub async fn set_typing(&self, text: impl Into<String>) {
        let command = Command::SetTyping { text: text.into() };
        // fails only if unmounted
        let _ = self.command_tx.send(command).await;
    }

    pub async fn perform_action(&self, action: OrderAction) -> Result<(), SyncError> {
        self.request(Command::order_action(action)).await
    }

    /// Submits the feedback asked for by the pending [`crate::FeedbackPrompt`].
    pub async fn submit_feedback(
        &self,
        rating: u8,
        comment: impl Into<String>,
    ) -> Result<(), SyncError> {
        self.request(Command::submit_feedback(rating, comment.into()))
            .await
    }

    pub async fn dismiss_feedback(&self) -> Result<(), SyncError> {
        self.request(Command::dismiss_feedback()).await
    }

    /// Loads the next page of older messages.
    ///
    /// Returns `false` if there are no older messages or they are already being loaded.
    pub async fn load_older(&self) -> Result<bool, SyncError> {
        self.request(Command::load_older()).await
    }

    /// Reloads the conversation and the newest messages, keeping pending messages.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        self.request(Command::refresh()).await
    }

    async fn request<T>(&self, (command, response): (Command, Response<T>)) -> Result<T, SyncError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SyncError::Unmounted)?;
        response.await
    }
}
