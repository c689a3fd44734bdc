// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Synchronization engine of a single order conversation.
//!
//! Combines the paginated REST history, the real-time push channels, optimistic local sends, the
//! typing presence protocol and the conversation status into one consistent
//! [`ConversationView`]. The entry point is [`SyncOrchestrator::mount`].

pub mod channel;
pub mod conversation;
mod error;
pub mod messages;
pub mod orchestrator;
pub mod pagination;
pub mod policy;
pub mod presence;
pub mod service;
pub mod settings;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
mod utils;

pub use gigcommon::{
    conversation::{Conversation, ConversationStatus, Participant},
    identifiers::{ConversationId, MessageId, OrderId, UserId},
    messages::{MessageType, ServerMessage},
    order::{FeedbackKind, OrderAction},
};

pub use crate::{
    channel::{BindState, ChannelBinding, ChannelError, PushChannelProvider},
    conversation::{FeedbackLedger, FeedbackPrompt},
    error::SyncError,
    messages::{Delivery, Message, MessageKey, TempKey},
    orchestrator::{ChannelHealth, ConversationView, SyncContext, SyncOrchestrator},
    service::ConversationService,
    settings::{PresenceSettings, SettingsError, SyncSettings},
};
