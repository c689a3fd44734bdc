// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory fakes of the backend and the push channel provider

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use gigapiclient::{ApiError, MessagePage, Pagination};
use gigcommon::{
    conversation::{Conversation, ConversationStatus, Participant},
    identifiers::{ConversationId, MessageId, OrderId, UserId},
    messages::{MessageType, ServerMessage},
    order::{Feedback, OrderAction},
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    channel::{ChannelError, ChannelSubscription, PushChannelProvider, RawChannelEvent},
    service::ConversationService,
};

pub const OWNER: UserId = UserId::new(1);
pub const SPECIALIST: UserId = UserId::new(2);
pub const ORDER: OrderId = OrderId::new(70);

/// Failure injected into the [`FakeBackend`]
#[derive(Debug, Clone)]
pub enum FakeFailure {
    Unavailable,
    Conflict(String),
    PolicyRejected(String),
}

impl FakeFailure {
    fn into_error(self) -> ApiError {
        match self {
            Self::Unavailable => ApiError::Server {
                status: 503,
                message: "Service unavailable".to_owned(),
            },
            Self::Conflict(message) => ApiError::Conflict(message),
            Self::PolicyRejected(message) => ApiError::PolicyRejected(message),
        }
    }
}

#[derive(Debug)]
struct BackendState {
    user_id: UserId,
    conversation: Conversation,
    messages: Vec<ServerMessage>,
    next_message_id: i64,
    /// `(page, limit)` of every message fetch
    fetches: Vec<(u32, u32)>,
    sent: Vec<String>,
    send_failures: VecDeque<FakeFailure>,
    fetch_failures: VecDeque<FakeFailure>,
    action_failures: VecDeque<FakeFailure>,
    actions: Vec<(OrderId, OrderAction)>,
    feedback: Vec<Feedback>,
    marked_as_read: usize,
    send_delay: Duration,
    fetch_delay: Duration,
}

/// Backend with a single conversation between [`OWNER`] and [`SPECIALIST`]
///
/// Requests are answered as the user passed to [`FakeBackend::new`].
#[derive(Debug, Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

impl FakeBackend {
    pub fn new(conversation_id: ConversationId, user_id: UserId, status: ConversationStatus) -> Self {
        let conversation = Conversation {
            id: conversation_id,
            status,
            participants: vec![
                Participant {
                    user_id: OWNER,
                    display_name: "Alice".to_owned(),
                    is_active: true,
                },
                Participant {
                    user_id: SPECIALIST,
                    display_name: "Bob".to_owned(),
                    is_active: true,
                },
            ],
            order_id: ORDER,
            order_owner_id: OWNER,
            updated_at: fixed_time(),
        };
        Self {
            state: Arc::new(Mutex::new(BackendState {
                user_id,
                conversation,
                messages: Vec::new(),
                next_message_id: 1000,
                fetches: Vec::new(),
                sent: Vec::new(),
                send_failures: VecDeque::new(),
                fetch_failures: VecDeque::new(),
                action_failures: VecDeque::new(),
                actions: Vec::new(),
                feedback: Vec::new(),
                marked_as_read: 0,
                send_delay: Duration::ZERO,
                fetch_delay: Duration::ZERO,
            })),
        }
    }

    /// Creates a text message as `sender_id` without sending it.
    pub fn message(&self, id: i64, sender_id: UserId, content: &str) -> ServerMessage {
        ServerMessage {
            id: MessageId::new(id),
            conversation_id: self.state.lock().conversation.id,
            sender_id,
            content: content.to_owned(),
            message_type: MessageType::Text,
            created_at: fixed_time() + TimeDelta::seconds(id),
        }
    }

    pub fn add_messages(&self, messages: impl IntoIterator<Item = ServerMessage>) {
        let messages: Vec<ServerMessage> = messages.into_iter().collect();
        let mut state = self.state.lock();
        state.messages.extend(messages);
        state.messages.sort_by_key(|m| (m.created_at, m.id));
    }

    pub fn set_status(&self, status: ConversationStatus) {
        let mut state = self.state.lock();
        state.conversation.status = status;
        state.conversation.updated_at += TimeDelta::seconds(1);
    }

    pub fn conversation(&self) -> Conversation {
        self.state.lock().conversation.clone()
    }

    pub fn fail_next_send(&self, failure: FakeFailure) {
        self.state.lock().send_failures.push_back(failure);
    }

    pub fn fail_next_fetch(&self, failure: FakeFailure) {
        self.state.lock().fetch_failures.push_back(failure);
    }

    pub fn fail_next_action(&self, failure: FakeFailure) {
        self.state.lock().action_failures.push_back(failure);
    }

    /// Id assigned to the next sent message
    pub fn set_next_message_id(&self, id: i64) {
        self.state.lock().next_message_id = id;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().send_delay = delay;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = delay;
    }

    pub fn fetches(&self) -> Vec<(u32, u32)> {
        self.state.lock().fetches.clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    pub fn actions(&self) -> Vec<(OrderId, OrderAction)> {
        self.state.lock().actions.clone()
    }

    pub fn feedback(&self) -> Vec<Feedback> {
        self.state.lock().feedback.clone()
    }

    pub fn marked_as_read(&self) -> usize {
        self.state.lock().marked_as_read
    }

    fn check_conversation(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        let state = self.state.lock();
        if state.conversation.id != conversation_id
            || state.conversation.status == ConversationStatus::Removed
        {
            return Err(ApiError::NotFound);
        }
        Ok(())
    }
}

impl ConversationService for FakeBackend {
    async fn fetch_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, ApiError> {
        self.check_conversation(conversation_id)?;
        Ok(self.state.lock().conversation.clone())
    }

    async fn fetch_messages(
        &self,
        conversation_id: ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError> {
        let delay = self.state.lock().fetch_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_conversation(conversation_id)?;
        let mut state = self.state.lock();
        if let Some(failure) = state.fetch_failures.pop_front() {
            return Err(failure.into_error());
        }
        state.fetches.push((page, limit));
        let start = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let messages = state
            .messages
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(MessagePage {
            messages,
            pagination: Pagination {
                total: state.messages.len() as u64,
                page,
                limit,
            },
        })
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        content: String,
    ) -> Result<ServerMessage, ApiError> {
        let delay = self.state.lock().send_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_conversation(conversation_id)?;
        let mut state = self.state.lock();
        if let Some(failure) = state.send_failures.pop_front() {
            return Err(failure.into_error());
        }
        if !state.conversation.status.accepts_messages() {
            return Err(ApiError::Conflict("Conversation is closed".to_owned()));
        }
        let id = state.next_message_id;
        state.next_message_id += 1;
        let message = ServerMessage {
            id: MessageId::new(id),
            conversation_id,
            sender_id: state.user_id,
            content: content.clone(),
            message_type: MessageType::Text,
            created_at: Utc::now(),
        };
        state.sent.push(content);
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn mark_as_read(&self, conversation_id: ConversationId) -> Result<(), ApiError> {
        self.check_conversation(conversation_id)?;
        self.state.lock().marked_as_read += 1;
        Ok(())
    }

    async fn order_action(&self, order_id: OrderId, action: OrderAction) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if let Some(failure) = state.action_failures.pop_front() {
            return Err(failure.into_error());
        }
        if state.conversation.order_id != order_id {
            return Err(ApiError::NotFound);
        }
        state.actions.push((order_id, action));
        let status = match action {
            OrderAction::Choose { .. } => ConversationStatus::InProgress,
            OrderAction::Cancel => ConversationStatus::Cancelled,
            OrderAction::Complete => ConversationStatus::Completed,
            OrderAction::Reject { specialist_id } => {
                if let Some(participant) = state.conversation.participant_mut(specialist_id) {
                    participant.is_active = false;
                }
                return Ok(());
            }
        };
        if status.rank() > state.conversation.status.rank() {
            state.conversation.status = status;
            state.conversation.updated_at += TimeDelta::seconds(1);
        }
        Ok(())
    }

    async fn submit_feedback(&self, feedback: Feedback) -> Result<(), ApiError> {
        self.state.lock().feedback.push(feedback);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ProviderState {
    subscribers: HashMap<String, mpsc::UnboundedSender<RawChannelEvent>>,
    failing_subscribes: usize,
    subscribe_attempts: usize,
    triggered: Vec<RawChannelEvent>,
}

/// Push channel provider delivering events published by the test
#[derive(Debug, Default)]
pub struct InMemoryPushProvider {
    state: Mutex<ProviderState>,
}

impl InMemoryPushProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `n` subscription attempts fail.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.state.lock().failing_subscribes = n;
    }

    /// Publishes an event; returns whether somebody is subscribed to the channel.
    pub fn publish(&self, channel: &str, event: &str, data: Value) -> bool {
        let state = self.state.lock();
        let Some(subscriber) = state.subscribers.get(channel) else {
            return false;
        };
        subscriber
            .send(RawChannelEvent {
                channel: channel.to_owned(),
                event: event.to_owned(),
                data,
            })
            .is_ok()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.state.lock().subscribers.contains_key(channel)
    }

    pub fn subscribe_attempts(&self) -> usize {
        self.state.lock().subscribe_attempts
    }

    /// Client events triggered by the engine
    pub fn triggered(&self) -> Vec<RawChannelEvent> {
        self.state.lock().triggered.clone()
    }
}

impl PushChannelProvider for InMemoryPushProvider {
    fn subscribe(&self, channel: &str) -> Option<ChannelSubscription> {
        let mut state = self.state.lock();
        state.subscribe_attempts += 1;
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.insert(channel.to_owned(), tx);
        Some(ChannelSubscription::new(rx))
    }

    fn unsubscribe(&self, channel: &str) {
        self.state.lock().subscribers.remove(channel);
    }

    fn trigger(&self, channel: &str, event: &str, data: Value) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if !state.subscribers.contains_key(channel) {
            return Err(ChannelError::NotSubscribed(channel.to_owned()));
        }
        state.triggered.push(RawChannelEvent {
            channel: channel.to_owned(),
            event: event.to_owned(),
            data,
        });
        Ok(())
    }
}
