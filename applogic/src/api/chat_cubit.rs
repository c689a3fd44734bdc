// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The screen of a single order conversation

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use gigcoreclient::{
    ChannelHealth, ConversationId, ConversationService, ConversationStatus, ConversationView,
    Delivery, FeedbackPrompt, Message, MessageType, OrderAction, PushChannelProvider, SyncContext,
    SyncOrchestrator, TempKey, UserId,
};
use tokio::sync::watch;
use tracing::debug;

use crate::util::CubitCore;

/// Delivery state of a message as shown in the chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiDelivery {
    Sending,
    /// Sending failed; the message can be retried.
    Failed,
    Sent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiMessage {
    /// Stable key of the message for the list view
    pub key: String,
    /// Set while the message is not confirmed by the backend
    pub temp_key: Option<TempKey>,
    pub sender_id: UserId,
    pub sender_name: Option<String>,
    pub content: String,
    pub is_own: bool,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub delivery: UiDelivery,
}

impl UiMessage {
    fn new(message: &Message, view: &ConversationView, viewer: UserId) -> Self {
        let key = match (message.id(), message.temp_key()) {
            (Some(id), _) => id.to_string(),
            (None, Some(temp_key)) => temp_key.to_string(),
            (None, None) => String::new(),
        };
        let delivery = match message.delivery() {
            None => UiDelivery::Sent,
            Some(Delivery::InFlight) => UiDelivery::Sending,
            Some(Delivery::Failed) => UiDelivery::Failed,
        };
        let sender_name = view
            .conversation
            .as_ref()
            .and_then(|conversation| conversation.display_name(message.sender_id()))
            .map(ToOwned::to_owned);
        Self {
            key,
            temp_key: message.temp_key(),
            sender_id: message.sender_id(),
            sender_name,
            content: message.content().to_owned(),
            is_own: message.sender_id() == viewer,
            is_system: message.message_type() == MessageType::System,
            created_at: message.created_at(),
            delivery,
        }
    }
}

/// The state of the conversation screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatState {
    pub conversation_id: ConversationId,
    pub status: Option<ConversationStatus>,
    pub messages: Vec<UiMessage>,
    pub typing_label: Option<String>,
    pub can_send: bool,
    /// Why the composer is disabled
    pub composer_hint: Option<String>,
    /// Order actions the viewer can take right now
    pub actions: Vec<OrderAction>,
    pub feedback_prompt: Option<FeedbackPrompt>,
    /// Real-time updates are not available; the state is refreshed on demand only.
    pub offline: bool,
    pub loading: bool,
    pub has_older: bool,
    pub removed: bool,
    pub error: Option<String>,
}

impl ChatState {
    fn new(view: &ConversationView, viewer: UserId) -> Self {
        let composer_hint = match view.status() {
            _ if view.loading && view.conversation.is_none() => None,
            Some(ConversationStatus::Removed) => Some("This conversation was removed".to_owned()),
            Some(status) if !status.accepts_messages() => {
                Some(format!("This conversation is {status}"))
            }
            Some(_) if !view.can_send => {
                Some("You are no longer a participant of this conversation".to_owned())
            }
            _ => None,
        };
        Self {
            conversation_id: view.conversation_id,
            status: view.status(),
            messages: view
                .messages
                .iter()
                .map(|message| UiMessage::new(message, view, viewer))
                .collect(),
            typing_label: view.typing_label.clone(),
            can_send: view.can_send,
            composer_hint,
            actions: available_actions(view, viewer),
            feedback_prompt: view.feedback_prompt,
            offline: view.channel_health == ChannelHealth::Degraded,
            loading: view.loading,
            has_older: view.has_older,
            removed: view.is_removed(),
            error: view.last_error.clone(),
        }
    }
}

/// Order actions of the order owner
///
/// While the order is open, the owner can choose or reject every active specialist. Specialists
/// can't act on the order.
fn available_actions(view: &ConversationView, viewer: UserId) -> Vec<OrderAction> {
    let Some(conversation) = view.conversation.as_ref() else {
        return Vec::new();
    };
    if !conversation.is_order_owner(viewer) {
        return Vec::new();
    }
    match conversation.status {
        ConversationStatus::Open => conversation
            .participants
            .iter()
            .filter(|participant| participant.user_id != viewer && participant.is_active)
            .flat_map(|participant| {
                [
                    OrderAction::Choose {
                        specialist_id: participant.user_id,
                    },
                    OrderAction::Reject {
                        specialist_id: participant.user_id,
                    },
                ]
            })
            .chain([OrderAction::Cancel])
            .collect(),
        ConversationStatus::InProgress => vec![OrderAction::Complete, OrderAction::Cancel],
        _ => Vec::new(),
    }
}

/// The cubit responsible for a single conversation screen
///
/// Mounts the conversation on creation and unmounts it when closed or dropped.
#[derive(Debug)]
pub struct ChatCubit {
    orchestrator: Arc<SyncOrchestrator>,
    core: CubitCore<ChatState>,
}

impl ChatCubit {
    pub fn new<S: ConversationService>(
        conversation_id: ConversationId,
        viewer: UserId,
        service: S,
        provider: Arc<dyn PushChannelProvider>,
        context: SyncContext,
    ) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::mount(
            conversation_id,
            viewer,
            service,
            provider,
            context,
        ));
        let core = CubitCore::with_initial_state(ChatState::new(&orchestrator.state(), viewer));

        let update_state_task = core
            .cancellation_token()
            .clone()
            .run_until_cancelled_owned(update_state_task(
                orchestrator.subscribe(),
                core.state_tx().clone(),
                viewer,
            ));
        tokio::spawn(update_state_task);

        Self { orchestrator, core }
    }

    // Cubit interface

    pub fn close(&mut self) {
        self.core.close();
        self.orchestrator.unmount();
    }

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    pub fn state(&self) -> ChatState {
        self.core.state()
    }

    pub fn stream(&self) -> impl Stream<Item = ChatState> + Send + 'static {
        self.core.stream()
    }

    // Cubit methods

    pub async fn send_message(&self, text: String) -> anyhow::Result<()> {
        self.orchestrator.send(text).await?;
        Ok(())
    }

    pub async fn retry_message(&self, temp_key: TempKey) -> anyhow::Result<()> {
        self.orchestrator.retry_send(temp_key).await?;
        Ok(())
    }

    /// The composer text changed.
    pub async fn set_draft(&self, text: String) {
        self.orchestrator.set_typing(text).await;
    }

    pub async fn perform_action(&self, action: OrderAction) -> anyhow::Result<()> {
        self.orchestrator.perform_action(action).await?;
        Ok(())
    }

    pub async fn submit_feedback(&self, rating: u8, comment: String) -> anyhow::Result<()> {
        self.orchestrator.submit_feedback(rating, comment).await?;
        Ok(())
    }

    pub async fn dismiss_feedback(&self) -> anyhow::Result<()> {
        self.orchestrator.dismiss_feedback().await?;
        Ok(())
    }

    pub async fn load_older(&self) -> anyhow::Result<bool> {
        Ok(self.orchestrator.load_older().await?)
    }

    pub async fn refresh(&self) -> anyhow::Result<()> {
        self.orchestrator.refresh().await?;
        Ok(())
    }
}

async fn update_state_task(
    mut view_rx: watch::Receiver<ConversationView>,
    state_tx: watch::Sender<ChatState>,
    viewer: UserId,
) {
    loop {
        let state = ChatState::new(&view_rx.borrow_and_update(), viewer);
        state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if view_rx.changed().await.is_err() {
            debug!("Conversation unmounted; stopping state updates");
            return;
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use futures_util::StreamExt;
    use gigcoreclient::{
        FeedbackLedger, SyncSettings,
        test_utils::{FakeBackend, InMemoryPushProvider, OWNER, SPECIALIST},
    };

    use crate::api::navigation_cubit::NavigationCubit;

    use super::*;

    const CONVERSATION: ConversationId = ConversationId::new(7);

    fn cubit(
        backend: &FakeBackend,
        provider: &Arc<InMemoryPushProvider>,
        navigation: &NavigationCubit,
        viewer: UserId,
    ) -> ChatCubit {
        let context = SyncContext {
            settings: SyncSettings::default(),
            active_conversation: navigation.active_conversation(),
            feedback: FeedbackLedger::new(),
        };
        ChatCubit::new(
            CONVERSATION,
            viewer,
            backend.clone(),
            provider.clone(),
            context,
        )
    }

    async fn until(cubit: &ChatCubit, mut predicate: impl FnMut(&ChatState) -> bool) -> ChatState {
        let mut stream = Box::pin(cubit.stream());
        tokio::time::timeout(Duration::from_secs(60), async {
            while let Some(state) = stream.next().await {
                if predicate(&state) {
                    return state;
                }
            }
            panic!("cubit closed");
        })
        .await
        .expect("timeout")
    }

    #[tokio::test(start_paused = true)]
    async fn owner_sees_order_actions() {
        let backend = FakeBackend::new(CONVERSATION, OWNER, ConversationStatus::Open);
        backend.add_messages([backend.message(1, SPECIALIST, "I can do it")]);
        let provider = InMemoryPushProvider::new();
        let navigation = NavigationCubit::new();
        let cubit = cubit(&backend, &provider, &navigation, OWNER);

        let state = until(&cubit, |state| state.status.is_some()).await;
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].sender_name.as_deref(), Some("Bob"));
        assert!(!state.messages[0].is_own);
        assert_eq!(
            state.actions,
            [
                OrderAction::Choose {
                    specialist_id: SPECIALIST
                },
                OrderAction::Reject {
                    specialist_id: SPECIALIST
                },
                OrderAction::Cancel,
            ]
        );

        cubit
            .perform_action(OrderAction::Choose {
                specialist_id: SPECIALIST,
            })
            .await
            .unwrap();
        let state = until(&cubit, |state| {
            state.status == Some(ConversationStatus::InProgress)
        })
        .await;
        assert_eq!(state.actions, [OrderAction::Complete, OrderAction::Cancel]);
    }

    #[tokio::test(start_paused = true)]
    async fn specialist_has_no_actions() {
        let backend = FakeBackend::new(CONVERSATION, SPECIALIST, ConversationStatus::Open);
        let provider = InMemoryPushProvider::new();
        let navigation = NavigationCubit::new();
        let cubit = cubit(&backend, &provider, &navigation, SPECIALIST);

        let state = until(&cubit, |state| state.status.is_some()).await;
        assert!(state.actions.is_empty());
        assert!(state.can_send);
        assert_eq!(state.composer_hint, None);
    }

    #[tokio::test(start_paused = true)]
    async fn send_and_policy_rejection() {
        let backend = FakeBackend::new(CONVERSATION, OWNER, ConversationStatus::Open);
        let provider = InMemoryPushProvider::new();
        let navigation = NavigationCubit::new();
        let cubit = cubit(&backend, &provider, &navigation, OWNER);
        until(&cubit, |state| state.status.is_some()).await;

        let error = cubit
            .send_message("call me: +49 170 1234567".to_owned())
            .await
            .unwrap_err();
        assert!(error.to_string().starts_with("Phone numbers"), "{error}");

        cubit.send_message("When?".to_owned()).await.unwrap();
        let state = until(&cubit, |state| {
            state
                .messages
                .first()
                .is_some_and(|message| message.delivery == UiDelivery::Sent)
        })
        .await;
        assert_eq!(state.messages.len(), 1);
        assert!(state.messages[0].is_own);
        assert_eq!(state.messages[0].key, "1000");
        assert_eq!(state.messages[0].temp_key, None);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_conversation_explains_composer() {
        let backend = FakeBackend::new(CONVERSATION, OWNER, ConversationStatus::Cancelled);
        let provider = InMemoryPushProvider::new();
        let navigation = NavigationCubit::new();
        let cubit = cubit(&backend, &provider, &navigation, OWNER);

        let state = until(&cubit, |state| state.status.is_some()).await;
        assert!(!state.can_send);
        assert_eq!(
            state.composer_hint.as_deref(),
            Some("This conversation is cancelled")
        );
        assert_eq!(state.feedback_prompt, None);
    }

    #[tokio::test(start_paused = true)]
    async fn close_unmounts() {
        let backend = FakeBackend::new(CONVERSATION, OWNER, ConversationStatus::InProgress);
        let provider = InMemoryPushProvider::new();
        let navigation = NavigationCubit::new();
        let mut cubit = cubit(&backend, &provider, &navigation, OWNER);
        until(&cubit, |state| state.status.is_some()).await;

        cubit.close();
        assert!(cubit.is_closed());
        assert!(!provider.is_subscribed("conversation.7"));
        assert!(cubit.send_message("hello".to_owned()).await.is_err());
    }
}
