// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Synchronization of a mounted conversation
//!
//! A [`SyncOrchestrator`] is the handle of a mounted conversation. All state of the conversation
//! is owned by a single task, the sync loop, which serializes commands from the UI, events pushed
//! on the channels, results of REST calls and timers. REST calls run in child tasks and report
//! back to the loop, so the loop never waits for the network.
//!
//! The handle observes the state through a watch channel of [`ConversationView`]s.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::TimeDelta;
use gigcommon::{
    events::{
        CLIENT_TYPING_EVENT, ConversationEvent, TypingEvent, conversation_channel,
        presence_channel,
    },
    identifiers::{ConversationId, UserId},
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    channel::{BindState, ChannelBinding, ChannelTrigger, PushChannelProvider, RawChannelEvent},
    conversation::{ConversationStateMachine, FeedbackLedger, Transition},
    pagination::PaginationCoordinator,
    presence::{LocalSignal, PresenceTracker},
    service::ConversationService,
    settings::SyncSettings,
};

use event::{Command, Completion, LoadMode};
use mark_as_read::MarkAsReadState;

mod api;
mod event;
mod handlers;
mod mark_as_read;
mod response;
mod state;

pub use state::{ChannelHealth, ConversationView};

const COMMAND_CHANNEL_SIZE: usize = 32;

/// Session-wide inputs shared by all mounted conversations
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub settings: SyncSettings,
    /// Conversation currently visible to the user
    pub active_conversation: watch::Receiver<Option<ConversationId>>,
    pub feedback: FeedbackLedger,
}

/// Handle of a mounted conversation
///
/// Dropping the handle unmounts the conversation.
pub struct SyncOrchestrator {
    conversation_id: ConversationId,
    viewer: UserId,
    command_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConversationView>,
    /// Whether the last typing signal sent was `typing=true`
    local_typing: Arc<AtomicBool>,
    bindings: Mutex<Option<Bindings>>,
    cancel: CancellationToken,
}

struct Bindings {
    conversation: ChannelBinding,
    presence: ChannelBinding,
}

impl SyncOrchestrator {
    /// Mounts the conversation `conversation_id` as seen by `viewer`.
    ///
    /// Binds the push channels and starts loading the conversation and its newest messages.
    /// Events pushed before the load completes are applied after it.
    ///
    /// Must be called within a tokio runtime.
    pub fn mount<S: ConversationService>(
        conversation_id: ConversationId,
        viewer: UserId,
        service: S,
        provider: Arc<dyn PushChannelProvider>,
        context: SyncContext,
    ) -> Self {
        let SyncContext {
            settings,
            active_conversation,
            feedback,
        } = context;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConversationView::new(conversation_id));

        let conversation = ChannelBinding::bind(
            provider.clone(),
            conversation_channel(conversation_id),
            inbound_tx.clone(),
            settings.bind_retry_delay,
        );
        let presence = ChannelBinding::bind(
            provider,
            presence_channel(conversation_id),
            inbound_tx,
            settings.bind_retry_delay,
        );

        let local_typing = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let reconcile_window =
            TimeDelta::from_std(settings.reconcile_window).unwrap_or(TimeDelta::MAX);

        let sync_loop = SyncLoop {
            conversation_id,
            viewer,
            service,
            command_rx,
            completion_tx,
            completion_rx,
            inbound_rx,
            conversation_bind_rx: conversation.subscribe_state(),
            presence_bind_rx: presence.subscribe_state(),
            active_rx: active_conversation,
            state_tx,
            typing_trigger: presence.trigger_handle(),
            local_typing: local_typing.clone(),
            cancel: cancel.clone(),
            machine: ConversationStateMachine::new(conversation_id, viewer, feedback),
            pagination: PaginationCoordinator::new(settings.page_size, reconcile_window),
            presence: PresenceTracker::new(settings.presence),
            mark_as_read: MarkAsReadState::default(),
            loading_older: false,
            load_generation: 0,
            applied_load: 0,
            last_error: None,
            settings,
        };
        tokio::spawn(cancel.clone().run_until_cancelled_owned(sync_loop.run()));
        info!(%conversation_id, %viewer, "Conversation mounted");

        Self {
            conversation_id,
            viewer,
            command_tx,
            state_rx,
            local_typing,
            bindings: Mutex::new(Some(Bindings {
                conversation,
                presence,
            })),
            cancel,
        }
    }

    /// Stops all timers and tasks, signals `typing=false` if needed and releases the channels.
    ///
    /// Safe to call several times. Pending requests fail with [`crate::SyncError::Unmounted`].
    pub fn unmount(&self) {
        let Some(bindings) = self.bindings.lock().take() else {
            return;
        };
        self.cancel.cancel();
        if self.local_typing.swap(false, Ordering::SeqCst)
            && let Some(data) = typing_event(self.viewer, None, false)
            && let Err(error) = bindings.presence.trigger(CLIENT_TYPING_EVENT, data)
        {
            debug!(%error, "Failed to send final typing signal");
        }
        bindings.conversation.unbind();
        bindings.presence.unbind();
        info!(conversation_id = %self.conversation_id, "Conversation unmounted");
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("conversation_id", &self.conversation_id)
            .field("viewer", &self.viewer)
            .field("mounted", &!self.cancel.is_cancelled())
            .finish()
    }
}

fn typing_event(user_id: UserId, display_name: Option<String>, is_typing: bool) -> Option<Value> {
    let event = TypingEvent {
        user_id,
        display_name,
        is_typing,
    };
    serde_json::to_value(&event)
        .inspect_err(|error| warn!(%error, "Failed to encode typing event"))
        .ok()
}

/// Input of a single iteration of the sync loop
enum Incoming {
    Command(Command),
    Completion(Completion),
    Channel(RawChannelEvent),
    BindingChanged,
    ActiveChanged,
    Timer,
    Stop,
}

struct SyncLoop<S> {
    conversation_id: ConversationId,
    viewer: UserId,
    service: S,
    settings: SyncSettings,

    command_rx: mpsc::Receiver<Command>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    inbound_rx: mpsc::UnboundedReceiver<RawChannelEvent>,
    conversation_bind_rx: watch::Receiver<BindState>,
    presence_bind_rx: watch::Receiver<BindState>,
    active_rx: watch::Receiver<Option<ConversationId>>,
    state_tx: watch::Sender<ConversationView>,

    typing_trigger: ChannelTrigger,
    local_typing: Arc<AtomicBool>,
    cancel: CancellationToken,

    machine: ConversationStateMachine,
    pagination: PaginationCoordinator,
    presence: PresenceTracker,
    mark_as_read: MarkAsReadState,
    loading_older: bool,
    /// Number of the last started load
    load_generation: u64,
    /// Number of the last applied load, 0 if none was applied yet
    applied_load: u64,
    last_error: Option<String>,
}

impl<S: ConversationService> SyncLoop<S> {
    async fn run(mut self) {
        self.start_load(LoadMode::Initial, None);
        self.publish();
        loop {
            let deadline = self.next_deadline();
            let incoming = tokio::select! {
                biased;
                Some(event) = self.inbound_rx.recv() => Incoming::Channel(event),
                Some(completion) = self.completion_rx.recv() => Incoming::Completion(completion),
                command = self.command_rx.recv() => match command {
                    Some(command) => Incoming::Command(command),
                    None => Incoming::Stop,
                },
                Ok(()) = self.conversation_bind_rx.changed() => Incoming::BindingChanged,
                Ok(()) = self.presence_bind_rx.changed() => Incoming::BindingChanged,
                Ok(()) = self.active_rx.changed() => Incoming::ActiveChanged,
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    Incoming::Timer
                }
            };
            match incoming {
                Incoming::Command(command) => self.handle_command(command),
                Incoming::Completion(completion) => self.handle_completion(completion),
                Incoming::Channel(event) => self.handle_channel_event(event),
                Incoming::BindingChanged => {}
                Incoming::ActiveChanged => self.on_active_changed(),
                Incoming::Timer => self.on_timer(),
                Incoming::Stop => {
                    debug!(conversation_id = %self.conversation_id, "All handles dropped");
                    return;
                }
            }
            self.publish();
        }
    }

    /// Runs `task` in a child task and feeds its result back into the loop.
    fn spawn(&self, task: impl Future<Output = Completion> + Send + 'static) {
        let completion_tx = self.completion_tx.clone();
        let task = async move {
            let completion = task.await;
            // the loop is gone if sending fails
            let _ = completion_tx.send(completion);
        };
        tokio::spawn(self.cancel.clone().run_until_cancelled_owned(task));
    }

    fn start_load(&mut self, mode: LoadMode, responder: Option<response::Responder<()>>) {
        self.pagination.begin_load();
        self.load_generation += 1;
        let generation = self.load_generation;
        let service = self.service.clone();
        let conversation_id = self.conversation_id;
        let page_size = self.pagination.page_size();
        self.spawn(async move {
            let result = async {
                let conversation = service.fetch_conversation(conversation_id).await?;
                let page =
                    crate::pagination::fetch_newest_page(&service, conversation_id, page_size)
                        .await?;
                Ok((conversation, page))
            }
            .await;
            Completion::Loaded {
                generation,
                mode,
                result,
                responder,
            }
        });
    }

    fn is_active(&self) -> bool {
        *self.active_rx.borrow() == Some(self.conversation_id)
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.presence
            .next_deadline()
            .into_iter()
            .chain(self.mark_as_read.due())
            .min()
    }

    fn on_timer(&mut self) {
        let now = Instant::now();
        let update = self.presence.poll(now);
        self.emit_typing(update.signal);
        if self.mark_as_read.fire(now) {
            let service = self.service.clone();
            let conversation_id = self.conversation_id;
            self.spawn(async move {
                let result = service.mark_as_read(conversation_id).await;
                Completion::MarkedAsRead { result }
            });
        }
    }

    fn on_active_changed(&mut self) {
        if self.is_active() {
            self.schedule_mark_as_read();
        } else {
            self.mark_as_read.cancel();
        }
    }

    /// Schedules marking the conversation as read up to the newest confirmed message.
    fn schedule_mark_as_read(&mut self) {
        if !self.is_active() {
            return;
        }
        let Some(newest) = self.pagination.store().newest_confirmed() else {
            return;
        };
        let due = Instant::now() + self.settings.mark_as_read_debounce;
        self.mark_as_read.schedule(newest.created_at(), due);
    }

    /// Sends a typing signal on the presence channel.
    fn emit_typing(&self, signal: Option<LocalSignal>) {
        let Some(signal) = signal else {
            return;
        };
        let is_typing = signal.is_typing();
        self.local_typing.store(is_typing, Ordering::SeqCst);
        let display_name = self
            .machine
            .conversation()
            .and_then(|conversation| conversation.display_name(self.viewer))
            .map(ToOwned::to_owned);
        let Some(data) = typing_event(self.viewer, display_name, is_typing) else {
            return;
        };
        if let Err(error) = self.typing_trigger.trigger(CLIENT_TYPING_EVENT, data) {
            // presence is advisory
            debug!(%error, ?signal, "Failed to send typing signal");
        }
    }

    /// Reacts to a status transition.
    fn on_transition(&mut self, transition: Option<Transition>) {
        let Some(Transition { from, to }) = transition else {
            return;
        };
        debug!(%from, %to, "Conversation transitioned");
        if !to.accepts_messages() {
            let signal = self.presence.stop_local();
            self.emit_typing(signal);
            self.presence.clear_remote();
        }
    }

    fn handle_channel_event(&mut self, event: RawChannelEvent) {
        let RawChannelEvent {
            channel,
            event,
            data,
        } = event;
        if channel == self.typing_trigger.channel() {
            match TypingEvent::decode(&event, data) {
                Ok(Some(typing)) => self.on_typing(typing),
                Ok(None) => debug!(%channel, %event, "Ignoring unknown presence event"),
                Err(error) => warn!(%channel, %event, %error, "Malformed presence event"),
            }
            return;
        }
        match ConversationEvent::decode(&event, data) {
            Ok(Some(event)) if event.conversation_id() != self.conversation_id => {
                warn!(
                    expected = %self.conversation_id,
                    actual = %event.conversation_id(),
                    "Ignoring event of other conversation"
                );
            }
            Ok(Some(event)) => self.on_conversation_event(event),
            Ok(None) => debug!(%channel, %event, "Ignoring unknown event"),
            Err(error) => warn!(%channel, %event, %error, "Malformed event"),
        }
    }

    fn on_typing(&mut self, typing: TypingEvent) {
        if typing.user_id == self.viewer {
            return; // own signal echoed by the provider
        }
        if self
            .machine
            .status()
            .is_some_and(|status| !status.accepts_messages())
        {
            return;
        }
        self.presence.on_remote_signal(
            typing.user_id,
            typing.display_name,
            typing.is_typing,
            Instant::now(),
        );
    }

    fn on_conversation_event(&mut self, event: ConversationEvent) {
        match event {
            ConversationEvent::NewMessage(message) => {
                let sender_id = message.sender_id;
                let incoming = self.pagination.append_incoming(message);
                debug!(%sender_id, ?incoming, "Message pushed");
                if sender_id != self.viewer {
                    self.presence.on_remote_message(sender_id);
                    self.schedule_mark_as_read();
                }
            }
            ConversationEvent::StatusChanged(change) => {
                let transition = self.machine.apply_pushed(change);
                self.on_transition(transition);
            }
            ConversationEvent::Deleted { .. } => {
                info!(conversation_id = %self.conversation_id, "Conversation deleted");
                let transition = self.machine.apply_deleted();
                self.on_transition(transition);
            }
        }
    }

    fn view(&self) -> ConversationView {
        let conversation = self.machine.conversation();
        let typing_label = self.presence.typing_label(|user_id| {
            conversation
                .and_then(|conversation| conversation.display_name(user_id))
                .map(ToOwned::to_owned)
        });
        ConversationView {
            conversation_id: self.conversation_id,
            conversation: conversation.cloned(),
            messages: self.pagination.store().messages().to_vec(),
            typing_label,
            can_send: self.machine.can_send().is_ok(),
            feedback_prompt: self.machine.feedback_prompt(),
            channel_health: ChannelHealth::from_states(
                *self.conversation_bind_rx.borrow(),
                *self.presence_bind_rx.borrow(),
            ),
            loading: self.pagination.is_loading(),
            has_older: self.pagination.next_older_page().is_some(),
            last_error: self.last_error.clone(),
        }
    }

    fn publish(&mut self) {
        let view = self.view();
        self.state_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }
}
