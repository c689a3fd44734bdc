// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Handling of commands and REST completions in the sync loop

use chrono::Utc;
use gigapiclient::ApiError;
use gigcommon::{
    conversation::{Conversation, ConversationStatus},
    identifiers::MessageId,
    messages::ServerMessage,
    order::{Feedback, OrderAction},
};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    error::SyncError,
    messages::{Delivery, Message, Reconciled, TempKey},
    pagination::{FetchedPage, fetch_page},
    policy,
    service::ConversationService,
};

use super::{
    SyncLoop,
    event::{Command, Completion, LoadMode},
    response::Responder,
};

impl<S: ConversationService> SyncLoop<S> {
    pub(super) fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { text, responder } => self.send(text, responder),
            Command::RetrySend {
                temp_key,
                responder,
            } => self.retry_send(temp_key, responder),
            Command::SetTyping { text } => {
                if self.machine.can_send().is_err() {
                    return;
                }
                let signal = self.presence.on_local_input(&text, Instant::now());
                self.emit_typing(signal);
            }
            Command::OrderAction { action, responder } => self.order_action(action, responder),
            Command::SubmitFeedback {
                rating,
                comment,
                responder,
            } => self.submit_feedback(rating, comment, responder),
            Command::DismissFeedback { responder } => {
                let result = match self.machine.resolve_prompt() {
                    Some(prompt) => {
                        debug!(?prompt, "Feedback dismissed");
                        Ok(())
                    }
                    None => Err(SyncError::NoFeedbackPending),
                };
                responder.send(result);
            }
            Command::LoadOlder { responder } => self.load_older(responder),
            Command::Refresh { responder } => {
                self.start_load(LoadMode::Preserving, Some(responder));
            }
        }
    }

    pub(super) fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded {
                generation,
                mode,
                result,
                responder,
            } => {
                let result = if generation < self.applied_load {
                    // a later load already brought newer state
                    debug!(generation, applied = self.applied_load, "Ignoring superseded load");
                    Ok(())
                } else {
                    self.on_loaded(generation, mode, result)
                };
                if let Some(responder) = responder {
                    responder.send(result);
                }
            }
            Completion::OlderLoaded { result, responder } => {
                self.loading_older = false;
                let result = match result {
                    Ok(page) => {
                        let added = self.pagination.merge_older(page);
                        debug!(added, "Merged older messages");
                        Ok(true)
                    }
                    Err(error) => {
                        warn!(%error, "Failed to load older messages");
                        Err(error.into())
                    }
                };
                responder.send(result);
            }
            Completion::Sent {
                temp_key,
                result,
                responder,
            } => {
                let result = self.on_sent(temp_key, result);
                responder.send(result);
            }
            Completion::ActionDone {
                action,
                result,
                responder,
            } => match result {
                Ok(()) => {
                    let transition = self.machine.apply_confirmed(action);
                    self.on_transition(transition);
                    // the backend may have changed more than the action itself
                    self.start_load(LoadMode::Preserving, None);
                    responder.send(Ok(()));
                }
                Err(error) => {
                    warn!(%error, ?action, "Order action failed");
                    responder.send(Err(error.into()));
                }
            },
            Completion::FeedbackSubmitted { result, responder } => match result {
                Ok(()) => {
                    self.machine.resolve_prompt();
                    responder.send(Ok(()));
                }
                Err(error) => {
                    warn!(%error, "Failed to submit feedback");
                    responder.send(Err(error.into()));
                }
            },
            Completion::MarkedAsRead { result } => {
                if let Err(error) = result {
                    error!(%error, "Failed to mark conversation as read");
                }
            }
        }
    }

    fn on_loaded(
        &mut self,
        generation: u64,
        mode: LoadMode,
        result: Result<(Conversation, FetchedPage), ApiError>,
    ) -> Result<(), SyncError> {
        match result {
            Ok((conversation, page)) => {
                self.applied_load = generation;
                let transition = self.machine.load_snapshot(conversation);
                match mode {
                    LoadMode::Initial => self.pagination.load_initial(page),
                    LoadMode::Preserving => self.pagination.load_initial_preserving(page),
                }
                self.on_transition(transition);
                self.last_error = None;
                self.mark_as_read.loaded();
                self.schedule_mark_as_read();
                Ok(())
            }
            Err(ApiError::NotFound) if self.machine.conversation().is_some() => {
                self.pagination.load_failed();
                info!(conversation_id = %self.conversation_id, "Conversation is gone");
                let transition = self.machine.apply_deleted();
                self.on_transition(transition);
                Err(SyncError::ConversationRemoved)
            }
            Err(error) => {
                self.pagination.load_failed();
                error!(%error, ?mode, "Failed to load conversation");
                self.last_error = Some(error.to_string());
                Err(error.into())
            }
        }
    }

    fn send(&mut self, text: String, responder: Responder<MessageId>) {
        let content = text.trim();
        if content.is_empty() {
            responder.send(Err(SyncError::EmptyMessage));
            return;
        }
        if let Err(error) = self.machine.can_send() {
            responder.send(Err(error));
            return;
        }
        // the content policy only applies until a specialist was chosen
        if self.machine.status() == Some(ConversationStatus::Open)
            && let Err(violation) = policy::check(content)
        {
            debug!(?violation, "Message violates the content policy");
            responder.send(Err(SyncError::PolicyRejected(violation.message().to_owned())));
            return;
        }

        let signal = self.presence.on_local_send();
        self.emit_typing(signal);

        let temp_key = TempKey::random();
        let content = content.to_owned();
        self.pagination.store_mut().append(Message::pending(
            temp_key,
            self.conversation_id,
            self.viewer,
            content.clone(),
            Utc::now(),
        ));
        self.spawn_send(temp_key, content, responder);
    }

    fn retry_send(&mut self, temp_key: TempKey, responder: Responder<MessageId>) {
        let content = match self.pagination.store().pending(temp_key) {
            Some(message) if message.delivery() == Some(Delivery::Failed) => {
                message.content().to_owned()
            }
            _ => {
                responder.send(Err(SyncError::UnknownPendingMessage(temp_key)));
                return;
            }
        };
        if let Err(error) = self.machine.can_send() {
            responder.send(Err(error));
            return;
        }
        self.pagination
            .store_mut()
            .set_delivery(temp_key, Delivery::InFlight);
        self.spawn_send(temp_key, content, responder);
    }

    fn spawn_send(&self, temp_key: TempKey, content: String, responder: Responder<MessageId>) {
        debug!(%temp_key, "Sending message");
        let service = self.service.clone();
        let conversation_id = self.conversation_id;
        self.spawn(async move {
            let result = service.send_message(conversation_id, content).await;
            Completion::Sent {
                temp_key,
                result,
                responder,
            }
        });
    }

    fn on_sent(
        &mut self,
        temp_key: TempKey,
        result: Result<ServerMessage, ApiError>,
    ) -> Result<MessageId, SyncError> {
        let error = match result {
            Ok(message) => {
                let id = message.id;
                match self.pagination.store_mut().reconcile(temp_key, message) {
                    Reconciled::Replaced => debug!(%temp_key, %id, "Message confirmed"),
                    Reconciled::Superseded => debug!(%temp_key, %id, "Message already echoed"),
                    Reconciled::Appended => debug!(%temp_key, %id, "Confirmed message appended"),
                }
                return Ok(id);
            }
            Err(error) => SyncError::from_send(temp_key, error),
        };

        if error.is_transient() {
            warn!(%temp_key, %error, "Sending failed; message can be retried");
            self.pagination
                .store_mut()
                .set_delivery(temp_key, Delivery::Failed);
        } else {
            warn!(%temp_key, %error, "Message rejected");
            self.pagination.store_mut().remove_pending(temp_key);
            if matches!(error, SyncError::SendRejected(_)) {
                // most likely the status changed without us being told
                self.start_load(LoadMode::Preserving, None);
            }
        }
        Err(error)
    }

    fn order_action(&mut self, action: OrderAction, responder: Responder<()>) {
        let order_id = match self.machine.conversation() {
            None => {
                responder.send(Err(SyncError::NotLoaded));
                return;
            }
            Some(conversation) if conversation.status == ConversationStatus::Removed => {
                responder.send(Err(SyncError::ConversationRemoved));
                return;
            }
            Some(conversation) => conversation.order_id,
        };
        info!(%order_id, ?action, "Performing order action");
        let service = self.service.clone();
        self.spawn(async move {
            let result = service.order_action(order_id, action).await;
            Completion::ActionDone {
                action,
                result,
                responder,
            }
        });
    }

    fn submit_feedback(&mut self, rating: u8, comment: String, responder: Responder<()>) {
        let Some(prompt) = self.machine.feedback_prompt() else {
            responder.send(Err(SyncError::NoFeedbackPending));
            return;
        };
        if !(1..=5).contains(&rating) {
            responder.send(Err(SyncError::InvalidRating));
            return;
        }
        let feedback = Feedback {
            order_id: prompt.order_id,
            rating,
            comment,
            kind: prompt.kind,
        };
        let service = self.service.clone();
        self.spawn(async move {
            let result = service.submit_feedback(feedback).await;
            Completion::FeedbackSubmitted { result, responder }
        });
    }

    fn load_older(&mut self, responder: Responder<bool>) {
        let Some(page) = self.pagination.next_older_page() else {
            responder.send(Ok(false));
            return;
        };
        if self.loading_older {
            responder.send(Ok(false));
            return;
        }
        self.loading_older = true;
        let service = self.service.clone();
        let conversation_id = self.conversation_id;
        let page_size = self.pagination.page_size();
        self.spawn(async move {
            let result = fetch_page(&service, conversation_id, page, page_size).await;
            Completion::OlderLoaded { result, responder }
        });
    }
}
