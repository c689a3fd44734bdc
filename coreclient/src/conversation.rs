// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical status of a conversation and its order
//!
//! The status changes from two independent sources:
//!
//! * confirmed results of local order actions, which are applied only after the backend
//!   acknowledged them, and
//! * status changes pushed by the backend, which always win.
//!
//! Both sources are filtered by the lifecycle order of [`ConversationStatus::rank`], so a late or
//! duplicated event can't move the conversation back.

use std::{collections::HashSet, sync::Arc};

use gigcommon::{
    conversation::{Conversation, ConversationStatus},
    events::StatusChange,
    identifiers::{ConversationId, OrderId, UserId},
    order::{FeedbackKind, OrderAction},
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::SyncError;

/// Conversations for which the feedback prompt was shown in this session
///
/// Shared by all conversations of a session, so remounting a conversation doesn't show the
/// prompt again.
#[derive(Debug, Clone, Default)]
pub struct FeedbackLedger {
    prompted: Arc<Mutex<HashSet<(ConversationId, UserId)>>>,
}

impl FeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_prompted(&self, conversation_id: ConversationId, user_id: UserId) -> bool {
        self.prompted.lock().contains(&(conversation_id, user_id))
    }

    /// Returns `true` only the first time it is called for a conversation and user.
    fn arm(&self, conversation_id: ConversationId, user_id: UserId) -> bool {
        self.prompted.lock().insert((conversation_id, user_id))
    }
}

/// Request to the user to review a finished order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackPrompt {
    pub order_id: OrderId,
    pub kind: FeedbackKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConversationStatus,
    pub to: ConversationStatus,
}

#[derive(Debug)]
pub struct ConversationStateMachine {
    conversation_id: ConversationId,
    viewer: UserId,
    conversation: Option<Conversation>,
    /// Status change received before the conversation was loaded
    early_change: Option<StatusChange>,
    ledger: FeedbackLedger,
    prompt: Option<FeedbackPrompt>,
}

impl ConversationStateMachine {
    pub fn new(conversation_id: ConversationId, viewer: UserId, ledger: FeedbackLedger) -> Self {
        Self {
            conversation_id,
            viewer,
            conversation: None,
            early_change: None,
            ledger,
            prompt: None,
        }
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn status(&self) -> Option<ConversationStatus> {
        self.conversation.as_ref().map(|c| c.status)
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    pub fn feedback_prompt(&self) -> Option<FeedbackPrompt> {
        self.prompt
    }

    /// Applies a conversation fetched from the backend.
    ///
    /// Snapshots older than the current state are ignored. That includes snapshots with a
    /// status behind the current one, since a pushed status change may have advanced the
    /// status without a timestamp while the snapshot was in flight. A removed conversation
    /// stays removed.
    pub fn load_snapshot(&mut self, mut snapshot: Conversation) -> Option<Transition> {
        if snapshot.id != self.conversation_id {
            warn!(expected = %self.conversation_id, actual = %snapshot.id, "Ignoring snapshot of other conversation");
            return None;
        }
        let transition = match self.conversation.take() {
            None => {
                self.conversation = Some(snapshot);
                None
            }
            Some(current) if is_stale_snapshot(&current, &snapshot) => {
                debug!(current = %current.status, status = %snapshot.status, "Ignoring stale snapshot");
                self.conversation = Some(current);
                None
            }
            Some(current) => {
                let from = current.status;
                let to = snapshot.status;
                if to == ConversationStatus::Closed && !snapshot.is_order_owner(self.viewer) {
                    deactivate(&mut snapshot, self.viewer);
                }
                self.conversation = Some(snapshot);
                (from != to).then(|| self.enter(from, to))
            }
        };
        match self.early_change.take() {
            Some(change) => self.apply_pushed(change).or(transition),
            None => transition,
        }
    }

    /// Applies a status change pushed by the backend.
    pub fn apply_pushed(&mut self, change: StatusChange) -> Option<Transition> {
        if change.conversation_id != self.conversation_id {
            return None;
        }
        let Some(conversation) = self.conversation.as_mut() else {
            debug!(status = %change.status, "Status change before conversation was loaded");
            self.early_change = Some(change);
            return None;
        };

        let from = conversation.status;
        let to = change.status;
        let stale = change
            .updated_at
            .is_some_and(|updated_at| updated_at < conversation.updated_at);
        if stale || to.rank() < from.rank() {
            warn!(%from, %to, "Ignoring stale status change");
            return None;
        }
        if to.rank() == from.rank() && to != from {
            warn!(%from, %to, "Ignoring conflicting status change");
            return None;
        }

        if let Some(updated_at) = change.updated_at {
            conversation.updated_at = updated_at;
        }
        if to == ConversationStatus::Closed && !conversation.is_order_owner(self.viewer) {
            // the order went to another specialist
            deactivate(conversation, self.viewer);
        }
        if from == to {
            return None;
        }
        conversation.status = to;
        info!(conversation_id = %self.conversation_id, %from, %to, "Status changed");
        Some(self.enter(from, to))
    }

    /// The conversation was deleted by the backend.
    pub fn apply_deleted(&mut self) -> Option<Transition> {
        self.apply_pushed(StatusChange {
            conversation_id: self.conversation_id,
            status: ConversationStatus::Removed,
            updated_at: None,
        })
    }

    /// Applies an order action after the backend confirmed it.
    pub fn apply_confirmed(&mut self, action: OrderAction) -> Option<Transition> {
        let conversation = self.conversation.as_mut()?;
        let to = match action {
            OrderAction::Choose { .. } => ConversationStatus::InProgress,
            OrderAction::Cancel => ConversationStatus::Cancelled,
            OrderAction::Complete => ConversationStatus::Completed,
            OrderAction::Reject { specialist_id } => {
                if let Some(participant) = conversation.participant_mut(specialist_id) {
                    participant.is_active = false;
                }
                return None;
            }
        };
        let from = conversation.status;
        if to.rank() <= from.rank() {
            debug!(%from, %to, "Confirmed action doesn't advance the status");
            return None;
        }
        conversation.status = to;
        info!(conversation_id = %self.conversation_id, %from, %to, ?action, "Order action applied");
        Some(self.enter(from, to))
    }

    fn enter(&mut self, from: ConversationStatus, to: ConversationStatus) -> Transition {
        if to.is_finished()
            && !from.is_finished()
            && let Some(conversation) = &self.conversation
            && self.ledger.arm(self.conversation_id, self.viewer)
        {
            let kind = match to {
                ConversationStatus::Completed => FeedbackKind::Completion,
                _ => FeedbackKind::Cancellation,
            };
            self.prompt = Some(FeedbackPrompt {
                order_id: conversation.order_id,
                kind,
            });
        }
        Transition { from, to }
    }

    /// Whether the viewer may send a message right now
    pub fn can_send(&self) -> Result<(), SyncError> {
        let conversation = self.conversation.as_ref().ok_or(SyncError::NotLoaded)?;
        match conversation.status {
            ConversationStatus::Removed => return Err(SyncError::ConversationRemoved),
            status if !status.accepts_messages() => {
                return Err(SyncError::ConversationClosed(status));
            }
            _ => {}
        }
        let active = conversation
            .participant(self.viewer)
            .is_none_or(|participant| participant.is_active);
        if !active {
            return Err(SyncError::ParticipantInactive);
        }
        Ok(())
    }

    /// Removes the pending feedback prompt after it was submitted or dismissed.
    ///
    /// The prompt is never shown again for this conversation in this session.
    pub fn resolve_prompt(&mut self) -> Option<FeedbackPrompt> {
        self.prompt.take()
    }
}

fn is_stale_snapshot(current: &Conversation, snapshot: &Conversation) -> bool {
    current.status == ConversationStatus::Removed
        || snapshot.updated_at < current.updated_at
        || snapshot.status.rank() < current.status.rank()
        || (snapshot.status.rank() == current.status.rank() && snapshot.status != current.status)
}

fn deactivate(conversation: &mut Conversation, user_id: UserId) {
    if let Some(participant) = conversation.participant_mut(user_id) {
        participant.is_active = false;
    }
}

#[cfg(test)]
mod test {
    use chrono::{DateTime, TimeZone, Utc};
    use gigcommon::conversation::Participant;

    use super::*;

    const CONVERSATION: ConversationId = ConversationId::new(7);
    const OWNER: UserId = UserId::new(1);
    const SPECIALIST: UserId = UserId::new(2);

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 10, 0, secs).unwrap()
    }

    fn conversation(status: ConversationStatus, secs: u32) -> Conversation {
        Conversation {
            id: CONVERSATION,
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
            order_id: OrderId::new(70),
            order_owner_id: OWNER,
            updated_at: at(secs),
        }
    }

    fn push(status: ConversationStatus, secs: Option<u32>) -> StatusChange {
        StatusChange {
            conversation_id: CONVERSATION,
            status,
            updated_at: secs.map(at),
        }
    }

    fn machine(viewer: UserId, status: ConversationStatus) -> ConversationStateMachine {
        let mut machine = ConversationStateMachine::new(CONVERSATION, viewer, FeedbackLedger::new());
        machine.load_snapshot(conversation(status, 0));
        machine
    }

    #[test]
    fn not_loaded() {
        let machine = ConversationStateMachine::new(CONVERSATION, OWNER, FeedbackLedger::new());
        assert!(matches!(machine.can_send(), Err(SyncError::NotLoaded)));
    }

    #[test]
    fn closed_stays_closed() {
        let mut machine = machine(OWNER, ConversationStatus::InProgress);
        machine.can_send().unwrap();

        let transition = machine.apply_pushed(push(ConversationStatus::Closed, Some(5)));
        assert_eq!(
            transition,
            Some(Transition {
                from: ConversationStatus::InProgress,
                to: ConversationStatus::Closed
            })
        );

        // stale open push arrives late
        assert_eq!(machine.apply_pushed(push(ConversationStatus::Open, Some(10))), None);
        assert_eq!(machine.apply_pushed(push(ConversationStatus::Open, None)), None);
        assert_eq!(machine.status(), Some(ConversationStatus::Closed));
        assert!(matches!(
            machine.can_send(),
            Err(SyncError::ConversationClosed(ConversationStatus::Closed))
        ));
    }

    #[test]
    fn removed_is_terminal() {
        let mut machine = machine(OWNER, ConversationStatus::Open);
        assert!(machine.apply_deleted().is_some());
        assert_eq!(machine.apply_pushed(push(ConversationStatus::Closed, None)), None);
        assert_eq!(machine.load_snapshot(conversation(ConversationStatus::Open, 60)), None);
        assert!(matches!(
            machine.can_send(),
            Err(SyncError::ConversationRemoved)
        ));
        assert_eq!(machine.feedback_prompt(), None);
    }

    #[test]
    fn terminal_states_dont_switch() {
        let mut machine = machine(OWNER, ConversationStatus::InProgress);
        machine.apply_pushed(push(ConversationStatus::Completed, None));
        assert_eq!(machine.apply_pushed(push(ConversationStatus::Cancelled, None)), None);
        assert_eq!(machine.status(), Some(ConversationStatus::Completed));
    }

    #[test]
    fn stale_push_is_ignored() {
        let mut machine = ConversationStateMachine::new(CONVERSATION, OWNER, FeedbackLedger::new());
        machine.load_snapshot(conversation(ConversationStatus::Open, 30));
        assert_eq!(
            machine.apply_pushed(push(ConversationStatus::InProgress, Some(10))),
            None
        );
        assert!(
            machine
                .apply_pushed(push(ConversationStatus::InProgress, Some(40)))
                .is_some()
        );
    }

    #[test]
    fn closed_deactivates_non_owner_viewer() {
        let mut machine = machine(SPECIALIST, ConversationStatus::Open);
        machine.apply_pushed(push(ConversationStatus::Closed, None));
        let viewer = machine.conversation().unwrap().participant(SPECIALIST).unwrap();
        assert!(!viewer.is_active);

        let mut machine = self::machine(OWNER, ConversationStatus::Open);
        machine.apply_pushed(push(ConversationStatus::Closed, None));
        let viewer = machine.conversation().unwrap().participant(OWNER).unwrap();
        assert!(viewer.is_active);
    }

    #[test]
    fn inactive_participant_cannot_send() {
        let mut machine = machine(SPECIALIST, ConversationStatus::Open);
        machine.apply_confirmed(OrderAction::Reject {
            specialist_id: SPECIALIST,
        });
        assert!(matches!(
            machine.can_send(),
            Err(SyncError::ParticipantInactive)
        ));
    }

    #[test]
    fn feedback_prompt_once_per_session() {
        let ledger = FeedbackLedger::new();
        let mut machine = ConversationStateMachine::new(CONVERSATION, OWNER, ledger.clone());
        machine.load_snapshot(conversation(ConversationStatus::InProgress, 0));

        machine.apply_pushed(push(ConversationStatus::Completed, None));
        assert_eq!(
            machine.feedback_prompt(),
            Some(FeedbackPrompt {
                order_id: OrderId::new(70),
                kind: FeedbackKind::Completion,
            })
        );
        assert!(machine.resolve_prompt().is_some());
        assert_eq!(machine.feedback_prompt(), None);
        assert!(ledger.was_prompted(CONVERSATION, OWNER));

        // remount in the same session
        let mut machine = ConversationStateMachine::new(CONVERSATION, OWNER, ledger);
        machine.load_snapshot(conversation(ConversationStatus::InProgress, 0));
        machine.apply_pushed(push(ConversationStatus::Completed, None));
        assert_eq!(machine.feedback_prompt(), None);
    }

    #[test]
    fn confirmed_actions_advance_status() {
        let mut machine = machine(OWNER, ConversationStatus::Open);
        assert!(
            machine
                .apply_confirmed(OrderAction::Choose {
                    specialist_id: SPECIALIST
                })
                .is_some()
        );
        assert_eq!(machine.status(), Some(ConversationStatus::InProgress));

        // idempotent repetition
        assert_eq!(
            machine.apply_confirmed(OrderAction::Choose {
                specialist_id: SPECIALIST
            }),
            None
        );

        machine.apply_confirmed(OrderAction::Cancel);
        assert_eq!(machine.status(), Some(ConversationStatus::Cancelled));
        assert_eq!(
            machine.feedback_prompt().map(|prompt| prompt.kind),
            Some(FeedbackKind::Cancellation)
        );
    }

    #[test]
    fn finished_on_load_does_not_prompt() {
        let machine = machine(OWNER, ConversationStatus::Completed);
        assert_eq!(machine.feedback_prompt(), None);
    }

    #[test]
    fn reload_after_push_keeps_status() {
        let mut machine = machine(SPECIALIST, ConversationStatus::InProgress);
        machine.apply_pushed(push(ConversationStatus::Closed, None));

        // fetched before the push, same timestamp
        let transition = machine.load_snapshot(conversation(ConversationStatus::InProgress, 0));
        assert_eq!(transition, None);
        assert_eq!(machine.status(), Some(ConversationStatus::Closed));
        let viewer = machine.conversation().unwrap().participant(SPECIALIST).unwrap();
        assert!(!viewer.is_active);
        assert!(matches!(
            machine.can_send(),
            Err(SyncError::ConversationClosed(ConversationStatus::Closed))
        ));

        // a newer snapshot with the same status still keeps the viewer inactive
        assert_eq!(machine.load_snapshot(conversation(ConversationStatus::Closed, 5)), None);
        let viewer = machine.conversation().unwrap().participant(SPECIALIST).unwrap();
        assert!(!viewer.is_active);
    }

    #[test]
    fn reload_doesnt_switch_terminal_state() {
        let mut machine = machine(OWNER, ConversationStatus::InProgress);
        machine.apply_pushed(push(ConversationStatus::Completed, None));
        assert_eq!(
            machine.load_snapshot(conversation(ConversationStatus::Cancelled, 10)),
            None
        );
        assert_eq!(machine.status(), Some(ConversationStatus::Completed));
    }

    #[test]
    fn newer_snapshot_advances_status() {
        let mut machine = machine(OWNER, ConversationStatus::Open);
        let transition = machine.load_snapshot(conversation(ConversationStatus::InProgress, 0));
        assert_eq!(
            transition,
            Some(Transition {
                from: ConversationStatus::Open,
                to: ConversationStatus::InProgress
            })
        );
    }

    #[test]
    fn push_before_load_is_applied_after_load() {
        let mut machine = ConversationStateMachine::new(CONVERSATION, OWNER, FeedbackLedger::new());
        assert_eq!(machine.apply_pushed(push(ConversationStatus::InProgress, Some(20))), None);
        let transition = machine.load_snapshot(conversation(ConversationStatus::Open, 10));
        assert_eq!(
            transition,
            Some(Transition {
                from: ConversationStatus::Open,
                to: ConversationStatus::InProgress
            })
        );
    }
}
