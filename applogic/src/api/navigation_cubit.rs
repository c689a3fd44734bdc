// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use futures_util::Stream;
use gigcoreclient::ConversationId;
use tokio::sync::watch;

use crate::util::CubitCore;

/// State of the global app navigation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationState {
    pub current_conversation: NavigationConversation,
    /// The feedback form of the current conversation is open.
    pub feedback_open: bool,
}

/// A conversation that is currently shown in the navigation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum NavigationConversation {
    /// There is no conversation currently open
    #[default]
    None,
    Open(ConversationId),
    /// A conversation that transitioned from open to closed.
    ///
    /// This state allows to navigate away from a conversation but keep views rendering the same
    /// conversation during the transition.
    Closed(ConversationId),
}

impl NavigationConversation {
    pub fn open_id(&self) -> Option<ConversationId> {
        match self {
            Self::Open(conversation_id) => Some(*conversation_id),
            _ => None,
        }
    }

    fn close(&mut self) -> bool {
        match self {
            Self::None => false,
            Self::Open(conversation_id) => {
                *self = Self::Closed(*conversation_id);
                true
            }
            Self::Closed(_) => false,
        }
    }
}

/// Provides the navigation state and navigation actions to the app
///
/// Also owns the observable of the conversation currently visible to the user, which the mounted
/// conversations use to decide whether to mark themselves as read.
#[derive(Debug)]
pub struct NavigationCubit {
    core: CubitCore<NavigationState>,
    active_tx: watch::Sender<Option<ConversationId>>,
}

impl Default for NavigationCubit {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationCubit {
    pub fn new() -> Self {
        let (active_tx, _) = watch::channel(None);
        Self {
            core: CubitCore::with_initial_state(NavigationState::default()),
            active_tx,
        }
    }

    // Cubit interface

    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    pub fn close(&mut self) {
        self.core.close();
    }

    pub fn state(&self) -> NavigationState {
        self.core.state()
    }

    pub fn stream(&self) -> impl Stream<Item = NavigationState> + Send + 'static {
        self.core.stream()
    }

    // Rust private methods

    /// Observable of the conversation currently visible to the user
    pub(crate) fn active_conversation(&self) -> watch::Receiver<Option<ConversationId>> {
        self.active_tx.subscribe()
    }

    // Cubit methods

    pub fn open_conversation(&self, conversation_id: ConversationId) {
        self.core.state_tx().send_if_modified(|state| {
            if state.current_conversation == NavigationConversation::Open(conversation_id) {
                return false;
            }
            *state = NavigationState {
                current_conversation: NavigationConversation::Open(conversation_id),
                feedback_open: false,
            };
            true
        });
        self.sync_active();
    }

    pub fn close_conversation(&self) {
        self.core.state_tx().send_if_modified(|state| {
            let mut changed = state.current_conversation.close();
            changed |= std::mem::replace(&mut state.feedback_open, false);
            changed
        });
        self.sync_active();
    }

    pub fn open_feedback(&self) {
        self.core.state_tx().send_if_modified(|state| {
            state.current_conversation.open_id().is_some()
                && !std::mem::replace(&mut state.feedback_open, true)
        });
    }

    /// Navigates one screen back; returns whether anything changed.
    pub fn pop(&self) -> bool {
        let changed = self.core.state_tx().send_if_modified(|state| {
            if state.feedback_open {
                state.feedback_open = false;
                true
            } else {
                state.current_conversation.close()
            }
        });
        self.sync_active();
        changed
    }

    /// Whether a new message in the conversation counts as unread
    ///
    /// Messages of the conversation the user is looking at are read right away.
    pub fn should_count_unread(&self, conversation_id: ConversationId) -> bool {
        *self.active_tx.borrow() != Some(conversation_id)
    }

    fn sync_active(&self) {
        let active = self.core.state_tx().borrow().current_conversation.open_id();
        self.active_tx.send_if_modified(|current| {
            if *current == active {
                return false;
            }
            *current = active;
            true
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CONVERSATION: ConversationId = ConversationId::new(7);
    const OTHER: ConversationId = ConversationId::new(8);

    #[test]
    fn open_and_close() {
        let navigation = NavigationCubit::new();
        let active = navigation.active_conversation();
        assert_eq!(*active.borrow(), None);

        navigation.open_conversation(CONVERSATION);
        assert_eq!(
            navigation.state().current_conversation,
            NavigationConversation::Open(CONVERSATION)
        );
        assert_eq!(*active.borrow(), Some(CONVERSATION));
        assert!(!navigation.should_count_unread(CONVERSATION));
        assert!(navigation.should_count_unread(OTHER));

        navigation.close_conversation();
        assert_eq!(
            navigation.state().current_conversation,
            NavigationConversation::Closed(CONVERSATION)
        );
        assert_eq!(*active.borrow(), None);
        assert!(navigation.should_count_unread(CONVERSATION));
    }

    #[test]
    fn pop_closes_feedback_first() {
        let navigation = NavigationCubit::new();
        navigation.open_feedback();
        assert!(!navigation.state().feedback_open);

        navigation.open_conversation(CONVERSATION);
        navigation.open_feedback();
        assert!(navigation.state().feedback_open);

        assert!(navigation.pop());
        assert!(!navigation.state().feedback_open);
        assert_eq!(*navigation.active_conversation().borrow(), Some(CONVERSATION));

        assert!(navigation.pop());
        assert_eq!(*navigation.active_conversation().borrow(), None);
        assert!(!navigation.pop());
    }

    #[test]
    fn switching_conversations() {
        let navigation = NavigationCubit::new();
        let mut active = navigation.active_conversation();
        navigation.open_conversation(CONVERSATION);
        navigation.open_conversation(OTHER);
        assert!(active.has_changed().unwrap());
        assert_eq!(*active.borrow_and_update(), Some(OTHER));

        navigation.open_conversation(OTHER);
        assert!(!active.has_changed().unwrap());
    }
}
