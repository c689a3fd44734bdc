// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use gigcommon::{
    conversation::{Conversation, ConversationStatus},
    identifiers::ConversationId,
};

use crate::{channel::BindState, conversation::FeedbackPrompt, messages::Message};

/// Health of the push channels of a conversation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelHealth {
    #[default]
    Connecting,
    /// Both channels are bound.
    Live,
    /// At least one channel could not be bound; the view is only updated by explicit reloads.
    Degraded,
    Released,
}

impl ChannelHealth {
    pub(crate) fn from_states(conversation: BindState, presence: BindState) -> Self {
        use BindState::*;
        match (conversation, presence) {
            (Released, _) | (_, Released) => Self::Released,
            (Degraded, _) | (_, Degraded) => Self::Degraded,
            (Bound, Bound) => Self::Live,
            _ => Self::Connecting,
        }
    }
}

/// Snapshot of a conversation as rendered by the UI
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationView {
    pub conversation_id: ConversationId,
    /// `None` until the conversation is loaded
    pub conversation: Option<Conversation>,
    /// Messages in display order
    pub messages: Vec<Message>,
    pub typing_label: Option<String>,
    pub can_send: bool,
    pub feedback_prompt: Option<FeedbackPrompt>,
    pub channel_health: ChannelHealth,
    pub loading: bool,
    pub has_older: bool,
    /// Error of the last failed load
    pub last_error: Option<String>,
}

impl ConversationView {
    pub(crate) fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            conversation: None,
            messages: Vec::new(),
            typing_label: None,
            can_send: false,
            feedback_prompt: None,
            channel_health: ChannelHealth::Connecting,
            loading: true,
            has_older: false,
            last_error: None,
        }
    }

    pub fn status(&self) -> Option<ConversationStatus> {
        self.conversation.as_ref().map(|c| c.status)
    }

    pub fn is_removed(&self) -> bool {
        self.status() == Some(ConversationStatus::Removed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_health() {
        use BindState::*;
        assert_eq!(ChannelHealth::from_states(Bound, Bound), ChannelHealth::Live);
        assert_eq!(
            ChannelHealth::from_states(Bound, Retrying),
            ChannelHealth::Connecting
        );
        assert_eq!(
            ChannelHealth::from_states(Degraded, Bound),
            ChannelHealth::Degraded
        );
        assert_eq!(
            ChannelHealth::from_states(Degraded, Released),
            ChannelHealth::Released
        );
    }
}
