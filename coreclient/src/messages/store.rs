// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{cmp::Ordering, collections::HashSet};

use chrono::TimeDelta;
use gigcommon::{identifiers::MessageId, messages::ServerMessage};
use tracing::debug;

use super::{Delivery, Message, MessageKey, TempKey};

/// Deduplicated and ordered messages of a single conversation
///
/// Invariants:
///
/// * no two messages share a [`MessageId`],
/// * messages are sorted by [`Message::display_cmp`].
///
/// All operations are total; there is no I/O and nothing can fail.
#[derive(Debug, Default, Clone)]
pub struct MessageStore {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

/// Outcome of reconciling a pending message with the send response of the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The pending message was replaced by the confirmed one.
    Replaced,
    /// The confirmed message was already known (e.g. pushed before the response arrived); the
    /// pending message was dropped.
    Superseded,
    /// There was no pending message; the confirmed message was appended.
    Appended,
}

/// Outcome of observing a message from the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    /// The message was already known.
    Duplicate,
    /// The message is the echo of a locally pending message which was replaced.
    Replaced(TempKey),
    Appended,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn pending(&self, temp_key: TempKey) -> Option<&Message> {
        self.position(temp_key).map(|idx| &self.messages[idx])
    }

    /// Newest message acknowledged by the backend
    pub fn newest_confirmed(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| !m.is_pending())
    }

    /// Inserts a message at its position in display order.
    ///
    /// Returns `false` if a message with the same id is already present. Pending messages are
    /// always inserted.
    pub fn append(&mut self, message: Message) -> bool {
        if let Some(id) = message.id()
            && !self.ids.insert(id)
        {
            debug!(%id, "Ignoring duplicate message");
            return false;
        }
        self.insert_sorted(message);
        true
    }

    /// Replaces the pending message `temp_key` with its confirmed counterpart.
    ///
    /// The message keeps its position unless its new creation time violates the display order.
    pub fn reconcile(&mut self, temp_key: TempKey, confirmed: ServerMessage) -> Reconciled {
        let position = self.position(temp_key);
        if self.ids.contains(&confirmed.id) {
            if let Some(idx) = position {
                self.messages.remove(idx);
            }
            return Reconciled::Superseded;
        }
        match position {
            Some(idx) => {
                self.replace_at(idx, confirmed);
                Reconciled::Replaced
            }
            None => {
                self.append(confirmed.into());
                Reconciled::Appended
            }
        }
    }

    /// Adds a pushed message.
    ///
    /// A pending message from the same sender with the same content created within `window` of
    /// the pushed message is considered to be its echo and is replaced.
    pub fn reconcile_echo(&mut self, message: ServerMessage, window: TimeDelta) -> EchoOutcome {
        if self.ids.contains(&message.id) {
            debug!(id = %message.id, "Ignoring duplicate message");
            return EchoOutcome::Duplicate;
        }
        match self.echo_position(&message, window) {
            Some((idx, temp_key)) => {
                self.replace_at(idx, message);
                EchoOutcome::Replaced(temp_key)
            }
            None => {
                self.append(message.into());
                EchoOutcome::Appended
            }
        }
    }

    /// Merges a fetched page.
    ///
    /// Messages already present are skipped, pending messages echoed by the page are replaced.
    /// Afterwards, the messages are stably sorted. Returns the number of new messages.
    pub fn merge(
        &mut self,
        page: impl IntoIterator<Item = ServerMessage>,
        window: TimeDelta,
    ) -> usize {
        let mut added = 0;
        for message in page {
            if !self.ids.insert(message.id) {
                continue;
            }
            match self.echo_position(&message, window) {
                Some((idx, _)) => self.messages[idx] = message.into(),
                None => self.messages.push(message.into()),
            }
            added += 1;
        }
        self.messages.sort_by(Message::display_cmp);
        added
    }

    /// Replaces all messages including pending ones by the given page.
    pub fn replace_all(&mut self, page: impl IntoIterator<Item = ServerMessage>) {
        self.messages.clear();
        self.ids.clear();
        self.merge(page, TimeDelta::zero());
    }

    /// Removes a pending message, e.g. after the backend rejected it.
    pub fn remove_pending(&mut self, temp_key: TempKey) -> Option<Message> {
        self.position(temp_key).map(|idx| self.messages.remove(idx))
    }

    /// Changes the delivery state of a pending message.
    ///
    /// Returns `false` if there is no such pending message.
    pub fn set_delivery(&mut self, temp_key: TempKey, delivery: Delivery) -> bool {
        let Some(idx) = self.position(temp_key) else {
            return false;
        };
        self.messages[idx].key = MessageKey::LocalPending { temp_key, delivery };
        true
    }

    fn position(&self, temp_key: TempKey) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.temp_key() == Some(temp_key))
    }

    fn echo_position(&self, message: &ServerMessage, window: TimeDelta) -> Option<(usize, TempKey)> {
        self.messages.iter().enumerate().find_map(|(idx, m)| {
            let temp_key = m.temp_key()?;
            m.is_echoed_by(message, window).then_some((idx, temp_key))
        })
    }

    fn insert_sorted(&mut self, message: Message) {
        let idx = self
            .messages
            .partition_point(|m| m.display_cmp(&message) != Ordering::Greater);
        self.messages.insert(idx, message);
    }

    fn replace_at(&mut self, idx: usize, confirmed: ServerMessage) {
        self.ids.insert(confirmed.id);
        self.messages[idx] = confirmed.into();
        if !self.is_ordered_at(idx) {
            let message = self.messages.remove(idx);
            self.insert_sorted(message);
        }
    }

    fn is_ordered_at(&self, idx: usize) -> bool {
        let message = &self.messages[idx];
        let after_prev = idx
            .checked_sub(1)
            .is_none_or(|prev| self.messages[prev].display_cmp(message) != Ordering::Greater);
        let before_next = self
            .messages
            .get(idx + 1)
            .is_none_or(|next| message.display_cmp(next) != Ordering::Greater);
        after_prev && before_next
    }
}
