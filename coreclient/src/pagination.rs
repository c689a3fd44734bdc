// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Loading of the message history
//!
//! Pages are numbered from 1 and page 1 holds the oldest messages. The newest messages are
//! therefore on the last page, which is only known after the total number of messages is known.

use chrono::TimeDelta;
use gigapiclient::ApiError;
use gigcommon::{identifiers::ConversationId, messages::ServerMessage};
use tracing::debug;

use crate::{
    messages::{EchoOutcome, MessageStore},
    service::ConversationService,
};

/// A page of messages fetched from the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub page: u32,
    pub total: u64,
    pub messages: Vec<ServerMessage>,
}

/// Number of the page holding the newest messages
pub fn newest_page(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total.div_ceil(page_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

pub async fn fetch_page(
    service: &impl ConversationService,
    conversation_id: ConversationId,
    page: u32,
    page_size: u32,
) -> Result<FetchedPage, ApiError> {
    let response = service
        .fetch_messages(conversation_id, page, page_size)
        .await?;
    Ok(FetchedPage {
        page,
        total: response.pagination.total,
        messages: response.messages,
    })
}

/// Fetches the page holding the newest messages.
///
/// The total number of messages is learned from a single message request for the first page. An
/// empty conversation needs no further request.
pub async fn fetch_newest_page(
    service: &impl ConversationService,
    conversation_id: ConversationId,
    page_size: u32,
) -> Result<FetchedPage, ApiError> {
    let first = fetch_page(service, conversation_id, 1, 1).await?;
    if first.total == 0 {
        return Ok(first);
    }
    let newest = newest_page(first.total, page_size);
    debug!(%conversation_id, total = first.total, page = newest, "Fetching newest page");
    fetch_page(service, conversation_id, newest, page_size).await
}

/// Outcome of an incoming pushed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// The initial load is running; the message is applied after it.
    Buffered,
    Applied(EchoOutcome),
}

/// Merges fetched pages with the locally held messages
///
/// Owns the [`MessageStore`]. While the initial page is being loaded, pushed messages are
/// buffered, so replacing the store with the loaded page doesn't drop them.
#[derive(Debug)]
pub struct PaginationCoordinator {
    store: MessageStore,
    page_size: u32,
    reconcile_window: TimeDelta,
    loading: bool,
    buffered: Vec<ServerMessage>,
    total: Option<u64>,
    /// Oldest page merged into the store
    oldest_page: Option<u32>,
}

impl PaginationCoordinator {
    pub fn new(page_size: u32, reconcile_window: TimeDelta) -> Self {
        Self {
            store: MessageStore::new(),
            page_size,
            reconcile_window,
            loading: false,
            buffered: Vec::new(),
            total: None,
            oldest_page: None,
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MessageStore {
        &mut self.store
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Starts buffering pushed messages until the loaded page is applied.
    pub fn begin_load(&mut self) {
        self.loading = true;
    }

    /// Replaces the store with the newest page.
    pub fn load_initial(&mut self, page: FetchedPage) {
        debug!(page = page.page, total = page.total, "Loaded initial page");
        self.store.replace_all(page.messages);
        self.finish_load(page.page, page.total);
    }

    /// Merges the newest page into the store, keeping pending messages.
    pub fn load_initial_preserving(&mut self, page: FetchedPage) {
        debug!(page = page.page, total = page.total, "Reloaded page");
        self.store.merge(page.messages, self.reconcile_window);
        let oldest = self.oldest_page.map_or(page.page, |oldest| oldest.min(page.page));
        self.finish_load(oldest, page.total);
    }

    /// The load failed; applies the buffered messages to the current content.
    pub fn load_failed(&mut self) {
        self.loading = false;
        self.drain_buffer();
    }

    /// Adds a message received on the push channel.
    pub fn append_incoming(&mut self, message: ServerMessage) -> Incoming {
        if self.loading {
            self.buffered.push(message);
            return Incoming::Buffered;
        }
        let outcome = self.store.reconcile_echo(message, self.reconcile_window);
        if outcome != EchoOutcome::Duplicate {
            self.total = self.total.map(|total| total + 1);
        }
        Incoming::Applied(outcome)
    }

    /// Page to fetch for older messages, if there are any
    pub fn next_older_page(&self) -> Option<u32> {
        self.oldest_page.and_then(|page| page.checked_sub(1)).filter(|page| *page >= 1)
    }

    /// Merges an older page into the store.
    pub fn merge_older(&mut self, page: FetchedPage) -> usize {
        let added = self.store.merge(page.messages, self.reconcile_window);
        self.oldest_page = Some(self.oldest_page.map_or(page.page, |oldest| oldest.min(page.page)));
        self.total = Some(page.total);
        added
    }

    fn finish_load(&mut self, oldest_page: u32, total: u64) {
        self.oldest_page = Some(oldest_page);
        self.total = Some(total);
        self.loading = false;
        self.drain_buffer();
    }

    fn drain_buffer(&mut self) {
        for message in std::mem::take(&mut self.buffered) {
            self.store.reconcile_echo(message, self.reconcile_window);
        }
    }
}
