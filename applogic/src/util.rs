// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

/// Core of a cubit: its observable state and the lifetime of its background tasks
///
/// Closing the cubit (or dropping the core) cancels all tasks spawned with the
/// [`Self::cancellation_token`] and ends all streams.
#[derive(Debug)]
pub(crate) struct CubitCore<S> {
    state_tx: watch::Sender<S>,
    cancel: CancellationToken,
}

impl<S> CubitCore<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub(crate) fn with_initial_state(initial_state: S) -> Self {
        let (state_tx, _) = watch::channel(initial_state);
        Self {
            state_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn state_tx(&self) -> &watch::Sender<S> {
        &self.state_tx
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn close(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn state(&self) -> S {
        self.state_tx.borrow().clone()
    }

    /// Stream of the current state followed by all changes until the cubit is closed
    pub(crate) fn stream(&self) -> impl Stream<Item = S> + Send + 'static {
        WatchStream::new(self.state_tx.subscribe()).take_until(self.cancel.clone().cancelled_owned())
    }
}

impl<S> Drop for CubitCore<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
