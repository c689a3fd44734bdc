// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Support for sending responses from the sync loop back to the caller.

use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};

use pin_project::pin_project;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::SyncError;

/// Creates a new [`Responder`] and [`Response`].
///
/// Can be only created in the `orchestrator` module.
pub(super) fn responder<T>() -> (Responder<T>, Response<T>) {
    let (tx, rx) = oneshot::channel();
    (Responder { tx: Some(tx) }, Response { rx })
}

/// Resolves to the result of a command
///
/// Resolves to [`SyncError::Unmounted`] if the loop stopped before answering.
#[pin_project]
pub(super) struct Response<T> {
    #[pin]
    rx: oneshot::Receiver<Result<T, SyncError>>,
}

impl<T> Future for Response<T> {
    type Output = Result<T, SyncError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.project().rx.poll(cx)) {
            Ok(res) => Poll::Ready(res),
            Err(_) => Poll::Ready(Err(SyncError::Unmounted)),
        }
    }
}

pub(super) struct Responder<T> {
    tx: Option<oneshot::Sender<Result<T, SyncError>>>,
}

impl<T> Responder<T> {
    pub(super) fn send(mut self, response: Result<T, SyncError>) {
        if let Some(tx) = self.tx.take()
            && tx.send(response).is_err()
        {
            debug!("caller stopped waiting for the response");
        }
    }
}

impl<T> std::fmt::Debug for Responder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("pending", &self.tx.is_some())
            .finish()
    }
}
