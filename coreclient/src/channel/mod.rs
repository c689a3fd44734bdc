// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Binding to channels of an external push channel provider
//!
//! A [`ChannelBinding`] is an owned handle of a channel subscription. It is acquired with
//! [`ChannelBinding::bind`] and released with [`ChannelBinding::unbind`] or when it is dropped.
//!
//! If the first subscription attempt fails, e.g. because the transport is not connected yet,
//! exactly one retry is scheduled. Reconnecting the transport is the job of the provider. If the
//! retry fails as well, the binding stays degraded.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// An event received on a channel
#[derive(Debug, Clone, PartialEq)]
pub struct RawChannelEvent {
    pub channel: String,
    pub event: String,
    pub data: Value,
}

/// Stream of events of a subscribed channel
#[derive(Debug)]
pub struct ChannelSubscription {
    events: mpsc::UnboundedReceiver<RawChannelEvent>,
}

impl ChannelSubscription {
    pub fn new(events: mpsc::UnboundedReceiver<RawChannelEvent>) -> Self {
        Self { events }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {0} is not subscribed")]
    NotSubscribed(String),
    #[error("Channel binding was released")]
    Released,
    #[error("Push channel transport failed: {0}")]
    Transport(String),
}

/// External publish/subscribe transport
#[cfg_attr(any(test, feature = "test_utils"), mockall::automock)]
pub trait PushChannelProvider: Send + Sync + 'static {
    /// Subscribes to a channel.
    ///
    /// Returns `None` if the subscription is currently not possible.
    fn subscribe(&self, channel: &str) -> Option<ChannelSubscription>;

    /// Removes all handlers of the channel and releases the subscription.
    ///
    /// Must be a no-op for channels which are not subscribed.
    fn unsubscribe(&self, channel: &str);

    /// Triggers a client event on a subscribed channel.
    fn trigger(&self, channel: &str, event: &str, data: Value) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    /// The first subscription attempt is running.
    Pending,
    Bound,
    /// The first subscription attempt failed; a retry is scheduled.
    Retrying,
    /// The subscription failed for good.
    Degraded,
    Released,
}

struct BindingInner {
    provider: Arc<dyn PushChannelProvider>,
    channel: String,
    state_tx: watch::Sender<BindState>,
    /// Guards subscribing against a concurrent release
    released: Mutex<bool>,
}

impl BindingInner {
    /// Tries to subscribe and spawns the forwarding of events to `sink`.
    ///
    /// Returns `false` if the subscription failed.
    fn try_subscribe(
        &self,
        sink: &mpsc::UnboundedSender<RawChannelEvent>,
        cancel: &CancellationToken,
    ) -> bool {
        let released = self.released.lock();
        if *released {
            return true;
        }
        let Some(subscription) = self.provider.subscribe(&self.channel) else {
            return false;
        };
        let task = forward(subscription, sink.clone());
        tokio::spawn(cancel.clone().run_until_cancelled_owned(task));
        self.state_tx.send_replace(BindState::Bound);
        info!(channel = %self.channel, "Channel bound");
        true
    }

    fn trigger(&self, event: &str, data: Value) -> Result<(), ChannelError> {
        if *self.released.lock() {
            return Err(ChannelError::Released);
        }
        if *self.state_tx.borrow() != BindState::Bound {
            return Err(ChannelError::NotSubscribed(self.channel.clone()));
        }
        self.provider.trigger(&self.channel, event, data)
    }
}

async fn forward(
    mut subscription: ChannelSubscription,
    sink: mpsc::UnboundedSender<RawChannelEvent>,
) {
    while let Some(event) = subscription.events.recv().await {
        if sink.send(event).is_err() {
            return; // receiver dropped
        }
    }
}

async fn retry_once(
    inner: Arc<BindingInner>,
    sink: mpsc::UnboundedSender<RawChannelEvent>,
    cancel: CancellationToken,
    delay: Duration,
) {
    tokio::time::sleep(delay).await;
    // drop handlers a failed attempt might have left behind, so events are not delivered twice
    inner.provider.unsubscribe(&inner.channel);
    if !inner.try_subscribe(&sink, &cancel) {
        warn!(channel = %inner.channel, "Channel subscription failed; continuing without it");
        inner.state_tx.send_replace(BindState::Degraded);
    }
}

/// Owned subscription of a channel
pub struct ChannelBinding {
    inner: Arc<BindingInner>,
    cancel: CancellationToken,
}

impl ChannelBinding {
    /// Subscribes to `channel` and forwards its events to `sink`.
    ///
    /// The first attempt is made immediately; if it fails, a single retry is made after
    /// `retry_delay`.
    pub fn bind(
        provider: Arc<dyn PushChannelProvider>,
        channel: String,
        sink: mpsc::UnboundedSender<RawChannelEvent>,
        retry_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(BindState::Pending);
        let inner = Arc::new(BindingInner {
            provider,
            channel,
            state_tx,
            released: Mutex::new(false),
        });
        let cancel = CancellationToken::new();
        if !inner.try_subscribe(&sink, &cancel) {
            debug!(channel = %inner.channel, ?retry_delay, "Channel subscription failed; retrying");
            inner.state_tx.send_replace(BindState::Retrying);
            let task = retry_once(inner.clone(), sink, cancel.clone(), retry_delay);
            tokio::spawn(cancel.clone().run_until_cancelled_owned(task));
        }
        Self { inner, cancel }
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn state(&self) -> BindState {
        *self.inner.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<BindState> {
        self.inner.state_tx.subscribe()
    }

    /// Triggers a client event on the bound channel.
    pub fn trigger(&self, event: &str, data: Value) -> Result<(), ChannelError> {
        self.inner.trigger(event, data)
    }

    /// Handle for triggering events which doesn't own the binding
    pub fn trigger_handle(&self) -> ChannelTrigger {
        ChannelTrigger {
            inner: self.inner.clone(),
        }
    }

    /// Releases the subscription and stops the forwarding of events.
    ///
    /// Safe to call several times and if the binding never succeeded.
    pub fn unbind(&self) {
        let mut released = self.inner.released.lock();
        if *released {
            return;
        }
        *released = true;
        self.cancel.cancel();
        self.inner.provider.unsubscribe(&self.inner.channel);
        self.inner.state_tx.send_replace(BindState::Released);
        debug!(channel = %self.inner.channel, "Channel released");
    }
}

impl Drop for ChannelBinding {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl std::fmt::Debug for ChannelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBinding")
            .field("channel", &self.inner.channel)
            .field("state", &self.state())
            .finish()
    }
}

/// Triggers events on a bound channel
///
/// Fails with [`ChannelError::Released`] after the binding was released.
#[derive(Clone)]
pub struct ChannelTrigger {
    inner: Arc<BindingInner>,
}

impl ChannelTrigger {
    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    pub fn trigger(&self, event: &str, data: Value) -> Result<(), ChannelError> {
        self.inner.trigger(event, data)
    }
}

#[cfg(test)]
mod test {
    use mockall::Sequence;
    use serde_json::json;

    use super::*;

    const CHANNEL: &str = "conversation.7";
    const RETRY_DELAY: Duration = Duration::from_secs(1);

    fn event(name: &str) -> RawChannelEvent {
        RawChannelEvent {
            channel: CHANNEL.to_owned(),
            event: name.to_owned(),
            data: json!({}),
        }
    }

    #[tokio::test]
    async fn bind_and_forward() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut provider = MockPushChannelProvider::new();
        provider
            .expect_subscribe()
            .withf(|channel| channel == CHANNEL)
            .times(1)
            .return_once(move |_| Some(ChannelSubscription::new(events_rx)));
        provider
            .expect_unsubscribe()
            .withf(|channel| channel == CHANNEL)
            .times(1)
            .return_const(());

        let (sink, mut inbound) = mpsc::unbounded_channel();
        let binding = ChannelBinding::bind(Arc::new(provider), CHANNEL.to_owned(), sink, RETRY_DELAY);
        assert_eq!(binding.state(), BindState::Bound);

        events_tx.send(event("new-message")).unwrap();
        assert_eq!(inbound.recv().await, Some(event("new-message")));

        binding.unbind();
        binding.unbind();
        assert_eq!(binding.state(), BindState::Released);
        drop(binding); // drop doesn't unsubscribe again
    }

    #[tokio::test(start_paused = true)]
    async fn retry_once_after_delay() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut provider = MockPushChannelProvider::new();
        let mut seq = Sequence::new();
        provider
            .expect_subscribe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| None);
        provider
            .expect_unsubscribe()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        provider
            .expect_subscribe()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move |_| Some(ChannelSubscription::new(events_rx)));
        provider
            .expect_unsubscribe()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let (sink, mut inbound) = mpsc::unbounded_channel();
        let binding = ChannelBinding::bind(Arc::new(provider), CHANNEL.to_owned(), sink, RETRY_DELAY);
        assert_eq!(binding.state(), BindState::Retrying);

        let mut state = binding.subscribe_state();
        state.wait_for(|state| *state == BindState::Bound).await.unwrap();

        events_tx.send(event("status-changed")).unwrap();
        assert_eq!(inbound.recv().await, Some(event("status-changed")));
        binding.unbind();
    }

    #[tokio::test(start_paused = true)]
    async fn degraded_after_failed_retry() {
        let mut provider = MockPushChannelProvider::new();
        provider.expect_subscribe().times(2).returning(|_| None);
        // once before the retry and once when released
        provider.expect_unsubscribe().times(2).return_const(());
        provider.expect_trigger().never();

        let (sink, _inbound) = mpsc::unbounded_channel();
        let binding = ChannelBinding::bind(Arc::new(provider), CHANNEL.to_owned(), sink, RETRY_DELAY);

        let mut state = binding.subscribe_state();
        state
            .wait_for(|state| *state == BindState::Degraded)
            .await
            .unwrap();
        assert!(matches!(
            binding.trigger("client-typing", json!({})),
            Err(ChannelError::NotSubscribed(_))
        ));
        // no further attempts
        tokio::time::sleep(RETRY_DELAY * 10).await;
        assert_eq!(binding.state(), BindState::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn unbind_cancels_the_retry() {
        let mut provider = MockPushChannelProvider::new();
        provider.expect_subscribe().times(1).returning(|_| None);
        provider.expect_unsubscribe().times(1).return_const(());

        let (sink, _inbound) = mpsc::unbounded_channel();
        let binding = ChannelBinding::bind(Arc::new(provider), CHANNEL.to_owned(), sink, RETRY_DELAY);
        binding.unbind();

        tokio::time::sleep(RETRY_DELAY * 2).await;
        assert_eq!(binding.state(), BindState::Released);
    }

    #[tokio::test]
    async fn trigger_after_release_fails() {
        let (_events_tx, events_rx) = mpsc::unbounded_channel();
        let mut provider = MockPushChannelProvider::new();
        provider
            .expect_subscribe()
            .return_once(move |_| Some(ChannelSubscription::new(events_rx)));
        provider.expect_unsubscribe().return_const(());
        provider
            .expect_trigger()
            .withf(|channel, event, data| {
                channel == CHANNEL && event == "client-typing" && data["isTyping"] == true
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let (sink, _inbound) = mpsc::unbounded_channel();
        let binding = ChannelBinding::bind(Arc::new(provider), CHANNEL.to_owned(), sink, RETRY_DELAY);
        let trigger = binding.trigger_handle();
        trigger
            .trigger("client-typing", json!({ "isTyping": true }))
            .unwrap();

        drop(binding);
        assert!(matches!(
            trigger.trigger("client-typing", json!({ "isTyping": false })),
            Err(ChannelError::Released)
        ));
    }
}
