// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Typing presence
//!
//! Presence is advisory: nobody acknowledges typing signals. Instead, all state expires on its
//! own. The local user emits `typing=true` when they start typing, refreshes it periodically and
//! emits `typing=false` once when they stop. A remote user is considered typing until they
//! signal stop, send a message, or don't refresh their signal within the expiry window.
//!
//! The tracker is a pure state machine. Time is passed in explicitly; the caller is responsible
//! for calling [`PresenceTracker::poll`] at [`PresenceTracker::next_deadline`].

use std::collections::BTreeMap;

use gigcommon::identifiers::UserId;
use tokio::time::Instant;

use crate::settings::PresenceSettings;

/// A typing signal the local client has to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSignal {
    Start,
    Refresh,
    Stop,
}

impl LocalSignal {
    pub fn is_typing(self) -> bool {
        matches!(self, Self::Start | Self::Refresh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalTyping {
    Idle,
    Active {
        next_refresh: Instant,
        inactive_at: Instant,
    },
}

#[derive(Debug, Clone)]
struct RemoteTyping {
    expires_at: Instant,
    display_name: Option<String>,
}

/// Result of advancing the tracker in time
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub signal: Option<LocalSignal>,
    /// Whether the set of typing remote users changed
    pub remote_changed: bool,
}

#[derive(Debug)]
pub struct PresenceTracker {
    settings: PresenceSettings,
    local: LocalTyping,
    remote: BTreeMap<UserId, RemoteTyping>,
}

impl PresenceTracker {
    pub fn new(settings: PresenceSettings) -> Self {
        Self {
            settings,
            local: LocalTyping::Idle,
            remote: BTreeMap::new(),
        }
    }

    pub fn is_local_typing(&self) -> bool {
        matches!(self.local, LocalTyping::Active { .. })
    }

    /// The composer text changed.
    pub fn on_local_input(&mut self, text: &str, now: Instant) -> Option<LocalSignal> {
        if text.trim().is_empty() {
            return self.stop_local();
        }
        let inactive_at = now + self.settings.inactivity_timeout;
        match self.local {
            LocalTyping::Idle => {
                self.local = LocalTyping::Active {
                    next_refresh: now + self.settings.refresh_interval,
                    inactive_at,
                };
                Some(LocalSignal::Start)
            }
            LocalTyping::Active { next_refresh, .. } => {
                self.local = LocalTyping::Active {
                    next_refresh,
                    inactive_at,
                };
                None
            }
        }
    }

    /// The local user sent a message.
    pub fn on_local_send(&mut self) -> Option<LocalSignal> {
        self.stop_local()
    }

    /// Stops local typing; emits a stop signal if the user was typing.
    pub fn stop_local(&mut self) -> Option<LocalSignal> {
        match std::mem::replace(&mut self.local, LocalTyping::Idle) {
            LocalTyping::Active { .. } => Some(LocalSignal::Stop),
            LocalTyping::Idle => None,
        }
    }

    /// A remote user signaled typing.
    ///
    /// Returns whether the set of typing users changed.
    pub fn on_remote_signal(
        &mut self,
        user_id: UserId,
        display_name: Option<String>,
        is_typing: bool,
        now: Instant,
    ) -> bool {
        if !is_typing {
            return self.remote.remove(&user_id).is_some();
        }
        let expires_at = now + self.settings.remote_expiry;
        match self.remote.get_mut(&user_id) {
            Some(typing) => {
                typing.expires_at = expires_at;
                if display_name.is_some() {
                    typing.display_name = display_name;
                }
                false
            }
            None => {
                self.remote.insert(
                    user_id,
                    RemoteTyping {
                        expires_at,
                        display_name,
                    },
                );
                true
            }
        }
    }

    /// A message from a remote user arrived; they are done typing.
    pub fn on_remote_message(&mut self, user_id: UserId) -> bool {
        self.remote.remove(&user_id).is_some()
    }

    pub fn clear_remote(&mut self) -> bool {
        let changed = !self.remote.is_empty();
        self.remote.clear();
        changed
    }

    /// Advances the timers to `now`.
    pub fn poll(&mut self, now: Instant) -> PresenceUpdate {
        let signal = match self.local {
            LocalTyping::Idle => None,
            LocalTyping::Active { inactive_at, .. } if inactive_at <= now => {
                self.local = LocalTyping::Idle;
                Some(LocalSignal::Stop)
            }
            LocalTyping::Active {
                mut next_refresh,
                inactive_at,
            } if next_refresh <= now => {
                while next_refresh <= now {
                    next_refresh += self.settings.refresh_interval;
                }
                self.local = LocalTyping::Active {
                    next_refresh,
                    inactive_at,
                };
                Some(LocalSignal::Refresh)
            }
            LocalTyping::Active { .. } => None,
        };

        let before = self.remote.len();
        self.remote.retain(|_, typing| now < typing.expires_at);
        PresenceUpdate {
            signal,
            remote_changed: self.remote.len() != before,
        }
    }

    /// Earliest time at which [`Self::poll`] has something to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let local = match self.local {
            LocalTyping::Idle => None,
            LocalTyping::Active {
                next_refresh,
                inactive_at,
            } => Some(next_refresh.min(inactive_at)),
        };
        let remote = self.remote.values().map(|typing| typing.expires_at).min();
        local.into_iter().chain(remote).min()
    }

    pub fn typing_users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.remote.keys().copied()
    }

    /// Label of the typing indicator, e.g. "Alice is typing…"
    ///
    /// Names not carried by the typing signals are looked up with `fallback_name`.
    pub fn typing_label(&self, fallback_name: impl Fn(UserId) -> Option<String>) -> Option<String> {
        let mut names = self.remote.iter().map(|(user_id, typing)| {
            typing
                .display_name
                .clone()
                .or_else(|| fallback_name(*user_id))
                .unwrap_or_else(|| "Someone".to_owned())
        });
        match self.remote.len() {
            0 => None,
            1 => Some(format!("{} is typing…", names.next()?)),
            2 => Some(format!(
                "{} and {} are typing…",
                names.next()?,
                names.next()?
            )),
            n => Some(format!("{n} people are typing…")),
        }
    }
}
