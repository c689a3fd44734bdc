// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::debug;

/// Debounced marking of a conversation as read
///
/// A newer schedule restarts the debounce.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) enum MarkAsReadState {
    #[default]
    NotLoaded,
    /// Conversation is marked as read until the given timestamp
    Marked { at: DateTime<Utc> },
    /// Conversation is scheduled to be marked as read until the given timestamp
    Scheduled {
        until_timestamp: DateTime<Utc>,
        marked_at: DateTime<Utc>,
        due: Instant,
    },
}

impl MarkAsReadState {
    pub(super) fn loaded(&mut self) {
        if *self == Self::NotLoaded {
            *self = Self::Marked {
                at: DateTime::<Utc>::MIN_UTC,
            };
        }
    }

    /// Returns whether marking was scheduled.
    pub(super) fn schedule(&mut self, until_timestamp: DateTime<Utc>, due: Instant) -> bool {
        let (marked_at, scheduled_until) = match *self {
            Self::NotLoaded => {
                debug!("Marking as read while conversation is not loaded");
                return false;
            }
            Self::Marked { at } => (at, at),
            Self::Scheduled {
                until_timestamp,
                marked_at,
                ..
            } => (marked_at, until_timestamp),
        };
        if until_timestamp <= scheduled_until {
            return false; // already marked or scheduled at a later timestamp
        }
        *self = Self::Scheduled {
            until_timestamp,
            marked_at,
            due,
        };
        true
    }

    /// Drops a scheduled marking, e.g. because the conversation is not visible anymore.
    pub(super) fn cancel(&mut self) {
        if let Self::Scheduled { marked_at, .. } = *self {
            *self = Self::Marked { at: marked_at };
        }
    }

    pub(super) fn due(&self) -> Option<Instant> {
        match self {
            Self::Scheduled { due, .. } => Some(*due),
            _ => None,
        }
    }

    /// Returns `true` if the debounce elapsed and the conversation has to be marked now.
    pub(super) fn fire(&mut self, now: Instant) -> bool {
        match *self {
            Self::Scheduled {
                until_timestamp,
                due,
                ..
            } if due <= now => {
                *self = Self::Marked {
                    at: until_timestamp,
                };
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn debounce() {
        let now = Instant::now();
        let t0 = Utc::now();
        let mut state = MarkAsReadState::default();
        assert!(!state.schedule(t0, now));

        state.loaded();
        assert!(state.schedule(t0, now + Duration::from_secs(2)));
        assert!(!state.fire(now + Duration::from_secs(1)));

        // a newer message restarts the debounce
        let t1 = t0 + TimeDelta::seconds(1);
        assert!(state.schedule(t1, now + Duration::from_secs(3)));
        assert!(!state.schedule(t0, now + Duration::from_secs(3)));
        assert!(!state.fire(now + Duration::from_secs(2)));
        assert!(state.fire(now + Duration::from_secs(3)));
        assert_eq!(state, MarkAsReadState::Marked { at: t1 });

        assert!(!state.schedule(t1, now + Duration::from_secs(5)));
        assert_eq!(state.due(), None);
    }

    #[test]
    fn cancel_keeps_previous_mark() {
        let now = Instant::now();
        let t0 = Utc::now();
        let mut state = MarkAsReadState::Marked { at: t0 };
        assert!(state.schedule(t0 + TimeDelta::seconds(1), now));
        state.cancel();
        assert_eq!(state, MarkAsReadState::Marked { at: t0 });
        assert!(!state.fire(now));
    }
}
