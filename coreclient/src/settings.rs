// SPDX-FileCopyrightText: 2024 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::{path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

/// Prefix of environment variables overriding settings, e.g. `GIGCHAT_PAGE_SIZE=50` or
/// `GIGCHAT_PRESENCE__REMOTE_EXPIRY_MS=10000`.
const ENV_PREFIX: &str = "GIGCHAT";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("Page size must not be zero")]
    ZeroPageSize,
    #[error("Typing refresh interval must be shorter than the inactivity timeout")]
    RefreshNotBelowInactivity,
    #[error("Remote typing expiry must be longer than two refresh intervals")]
    ExpiryTooShort,
}

/// Configuration of the conversation synchronization.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    /// Number of messages per fetched page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Maximum difference between the creation time of a pending message and a pushed message
    /// for the latter to be considered the echo of the former
    #[serde(
        rename = "reconcile_window_ms",
        with = "duration_millis",
        default = "default_30s"
    )]
    pub reconcile_window: Duration,
    /// Delay before the single retry of a failed channel subscription
    #[serde(
        rename = "bind_retry_delay_ms",
        with = "duration_millis",
        default = "default_1s"
    )]
    pub bind_retry_delay: Duration,
    /// Debounce of marking the conversation as read
    #[serde(
        rename = "mark_as_read_debounce_ms",
        with = "duration_millis",
        default = "default_2s"
    )]
    pub mark_as_read_debounce: Duration,
    #[serde(default)]
    pub presence: PresenceSettings,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            reconcile_window: default_30s(),
            bind_retry_delay: default_1s(),
            mark_as_read_debounce: default_2s(),
            presence: PresenceSettings::default(),
        }
    }
}

/// Timing of the typing presence protocol.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresenceSettings {
    /// Interval of refresh signals while the local user is typing
    #[serde(
        rename = "refresh_interval_ms",
        with = "duration_millis",
        default = "default_3s"
    )]
    pub refresh_interval: Duration,
    /// Time after the last input after which the local user stops typing
    #[serde(
        rename = "inactivity_timeout_ms",
        with = "duration_millis",
        default = "default_5s"
    )]
    pub inactivity_timeout: Duration,
    /// Time after the last signal of a remote user after which the user stops typing
    #[serde(
        rename = "remote_expiry_ms",
        with = "duration_millis",
        default = "default_8s"
    )]
    pub remote_expiry: Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            refresh_interval: default_3s(),
            inactivity_timeout: default_5s(),
            remote_expiry: default_8s(),
        }
    }
}

impl PresenceSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.refresh_interval >= self.inactivity_timeout {
            return Err(SettingsError::RefreshNotBelowInactivity);
        }
        if self.remote_expiry <= self.refresh_interval * 2 {
            return Err(SettingsError::ExpiryTooShort);
        }
        Ok(())
    }
}

impl SyncSettings {
    /// Loads the settings from an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );
        }
        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.page_size == 0 {
            return Err(SettingsError::ZeroPageSize);
        }
        self.presence.validate()
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_1s() -> Duration {
    Duration::from_secs(1)
}

fn default_2s() -> Duration {
    Duration::from_secs(2)
}

fn default_3s() -> Duration {
    Duration::from_secs(3)
}

fn default_5s() -> Duration {
    Duration::from_secs(5)
}

fn default_8s() -> Duration {
    Duration::from_secs(8)
}

fn default_30s() -> Duration {
    Duration::from_secs(30)
}

mod duration_millis {
    use serde::de;

    use std::time::Duration;

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let millis: u64 = serde::Deserialize::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = SyncSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.page_size, 100);
        assert!(settings.presence.refresh_interval * 2 < settings.presence.remote_expiry);
    }

    #[test]
    fn load_from_yaml() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "page_size: 50\nbind_retry_delay_ms: 500\npresence:\n  refresh_interval_ms: 2000\n  inactivity_timeout_ms: 4000\n  remote_expiry_ms: 6000"
        )
        .unwrap();

        let settings = SyncSettings::load(Some(file.path())).unwrap();
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.bind_retry_delay, Duration::from_millis(500));
        assert_eq!(settings.reconcile_window, Duration::from_secs(30));
        assert_eq!(settings.presence.remote_expiry, Duration::from_secs(6));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings = SyncSettings::load(Some(Path::new("/nonexistent/gigchat.yaml"))).unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn reject_flickering_presence_timing() {
        let presence = PresenceSettings {
            refresh_interval: Duration::from_secs(3),
            inactivity_timeout: Duration::from_secs(5),
            remote_expiry: Duration::from_secs(6),
        };
        assert!(matches!(
            presence.validate(),
            Err(SettingsError::ExpiryTooShort)
        ));

        let settings = SyncSettings {
            page_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ZeroPageSize)
        ));
    }
}
