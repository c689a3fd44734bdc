// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logged-in session of the app

use std::{fmt, path::Path, sync::Arc};

use anyhow::Context;
use gigapiclient::ApiClient;
use gigcoreclient::{
    ConversationId, FeedbackLedger, PushChannelProvider, SyncContext, SyncSettings, UserId,
};
use secrecy::SecretString;
use tracing::info;
use url::Url;

use super::{chat_cubit::ChatCubit, navigation_cubit::NavigationCubit};

/// Everything needed to open conversations of the logged-in user
///
/// Feedback prompts are shown at most once per conversation during the lifetime of the session.
#[derive(Clone)]
pub struct Session {
    api_client: ApiClient,
    viewer: UserId,
    provider: Arc<dyn PushChannelProvider>,
    context: SyncContext,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("api_client", &self.api_client)
            .field("viewer", &self.viewer)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session for `viewer` authenticated with `token`.
    ///
    /// Settings are read from the YAML file at `settings_path` if it exists, and from the
    /// environment.
    pub fn new(
        base_url: Url,
        token: SecretString,
        viewer: UserId,
        settings_path: Option<&Path>,
        provider: Arc<dyn PushChannelProvider>,
        navigation: &NavigationCubit,
    ) -> anyhow::Result<Self> {
        let settings = SyncSettings::load(settings_path).context("invalid sync settings")?;
        let api_client = ApiClient::new(base_url, token).context("invalid API endpoint")?;
        info!(%viewer, page_size = settings.page_size, "Session started");
        Ok(Self {
            api_client,
            viewer,
            provider,
            context: SyncContext {
                settings,
                active_conversation: navigation.active_conversation(),
                feedback: FeedbackLedger::new(),
            },
        })
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    /// Mounts the conversation and returns the cubit of its screen.
    ///
    /// Must be called within a tokio runtime.
    pub fn open_chat(&self, conversation_id: ConversationId) -> ChatCubit {
        ChatCubit::new(
            conversation_id,
            self.viewer,
            self.api_client.clone(),
            self.provider.clone(),
            self.context.clone(),
        )
    }
}
