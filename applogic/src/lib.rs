// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! App-facing state of the order chat
//!
//! Cubits expose the state of a screen as an observable stream and translate user intents into
//! calls of the synchronization engine in [`gigcoreclient`].

pub mod api;
pub mod logging;
mod util;

pub use api::{
    chat_cubit::{ChatCubit, ChatState, UiDelivery, UiMessage},
    navigation_cubit::{NavigationConversation, NavigationCubit, NavigationState},
    session::Session,
};
