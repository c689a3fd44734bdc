// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Data model shared between the REST client and the conversation sync engine.

pub mod conversation;
pub mod events;
pub mod identifiers;
pub mod messages;
pub mod order;
