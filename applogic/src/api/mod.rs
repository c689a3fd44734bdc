// SPDX-FileCopyrightText: 2026 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The API exposed to the app

pub mod chat_cubit;
pub mod navigation_cubit;
pub mod session;
