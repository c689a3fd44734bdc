// SPDX-FileCopyrightText: 2025 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::LazyLock;

pub(super) static USER_AGENT: LazyLock<String> =
    LazyLock::new(|| new_user_agent(env!("CARGO_PKG_VERSION"), std::env::consts::OS));

fn new_user_agent(pkg_version: &str, os: &str) -> String {
    format!("gigchat-client/{pkg_version} ({os})")
}

#[cfg(test)]
mod test {
    #[test]
    fn user_agent() {
        assert_eq!(
            super::new_user_agent("1.2.3", "linux"),
            "gigchat-client/1.2.3 (linux)"
        );
    }
}
