// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::anyhow;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, filter::Directive};

/// Initializes the global logger.
///
/// `RUST_LOG` takes precedence over `default_directive`, which defaults to `info`. Fails if a
/// global logger is already set.
pub fn init_logging(default_directive: Option<&str>) -> anyhow::Result<()> {
    let default_directive: Directive = match default_directive {
        Some(directive) => directive.parse()?,
        None => Level::INFO.into(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_directive)
                .from_env_lossy(),
        )
        .try_init()
        .map_err(|error| anyhow!("failed to initialize logging: {error}"))?;
    info!("Logging initialized");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn invalid_directive() {
        assert!(init_logging(Some("gigcoreclient=loud")).is_err());
    }
}
