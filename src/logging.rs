// Bookmate Downloader - books and audiobooks for offline reading
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Console logging
//!
//! `RUST_LOG` wins when set; otherwise the level is `info`, or `debug` with
//! [`LogOptions::debug`]. Output goes to stderr so stdout stays free for the
//! run summary.

use std::io;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("logging already initialized")]
    AlreadyInitialized,
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("subscriber init failed: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Clone, Copy, Debug)]
pub struct LogOptions {
    pub debug: bool,
    pub use_color: bool,
    /// Include module targets in each line
    pub with_target: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            debug: false,
            use_color: true,
            with_target: false,
        }
    }
}

impl LogOptions {
    fn default_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Build the filter from `RUST_LOG`, falling back to the options' level
fn build_filter(options: &LogOptions, env_value: Option<&str>) -> Result<EnvFilter, LogError> {
    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(directives) => Ok(EnvFilter::try_new(directives)?),
        None => Ok(EnvFilter::try_new(options.default_directive())?),
    }
}

/// Install the global subscriber
pub fn init(options: LogOptions) -> Result<(), LogError> {
    let env_value = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&options, env_value.as_deref())?;

    let console_layer = fmt::layer()
        .with_target(options.with_target)
        .with_level(true)
        .with_ansi(options.use_color)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()
        .map_err(|e| {
            if e.to_string().contains("already") {
                LogError::AlreadyInitialized
            } else {
                LogError::SubscriberInit(e)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        let filter = build_filter(&LogOptions::default(), None).unwrap();
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_debug_flag() {
        let options = LogOptions {
            debug: true,
            ..LogOptions::default()
        };
        let filter = build_filter(&options, Some("  ")).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_env_overrides_flag() {
        let options = LogOptions {
            debug: true,
            ..LogOptions::default()
        };
        let filter = build_filter(&options, Some("bookmate_core=trace")).unwrap();
        assert_eq!(filter.to_string(), "bookmate_core=trace");
    }
}
