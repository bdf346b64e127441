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


//! Auth token loading
//!
//! The token is obtained out of band (the app's OAuth flow) and handed to the
//! downloader through one of, in order:
//! 1. an explicit value (`--token`)
//! 2. the `BOOKMATE_AUTH_TOKEN` environment variable
//! 3. a token file, `token.txt` by default

use crate::error::{DownloaderError, Result};
use std::fmt;
use std::path::Path;

/// Environment variable consulted for the token
pub const TOKEN_ENV_VAR: &str = "BOOKMATE_AUTH_TOKEN";

/// Default token file, relative to the working directory
pub const DEFAULT_TOKEN_FILE: &str = "token.txt";

/// Opaque API token; never printed in full
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    /// Raw token value for building request headers
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let visible: String = self.0.chars().take(4).collect();
        write!(f, "AuthToken({}***)", visible)
    }
}

/// Resolve the token from an explicit value, the environment or a token file
pub fn load_token(explicit: Option<&str>, token_file: &Path) -> Result<AuthToken> {
    let env_value = std::env::var(TOKEN_ENV_VAR).ok();
    resolve_token(explicit, env_value.as_deref(), token_file)
}

fn resolve_token(
    explicit: Option<&str>,
    env_value: Option<&str>,
    token_file: &Path,
) -> Result<AuthToken> {
    if let Some(token) = non_empty(explicit) {
        tracing::debug!("using auth token from command line");
        return Ok(AuthToken::new(token));
    }

    if let Some(token) = non_empty(env_value) {
        tracing::debug!("using auth token from {}", TOKEN_ENV_VAR);
        return Ok(AuthToken::new(token));
    }

    if token_file.is_file() {
        let raw = std::fs::read_to_string(token_file)
            .map_err(|e| DownloaderError::file_io("read", token_file, e))?;
        if let Some(token) = non_empty(Some(&raw)) {
            tracing::debug!(file = %token_file.display(), "using auth token from file");
            return Ok(AuthToken::new(token));
        }
    }

    Err(DownloaderError::MissingAuthToken(token_file.to_path_buf()))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
