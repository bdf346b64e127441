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


//! HTTP client for the Bookmate content API
//!
//! This module provides the client configuration and the transport seam used by
//! the download primitive:
//! - `ClientConfig` - immutable settings built once at startup (base URL, auth
//!   token, device identity, timeout, retry policy)
//! - `HttpTransport` - narrow "GET one URL" capability, implemented over reqwest
//!   and replaced by scripted doubles in tests
//!
//! # Authentication
//!
//! The API authenticates with a set of capability headers rather than a bearer
//! token. The headers are produced by [`ClientConfig::auth_headers`] and attached
//! per request, never as client defaults, so that a redirect can be followed
//! without leaking them to the CDN host.
//!
//! # Redirects
//!
//! The reqwest client is built with redirects disabled. The download primitive
//! sees the 3xx response itself and decides how to follow it.

use crate::api::auth::AuthToken;
use crate::download::retry::RetryPolicy;
use crate::error::{DownloaderError, Result};
use futures_util::future::{BoxFuture, FutureExt};
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Content API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.bookmate.yandex.net/api/v5";

/// Device identities the mobile app reports; one is picked per run
pub const APP_USER_AGENTS: [&str; 3] = [
    "Samsung/Galaxy_A51 Android/12 Bookmate/3.7.3",
    "Huawei/P40_Lite Android/11 Bookmate/3.7.3",
    "OnePlus/Nord_N10 Android/10 Bookmate/3.7.3",
];

/// Device headers the app sends with empty values
const EMPTY_DEVICE_HEADERS: [&str; 10] = [
    "mcc",
    "mnc",
    "imei",
    "subscription-country",
    "app-locale",
    "bookmate-version",
    "bookmate-websocket-version",
    "device-idfa",
    "accept-encoding",
    "user-agent",
];

/// Pick one of the app's device identities at random
pub fn random_app_user_agent() -> &'static str {
    APP_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(APP_USER_AGENTS[0])
}

/// Configuration for every network operation
///
/// Built once, then shared read-only; there is no way to mutate it after
/// [`ClientConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    auth_token: AuthToken,
    app_user_agent: String,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl ClientConfig {
    pub fn builder(auth_token: AuthToken) -> ClientConfigBuilder {
        ClientConfigBuilder::new(auth_token)
    }

    /// Get the API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn app_user_agent(&self) -> &str {
        &self.app_user_agent
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Capability header set attached to every authenticated request
    pub fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            HeaderName::from_static("app-user-agent"),
            HeaderValue::from_str(&self.app_user_agent).map_err(|e| {
                DownloaderError::InvalidConfiguration(format!("Invalid app user agent: {}", e))
            })?,
        );
        headers.insert(
            HeaderName::from_static("onyx-preinstall"),
            HeaderValue::from_static("false"),
        );

        let mut token = HeaderValue::from_str(self.auth_token.expose()).map_err(|e| {
            DownloaderError::InvalidConfiguration(format!("Invalid auth token: {}", e))
        })?;
        token.set_sensitive(true);
        headers.insert(HeaderName::from_static("auth-token"), token);

        for name in EMPTY_DEVICE_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(""));
        }

        Ok(headers)
    }
}

/// Builder for ClientConfig
#[derive(Debug)]
pub struct ClientConfigBuilder {
    base_url: String,
    auth_token: AuthToken,
    app_user_agent: Option<String>,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl ClientConfigBuilder {
    pub fn new(auth_token: AuthToken) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token,
            app_user_agent: None,
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn app_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.app_user_agent = Some(user_agent.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        if self.auth_token.expose().trim().is_empty() {
            return Err(DownloaderError::InvalidConfiguration(
                "auth token is empty".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(DownloaderError::InvalidConfiguration(
                "retry policy needs at least one attempt".to_string(),
            ));
        }

        let config = ClientConfig {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            auth_token: self.auth_token,
            app_user_agent: self
                .app_user_agent
                .unwrap_or_else(|| random_app_user_agent().to_string()),
            timeout: self.timeout,
            retry: self.retry,
        };

        // Surface bad header values now rather than on the first request
        config.auth_headers()?;

        Ok(config)
    }
}

/// Response to a single GET, reduced to what the download primitive needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Absolute redirect target, when the server sent one
    pub location: Option<String>,
    /// Body; only read for 200 responses
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            location: None,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            location: None,
            body: Vec::new(),
        }
    }

    pub fn redirect<S: Into<String>>(location: S) -> Self {
        Self {
            status: 302,
            location: Some(location.into()),
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK.as_u16()
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.location.is_some()
    }
}

/// Capability to issue one GET request
///
/// `headers` is `None` for unauthenticated requests (redirect targets).
pub trait HttpTransport: Send + Sync {
    fn get<'a>(
        &'a self,
        url: &'a str,
        headers: Option<&'a HeaderMap>,
    ) -> BoxFuture<'a, Result<HttpResponse>>;
}

/// reqwest-backed transport with redirects disabled
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .redirect(Policy::none())
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get<'a>(
        &'a self,
        url: &'a str,
        headers: Option<&'a HeaderMap>,
    ) -> BoxFuture<'a, Result<HttpResponse>> {
        async move {
            let mut request = self.client.get(url);
            if let Some(headers) = headers {
                request = request.headers(headers.clone());
            }

            let response = request.send().await?;
            let status = response.status();

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|loc| {
                    response
                        .url()
                        .join(loc)
                        .map(|u| u.to_string())
                        .unwrap_or_else(|_| loc.to_string())
                });

            let body = if status == StatusCode::OK {
                response.bytes().await?.to_vec()
            } else {
                Vec::new()
            };

            Ok(HttpResponse {
                status: status.as_u16(),
                location,
                body,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AuthToken {
        AuthToken::new("secret-token")
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::builder(token())
            .base_url("https://api.example.com/v5/")
            .app_user_agent("TestAgent/1.0")
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.base_url(), "https://api.example.com/v5");
        assert_eq!(config.app_user_agent(), "TestAgent/1.0");
        assert_eq!(config.timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_default_user_agent_is_an_app_identity() {
        let config = ClientConfig::builder(token()).build().unwrap();
        assert!(APP_USER_AGENTS.contains(&config.app_user_agent()));
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let result = ClientConfig::builder(AuthToken::new("  ")).build();
        assert!(matches!(result, Err(DownloaderError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_auth_headers() {
        let config = ClientConfig::builder(token())
            .app_user_agent("TestAgent/1.0")
            .build()
            .unwrap();
        let headers = config.auth_headers().unwrap();

        assert_eq!(headers["auth-token"], "secret-token");
        assert!(headers["auth-token"].is_sensitive());
        assert_eq!(headers["app-user-agent"], "TestAgent/1.0");
        assert_eq!(headers["onyx-preinstall"], "false");
        assert_eq!(headers["imei"], "");
    }

    #[test]
    fn test_response_classification() {
        assert!(HttpResponse::ok(b"x".to_vec()).is_success());
        assert!(HttpResponse::redirect("https://cdn.example/x").is_redirect());
        assert!(!HttpResponse::status(302).is_redirect());
        assert!(!HttpResponse::status(404).is_success());
    }
}
