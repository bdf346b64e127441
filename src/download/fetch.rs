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


//! Authenticated fetch with redirect following and bounded retries
//!
//! One attempt is:
//! 1. GET with the capability headers
//! 2. 200 → done
//! 3. 3xx with a `Location` → GET the target once, without any auth headers;
//!    only a 200 from the target counts
//! 4. anything else → transient failure
//!
//! Attempts are repeated by the client's [`RetryPolicy`](super::RetryPolicy).
//! Files are written whole, through a temp file, after a successful attempt;
//! nothing is resumed.

use crate::api::client::{ClientConfig, HttpResponse, HttpTransport, ReqwestTransport};
use crate::error::{DownloaderError, Result};
use crate::file::manager;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A single fetch in flight
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub url: String,
    /// Where the body goes; `None` when the body is consumed in memory
    pub destination: Option<PathBuf>,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
}

impl DownloadJob {
    pub fn new<S: Into<String>>(url: S, destination: Option<PathBuf>, max_attempts: u32) -> Self {
        Self {
            url: url.into(),
            destination,
            attempt: 0,
            max_attempts,
        }
    }

    fn at_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }
}

/// Download primitive shared by every resource handler
#[derive(Clone)]
pub struct Downloader {
    config: Arc<ClientConfig>,
    transport: Arc<dyn HttpTransport>,
    headers: HeaderMap,
}

impl Downloader {
    /// Create a downloader over a reqwest transport
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a downloader over any transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let headers = config.auth_headers()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
            headers,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch a URL into memory
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let job = DownloadJob::new(url, None, self.config.retry_policy().max_attempts);
        self.run(job).await
    }

    /// Fetch a URL and parse the body as JSON
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.fetch_bytes(url).await?;
        serde_json::from_slice(&body)
            .map_err(|e| DownloaderError::invalid_response(url, format!("malformed JSON: {}", e)))
    }

    /// Fetch a URL and write the body to `destination`, creating parent dirs.
    ///
    /// Returns the number of bytes written.
    pub async fn download_to_file(&self, url: &str, destination: &Path) -> Result<u64> {
        let job = DownloadJob::new(
            url,
            Some(destination.to_path_buf()),
            self.config.retry_policy().max_attempts,
        );
        let body = self.run(job).await?;

        if let Some(parent) = destination.parent() {
            manager::ensure_directory(parent).await?;
        }
        // A partial file must never appear under the final name
        manager::atomic_write(destination, &body).await?;

        tracing::info!(
            path = %destination.display(),
            bytes = body.len(),
            "file downloaded"
        );
        Ok(body.len() as u64)
    }

    async fn run(&self, job: DownloadJob) -> Result<Vec<u8>> {
        let policy = self.config.retry_policy();
        policy
            .run(&job.url, |attempt| {
                let job = job.at_attempt(attempt);
                async move { self.attempt(&job).await }
            })
            .await
    }

    async fn attempt(&self, job: &DownloadJob) -> Result<Vec<u8>> {
        tracing::debug!(
            url = %job.url,
            attempt = job.attempt,
            max_attempts = job.max_attempts,
            destination = ?job.destination,
            "GET"
        );

        let response = self.transport.get(&job.url, Some(&self.headers)).await?;
        if response.is_success() {
            return Ok(response.body);
        }

        if let HttpResponse {
            location: Some(target),
            ..
        } = &response
        {
            if response.is_redirect() {
                tracing::debug!(from = %job.url, to = %target, "following redirect");
                let followed = self.transport.get(target, None).await?;
                if followed.is_success() {
                    return Ok(followed.body);
                }
                return Err(DownloaderError::UnexpectedStatus {
                    status: followed.status,
                    url: target.clone(),
                });
            }
        }

        Err(DownloaderError::UnexpectedStatus {
            status: response.status,
            url: job.url.clone(),
        })
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::AuthToken;
    use futures_util::future::{BoxFuture, FutureExt};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Transport that replays canned responses and records each request
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<HttpResponse>>,
        /// (url, had auth headers)
        requests: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<(String, bool)> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn get<'a>(
            &'a self,
            url: &'a str,
            headers: Option<&'a HeaderMap>,
        ) -> BoxFuture<'a, Result<HttpResponse>> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), headers.is_some()));
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| HttpResponse::status(599));
            async move { Ok(next) }.boxed()
        }
    }

    fn downloader(transport: Arc<ScriptedTransport>) -> Downloader {
        let config = ClientConfig::builder(AuthToken::new("token")).build().unwrap();
        Downloader::with_transport(config, transport).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_give_up() {
        let transport = ScriptedTransport::new(vec![
            HttpResponse::status(500),
            HttpResponse::status(404),
            HttpResponse::status(503),
            HttpResponse::ok(b"never requested".to_vec()),
        ]);
        let dl = downloader(transport.clone());

        let err = dl.fetch_bytes("https://api.example/x").await.unwrap_err();

        assert!(matches!(err, DownloaderError::DownloadFailed { attempts: 3, .. }));
        assert!(err.is_fatal());
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt() {
        let transport = ScriptedTransport::new(vec![
            HttpResponse::status(502),
            HttpResponse::ok(b"payload".to_vec()),
            HttpResponse::status(500),
        ]);
        let dl = downloader(transport.clone());

        let body = dl.fetch_bytes("https://api.example/x").await.unwrap();

        assert_eq!(body, b"payload");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_redirect_is_followed_without_auth() {
        let transport = ScriptedTransport::new(vec![
            HttpResponse::redirect("https://cdn.example/file.m4a"),
            HttpResponse::ok(b"audio".to_vec()),
        ]);
        let dl = downloader(transport.clone());
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("nested").join("Глава_1.m4a");

        let written = dl
            .download_to_file("https://api.example/track", &dest)
            .await
            .unwrap();

        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"audio");
        assert_eq!(
            transport.requests(),
            vec![
                ("https://api.example/track".to_string(), true),
                ("https://cdn.example/file.m4a".to_string(), false),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_redirect_target_counts_as_failed_attempt() {
        let transport = ScriptedTransport::new(vec![
            HttpResponse::redirect("https://cdn.example/a"),
            HttpResponse::status(403),
            HttpResponse::ok(b"ok".to_vec()),
        ]);
        let dl = downloader(transport.clone());

        let body = dl.fetch_bytes("https://api.example/a").await.unwrap();

        assert_eq!(body, b"ok");
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_appears_only_after_a_complete_download() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("Глава_2.m4a");

        let failing = ScriptedTransport::new(vec![
            HttpResponse::status(500),
            HttpResponse::status(500),
            HttpResponse::status(500),
        ]);
        downloader(failing).download_to_file("https://api.example/t", &dest).await.unwrap_err();
        assert!(!dest.exists());

        let ok = ScriptedTransport::new(vec![HttpResponse::ok(b"full track".to_vec())]);
        downloader(ok).download_to_file("https://api.example/t", &dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"full track");
        assert!(!dir.path().join(".Глава_2.m4a.tmp").exists());
    }

    #[tokio::test]
    async fn test_fetch_json_reports_malformed_body() {
        let transport = ScriptedTransport::new(vec![HttpResponse::ok(b"not json".to_vec())]);
        let dl = downloader(transport);

        let err = dl
            .fetch_json::<serde_json::Value>("https://api.example/j")
            .await
            .unwrap_err();

        assert!(matches!(err, DownloaderError::InvalidApiResponse { .. }));
    }
}
