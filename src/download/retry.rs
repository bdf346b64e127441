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


//! Bounded retry for network operations
//!
//! A [`RetryPolicy`] repeats an async operation while it fails with a
//! retryable error (see [`DownloaderError::is_retryable`]). Delays use tokio's
//! clock, so tests running with a paused runtime complete instantly.

use crate::error::{DownloaderError, Result};
use std::future::Future;
use std::time::Duration;

/// Default number of attempts per download
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// `base * 2^(attempt-1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
                base.saturating_mul(factor).min(*max)
            }
        }
    }
}

/// How many times an operation is attempted and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::Fixed(DEFAULT_RETRY_DELAY),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error or the
    /// attempt bound is reached.
    ///
    /// `op` receives the 1-based attempt number. Exhaustion is reported as
    /// [`DownloaderError::DownloadFailed`] naming `target`.
    pub async fn run<T, F, Fut>(&self, target: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(
                        target_url = target,
                        attempts = attempt,
                        error = %e,
                        "giving up"
                    );
                    return Err(DownloaderError::DownloadFailed {
                        url: target.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.backoff.delay_after(attempt);
                    tracing::warn!(
                        target_url = target,
                        attempt,
                        max_attempts,
                        error = %e,
                        "attempt failed, retrying in {:?}",
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status_error() -> DownloaderError {
        DownloaderError::UnexpectedStatus {
            status: 500,
            url: "https://example.com".to_string(),
        }
    }

    #[test]
    fn test_backoff_delays() {
        assert_eq!(Backoff::None.delay_after(3), Duration::ZERO);
        assert_eq!(
            Backoff::Fixed(Duration::from_secs(5)).delay_after(2),
            Duration::from_secs(5)
        );

        let exp = Backoff::Exponential {
            base: Duration::from_secs(2),
            max: Duration::from_secs(10),
        };
        assert_eq!(exp.delay_after(1), Duration::from_secs(2));
        assert_eq!(exp.delay_after(2), Duration::from_secs(4));
        assert_eq!(exp.delay_after(3), Duration::from_secs(8));
        assert_eq!(exp.delay_after(4), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_waits_between_attempts() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<()> = RetryPolicy::default()
            .run("https://example.com/x", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(status_error()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(DownloaderError::DownloadFailed { attempts, url, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(url, "https://example.com/x");
            }
            other => panic!("expected DownloadFailed, got {:?}", other),
        }
        // Two pauses of 5 s, none after the last attempt
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_retrying() {
        let calls = AtomicU32::new(0);

        let result = RetryPolicy::default()
            .run("u", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 2 {
                        Ok(attempt)
                    } else {
                        Err(status_error())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_returned_immediately() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = RetryPolicy::new(5, Backoff::None)
            .run("u", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DownloaderError::ConversionFailed("bad".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(DownloaderError::ConversionFailed(_))));
    }
}
