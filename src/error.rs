//! Error types for the Bookmate downloader
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by the stage that raises them so callers can decide which
//! ones have a documented fallback and which ones end the run.
//!
//! ## Stage Mapping
//!
//! ### Network (download primitive)
//! - `UnexpectedStatus`, `Http` → transient, retried by [`crate::download::RetryPolicy`]
//! - `DownloadFailed` → retry bound exceeded, fatal for the whole run
//!
//! ### Audio assembly
//! - `ProbeFailed` → absorbed by the planner (fallback duration)
//! - `TranscoderNotFound`, `TranscodeFailed` → absorbed by the assembler (fallback merge)
//! - `FallbackMergeFailed` → fatal, no further degradation exists
//!
//! ### Filesystem
//! - `DirectoryNotFound`, `NoChapterFiles`, `FileIoError`, `Io` → scoped to the
//!   operation that raised them
//!
//! ### Configuration
//! - `UnknownResourceType`, `InvalidConfiguration`, `MissingAuthToken`

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our DownloaderError type
pub type Result<T> = std::result::Result<T, DownloaderError>;

/// Main error type for the downloader
#[derive(Error, Debug)]
pub enum DownloaderError {
    // ===== Network Errors =====

    /// Server answered with something other than 200 or a followable redirect
    #[error("Server responded with unexpected status code {status} for {url}")]
    UnexpectedStatus {
        status: u16,
        url: String,
    },

    /// HTTP client error from reqwest (connection reset, DNS, TLS...)
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Retry bound exceeded; the run cannot continue
    #[error("Failed to download {url} after {attempts} attempts: {reason}")]
    DownloadFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Content API returned JSON we could not understand
    #[error("Invalid API response from {url}: {message}")]
    InvalidApiResponse {
        url: String,
        message: String,
    },

    // ===== Audio Assembly Errors =====

    /// Duration probe failed or produced no usable value
    #[error("Could not probe duration of {path}: {message}")]
    ProbeFailed {
        path: PathBuf,
        message: String,
    },

    /// Transcoder binary not found in PATH
    #[error("FFmpeg not found. Please install FFmpeg and ensure it's in your PATH.")]
    TranscoderNotFound,

    /// Transcoder ran but exited with a failure status
    #[error("Chapter concatenation failed: {0}")]
    TranscodeFailed(String),

    /// The degraded merge path failed too
    #[error("Fallback merge failed: {0}")]
    FallbackMergeFailed(String),

    // ===== Filesystem Errors =====

    /// Audiobook or library directory does not exist
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// Directory exists but holds no chapter files
    #[error("No chapter files found in {0}")]
    NoChapterFiles(PathBuf),

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Ebook or comic conversion failed
    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    // ===== Configuration Errors =====

    /// Resource kind string is not one the dispatcher knows
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No auth token in flag, environment or token file
    #[error("No auth token found (tried --token, BOOKMATE_AUTH_TOKEN and {0})")]
    MissingAuthToken(PathBuf),

    // ===== External Library Errors =====

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive error (epub containers, comic archives)
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Image decoding/encoding error while building comic PDFs
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// PDF writer error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// Helper methods for creating common errors
impl DownloaderError {
    /// Create a FileIoError describing the operation and path
    pub fn file_io<S: AsRef<str>>(operation: S, path: &std::path::Path, err: std::io::Error) -> Self {
        DownloaderError::FileIoError(format!("{}: {} - {}", operation.as_ref(), path.display(), err))
    }

    /// Create a ProbeFailed error
    pub fn probe_failed<S: Into<String>>(path: &std::path::Path, message: S) -> Self {
        DownloaderError::ProbeFailed {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Create an InvalidApiResponse error
    pub fn invalid_response<S: Into<String>>(url: &str, message: S) -> Self {
        DownloaderError::InvalidApiResponse {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Check if a single failed attempt may succeed when repeated
    ///
    /// Returns `true` for non-200/non-redirect responses and for transport
    /// level failures (connection refused, reset, timeout).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloaderError::UnexpectedStatus { .. } | DownloaderError::Http(_)
        )
    }

    /// Check if the error has a documented fallback in the merge pipeline
    pub fn is_transcode_error(&self) -> bool {
        matches!(
            self,
            DownloaderError::TranscoderNotFound | DownloaderError::TranscodeFailed(_)
        )
    }

    /// Check if error ends the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DownloaderError::DownloadFailed { .. }
                | DownloaderError::FallbackMergeFailed(_)
                | DownloaderError::UnknownResourceType(_)
                | DownloaderError::MissingAuthToken(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            DownloaderError::DownloadFailed { url, attempts, .. } => {
                format!(
                    "Failed to download {} after {} attempts. Check that the id is correct or try again later.",
                    url, attempts
                )
            }
            DownloaderError::MissingAuthToken(path) => {
                format!(
                    "No auth token available. Pass --token, set BOOKMATE_AUTH_TOKEN or write the token to {}.",
                    path.display()
                )
            }
            DownloaderError::UnknownResourceType(kind) => {
                format!(
                    "Unknown resource type '{}'. Expected one of: book, audiobook, comicbook, serial, series.",
                    kind
                )
            }
            _ => self.to_string(),
        }
    }
}
