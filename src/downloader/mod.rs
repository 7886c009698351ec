//! Media extraction.
//!
//! The extractor resolves a URL to a single media file on local disk. The
//! call is blocking by contract; [`ExtractionPool`] is the only thing that
//! should invoke it from async code.

/// Explicit extractor configuration
pub mod options;
/// Bounded worker pool for blocking extractions
pub mod pool;
/// yt-dlp backed extractor
pub mod ytdlp;

pub use options::ExtractorOptions;
pub use pool::{ExtractionPool, PoolError};
pub use ytdlp::YtDlpExtractor;

use crate::scratch::ScratchTarget;
use crate::utils::format_megabytes;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One download to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Page or media URL
    pub url: String,
    /// Cookie jar for authenticated sources
    pub cookies: Option<PathBuf>,
}

impl DownloadRequest {
    /// Request without credentials
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cookies: None,
        }
    }

    /// Attaches a cookie jar
    #[must_use]
    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }
}

/// A finished download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Final file inside the request's scratch slot
    pub path: PathBuf,
    /// Display title reported by the source
    pub title: String,
    /// Effective size in bytes (largest of reported and on-disk)
    pub size: u64,
}

/// Why the extraction tool gave up, as far as its error text tells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No extractor for this site or not a media URL
    Unsupported,
    /// Removed, private or otherwise gone
    Unavailable,
    /// Blocked in the server's region
    GeoBlocked,
    /// Needs login, age confirmation or membership
    LoginRequired,
    /// DNS, connection or throttling problems
    Network,
    /// Anything the patterns do not recognise
    Other,
}

impl FailureReason {
    /// Short explanation suitable for chat users
    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Unsupported => "this site or link is not supported",
            Self::Unavailable => "the media is unavailable or was removed",
            Self::GeoBlocked => "the media is blocked in the server's region",
            Self::LoginRequired => "the media requires a login",
            Self::Network => "the source could not be reached",
            Self::Other => "the download failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unsupported => "unsupported source",
            Self::Unavailable => "media unavailable",
            Self::GeoBlocked => "geo-blocked",
            Self::LoginRequired => "login required",
            Self::Network => "network error",
            Self::Other => "extraction error",
        };
        f.write_str(label)
    }
}

/// Errors produced by an extractor
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The tool could not be started at all
    #[error("failed to launch {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The tool ran and reported an error
    #[error("{reason}: {message}")]
    Tool {
        /// Classified reason
        reason: FailureReason,
        /// Last meaningful line of the tool's error output
        message: String,
    },
    /// The download exceeds the configured ceiling
    #[error("file too large: {size} bytes (limit {limit} bytes)")]
    TooLarge {
        /// Reported or measured size in bytes
        size: u64,
        /// Ceiling in bytes
        limit: u64,
    },
    /// The tool finished without producing a file
    #[error("nothing was downloaded")]
    NothingDownloaded,
    /// The tool's machine-readable output could not be parsed
    #[error("unexpected extractor output: {0}")]
    MalformedOutput(#[from] serde_json::Error),
    /// The reported file could not be inspected
    #[error("cannot access {path}: {source}")]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

impl ExtractError {
    /// Failure notice shown in the chat
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Tool { reason, .. } => reason.user_message().to_string(),
            Self::TooLarge { size, limit } => format!(
                "the file is {} which exceeds the {} upload limit",
                format_megabytes(*size),
                format_megabytes(*limit)
            ),
            Self::NothingDownloaded => {
                "nothing was downloaded (the file may exceed the upload limit)".to_string()
            }
            Self::Spawn { .. } | Self::MalformedOutput(_) | Self::Io { .. } => {
                FailureReason::Other.user_message().to_string()
            }
        }
    }
}

/// A blocking media extractor.
///
/// Implementations write into `target` only and must not delete files on
/// success: the caller's scratch guard owns cleanup.
#[cfg_attr(test, mockall::automock)]
pub trait MediaExtractor: Send + Sync {
    /// Downloads the media behind `request.url` into the scratch slot.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractError`] for every kind of failure, including a
    /// download that exceeds the size ceiling.
    fn fetch(
        &self,
        request: &DownloadRequest,
        target: &ScratchTarget,
    ) -> Result<DownloadResult, ExtractError>;

    /// Version string of the underlying tool, for health checks.
    ///
    /// # Errors
    ///
    /// Returns an [`ExtractError`] if the tool cannot be queried.
    fn version(&self) -> Result<String, ExtractError>;
}
