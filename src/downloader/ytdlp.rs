//! YT-DLP extractor - media download via the yt-dlp executable
//!
//! Runs yt-dlp as a blocking child process, reads the JSON line it prints
//! after the final file move, and enforces the size ceiling on the result.

use super::{
    DownloadRequest, DownloadResult, ExtractError, ExtractorOptions, FailureReason,
    MediaExtractor,
};
use crate::scratch::{remove_if_exists, ScratchTarget};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::{debug, info, warn};

/// Title used when the source does not report one
pub const UNTITLED: &str = "Untitled video";

/// Error text fragments and the reason they indicate, checked in order.
const FAILURE_PATTERNS: &[(&str, FailureReason)] = &[
    ("unsupported url", FailureReason::Unsupported),
    ("is not a valid url", FailureReason::Unsupported),
    ("no video formats found", FailureReason::Unsupported),
    ("blocked it in your country", FailureReason::GeoBlocked),
    ("available in your country", FailureReason::GeoBlocked),
    ("geo-restricted", FailureReason::GeoBlocked),
    ("geo restricted", FailureReason::GeoBlocked),
    ("sign in to confirm", FailureReason::LoginRequired),
    ("sign in to view", FailureReason::LoginRequired),
    ("age-restricted", FailureReason::LoginRequired),
    ("members-only", FailureReason::LoginRequired),
    ("login required", FailureReason::LoginRequired),
    ("use --cookies", FailureReason::LoginRequired),
    ("private video", FailureReason::LoginRequired),
    ("video unavailable", FailureReason::Unavailable),
    ("this video is not available", FailureReason::Unavailable),
    ("removed by the uploader", FailureReason::Unavailable),
    ("no longer available", FailureReason::Unavailable),
    ("has been removed", FailureReason::Unavailable),
    ("copyright", FailureReason::Unavailable),
    ("terminated account", FailureReason::Unavailable),
    ("http error 404", FailureReason::Unavailable),
    ("http error 403", FailureReason::Unavailable),
    ("connection reset", FailureReason::Network),
    ("timed out", FailureReason::Network),
    ("unable to download webpage", FailureReason::Network),
    ("http error 429", FailureReason::Network),
    ("http error 503", FailureReason::Network),
    ("network is unreachable", FailureReason::Network),
    ("name resolution", FailureReason::Network),
];

/// Classifies yt-dlp error output
#[must_use]
pub fn classify_error(error_msg: &str) -> FailureReason {
    let lowered = error_msg.to_lowercase();
    FAILURE_PATTERNS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map_or(FailureReason::Other, |(_, reason)| *reason)
}

/// Fields printed by [`super::options::PRINT_TEMPLATE`]
#[derive(Debug, Deserialize, PartialEq)]
struct PrintedInfo {
    filepath: Option<PathBuf>,
    title: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

impl PrintedInfo {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn reported_size(&self) -> Option<u64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|size| size.is_finite() && *size > 0.0)
            .map(|size| size as u64)
    }
}

/// Parses the last JSON line of yt-dlp's stdout.
///
/// Returns `Ok(None)` when nothing was printed, which happens when the
/// tool skipped the item (for example because of `--max-filesize`).
fn parse_printed_info(stdout: &str) -> Result<Option<PrintedInfo>, serde_json::Error> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|line| line.starts_with('{'))
        .map(serde_json::from_str)
        .transpose()
}

/// Picks the line worth showing from yt-dlp's error output.
fn error_summary(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let text = if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    };

    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR"))
        .or_else(|| lines.last())
        .map_or_else(
            || format!("yt-dlp exited with {}", output.status),
            |line| (*line).to_string(),
        )
}

/// Deletes `path` and reports [`ExtractError::TooLarge`] when the larger of
/// the reported and on-disk sizes exceeds `limit`; otherwise returns that
/// effective size.
///
/// # Errors
///
/// Returns [`ExtractError::Io`] if the file cannot be inspected, or
/// [`ExtractError::TooLarge`] when the ceiling is exceeded.
pub fn enforce_size_limit(
    path: &Path,
    reported: Option<u64>,
    limit: Option<u64>,
) -> Result<u64, ExtractError> {
    let on_disk = std::fs::metadata(path)
        .map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    let size = reported.unwrap_or(0).max(on_disk);

    if let Some(limit) = limit {
        if size > limit {
            warn!(
                path = %path.display(),
                size,
                limit,
                "Downloaded file exceeds size limit, deleting"
            );
            if let Err(e) = remove_if_exists(path) {
                warn!(path = %path.display(), error = %e, "Failed to delete oversized file");
            }
            return Err(ExtractError::TooLarge { size, limit });
        }
    }
    Ok(size)
}

/// Extractor backed by the yt-dlp executable
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: String,
    options: ExtractorOptions,
}

impl YtDlpExtractor {
    /// Create an extractor running `program` with `options`
    #[must_use]
    pub fn new(program: impl Into<String>, options: ExtractorOptions) -> Self {
        Self {
            program: program.into(),
            options,
        }
    }

    /// Options this extractor passes to yt-dlp
    #[must_use]
    pub const fn options(&self) -> &ExtractorOptions {
        &self.options
    }

    fn run(&self, args: Vec<std::ffi::OsString>) -> Result<Output, ExtractError> {
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExtractError::Spawn {
                program: self.program.clone(),
                source,
            })
    }
}

impl MediaExtractor for YtDlpExtractor {
    fn fetch(
        &self,
        request: &DownloadRequest,
        target: &ScratchTarget,
    ) -> Result<DownloadResult, ExtractError> {
        let args = self
            .options
            .to_args(&request.url, target, request.cookies.as_deref());
        debug!(url = %request.url, stem = %target.stem(), "Executing yt-dlp");

        let output = self.run(args)?;
        if !output.status.success() {
            let message = error_summary(&output);
            let reason = classify_error(&message);
            warn!(url = %request.url, %reason, error = %message, "yt-dlp failed");
            return Err(ExtractError::Tool { reason, message });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(info) = parse_printed_info(&stdout)? else {
            warn!(url = %request.url, "yt-dlp finished without downloading anything");
            return Err(ExtractError::NothingDownloaded);
        };
        let Some(path) = info.filepath.clone() else {
            return Err(ExtractError::NothingDownloaded);
        };

        let size = enforce_size_limit(&path, info.reported_size(), self.options.max_filesize)?;
        let title = info
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        info!(url = %request.url, path = %path.display(), size, "Download finished");
        Ok(DownloadResult { path, title, size })
    }

    fn version(&self) -> Result<String, ExtractError> {
        let output = self.run(vec!["--version".into()])?;
        if !output.status.success() {
            let message = error_summary(&output);
            return Err(ExtractError::Tool {
                reason: classify_error(&message),
                message,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scratch::Scratch;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_classify_error_patterns() {
        assert_eq!(
            classify_error("ERROR: Unsupported URL: https://example.com"),
            FailureReason::Unsupported
        );
        assert_eq!(
            classify_error("ERROR: [youtube] abc: The uploader has not made this video available in your country"),
            FailureReason::GeoBlocked
        );
        assert_eq!(
            classify_error("ERROR: [youtube] abc: Video unavailable"),
            FailureReason::Unavailable
        );
        assert_eq!(
            classify_error("ERROR: [instagram] xyz: Requested content is not available, rate-limit reached or login required. Use --cookies"),
            FailureReason::LoginRequired
        );
        assert_eq!(
            classify_error("ERROR: Unable to download webpage: <urlopen error [Errno -3] Temporary failure in name resolution>"),
            FailureReason::Network
        );
        assert_eq!(classify_error("ERROR: something new"), FailureReason::Other);
    }

    #[test]
    fn test_parse_printed_info_takes_last_json_line() {
        let stdout = "[debug] noise\n{\"filepath\": \"a.mp4\", \"title\": \"First\"}\n{\"filepath\": \"downloads/x.mp4\", \"title\": \"Sample Clip\", \"filesize\": 1024, \"filesize_approx\": 2048.5}\n";
        let info = parse_printed_info(stdout)
            .expect("valid json")
            .expect("one line");
        assert_eq!(info.filepath, Some(PathBuf::from("downloads/x.mp4")));
        assert_eq!(info.title.as_deref(), Some("Sample Clip"));
        assert_eq!(info.reported_size(), Some(1024));
    }

    #[test]
    fn test_parse_printed_info_empty_output() {
        assert!(parse_printed_info("").expect("empty is fine").is_none());
        assert!(parse_printed_info("\n  \n").expect("blank is fine").is_none());
    }

    #[test]
    fn test_parse_printed_info_malformed() {
        assert!(parse_printed_info("{not json").is_err());
    }

    #[test]
    fn test_reported_size_falls_back_to_approx() {
        let info = PrintedInfo {
            filepath: None,
            title: None,
            filesize: None,
            filesize_approx: Some(3_000_000.7),
        };
        assert_eq!(info.reported_size(), Some(3_000_000));

        let unknown = PrintedInfo {
            filepath: None,
            title: None,
            filesize: None,
            filesize_approx: None,
        };
        assert_eq!(unknown.reported_size(), None);
    }

    #[test]
    fn test_enforce_size_limit_within_ceiling() {
        let root = tempdir().expect("tempdir");
        let path = root.path().join("clip.mp4");
        fs::write(&path, vec![0u8; 100]).expect("write");

        let size = enforce_size_limit(&path, Some(50), Some(1000)).expect("within limit");
        assert_eq!(size, 100);
        assert!(path.exists());
    }

    #[test]
    fn test_enforce_size_limit_deletes_oversized_file() {
        let root = tempdir().expect("tempdir");
        let path = root.path().join("clip.mp4");
        fs::write(&path, vec![0u8; 100]).expect("write");

        let err = enforce_size_limit(&path, Some(5_000), Some(1000)).expect_err("over limit");
        assert!(matches!(err, ExtractError::TooLarge { size: 5_000, limit: 1000 }));
        assert!(!path.exists());
    }

    #[test]
    fn test_enforce_size_limit_measures_disk_when_unreported() {
        let root = tempdir().expect("tempdir");
        let path = root.path().join("clip.mp4");
        fs::write(&path, vec![0u8; 2000]).expect("write");

        let err = enforce_size_limit(&path, None, Some(1000)).expect_err("over limit");
        assert!(matches!(err, ExtractError::TooLarge { size: 2000, .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_enforce_size_limit_unlimited() {
        let root = tempdir().expect("tempdir");
        let path = root.path().join("clip.mp4");
        fs::write(&path, vec![0u8; 2000]).expect("write");
        assert_eq!(enforce_size_limit(&path, None, None).expect("no limit"), 2000);
    }

    #[test]
    fn test_enforce_size_limit_missing_file() {
        let root = tempdir().expect("tempdir");
        let err = enforce_size_limit(&root.path().join("gone.mp4"), None, Some(10))
            .expect_err("missing file");
        assert!(matches!(err, ExtractError::Io { .. }));
    }

    #[test]
    fn test_missing_binary_is_spawn_error() {
        let root = tempdir().expect("tempdir");
        let scratch = Scratch::open(root.path()).expect("scratch");
        let slot = scratch.allocate();
        let extractor = YtDlpExtractor::new(
            "/nonexistent/definitely-not-yt-dlp",
            ExtractorOptions::default(),
        );

        let err = extractor
            .fetch(&DownloadRequest::new("https://example.com/v/1"), &slot.target())
            .expect_err("binary is missing");
        assert!(matches!(err, ExtractError::Spawn { .. }));
        assert!(matches!(extractor.version(), Err(ExtractError::Spawn { .. })));
    }
}
