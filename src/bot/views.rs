//! Relay UI texts
//!
//! Every string the bot shows to chat users lives here.

use crate::utils::format_megabytes;

/// Trait for relay view rendering
pub trait RelayView {
    /// Usage text for `/start`
    fn welcome_message(max_file_size: u64) -> String;

    /// Status while the extractor runs
    fn downloading() -> &'static str;

    /// Status while the file is being sent
    fn uploading() -> &'static str;

    /// Reply when a cookie-gated source has no cookie jar configured
    fn missing_credentials(domain: &str) -> String;

    /// Status edit after a failed extraction
    fn extraction_failed(reason: &str) -> String;

    /// Reply after the chat platform rejected the upload
    fn upload_failed(error: &str) -> String;

    /// Reply for unexpected failures
    fn internal_error() -> &'static str;

    /// `/healthcheck` answer
    fn healthcheck(tool_version: Result<&str, &str>) -> String;

    /// Reply for users outside the allow-list
    fn access_denied() -> &'static str;
}

/// Default English implementation of `RelayView`
pub struct DefaultRelayView;

impl RelayView for DefaultRelayView {
    fn welcome_message(max_file_size: u64) -> String {
        format!(
            "👋 Send me a link to a video and I will upload it here.\n\n\
             Files larger than {} cannot be sent.",
            format_megabytes(max_file_size)
        )
    }

    fn downloading() -> &'static str {
        "⏳ Downloading…"
    }

    fn uploading() -> &'static str {
        "📤 Uploading…"
    }

    fn missing_credentials(domain: &str) -> String {
        format!("🔒 Downloads from {domain} require cookies, but no cookie file is configured.")
    }

    fn extraction_failed(reason: &str) -> String {
        format!("❌ Could not download this link: {reason}")
    }

    fn upload_failed(error: &str) -> String {
        format!("❌ Error: {error}")
    }

    fn internal_error() -> &'static str {
        "❌ Something went wrong while processing this link."
    }

    fn healthcheck(tool_version: Result<&str, &str>) -> String {
        match tool_version {
            Ok(version) => format!("OK\nyt-dlp {version}"),
            Err(error) => format!("⚠️ yt-dlp is not available: {error}"),
        }
    }

    fn access_denied() -> &'static str {
        "⛔️ Access denied"
    }
}
