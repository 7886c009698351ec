use clip_relay::downloader::{ExtractorOptions, MediaExtractor, YtDlpExtractor};

/// Needs a real yt-dlp on PATH.
/// Run with `cargo test --test ytdlp_binary -- --ignored`.
#[test]
#[ignore = "requires yt-dlp to be installed"]
fn ytdlp_binary_reports_version() {
    let program = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());
    let extractor = YtDlpExtractor::new(program, ExtractorOptions::default());

    let version = extractor.version().expect("yt-dlp should be runnable");
    assert!(!version.is_empty());
    assert!(
        version.chars().next().is_some_and(|c| c.is_ascii_digit()),
        "unexpected version string: {version}"
    );
}
