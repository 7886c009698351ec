//! Extractor options.
//!
//! Every yt-dlp flag the relay relies on is a field here, so the command
//! line is fully determined by this struct plus the request.

use crate::scratch::ScratchTarget;
use std::ffi::OsString;
use std::path::Path;

/// Format selector preferring an MP4 container Telegram can play inline.
pub const DEFAULT_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Container used when separate video and audio streams are merged.
pub const DEFAULT_MERGE_FORMAT: &str = "mp4";

/// Template printed after the final file move; one JSON object per item.
pub const PRINT_TEMPLATE: &str = "after_move:%(.{filepath,title,filesize,filesize_approx})j";

/// Seconds yt-dlp waits on a silent connection before giving up.
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 30;

/// Options passed to yt-dlp for every download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorOptions {
    /// `-f`: format selector
    pub format: String,
    /// `--merge-output-format`: container for merged streams
    pub merge_output_format: Option<String>,
    /// `--no-playlist`: a playlist URL yields only the referenced item
    pub no_playlist: bool,
    /// `--quiet --no-warnings --no-progress`: keeps stdout machine-readable
    pub quiet: bool,
    /// `--max-filesize`: lets the tool skip downloads it knows are too big.
    /// The result is still measured afterwards, since the size is often
    /// unknown before the transfer starts. `None` disables the ceiling.
    pub max_filesize: Option<u64>,
    /// `--socket-timeout`: a stalled transfer fails instead of holding a
    /// pool permit forever
    pub socket_timeout: Option<u64>,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
            merge_output_format: Some(DEFAULT_MERGE_FORMAT.to_string()),
            no_playlist: true,
            quiet: true,
            max_filesize: None,
            socket_timeout: Some(DEFAULT_SOCKET_TIMEOUT_SECS),
        }
    }
}

impl ExtractorOptions {
    /// Default options with a size ceiling
    #[must_use]
    pub fn with_max_filesize(max_filesize: u64) -> Self {
        Self {
            max_filesize: Some(max_filesize),
            ..Self::default()
        }
    }

    /// Builds the full yt-dlp argument list.
    ///
    /// The output template comes from the scratch slot and the URL is
    /// placed after `--` so it can never be read as a flag.
    #[must_use]
    pub fn to_args(&self, url: &str, target: &ScratchTarget, cookies: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-f".into(),
            self.format.clone().into(),
            "-o".into(),
            target.output_template(),
        ];

        if let Some(ref merge) = self.merge_output_format {
            args.push("--merge-output-format".into());
            args.push(merge.clone().into());
        }
        if self.no_playlist {
            args.push("--no-playlist".into());
        }
        if self.quiet {
            args.extend(["--quiet", "--no-warnings", "--no-progress"].map(OsString::from));
        }
        if let Some(limit) = self.max_filesize {
            args.push("--max-filesize".into());
            args.push(limit.to_string().into());
        }
        if let Some(secs) = self.socket_timeout {
            args.push("--socket-timeout".into());
            args.push(secs.to_string().into());
        }
        if let Some(path) = cookies {
            args.push("--cookies".into());
            args.push(path.as_os_str().to_owned());
        }

        // --print implies --simulate; the download must still happen
        args.extend(["--no-simulate", "--print", PRINT_TEMPLATE].map(OsString::from));
        args.push("--".into());
        args.push(url.into());
        args
    }
}
