//! Configuration and settings management
//!
//! Loads settings from optional config files and environment variables.
//! A `.env` file is loaded by the binaries before [`Settings::new`] runs.

use config::{Config, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Telegram Bot API upload limit for bots, in mebibytes.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 50;
/// Scratch directory for in-flight downloads.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
/// Extraction tool executable.
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
/// HTTP timeout for Bot API calls, generous enough for 50 MB uploads.
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 300;
/// Seconds the extraction tool waits on a silent connection.
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = crate::downloader::options::DEFAULT_SOCKET_TIMEOUT_SECS;
/// Number of extractions allowed to run at the same time.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;
/// Domains that cannot be fetched without a cookie jar.
pub const DEFAULT_COOKIE_DOMAINS: &str = "instagram.com";

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Netscape-format cookie jar handed to the extractor
    pub cookies_file: Option<PathBuf>,

    /// Scratch directory for downloads
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Upload ceiling in MiB; larger downloads are discarded
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Path or name of the yt-dlp executable
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    /// Timeout for Bot API requests (uploads included), in seconds
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,

    /// Network inactivity timeout handed to the extractor, in seconds
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,

    /// Size of the extraction worker pool
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Comma-separated list of domains that require the cookie jar
    #[serde(rename = "cookie_domains")]
    pub cookie_domains_str: Option<String>,

    /// Comma-separated list of allowed user IDs; empty means everyone
    #[serde(rename = "allowed_users")]
    pub allowed_users_str: Option<String>,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(DEFAULT_DOWNLOAD_DIR)
}

const fn default_max_file_size_mb() -> u64 {
    DEFAULT_MAX_FILE_SIZE_MB
}

fn default_ytdlp_path() -> String {
    DEFAULT_YTDLP_PATH.to_string()
}

const fn default_upload_timeout_secs() -> u64 {
    DEFAULT_UPLOAD_TIMEOUT_SECS
}

const fn default_socket_timeout_secs() -> u64 {
    DEFAULT_SOCKET_TIMEOUT_SECS
}

const fn default_max_concurrent_downloads() -> usize {
    DEFAULT_MAX_CONCURRENT_DOWNLOADS
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use clip_relay::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails, the token is missing, or a
    /// value is out of range.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Loads settings with `vars` standing in for the process environment.
    ///
    /// `None` reads the real environment.
    ///
    /// # Errors
    ///
    /// Same as [`Settings::new`].
    pub fn load(vars: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let run_mode = match vars {
            Some(ref vars) => vars.get("RUN_MODE").cloned(),
            None => std::env::var("RUN_MODE").ok(),
        }
        .unwrap_or_else(|| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Local overrides, not checked into git
            .add_source(File::with_name("config/local").required(false))
            // `APP__DOWNLOAD_DIR=/tmp/x` style overrides
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .source(vars.clone()),
            )
            // Bare variables: TELEGRAM_TOKEN -> telegram_token
            .add_source(Environment::default().ignore_empty(true).source(vars))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks invariants that serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram_token.trim().is_empty() {
            return Err(ConfigError::Message(
                "TELEGRAM_TOKEN must be set".to_string(),
            ));
        }
        if self.max_file_size_mb == 0 {
            return Err(ConfigError::Message(
                "MAX_FILE_SIZE_MB must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(ConfigError::Message(
                "MAX_CONCURRENT_DOWNLOADS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload ceiling in bytes
    #[must_use]
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Returns the lower-cased domains that require the cookie jar
    #[must_use]
    pub fn cookie_domains(&self) -> Vec<String> {
        self.cookie_domains_str
            .as_deref()
            .unwrap_or(DEFAULT_COOKIE_DOMAINS)
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .map(|token| token.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|token| !token.is_empty())
            .collect()
    }

    /// Returns a set of Telegram IDs that are allowed to use the bot
    #[must_use]
    pub fn allowed_users(&self) -> HashSet<i64> {
        self.allowed_users_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter_map(|id| id.parse::<i64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// An empty allow-list leaves the bot open to everyone.
    #[must_use]
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        let allowed = self.allowed_users();
        allowed.is_empty() || allowed.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            telegram_token: "dummy".to_string(),
            cookies_file: None,
            download_dir: default_download_dir(),
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            ytdlp_path: default_ytdlp_path(),
            upload_timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            cookie_domains_str: None,
            allowed_users_str: None,
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        let settings = Settings::load(Some(vars(&[
            ("TELEGRAM_TOKEN", "123:abc"),
            ("MAX_FILE_SIZE_MB", "20"),
            ("COOKIES_FILE", ""),
            ("APP__SOCKET_TIMEOUT_SECS", "5"),
        ])))?;
        assert_eq!(settings.telegram_token, "123:abc");
        assert_eq!(settings.max_file_size_mb, 20);
        assert_eq!(settings.cookies_file, None);
        assert_eq!(settings.socket_timeout_secs, 5);
        assert_eq!(settings.download_dir, PathBuf::from(DEFAULT_DOWNLOAD_DIR));
        Ok(())
    }

    #[test]
    fn test_config_rejects_blank_token() {
        assert!(Settings::load(Some(vars(&[("TELEGRAM_TOKEN", "   ")]))).is_err());
        assert!(Settings::load(Some(vars(&[]))).is_err());
    }

    #[test]
    fn test_max_file_size_bytes() {
        let s = settings();
        assert_eq!(s.max_file_size_bytes(), 50 * 1024 * 1024);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut s = settings();
        s.max_file_size_mb = 0;
        assert!(s.validate().is_err());

        let mut s = settings();
        s.max_concurrent_downloads = 0;
        assert!(s.validate().is_err());

        assert!(settings().validate().is_ok());
    }

    #[test]
    fn test_cookie_domains_default_and_parsing() {
        let mut s = settings();
        assert_eq!(s.cookie_domains(), vec!["instagram.com".to_string()]);

        s.cookie_domains_str = Some("Instagram.com; .tiktok.com , x.com".to_string());
        assert_eq!(
            s.cookie_domains(),
            vec![
                "instagram.com".to_string(),
                "tiktok.com".to_string(),
                "x.com".to_string()
            ]
        );
    }

    #[test]
    fn test_list_parsing() {
        let mut s = settings();

        // Open bot when no list is configured
        assert!(s.is_user_allowed(42));

        s.allowed_users_str = Some("333; 444, 555".to_string());
        let allowed = s.allowed_users();
        assert!(allowed.contains(&333));
        assert!(allowed.contains(&444));
        assert!(allowed.contains(&555));
        assert_eq!(allowed.len(), 3);
        assert!(s.is_user_allowed(444));
        assert!(!s.is_user_allowed(42));

        s.allowed_users_str = Some("abc, 777".to_string());
        let allowed = s.allowed_users();
        assert!(allowed.contains(&777));
        assert_eq!(allowed.len(), 1);
    }
}
