//! Cookie jar selection for authenticated sources.

use super::RelayError;
use reqwest::Url;
use std::path::PathBuf;
use tracing::debug;

/// Decides which requests get the cookie jar and which must be refused
#[derive(Debug, Clone, Default)]
pub struct CredentialPolicy {
    cookies_file: Option<PathBuf>,
    domains: Vec<String>,
}

impl CredentialPolicy {
    /// `domains` are lower-case registrable domains, e.g. `instagram.com`
    #[must_use]
    pub const fn new(cookies_file: Option<PathBuf>, domains: Vec<String>) -> Self {
        Self {
            cookies_file,
            domains,
        }
    }

    /// Cookie-required domain matching the URL's host, if any
    #[must_use]
    pub fn gated_domain(&self, url: &str) -> Option<&str> {
        let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
        self.domains
            .iter()
            .find(|domain| {
                host == domain.as_str()
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(String::as_str)
    }

    fn usable_cookies(&self) -> Option<PathBuf> {
        self.cookies_file
            .as_ref()
            .filter(|path| path.is_file())
            .cloned()
    }

    /// Resolves the cookie jar for `url`.
    ///
    /// A configured, existing jar is passed along for every URL. Gated
    /// domains without one are refused before any download starts.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingCredentials`] for a gated domain when no
    /// usable cookie file is configured.
    pub fn resolve(&self, url: &str) -> Result<Option<PathBuf>, RelayError> {
        let cookies = self.usable_cookies();
        if cookies.is_none() {
            if let Some(domain) = self.gated_domain(url) {
                debug!(url, domain, "Cookie jar required but unavailable");
                return Err(RelayError::MissingCredentials {
                    domain: domain.to_string(),
                });
            }
        }
        Ok(cookies)
    }
}
