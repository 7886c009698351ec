//! URL detection in inbound messages.

use lazy_regex::lazy_regex;

static RE_URL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"https?://\S+");

/// Returns the URL the relay should act on.
///
/// Entity-derived links win over the raw text scan because they carry the
/// exact span Telegram recognised (and the hidden target of text links).
/// Only the first URL is ever used.
///
/// # Examples
///
/// ```
/// use clip_relay::relay::url::find_url;
///
/// let url = find_url("check this out https://example.com/v/123 cool right?", &[]);
/// assert_eq!(url.as_deref(), Some("https://example.com/v/123"));
/// ```
#[must_use]
pub fn find_url(text: &str, links: &[String]) -> Option<String> {
    links
        .iter()
        .map(|link| link.trim())
        .find(|link| !link.is_empty())
        .map(str::to_string)
        .or_else(|| RE_URL.find(text).map(|m| m.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_regex_match() {
        assert_eq!(
            find_url(
                "two links: http://a.example/1 and https://b.example/2",
                &[]
            )
            .as_deref(),
            Some("http://a.example/1")
        );
    }

    #[test]
    fn test_no_url() {
        assert_eq!(find_url("just chatting, nothing to see", &[]), None);
        assert_eq!(find_url("ftp://example.com/file", &[]), None);
        assert_eq!(find_url("", &[]), None);
    }

    #[test]
    fn test_entities_take_precedence() {
        let links = vec!["https://youtu.be/abc".to_string()];
        assert_eq!(
            find_url("watch this https://example.com/other", &links).as_deref(),
            Some("https://youtu.be/abc")
        );
    }

    #[test]
    fn test_blank_entity_falls_back_to_text() {
        let links = vec!["  ".to_string()];
        assert_eq!(
            find_url("see https://example.com/v/9", &links).as_deref(),
            Some("https://example.com/v/9")
        );
    }

    #[test]
    fn test_url_stops_at_whitespace() {
        assert_eq!(
            find_url("https://example.com/v/1\nnext line", &[]).as_deref(),
            Some("https://example.com/v/1")
        );
    }
}
