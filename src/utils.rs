//! Small text helpers shared by the relay and the Telegram transport.

/// Telegram's hard limit for media captions, in characters.
pub const TELEGRAM_CAPTION_LIMIT: usize = 1024;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use clip_relay::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Builds an HTML-safe video caption from a media title.
///
/// The title is cut to fit the caption limit before escaping, so entities
/// such as `&amp;` are never split in half. Escaping can still grow the
/// text; Telegram counts the caption after entity parsing, so the visible
/// length stays within the limit.
///
/// # Examples
///
/// ```
/// use clip_relay::utils::html_caption;
/// assert_eq!(html_caption("Tom & Jerry <live>"), "Tom &amp; Jerry &lt;live&gt;");
/// ```
#[must_use]
pub fn html_caption(title: &str) -> String {
    let title = title.trim();
    let truncated = if title.chars().count() > TELEGRAM_CAPTION_LIMIT {
        format!("{}…", truncate_str(title, TELEGRAM_CAPTION_LIMIT - 1))
    } else {
        title.to_string()
    };
    html_escape::encode_text(&truncated).into_owned()
}

/// Formats a byte count as mebibytes with two decimals, for logs and notices.
///
/// # Examples
///
/// ```
/// use clip_relay::utils::format_megabytes;
/// assert_eq!(format_megabytes(52_428_800), "50.00 MB");
/// ```
#[must_use]
pub fn format_megabytes(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let mb = bytes as f64 / 1024.0 / 1024.0;
    format!("{mb:.2} MB")
}
