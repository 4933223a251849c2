//! URL allow-list checked before any job is created.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static ALLOWED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^https?://(www\.)?(youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)[\w-]{11}",
        r"^https?://(www\.)?music\.youtube\.com/watch\?v=[\w-]{11}",
        r"^https?://m\.youtube\.com/watch\?v=[\w-]{11}",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static VIDEO_ID: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?:[?&]v=|youtu\.be/|/embed/|/shorts/)([A-Za-z0-9_-]{11})").ok()
});

/// Returns true if the URL points at a supported video page.
pub fn is_supported_url(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && ALLOWED_PATTERNS.iter().any(|re| re.is_match(url))
}

/// Extract the 11-character video id, if the URL carries one.
pub fn video_id(url: &str) -> Option<String> {
    VIDEO_ID
        .as_ref()?
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
