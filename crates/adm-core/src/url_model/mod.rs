//! Video URL recognition and extraction from pasted text.
//!
//! Accepts the common YouTube URL shapes (watch, youtu.be, embed, /v/ and the
//! mobile host), with or without scheme and `www.`, and normalizes each hit to
//! `https://www.youtube.com/watch?v=<id>`.

mod patterns;

use std::collections::HashSet;

use patterns::patterns;

/// Pulls candidate download URLs out of free text. Pure; no I/O.
pub trait UrlExtractor: Send + Sync {
    /// Normalized, deduplicated URLs in first-seen order.
    fn extract(&self, text: &str) -> Vec<String>;
}

/// Default extractor for YouTube links.
#[derive(Debug, Clone, Copy, Default)]
pub struct YoutubeUrlExtractor;

impl UrlExtractor for YoutubeUrlExtractor {
    fn extract(&self, text: &str) -> Vec<String> {
        extract_urls_from_text(text)
    }
}

/// True if the whole (trimmed) string is a recognized YouTube video URL.
pub fn is_youtube_url(url: &str) -> bool {
    youtube_video_id(url).is_some()
}

/// The 11-character video id of a recognized YouTube URL.
pub fn youtube_video_id(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    patterns()
        .anchored
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Canonical watch URL for a recognized YouTube URL; other input is returned trimmed.
pub fn normalize_url(url: &str) -> String {
    match youtube_video_id(url) {
        Some(id) => format!("https://www.youtube.com/watch?v={id}"),
        None => url.trim().to_string(),
    }
}

/// Extract every YouTube URL in `text`, line by line.
///
/// A line that is itself a URL is taken whole; otherwise URLs embedded in the
/// line are searched for.
pub fn extract_urls_from_text(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut push = |url: String| {
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    };

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if is_youtube_url(line) {
            push(normalize_url(line));
            continue;
        }
        for re in &patterns().search {
            for m in re.find_iter(line) {
                if is_youtube_url(m.as_str()) {
                    push(normalize_url(m.as_str()));
                }
            }
        }
    }
    urls
}
