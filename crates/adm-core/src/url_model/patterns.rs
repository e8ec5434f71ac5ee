//! Compiled YouTube URL patterns.

use regex::Regex;
use std::sync::OnceLock;

/// Whole-string patterns; capture group 1 is the video id.
const ANCHORED: [&str; 5] = [
    r"(?i)^(?:https?://)?(?:www\.)?youtube\.com/watch\?v=([a-zA-Z0-9_-]{11})(?:&.*)?$",
    r"(?i)^(?:https?://)?(?:www\.)?youtu\.be/([a-zA-Z0-9_-]{11})(?:\?.*)?$",
    r"(?i)^(?:https?://)?(?:www\.)?youtube\.com/embed/([a-zA-Z0-9_-]{11})(?:\?.*)?$",
    r"(?i)^(?:https?://)?(?:www\.)?youtube\.com/v/([a-zA-Z0-9_-]{11})(?:\?.*)?$",
    r"(?i)^(?:https?://)?(?:m\.)?youtube\.com/watch\?v=([a-zA-Z0-9_-]{11})(?:&.*)?$",
];

/// Same shapes, for finding URLs inside a longer line.
const SEARCH: [&str; 5] = [
    r"(?i)(?:https?://)?(?:www\.)?youtube\.com/watch\?v=[a-zA-Z0-9_-]{11}(?:&\S*)?",
    r"(?i)(?:https?://)?(?:www\.)?youtu\.be/[a-zA-Z0-9_-]{11}(?:\?\S*)?",
    r"(?i)(?:https?://)?(?:www\.)?youtube\.com/embed/[a-zA-Z0-9_-]{11}(?:\?\S*)?",
    r"(?i)(?:https?://)?(?:www\.)?youtube\.com/v/[a-zA-Z0-9_-]{11}(?:\?\S*)?",
    r"(?i)(?:https?://)?(?:m\.)?youtube\.com/watch\?v=[a-zA-Z0-9_-]{11}(?:&\S*)?",
];

pub(super) struct Patterns {
    pub(super) anchored: Vec<Regex>,
    pub(super) search: Vec<Regex>,
}

pub(super) fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        anchored: compile(&ANCHORED),
        search: compile(&SEARCH),
    })
}

fn compile(sources: &[&str]) -> Vec<Regex> {
    sources
        .iter()
        .map(|src| Regex::new(src).expect("built-in URL pattern must compile"))
        .collect()
}
