//! Utility functions for text measurement, log formatting, and pacing.
//!
//! This module provides helpers used throughout the pipeline:
//! - Word counting, the single definition behind every `word_count`
//! - Fallback summaries built from leading sentences
//! - String truncation and capitalisation for logs and labels
//! - HTML escaping for the composed post
//! - Randomised user agents and cancellable pacing waits

use once_cell::sync::Lazy;
use rand::{Rng, rng};
use regex::Regex;
use std::ops::Range;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Browser user agents rotated across outbound requests.
pub const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:89.0) Gecko/20100101 Firefox/89.0",
];

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("static regex"));

/// Pick one of [`USER_AGENTS`] at random.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS[rng().random_range(0..USER_AGENTS.len())]
}

/// Count word tokens in `text`.
///
/// A word is a maximal run of word characters between word boundaries, so
/// `"state-of-the-art"` counts as four words and punctuation counts as none.
pub fn count_words(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// Build a summary from the first three `.`-separated sentences of `text`.
///
/// Empty sentences are dropped, the rest are trimmed and joined with `". "`,
/// and a trailing period is appended when anything remains.
pub fn leading_sentences_summary(text: &str) -> String {
    let mut summary = text
        .split('.')
        .take(3)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(". ");
    if !summary.is_empty() {
        summary.push('.');
    }
    summary
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended. Truncation respects char boundaries.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Upper-case the first character and lower-case the rest.
///
/// Used to normalise raw extracted keywords into post labels
/// (e.g. `"NVIDIA"` -> `"Nvidia"`, `"machine learning"` -> `"Machine learning"`).
pub fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + &c.as_str().to_lowercase(),
    }
}

/// Escape text for inclusion in HTML element content or quoted attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` when the wait was cut short by cancellation.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = sleep(duration) => false,
    }
}

/// Sleep for a random number of milliseconds drawn from `range_ms`.
///
/// Returns `true` when the wait was cut short by cancellation.
pub async fn jitter(cancel: &CancellationToken, range_ms: Range<u64>) -> bool {
    let ms = rng().random_range(range_ms);
    debug!(ms, "Pacing before next request");
    pause(cancel, Duration::from_millis(ms)).await
}
