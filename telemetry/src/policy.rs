//! Response-body fetch policy.
//!
//! One pure decision per finished request. A skipped body is always set to
//! a placeholder naming the reason, so "not fetched" can never be confused
//! with "fetched but empty".

use std::fmt;

use wildmatch::WildMatch;

use crate::BodyFetchConfig;

/// Placeholder installed while an issued body fetch is still in flight.
pub const BODY_PENDING: &str = "[body pending]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExcludedPattern,
    StaticAsset,
    TooLarge,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ExcludedPattern => write!(f, "url excluded by pattern"),
            SkipReason::StaticAsset => write!(f, "static asset"),
            SkipReason::TooLarge => write!(f, "exceeds size limit"),
        }
    }
}

pub fn skip_placeholder(reason: SkipReason) -> String {
    format!("[body not fetched: {reason}]")
}

pub fn failure_placeholder(error: &str) -> String {
    format!("[body unavailable: {error}]")
}

/// Decide whether a finished response's body should be fetched.
///
/// Precedence: explicit exclude patterns, then the fetch-all override and
/// explicit include patterns, then the static-asset heuristics, with the
/// size ceiling applying to everything.
pub fn decide_body_fetch(
    config: &BodyFetchConfig,
    url: &str,
    mime_type: Option<&str>,
    encoded_length: Option<f64>,
) -> Result<(), SkipReason> {
    if matches_any(&config.exclude_patterns, url) {
        return Err(SkipReason::ExcludedPattern);
    }
    if encoded_length.is_some_and(|len| len > config.max_size_bytes) {
        return Err(SkipReason::TooLarge);
    }
    if config.fetch_all || matches_any(&config.include_patterns, url) {
        return Ok(());
    }
    if is_static_asset(url, mime_type) {
        return Err(SkipReason::StaticAsset);
    }
    Ok(())
}

fn matches_any(patterns: &[String], url: &str) -> bool {
    patterns.iter().any(|p| WildMatch::new(p).matches(url))
}

/// Images, fonts, CSS, and sourcemaps are skipped by default; their bodies
/// are rarely what a debugging session is after and they dominate transfer
/// volume.
fn is_static_asset(url: &str, mime_type: Option<&str>) -> bool {
    if let Some(mime) = mime_type {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/")
            || mime.starts_with("font/")
            || mime.starts_with("audio/")
            || mime.starts_with("video/")
            || mime.contains("css")
            || mime.contains("font")
        {
            return true;
        }
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    const SKIPPED_EXTENSIONS: &[&str] = &[
        ".css", ".map", ".woff", ".woff2", ".ttf", ".otf", ".eot", ".png", ".jpg", ".jpeg",
        ".gif", ".webp", ".svg", ".ico",
    ];
    SKIPPED_EXTENSIONS
        .iter()
        .any(|ext| path.to_ascii_lowercase().ends_with(ext))
}
