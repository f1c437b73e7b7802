use serde::Deserialize;
use serde::Serialize;

/// Hard ceilings and filters for the collection engine. Once a cap is hit,
/// new entries in that category are dropped; existing entries are never
/// evicted (availability over completeness).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TelemetryConfig {
    /// Ceiling on in-flight plus completed network records combined, so a
    /// burst cannot grow the in-flight map past the budget either.
    pub max_requests: usize,
    pub max_console_messages: usize,
    pub max_websockets: usize,
    pub max_frames_per_websocket: usize,
    /// In-flight entries older than this that never reached a terminal
    /// event are discarded by the sweep.
    pub stale_timeout_ms: f64,
    /// Domains whose finished requests are excluded from output entirely.
    pub excluded_domains: Vec<String>,
    /// Wildcard URL patterns excluded from output entirely.
    pub excluded_url_patterns: Vec<String>,
    pub body: BodyFetchConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_requests: 2000,
            max_console_messages: 1000,
            max_websockets: 100,
            max_frames_per_websocket: 200,
            stale_timeout_ms: 120_000.0,
            excluded_domains: Vec::new(),
            excluded_url_patterns: Vec::new(),
            body: BodyFetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BodyFetchConfig {
    /// Fetch every response body, overriding the heuristics (but not the
    /// size ceiling).
    pub fetch_all: bool,
    /// Wildcard URL patterns always fetched.
    pub include_patterns: Vec<String>,
    /// Wildcard URL patterns never fetched.
    pub exclude_patterns: Vec<String>,
    pub max_size_bytes: f64,
}

impl Default for BodyFetchConfig {
    fn default() -> Self {
        Self {
            fetch_all: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_size_bytes: 2_000_000.0,
        }
    }
}
