//! Telemetry records as they travel over the wire and into HAR export.
//!
//! Field names serialize in camelCase to match the CDP payloads they are
//! lifted from, so a record can be built by merging event JSON without a
//! rename layer.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// One network request, accumulated across its CDP lifecycle. Records
/// start in the engine's in-flight map and move into the completed list
/// exactly once, on `loadingFinished` or `loadingFailed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequestRecord {
    pub request_id: String,
    pub url: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,
    /// Navigation generation this request was first seen under.
    pub navigation_id: u64,
    /// Wall-clock start, milliseconds since the Unix epoch.
    pub started_at_ms: f64,
    /// HTTP status; 0 until a response arrives, and forced back to 0 on
    /// loading failure.
    #[serde(default)]
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub response_headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<ResourceTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoded_data_length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<f64>,
    /// Response body, a fetch-pending marker, or a skip placeholder.
    /// Never `None` on a finalized record, so "not fetched" stays
    /// distinguishable from "fetched but empty".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// True when `body` holds base64-encoded binary data.
    #[serde(default)]
    pub body_base64: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
}

impl NetworkRequestRecord {
    pub fn failed(&self) -> bool {
        self.error_text.is_some() || self.canceled || self.blocked_reason.is_some()
    }
}

/// Subset of CDP `Network.ResourceTiming` needed for the HAR breakdown.
/// All `*_start`/`*_end` offsets are milliseconds relative to
/// `request_time`; -1 means the phase did not happen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTiming {
    /// Baseline in seconds (CDP's monotonic `requestTime`).
    #[serde(default)]
    pub request_time: f64,
    #[serde(default = "minus_one")]
    pub dns_start: f64,
    #[serde(default = "minus_one")]
    pub dns_end: f64,
    #[serde(default = "minus_one")]
    pub connect_start: f64,
    #[serde(default = "minus_one")]
    pub connect_end: f64,
    #[serde(default = "minus_one")]
    pub ssl_start: f64,
    #[serde(default = "minus_one")]
    pub ssl_end: f64,
    #[serde(default = "minus_one")]
    pub send_start: f64,
    #[serde(default = "minus_one")]
    pub send_end: f64,
    #[serde(default = "minus_one")]
    pub receive_headers_end: f64,
}

fn minus_one() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessageRecord {
    /// CDP console level: log, info, warning, error, debug.
    pub level: String,
    pub text: String,
    pub timestamp_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameDirection {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketFrame {
    pub direction: FrameDirection,
    pub opcode: i64,
    pub payload: String,
    pub timestamp_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketConnectionRecord {
    pub request_id: String,
    pub url: String,
    #[serde(default)]
    pub frames: Vec<WebSocketFrame>,
    /// Frames discarded after the per-connection cap was reached.
    #[serde(default)]
    pub dropped_frames: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One element matched by a `query` command. `index` is the 1-based
/// position shown to the user; resolver tokens are 0-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryNode {
    pub index: u32,
    pub node_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}
