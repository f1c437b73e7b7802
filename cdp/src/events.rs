//! Typed model of the CDP events the telemetry engine consumes.
//!
//! Field names deserialize straight from the wire payloads (camelCase), so
//! the chromiumoxide adapter can serialize its generated event structs back
//! to JSON and funnel them through the same [`CdpEvent::parse`] path the
//! tests use.

use std::collections::HashMap;

use pagetap_protocol::ResourceTiming;
use serde::Deserialize;
use serde_json::Value;

/// One browser event, already narrowed to the set the engine cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum CdpEvent {
    RequestWillBeSent(RequestWillBeSent),
    ResponseReceived(ResponseReceived),
    LoadingFinished(LoadingFinished),
    LoadingFailed(LoadingFailed),
    ConsoleApiCalled(ConsoleApiCalled),
    WebSocketCreated(WebSocketCreated),
    WebSocketHandshake(WebSocketHandshake),
    WebSocketFrame(WebSocketFrameEvent),
    WebSocketClosed(WebSocketClosed),
    FrameNavigated(FrameNavigated),
}

impl CdpEvent {
    /// Map a raw `(method, params)` pair to a typed event. Methods outside
    /// the collected set return `None` and are dropped by the caller.
    pub fn parse(method: &str, params: &Value) -> Option<CdpEvent> {
        let event = match method {
            "Network.requestWillBeSent" => {
                CdpEvent::RequestWillBeSent(from_value(params)?)
            }
            "Network.responseReceived" => CdpEvent::ResponseReceived(from_value(params)?),
            "Network.loadingFinished" => CdpEvent::LoadingFinished(from_value(params)?),
            "Network.loadingFailed" => CdpEvent::LoadingFailed(from_value(params)?),
            "Runtime.consoleAPICalled" => CdpEvent::ConsoleApiCalled(from_value(params)?),
            "Network.webSocketCreated" => CdpEvent::WebSocketCreated(from_value(params)?),
            "Network.webSocketHandshakeResponseReceived" => {
                CdpEvent::WebSocketHandshake(from_value(params)?)
            }
            "Network.webSocketFrameSent" => {
                let mut frame: WebSocketFrameEvent = from_value(params)?;
                frame.sent = true;
                CdpEvent::WebSocketFrame(frame)
            }
            "Network.webSocketFrameReceived" => {
                let mut frame: WebSocketFrameEvent = from_value(params)?;
                frame.sent = false;
                CdpEvent::WebSocketFrame(frame)
            }
            "Network.webSocketClosed" => CdpEvent::WebSocketClosed(from_value(params)?),
            "Page.frameNavigated" => CdpEvent::FrameNavigated(from_value(params)?),
            _ => return None,
        };
        Some(event)
    }
}

fn from_value<T: serde::de::DeserializeOwned>(params: &Value) -> Option<T> {
    match serde_json::from_value(params.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::debug!("dropping malformed CDP event payload: {e}");
            None
        }
    }
}

/// Flatten a CDP `Headers` object into string pairs. Non-string values
/// occasionally show up (numbers from some proxies); they are stringified
/// rather than dropped.
pub fn header_map(headers: &Value) -> HashMap<String, String> {
    let Some(object) = headers.as_object() else {
        return HashMap::new();
    };
    object
        .iter()
        .map(|(k, v)| {
            let value = match v.as_str() {
                Some(s) => s.to_string(),
                None => v.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    pub request_id: String,
    pub request: RequestInfo,
    /// CDP resource type (`Document`, `XHR`, `Image`, ...).
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    /// Monotonic seconds; baseline for later events with the same id.
    pub timestamp: f64,
    /// Seconds since the Unix epoch at request start.
    #[serde(default)]
    pub wall_time: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Value,
    #[serde(default)]
    pub post_data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    pub request_id: String,
    pub response: ResponseInfo,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Value,
    #[serde(default)]
    pub remote_ip_address: Option<String>,
    #[serde(default)]
    pub remote_port: Option<i64>,
    #[serde(default)]
    pub connection_id: Option<f64>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub timing: Option<ResourceTiming>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
    pub request_id: String,
    pub timestamp: f64,
    #[serde(default)]
    pub encoded_data_length: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
    pub request_id: String,
    pub timestamp: f64,
    #[serde(default)]
    pub error_text: String,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalled {
    /// Console level as CDP names it: log, info, warning, error, debug, ...
    #[serde(rename = "type")]
    pub level: String,
    #[serde(default)]
    pub args: Vec<Value>,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub stack_trace: Option<StackTrace>,
}

impl ConsoleApiCalled {
    /// Human-readable message text: each remote-object arg rendered by its
    /// primitive value or description, space-joined.
    pub fn text(&self) -> String {
        let parts: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if let Some(value) = arg.get("value") {
                    match value.as_str() {
                        Some(s) => s.to_string(),
                        None => value.to_string(),
                    }
                } else if let Some(description) = arg.get("description").and_then(Value::as_str) {
                    description.to_string()
                } else {
                    arg.to_string()
                }
            })
            .collect();
        parts.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
}

impl StackTrace {
    pub fn render(&self) -> String {
        self.call_frames
            .iter()
            .map(|frame| {
                let name = if frame.function_name.is_empty() {
                    "<anonymous>"
                } else {
                    frame.function_name.as_str()
                };
                format!(
                    "at {name} ({}:{}:{})",
                    frame.url, frame.line_number, frame.column_number
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketCreated {
    pub request_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketHandshake {
    pub request_id: String,
    pub response: WebSocketHandshakeResponse,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketHandshakeResponse {
    #[serde(default)]
    pub status: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketFrameEvent {
    pub request_id: String,
    pub timestamp: f64,
    pub response: WebSocketFramePayload,
    /// Set by [`CdpEvent::parse`] from the method name; not on the wire.
    #[serde(skip)]
    pub sent: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketFramePayload {
    #[serde(default)]
    pub opcode: i64,
    #[serde(default)]
    pub payload_data: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketClosed {
    pub request_id: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameNavigated {
    pub frame: FrameInfo,
}

impl FrameNavigated {
    /// Only top-level navigations bump the navigation id; subframe loads
    /// must not invalidate caches.
    pub fn is_top_level(&self) -> bool {
        self.frame.parent_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub url: String,
}
