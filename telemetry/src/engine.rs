//! The collection engine: network request lifecycle, console capture,
//! WebSocket capture, navigation tracking, staleness sweep.
//!
//! A network record lives in the insertion-ordered in-flight map from
//! `requestWillBeSent` until a terminal event moves it into the completed
//! list exactly once, or the sweep discards it. A half-captured request
//! without completion metadata never reaches output.

use std::collections::HashSet;

use indexmap::IndexMap;
use pagetap_cdp::CdpEvent;
use pagetap_cdp::header_map;
use pagetap_protocol::ConsoleMessageRecord;
use pagetap_protocol::FrameDirection;
use pagetap_protocol::NetworkRequestRecord;
use pagetap_protocol::WebSocketConnectionRecord;
use pagetap_protocol::WebSocketFrame;
use serde::Serialize;
use tracing::debug;
use wildmatch::WildMatch;

use crate::Clock;
use crate::TelemetryConfig;
use crate::policy;

/// A response-body fetch the worker should issue. The engine only decides;
/// the CDP call happens outside and the result comes back through
/// [`TelemetryEngine::apply_body`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyFetch {
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub body: String,
    pub base64_encoded: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCounters {
    pub requests: u64,
    pub console_messages: u64,
    pub websockets: u64,
}

/// Counters reported by the `status` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub completed_requests: usize,
    pub inflight_requests: usize,
    pub console_messages: usize,
    pub websockets: usize,
    pub open_websockets: usize,
    pub dropped: DropCounters,
    pub navigation_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    pub collecting_since_ms: f64,
}

struct InFlight {
    record: NetworkRequestRecord,
    /// Engine clock at first sight; the sweep ages entries against this.
    seen_at_ms: f64,
    /// CDP monotonic timestamp at first sight, for converting later event
    /// timestamps into wall-clock offsets.
    start_monotonic: f64,
}

pub struct TelemetryEngine {
    config: TelemetryConfig,
    clock: Clock,
    navigation_id: u64,
    current_url: Option<String>,
    inflight: IndexMap<String, InFlight>,
    completed: Vec<NetworkRequestRecord>,
    pending_bodies: HashSet<String>,
    console: Vec<ConsoleMessageRecord>,
    open_websockets: IndexMap<String, WebSocketConnectionRecord>,
    closed_websockets: Vec<WebSocketConnectionRecord>,
    dropped: DropCounters,
    started_at_ms: f64,
}

impl TelemetryEngine {
    pub fn new(config: TelemetryConfig, clock: Clock) -> Self {
        let started_at_ms = clock();
        Self {
            config,
            clock,
            navigation_id: 1,
            current_url: None,
            inflight: IndexMap::new(),
            completed: Vec::new(),
            pending_bodies: HashSet::new(),
            console: Vec::new(),
            open_websockets: IndexMap::new(),
            closed_websockets: Vec::new(),
            dropped: DropCounters::default(),
            started_at_ms,
        }
    }

    /// Feed one CDP event through the state machine. Returns a body fetch
    /// the caller should issue, if the finished request warrants one.
    pub fn handle_event(&mut self, event: CdpEvent) -> Option<BodyFetch> {
        match event {
            CdpEvent::RequestWillBeSent(e) => self.on_request_will_be_sent(e),
            CdpEvent::ResponseReceived(e) => self.on_response_received(e),
            CdpEvent::LoadingFinished(e) => return self.on_loading_finished(e),
            CdpEvent::LoadingFailed(e) => self.on_loading_failed(e),
            CdpEvent::ConsoleApiCalled(e) => self.on_console(e),
            CdpEvent::WebSocketCreated(e) => self.on_websocket_created(e),
            CdpEvent::WebSocketHandshake(e) => {
                if let Some(record) = self.open_websockets.get_mut(&e.request_id) {
                    record.status = Some(e.response.status);
                }
            }
            CdpEvent::WebSocketFrame(e) => self.on_websocket_frame(e),
            CdpEvent::WebSocketClosed(e) => self.on_websocket_closed(e),
            CdpEvent::FrameNavigated(e) => {
                if e.is_top_level() {
                    self.navigation_id += 1;
                    self.current_url = Some(e.frame.url);
                }
            }
        }
        None
    }

    fn on_request_will_be_sent(&mut self, event: pagetap_cdp::RequestWillBeSent) {
        // A redirect re-fires the event for the same id; update the record
        // in place without resetting its age, so redirect chains age from
        // first sight.
        if let Some(entry) = self.inflight.get_mut(&event.request_id) {
            entry.record.url = event.request.url;
            entry.record.method = event.request.method;
            entry.record.request_headers = header_map(&event.request.headers);
            entry.record.post_data = event.request.post_data;
            return;
        }
        if self.inflight.len() + self.completed.len() >= self.config.max_requests {
            self.dropped.requests += 1;
            return;
        }
        let started_at_ms = if event.wall_time > 0.0 {
            event.wall_time * 1000.0
        } else {
            (self.clock)()
        };
        let record = NetworkRequestRecord {
            request_id: event.request_id.clone(),
            url: event.request.url,
            method: event.request.method,
            resource_type: event.resource_type,
            request_headers: header_map(&event.request.headers),
            post_data: event.request.post_data,
            navigation_id: self.navigation_id,
            started_at_ms,
            ..Default::default()
        };
        self.inflight.insert(
            event.request_id,
            InFlight {
                record,
                seen_at_ms: (self.clock)(),
                start_monotonic: event.timestamp,
            },
        );
    }

    fn on_response_received(&mut self, event: pagetap_cdp::ResponseReceived) {
        let Some(entry) = self.inflight.get_mut(&event.request_id) else {
            return;
        };
        let response = event.response;
        entry.record.status = response.status;
        entry.record.status_text = Some(response.status_text);
        entry.record.mime_type = Some(response.mime_type);
        entry.record.response_headers = header_map(&response.headers);
        entry.record.remote_address = response.remote_ip_address.map(|ip| match response
            .remote_port
        {
            Some(port) => format!("{ip}:{port}"),
            None => ip,
        });
        entry.record.connection_id = response.connection_id;
        entry.record.protocol = response.protocol;
        entry.record.timing = response.timing;
    }

    fn on_loading_finished(&mut self, event: pagetap_cdp::LoadingFinished) -> Option<BodyFetch> {
        let entry = self.inflight.shift_remove(&event.request_id)?;
        let mut record = entry.record;
        record.encoded_data_length = Some(event.encoded_data_length);
        record.finished_at_ms =
            Some(record.started_at_ms + (event.timestamp - entry.start_monotonic) * 1000.0);

        if self.is_excluded(&record.url) {
            debug!("excluding finished request {}", record.url);
            return None;
        }

        let fetch = match policy::decide_body_fetch(
            &self.config.body,
            &record.url,
            record.mime_type.as_deref(),
            record.encoded_data_length,
        ) {
            Ok(()) => {
                record.body = Some(policy::BODY_PENDING.to_string());
                self.pending_bodies.insert(record.request_id.clone());
                Some(BodyFetch {
                    request_id: record.request_id.clone(),
                })
            }
            Err(reason) => {
                record.body = Some(policy::skip_placeholder(reason));
                None
            }
        };
        self.completed.push(record);
        fetch
    }

    fn on_loading_failed(&mut self, event: pagetap_cdp::LoadingFailed) {
        let Some(entry) = self.inflight.shift_remove(&event.request_id) else {
            return;
        };
        let mut record = entry.record;
        record.status = 0;
        record.error_text = Some(event.error_text);
        record.canceled = event.canceled;
        record.blocked_reason = event.blocked_reason;
        record.finished_at_ms =
            Some(record.started_at_ms + (event.timestamp - entry.start_monotonic) * 1000.0);
        record.body = Some(policy::failure_placeholder("request failed"));
        self.completed.push(record);
    }

    fn on_console(&mut self, event: pagetap_cdp::ConsoleApiCalled) {
        if self.console.len() >= self.config.max_console_messages {
            self.dropped.console_messages += 1;
            return;
        }
        let stack_trace = if event.level == "error" {
            event.stack_trace.as_ref().map(pagetap_cdp::StackTrace::render)
        } else {
            None
        };
        self.console.push(ConsoleMessageRecord {
            level: event.level.clone(),
            text: event.text(),
            timestamp_ms: if event.timestamp > 0.0 {
                event.timestamp
            } else {
                (self.clock)()
            },
            navigation_id: Some(self.navigation_id),
            stack_trace,
        });
    }

    fn on_websocket_created(&mut self, event: pagetap_cdp::WebSocketCreated) {
        if self.open_websockets.len() + self.closed_websockets.len() >= self.config.max_websockets
        {
            self.dropped.websockets += 1;
            return;
        }
        self.open_websockets.insert(
            event.request_id.clone(),
            WebSocketConnectionRecord {
                request_id: event.request_id,
                url: event.url,
                frames: Vec::new(),
                dropped_frames: 0,
                status: None,
                closed_at_ms: None,
                error: None,
            },
        );
    }

    fn on_websocket_frame(&mut self, event: pagetap_cdp::WebSocketFrameEvent) {
        let Some(record) = self.open_websockets.get_mut(&event.request_id) else {
            return;
        };
        if record.frames.len() >= self.config.max_frames_per_websocket {
            record.dropped_frames += 1;
            return;
        }
        record.frames.push(WebSocketFrame {
            direction: if event.sent {
                FrameDirection::Sent
            } else {
                FrameDirection::Received
            },
            opcode: event.response.opcode,
            payload: event.response.payload_data,
            timestamp_ms: (self.clock)(),
        });
    }

    fn on_websocket_closed(&mut self, event: pagetap_cdp::WebSocketClosed) {
        let Some(mut record) = self.open_websockets.shift_remove(&event.request_id) else {
            return;
        };
        record.closed_at_ms = Some((self.clock)());
        self.closed_websockets.push(record);
    }

    /// Apply a body-fetch outcome. A result whose request is no longer
    /// pending (cleaned up, or already resolved) is dropped silently; the
    /// fetch task was abandoned, not cancelled.
    pub fn apply_body(&mut self, request_id: &str, outcome: Result<FetchedBody, String>) {
        if !self.pending_bodies.remove(request_id) {
            debug!("discarding late body for {request_id}");
            return;
        }
        let Some(record) = self
            .completed
            .iter_mut()
            .rev()
            .find(|r| r.request_id == request_id)
        else {
            return;
        };
        match outcome {
            Ok(fetched) => {
                record.body = Some(fetched.body);
                record.body_base64 = fetched.base64_encoded;
            }
            Err(error) => {
                record.body = Some(policy::failure_placeholder(&error));
            }
        }
    }

    /// Discard in-flight entries that never reached a terminal event within
    /// the stale timeout. Returns how many were removed.
    pub fn sweep_stale(&mut self) -> usize {
        let now = (self.clock)();
        let timeout = self.config.stale_timeout_ms;
        let before = self.inflight.len();
        self.inflight
            .retain(|_, entry| now - entry.seen_at_ms <= timeout);
        let removed = before - self.inflight.len();
        if removed > 0 {
            debug!("swept {removed} stale in-flight requests");
        }
        removed
    }

    /// Move still-open WebSocket records into the output list; called at
    /// shutdown so open connections are not lost.
    pub fn flush_open_websockets(&mut self) {
        let open: Vec<WebSocketConnectionRecord> =
            self.open_websockets.drain(..).map(|(_, r)| r).collect();
        self.closed_websockets.extend(open);
    }

    fn is_excluded(&self, url: &str) -> bool {
        if self
            .config
            .excluded_url_patterns
            .iter()
            .any(|p| WildMatch::new(p).matches(url))
        {
            return true;
        }
        if self.config.excluded_domains.is_empty() {
            return false;
        }
        let Some(host) = url::Url::parse(url).ok().and_then(|u| u.host_str().map(String::from))
        else {
            return false;
        };
        self.config
            .excluded_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }

    pub fn completed(&self) -> &[NetworkRequestRecord] {
        &self.completed
    }

    pub fn console_messages(&self) -> &[ConsoleMessageRecord] {
        &self.console
    }

    pub fn websockets(&self) -> &[WebSocketConnectionRecord] {
        &self.closed_websockets
    }

    pub fn navigation_id(&self) -> u64 {
        self.navigation_id
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            completed_requests: self.completed.len(),
            inflight_requests: self.inflight.len(),
            console_messages: self.console.len(),
            websockets: self.closed_websockets.len(),
            open_websockets: self.open_websockets.len(),
            dropped: self.dropped,
            navigation_id: self.navigation_id,
            current_url: self.current_url.clone(),
            collecting_since_ms: self.started_at_ms,
        }
    }
}
