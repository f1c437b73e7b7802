//! IPC envelope shared by all three processes.
//!
//! The same newline-delimited JSON framing runs on both hops: client to
//! daemon over the session's Unix socket, and daemon to worker over the
//! worker's stdio. Requests carry a `requestId` assigned by the sender of
//! the hop; responses echo it back so the broker can demultiplex replies
//! to the right client connection.

use serde::Deserialize;
use serde::Serialize;

use crate::command::Command;
use crate::error::CommandError;

/// A single request line: `{"requestId": N, "type": "<command>", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub request_id: u64,
    #[serde(flatten)]
    pub command: Command,
}

impl WireRequest {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            command,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// A single response line. `kind` discriminates the payload shape: the
/// worker's internal kinds (`worker_status`, `worker_peek`,
/// `worker_har_data`) differ from the client-facing `<command>_response`
/// kinds the broker adapts them into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    pub request_id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl WireResponse {
    pub fn ok(request_id: u64, kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            request_id,
            kind: kind.into(),
            status: ResponseStatus::Ok,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(request_id: u64, kind: impl Into<String>, error: CommandError) -> Self {
        Self {
            request_id,
            kind: kind.into(),
            status: ResponseStatus::Error,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::command::Command;
    use crate::command::PeekParams;

    #[test]
    fn request_envelope_round_trips() {
        let request = WireRequest::new(
            7,
            Command::Peek(PeekParams {
                last_n: Some(5),
                offset: None,
            }),
        );
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            json!({
                "requestId": 7,
                "type": "peek",
                "params": {"lastN": 5},
            }),
            value
        );

        let parsed: WireRequest = serde_json::from_value(value).expect("deserialize");
        assert_eq!(request, parsed);
    }

    #[test]
    fn response_kind_and_status_serialize_as_strings() {
        let response = WireResponse::ok(3, "peek_response", json!({"preview": {}}));
        let value = serde_json::to_value(&response).expect("serialize");
        assert_eq!(
            json!({
                "requestId": 3,
                "type": "peek_response",
                "status": "ok",
                "data": {"preview": {}},
            }),
            value
        );
    }
}
