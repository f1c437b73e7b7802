//! Per-family response adapters.
//!
//! The worker answers the three transformed families with internal kinds
//! (`worker_status`, `worker_peek`, `worker_har_data`); the broker reshapes
//! those into the client-facing payloads, folding in the state only the
//! daemon knows. Exit synthesis runs through the same adapters, so a
//! client sees the identical shape whether the worker answered or died.

use pagetap_protocol::CommandError;
use pagetap_protocol::CommandFamily;
use pagetap_protocol::WireResponse;
use serde_json::Value;
use serde_json::json;

/// Daemon-side facts folded into responses, captured at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub struct CarryState {
    pub daemon_pid: u32,
    /// PID recorded by the worker, when its pid file names a live process.
    pub session_pid: Option<i32>,
    pub socket_path: String,
    pub uptime_seconds: u64,
}

/// Reshape a worker response into the client-facing response for its
/// command. Errors keep their payload and only get re-addressed.
pub fn adapt_response(
    family: CommandFamily,
    client_request_id: u64,
    client_kind: &str,
    carry: &CarryState,
    worker: WireResponse,
) -> WireResponse {
    if let Some(error) = worker.error {
        return WireResponse::error(client_request_id, client_kind, error);
    }
    let data = worker.data.unwrap_or(Value::Null);
    let data = match family {
        CommandFamily::Status => merge_status(carry, data),
        CommandFamily::Peek => json!({
            "preview": data,
            "sessionPid": carry.session_pid,
        }),
        CommandFamily::Har => json!({
            "requests": data.get("entries").cloned().unwrap_or_else(|| json!([])),
        }),
        CommandFamily::Generic => data,
    };
    WireResponse::ok(client_request_id, client_kind, data)
}

/// Synthesize the response for a request still outstanding when the worker
/// exited, in the same family shape a real answer would have had.
pub fn exit_response(
    family: CommandFamily,
    client_request_id: u64,
    client_kind: &str,
    carry: &CarryState,
) -> WireResponse {
    let worker = WireResponse::error(client_request_id, client_kind, CommandError::worker_exited());
    adapt_response(family, client_request_id, client_kind, carry, worker)
}

fn merge_status(carry: &CarryState, data: Value) -> Value {
    let mut merged = match data {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    merged.insert("daemonPid".to_string(), json!(carry.daemon_pid));
    merged.insert("sessionPid".to_string(), json!(carry.session_pid));
    merged.insert("socketPath".to_string(), json!(carry.socket_path));
    merged.insert("uptimeSeconds".to_string(), json!(carry.uptime_seconds));
    Value::Object(merged)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pagetap_protocol::ResponseStatus;
    use pagetap_protocol::exit_code;
    use pretty_assertions::assert_eq;

    use super::*;

    fn carry() -> CarryState {
        CarryState {
            daemon_pid: 4242,
            session_pid: Some(5000),
            socket_path: "/tmp/s/daemon.sock".to_string(),
            uptime_seconds: 90,
        }
    }

    #[test]
    fn status_merges_daemon_facts_over_the_worker_payload() {
        let worker = WireResponse::ok(
            17,
            "worker_status",
            json!({"completedRequests": 12, "workerPid": 6000}),
        );
        let adapted = adapt_response(CommandFamily::Status, 3, "status_response", &carry(), worker);
        assert_eq!(3, adapted.request_id);
        assert_eq!("status_response", adapted.kind);
        let data = adapted.data.unwrap();
        assert_eq!(12, data["completedRequests"].as_u64().unwrap());
        assert_eq!(4242, data["daemonPid"].as_u64().unwrap());
        assert_eq!(5000, data["sessionPid"].as_u64().unwrap());
        assert_eq!("/tmp/s/daemon.sock", data["socketPath"].as_str().unwrap());
        assert_eq!(90, data["uptimeSeconds"].as_u64().unwrap());
    }

    #[test]
    fn peek_wraps_the_payload_in_a_preview_envelope() {
        let worker = WireResponse::ok(
            8,
            "worker_peek",
            json!({"requests": [], "hasMoreRequests": false}),
        );
        let adapted = adapt_response(CommandFamily::Peek, 1, "peek_response", &carry(), worker);
        let data = adapted.data.unwrap();
        assert_eq!(false, data["preview"]["hasMoreRequests"].as_bool().unwrap());
        assert_eq!(5000, data["sessionPid"].as_u64().unwrap());
    }

    #[test]
    fn har_renames_entries_to_requests() {
        let worker = WireResponse::ok(2, "worker_har_data", json!({"entries": [{"url": "a"}]}));
        let adapted = adapt_response(CommandFamily::Har, 2, "har_data_response", &carry(), worker);
        assert_eq!(
            json!([{"url": "a"}]),
            adapted.data.unwrap()["requests"]
        );
    }

    #[test]
    fn generic_passes_data_through_re_addressed() {
        let worker = WireResponse::ok(900, "details_response", json!({"url": "https://x"}));
        let adapted =
            adapt_response(CommandFamily::Generic, 4, "details_response", &carry(), worker);
        assert_eq!(4, adapted.request_id);
        assert_eq!(json!({"url": "https://x"}), adapted.data.unwrap());
    }

    #[test]
    fn worker_errors_keep_their_payload() {
        let worker = WireResponse::error(
            900,
            "worker_peek",
            CommandError::out_of_range("id 9 is out of range"),
        );
        let adapted = adapt_response(CommandFamily::Peek, 6, "peek_response", &carry(), worker);
        assert_eq!(ResponseStatus::Error, adapted.status);
        assert_eq!("peek_response", adapted.kind);
        assert_eq!(exit_code::OUT_OF_RANGE, adapted.error.unwrap().exit_code);
    }

    #[test]
    fn exit_synthesis_carries_the_transport_error_in_the_client_kind() {
        let adapted = exit_response(CommandFamily::Status, 11, "status_response", &carry());
        assert_eq!("status_response", adapted.kind);
        let error = adapted.error.unwrap();
        assert_eq!(exit_code::WORKER_EXITED, error.exit_code);
        assert_eq!("Worker process exited before responding", error.message);
    }
}
