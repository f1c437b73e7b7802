//! The broker: the daemon's only stateful component.
//!
//! Requests from any client connection funnel into one broker, which
//! re-ids them onto the worker hop, remembers who is waiting, and routes
//! each worker reply (or the worker's death) back to exactly one waiter.

use std::collections::HashMap;

use pagetap_protocol::CommandFamily;
use pagetap_protocol::WireRequest;
use pagetap_protocol::WireResponse;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::warn;

use crate::adapt::CarryState;
use crate::adapt::adapt_response;
use crate::adapt::exit_response;

/// Everything the broker loop reacts to.
pub enum BrokerMsg {
    Dispatch {
        request: WireRequest,
        reply: oneshot::Sender<WireResponse>,
    },
    WorkerLine(String),
    WorkerExited,
}

struct Pending {
    client_request_id: u64,
    client_kind: String,
    family: CommandFamily,
    carry: CarryState,
    reply: oneshot::Sender<WireResponse>,
}

pub struct Broker {
    pending: HashMap<u64, Pending>,
    next_worker_id: u64,
    to_worker: mpsc::UnboundedSender<String>,
    worker_alive: bool,
    shutdown_requested: bool,
}

impl Broker {
    pub fn new(to_worker: mpsc::UnboundedSender<String>) -> Self {
        Self {
            pending: HashMap::new(),
            next_worker_id: 1,
            to_worker,
            worker_alive: true,
            shutdown_requested: false,
        }
    }

    /// Forward a client request to the worker under a fresh worker-side id.
    /// If the worker is already gone the reply is synthesized immediately.
    pub fn dispatch(
        &mut self,
        carry: CarryState,
        request: WireRequest,
        reply: oneshot::Sender<WireResponse>,
    ) {
        let family = request.command.family();
        let client_kind = request.command.response_kind();
        let client_request_id = request.request_id;
        if matches!(request.command, pagetap_protocol::Command::Shutdown(_)) {
            self.shutdown_requested = true;
        }

        if !self.worker_alive {
            let _ = reply.send(exit_response(family, client_request_id, &client_kind, &carry));
            return;
        }

        let worker_id = self.next_worker_id;
        self.next_worker_id += 1;
        let worker_request = WireRequest::new(worker_id, request.command);
        let line = match serde_json::to_string(&worker_request) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize request {client_request_id}: {e}");
                return;
            }
        };
        if self.to_worker.send(line).is_err() {
            let _ = reply.send(exit_response(family, client_request_id, &client_kind, &carry));
            return;
        }
        self.pending.insert(
            worker_id,
            Pending {
                client_request_id,
                client_kind,
                family,
                carry,
                reply,
            },
        );
    }

    /// Route one worker stdout line to its waiter. Lines that parse but
    /// match no outstanding id are logged and dropped; a response must
    /// resolve at most one request.
    pub fn handle_worker_line(&mut self, line: &str) {
        let response: WireResponse = match serde_json::from_str(line) {
            Ok(response) => response,
            Err(e) => {
                warn!("dropping malformed worker line: {e}");
                return;
            }
        };
        let Some(pending) = self.pending.remove(&response.request_id) else {
            warn!(
                "worker answered unknown request id {}, discarding",
                response.request_id
            );
            return;
        };
        let adapted = adapt_response(
            pending.family,
            pending.client_request_id,
            &pending.client_kind,
            &pending.carry,
            response,
        );
        // The client may have hung up while waiting.
        let _ = pending.reply.send(adapted);
    }

    /// Fail every outstanding request with a transport error shaped for
    /// its command; later dispatches fail fast the same way.
    pub fn handle_worker_exit(&mut self) {
        self.worker_alive = false;
        for (_, pending) in self.pending.drain() {
            let response = exit_response(
                pending.family,
                pending.client_request_id,
                &pending.client_kind,
                &pending.carry,
            );
            let _ = pending.reply.send(response);
        }
    }

    pub fn worker_alive(&self) -> bool {
        self.worker_alive
    }

    /// True once a `shutdown` command has been forwarded; worker exit then
    /// ends the daemon rather than leaving it up in fail-fast mode.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
