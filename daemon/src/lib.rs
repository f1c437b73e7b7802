//! The session daemon: accepts short-lived client connections on a Unix
//! socket and brokers their requests to the one long-lived worker process.
//!
//! The broker is the only piece holding cross-request state: a map of
//! outstanding worker-side request ids to the client connections waiting on
//! them. Worker death is a first-class event: every outstanding request is
//! answered with a transport error in its command's response shape. After a
//! requested `shutdown` the daemon follows the worker down; after an
//! unexpected exit it stays up and fails later dispatches fast.

mod adapt;
mod broker;
mod server;
mod worker_proc;

pub use adapt::CarryState;
pub use adapt::adapt_response;
pub use broker::Broker;
pub use broker::BrokerMsg;
pub use server::DaemonOptions;
pub use server::run;
pub use worker_proc::WorkerHandle;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Session(#[from] pagetap_session::SessionError),

    #[error("failed to spawn worker: {0}")]
    WorkerSpawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
