//! The worker process: sole owner of the CDP connection and the telemetry
//! engine for one session.
//!
//! Commands arrive as JSON lines on stdin (from the daemon), responses
//! leave as JSON lines on stdout. CDP event ingestion is push-based and
//! fully decoupled from command traffic; collection continues with no
//! client connected.

mod capture;
mod hints;
mod registry;
mod runtime;

pub use hints::UsageHints;
pub use registry::CommandContext;
pub use registry::handle_command;
pub use runtime::WorkerOptions;
pub use runtime::run;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Cdp(#[from] pagetap_cdp::CdpError),

    #[error(transparent)]
    Session(#[from] pagetap_session::SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
