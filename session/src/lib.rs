//! Per-session state on disk: directory layout, PID files, advisory locks,
//! and idempotent cleanup.
//!
//! Every file in a session directory is independently removable; cleanup
//! tolerates any subset being present. Cross-process coordination uses
//! advisory `fs2` locks plus liveness checks on recorded PIDs so a crashed
//! holder never wedges the session.

mod cleanup;
mod lock;
mod meta;
mod paths;
mod pid;

pub use cleanup::cleanup_session;
pub use lock::LockGuard;
pub use lock::acquire_lock;
pub use meta::SessionMeta;
pub use paths::SessionDir;
pub use paths::state_root;
pub use pid::PidFile;
pub use pid::pid_is_alive;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("could not acquire lock on {0} after multiple attempts")]
    LockBusy(String),

    #[error("no home directory available to place session state")]
    NoStateRoot,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed session metadata: {0}")]
    Meta(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
