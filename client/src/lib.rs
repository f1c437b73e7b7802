//! CLI-process side of the system: the daemon socket client, the
//! cross-process query cache, and the staleness resolver.

mod cache;
mod daemon_client;
mod memo;
mod resolver;

pub use cache::QueryCache;
pub use cache::QueryCacheEntry;
pub use daemon_client::DaemonClient;
pub use memo::NavigationMemo;
pub use resolver::Resolved;
pub use resolver::SessionOps;
pub use resolver::Validation;
pub use resolver::resolve;
pub use resolver::resolve_with_refresh;
pub use resolver::validate;

use pagetap_protocol::CommandError;
use pagetap_protocol::exit_code;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("daemon unreachable: {0}")]
    DaemonUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Structured user or transport error returned over IPC, or built
    /// locally by the resolver.
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Session(#[from] pagetap_session::SessionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::DaemonUnreachable(_) => exit_code::DAEMON_UNREACHABLE,
            ClientError::Timeout(_) => exit_code::CDP_TIMEOUT,
            ClientError::Protocol(_) => exit_code::PROTOCOL,
            ClientError::Command(e) => e.exit_code,
            ClientError::Session(_) | ClientError::Io(_) => exit_code::PROTOCOL,
        }
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            ClientError::Command(e) => e.suggestion.as_deref(),
            ClientError::DaemonUnreachable(_) => {
                Some("is the session running? try `pagetap start`")
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
