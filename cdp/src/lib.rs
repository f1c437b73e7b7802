//! Chrome DevTools Protocol seam.
//!
//! The worker talks to the browser through the [`CdpConnection`] trait plus
//! a plain event receiver, so the telemetry engine and the command registry
//! never see chromiumoxide types. Production code uses [`ChromiumCdp`];
//! tests script the trait directly.

mod chromium;
mod connection;
mod discover;
mod events;

pub use chromium::ChromiumCdp;
pub use connection::CdpConnection;
pub use discover::discover_websocket_url;
pub use events::CdpEvent;
pub use events::ConsoleApiCalled;
pub use events::FrameNavigated;
pub use events::LoadingFailed;
pub use events::LoadingFinished;
pub use events::RequestInfo;
pub use events::RequestWillBeSent;
pub use events::ResponseInfo;
pub use events::ResponseReceived;
pub use events::StackTrace;
pub use events::WebSocketClosed;
pub use events::WebSocketCreated;
pub use events::WebSocketFrameEvent;
pub use events::WebSocketHandshake;
pub use events::header_map;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("CDP error: {0}")]
    Cdp(String),

    #[error("CDP call timed out: {0}")]
    Timeout(String),

    #[error("failed to discover browser endpoint: {0}")]
    Discovery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for CdpError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        CdpError::Cdp(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdpError>;
