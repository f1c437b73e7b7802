//! Wire types shared by the client, daemon, and worker processes.
//!
//! The protocol is deliberately closed: three roles, one envelope, and a
//! fixed command set. Everything that crosses a process boundary lives in
//! this crate so the three binaries cannot drift apart.

mod command;
mod error;
mod records;
mod wire;

pub use command::CdpCallParams;
pub use command::Command;
pub use command::CommandFamily;
pub use command::DetailsParams;
pub use command::HarDataParams;
pub use command::HeadersParams;
pub use command::NavIdParams;
pub use command::PeekParams;
pub use command::QueryParams;
pub use command::ShutdownParams;
pub use command::StatusParams;
pub use error::CommandError;
pub use error::WORKER_EXIT_MESSAGE;
pub use error::exit_code;
pub use records::ConsoleMessageRecord;
pub use records::FrameDirection;
pub use records::NetworkRequestRecord;
pub use records::QueryNode;
pub use records::ResourceTiming;
pub use records::WebSocketConnectionRecord;
pub use records::WebSocketFrame;
pub use wire::ResponseStatus;
pub use wire::WireRequest;
pub use wire::WireResponse;
