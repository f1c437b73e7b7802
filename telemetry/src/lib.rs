//! Bounded, stateful telemetry collection over CDP events.
//!
//! The engine is a plain state machine: the worker's select loop feeds it
//! [`pagetap_cdp::CdpEvent`]s and body-fetch completions, and reads back
//! hard-capped completed lists. Nothing in here does IO or holds a lock;
//! single ownership by the event-handling task is the concurrency model.

mod config;
mod engine;
mod har;
mod page;
mod policy;

pub use config::BodyFetchConfig;
pub use config::TelemetryConfig;
pub use engine::BodyFetch;
pub use engine::DropCounters;
pub use engine::EngineStatus;
pub use engine::FetchedBody;
pub use engine::TelemetryEngine;
pub use har::Har;
pub use har::build_har;
pub use page::DEFAULT_LAST_N;
pub use page::Window;
pub use page::window;
pub use policy::BODY_PENDING;
pub use policy::SkipReason;
pub use policy::decide_body_fetch;
pub use policy::failure_placeholder;
pub use policy::skip_placeholder;

/// Wall clock in milliseconds since the Unix epoch. Injectable so sweep
/// and TTL behavior is deterministic in tests.
pub type Clock = Box<dyn Fn() -> f64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Box::new(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    })
}
