//! Client-facing error taxonomy.
//!
//! Errors cross the IPC boundary as structured payloads, never as bare
//! panics: user errors (bad arguments, stale cache, out-of-range index)
//! carry exit codes 2-9, transport and software errors (worker exited,
//! CDP timeout, daemon unreachable) carry 10-19 so scripts can tell the
//! two apart.

use serde::Deserialize;
use serde::Serialize;

pub mod exit_code {
    /// Invalid arguments or parameters.
    pub const INVALID_ARGUMENT: i32 = 2;
    /// A requested resource does not exist.
    pub const NOT_FOUND: i32 = 3;
    /// An index fell outside the valid range.
    pub const OUT_OF_RANGE: i32 = 4;
    /// The query cache exists but belongs to an earlier navigation.
    pub const STALE_CACHE: i32 = 5;
    /// No query cache has been written for this session yet.
    pub const NO_CACHE: i32 = 6;

    /// The daemon socket could not be reached.
    pub const DAEMON_UNREACHABLE: i32 = 10;
    /// The worker exited before answering.
    pub const WORKER_EXITED: i32 = 11;
    /// A CDP call did not answer within its timeout.
    pub const CDP_TIMEOUT: i32 = 12;
    /// A malformed frame or other protocol-level failure.
    pub const PROTOCOL: i32 = 13;
}

/// Fixed message attached to every response synthesized when the worker
/// dies with requests still outstanding.
pub const WORKER_EXIT_MESSAGE: &str = "Worker process exited before responding";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct CommandError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub exit_code: i32,
}

impl CommandError {
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            exit_code,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(message, exit_code::INVALID_ARGUMENT)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, exit_code::NOT_FOUND)
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(message, exit_code::OUT_OF_RANGE)
    }

    pub fn worker_exited() -> Self {
        Self::new(WORKER_EXIT_MESSAGE, exit_code::WORKER_EXITED)
    }

    /// True for the transport/software range, as opposed to user errors.
    pub fn is_transport(&self) -> bool {
        self.exit_code >= exit_code::DAEMON_UNREACHABLE
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn serializes_without_empty_suggestion() {
        let error = CommandError::out_of_range("id 7 out of range");
        assert_eq!(
            json!({"message": "id 7 out of range", "exitCode": 4}),
            serde_json::to_value(&error).unwrap()
        );
    }

    #[test]
    fn transport_range_starts_at_ten() {
        assert!(!CommandError::invalid_argument("bad").is_transport());
        assert!(CommandError::worker_exited().is_transport());
    }
}
