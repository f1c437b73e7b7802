//! The closed command set.
//!
//! Every operation a client can ask of the worker is one variant here.
//! There is deliberately no extension point: the broker, the worker
//! registry, and the exit-synthesis path all match exhaustively on this
//! enum, so adding a command is a compile-visible change at every site
//! that must handle it.

use serde::Deserialize;
use serde::Serialize;

/// How the broker reshapes a command's worker response for the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFamily {
    /// Merged with broker-held base status data.
    Status,
    /// Renamed fields wrapped in a `preview` envelope.
    Peek,
    /// `entries` renamed into a `requests` payload.
    Har,
    /// Forwarded unchanged as `<command>_response`.
    Generic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Command {
    Status(StatusParams),
    Peek(PeekParams),
    HarData(HarDataParams),
    Details(DetailsParams),
    Headers(HeadersParams),
    Query(QueryParams),
    NavId(NavIdParams),
    CdpCall(CdpCallParams),
    Shutdown(ShutdownParams),
}

impl Command {
    /// Wire name, also the prefix of the client-facing response kind.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Status(_) => "status",
            Command::Peek(_) => "peek",
            Command::HarData(_) => "har_data",
            Command::Details(_) => "details",
            Command::Headers(_) => "headers",
            Command::Query(_) => "query",
            Command::NavId(_) => "nav_id",
            Command::CdpCall(_) => "cdp_call",
            Command::Shutdown(_) => "shutdown",
        }
    }

    /// Response kind the client expects for this command.
    pub fn response_kind(&self) -> String {
        format!("{}_response", self.name())
    }

    /// Response kind the worker emits. The three transformed families use
    /// internal `worker_*` kinds; everything else already has the client
    /// shape when it leaves the worker.
    pub fn worker_kind(&self) -> String {
        match self.family() {
            CommandFamily::Status => "worker_status".to_string(),
            CommandFamily::Peek => "worker_peek".to_string(),
            CommandFamily::Har => "worker_har_data".to_string(),
            CommandFamily::Generic => self.response_kind(),
        }
    }

    pub fn family(&self) -> CommandFamily {
        match self {
            Command::Status(_) => CommandFamily::Status,
            Command::Peek(_) => CommandFamily::Peek,
            Command::HarData(_) => CommandFamily::Har,
            _ => CommandFamily::Generic,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusParams {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeekParams {
    /// Return at most this many entries per category, newest last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_n: Option<usize>,
    /// Skip this many entries from the tail before taking `last_n`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarDataParams {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsParams {
    /// 0-based index into the completed request list.
    pub id: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeadersParams {
    /// 0-based index into the completed request list; when absent the
    /// worker falls back through its priority chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub selector: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavIdParams {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdpCallParams {
    /// Fully qualified CDP method, e.g. `Runtime.evaluate`.
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownParams {
    /// Capture a final DOM/accessibility snapshot before exiting.
    #[serde(default = "default_capture")]
    pub capture: bool,
}

impl Default for ShutdownParams {
    fn default() -> Self {
        Self {
            capture: default_capture(),
        }
    }
}

fn default_capture() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn commands_serialize_with_snake_case_tags() {
        let command = Command::CdpCall(CdpCallParams {
            method: "Network.enable".to_string(),
            params: json!({}),
        });
        assert_eq!(
            json!({"type": "cdp_call", "params": {"method": "Network.enable", "params": {}}}),
            serde_json::to_value(&command).unwrap()
        );

        let command = Command::NavId(NavIdParams {});
        assert_eq!(
            json!({"type": "nav_id", "params": {}}),
            serde_json::to_value(&command).unwrap()
        );
    }

    #[test]
    fn worker_kinds_differ_only_for_transformed_families() {
        assert_eq!(
            "worker_status",
            Command::Status(StatusParams {}).worker_kind()
        );
        assert_eq!("worker_peek", Command::Peek(PeekParams::default()).worker_kind());
        assert_eq!(
            "worker_har_data",
            Command::HarData(HarDataParams {}).worker_kind()
        );
        assert_eq!(
            "details_response",
            Command::Details(DetailsParams { id: 0 }).worker_kind()
        );
    }

    #[test]
    fn shutdown_defaults_to_capturing() {
        let parsed: ShutdownParams = serde_json::from_value(json!({})).unwrap();
        assert!(parsed.capture);
    }
}
