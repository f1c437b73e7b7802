use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::CdpError;
use crate::Result;

#[derive(Deserialize)]
struct JsonVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Resolve the browser's debugging WebSocket URL from its HTTP endpoint.
///
/// The generous timeout gives a freshly launched browser time to bring up
/// `/json/version`.
pub async fn discover_websocket_url(host: &str, port: u16) -> Result<String> {
    let url = format!("http://{host}:{port}/json/version");
    debug!("requesting browser version info from {url}");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| CdpError::Discovery(format!("failed to build HTTP client: {e}")))?;

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| CdpError::Discovery(format!("failed to reach debug port: {e}")))?;

    if !resp.status().is_success() {
        return Err(CdpError::Discovery(format!(
            "{url} returned {}",
            resp.status()
        )));
    }

    let body: JsonVersion = resp
        .json()
        .await
        .map_err(|e| CdpError::Discovery(format!("failed to parse version response: {e}")))?;

    Ok(body.web_socket_debugger_url)
}
