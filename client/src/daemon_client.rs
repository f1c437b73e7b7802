use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use pagetap_protocol::Command;
use pagetap_protocol::NavIdParams;
use pagetap_protocol::QueryParams;
use pagetap_protocol::WireRequest;
use pagetap_protocol::WireResponse;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::unix::OwnedWriteHalf;
use tracing::debug;

use crate::ClientError;
use crate::QueryCacheEntry;
use crate::Result;
use crate::resolver::SessionOps;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One connection to the session daemon: newline-delimited JSON requests,
/// responses correlated by `requestId`. A CLI invocation issues its
/// requests sequentially, so a simple send-then-read-line loop suffices.
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl DaemonClient {
    pub async fn connect(socket: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket).await.map_err(|e| {
            ClientError::DaemonUnreachable(format!("{}: {e}", socket.display()))
        })?;
        let (read, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read),
            writer,
            next_id: 1,
        })
    }

    /// Send one command and wait for its response.
    pub async fn request(&mut self, command: Command) -> Result<WireResponse> {
        let name = command.name();
        let request = WireRequest::new(self.next_id, command);
        self.next_id += 1;

        let mut line = serde_json::to_string(&request)
            .map_err(|e| ClientError::Protocol(format!("failed to encode request: {e}")))?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.read_response(request.request_id))
            .await
            .map_err(|_| ClientError::Timeout(format!("{name} after {REQUEST_TIMEOUT:?}")))??;
        Ok(response)
    }

    /// Like [`DaemonClient::request`] but converts an error-status response
    /// into [`ClientError::Command`], returning only the `data` payload.
    pub async fn request_ok(&mut self, command: Command) -> Result<serde_json::Value> {
        let response = self.request(command).await?;
        if response.is_ok() {
            return Ok(response.data.unwrap_or(serde_json::Value::Null));
        }
        match response.error {
            Some(error) => Err(ClientError::Command(error)),
            None => Err(ClientError::Protocol(format!(
                "error response without error payload for {}",
                response.kind
            ))),
        }
    }

    async fn read_response(&mut self, request_id: u64) -> Result<WireResponse> {
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await?;
            if read == 0 {
                return Err(ClientError::DaemonUnreachable(
                    "daemon closed the connection".to_string(),
                ));
            }
            let response: WireResponse = serde_json::from_str(line.trim_end())
                .map_err(|e| ClientError::Protocol(format!("malformed response line: {e}")))?;
            if response.request_id == request_id {
                return Ok(response);
            }
            debug!(
                "ignoring response for unrelated request {}",
                response.request_id
            );
        }
    }
}

#[async_trait]
impl SessionOps for DaemonClient {
    async fn current_navigation_id(&mut self) -> Result<u64> {
        let data = self.request_ok(Command::NavId(NavIdParams {})).await?;
        data.get("navigationId")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                ClientError::Protocol("nav_id response missing navigationId".to_string())
            })
    }

    async fn run_query(&mut self, selector: &str) -> Result<QueryCacheEntry> {
        let data = self
            .request_ok(Command::Query(QueryParams {
                selector: selector.to_string(),
            }))
            .await?;
        serde_json::from_value(data)
            .map_err(|e| ClientError::Protocol(format!("malformed query response: {e}")))
    }
}
