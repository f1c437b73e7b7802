use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Async call seam over the browser's debugging WebSocket.
///
/// Event delivery is deliberately not part of the trait: the adapter hands
/// out one `mpsc` receiver of [`crate::CdpEvent`] at connect time, and the
/// worker's select loop owns it. Keeping the trait call-only makes scripted
/// fakes in tests a ten-line struct.
#[async_trait]
pub trait CdpConnection: Send + Sync {
    /// Execute an arbitrary CDP method with raw JSON params.
    async fn call(&self, method: &str, params: Value) -> Result<Value>;
}
