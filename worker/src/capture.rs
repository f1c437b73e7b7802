//! Final page snapshot taken during shutdown.

use std::sync::Arc;
use std::time::Duration;

use pagetap_cdp::CdpConnection;
use serde_json::Value;
use serde_json::json;
use tracing::warn;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Capture the full DOM tree and the accessibility tree. Each side is
/// independently best-effort: a timeout or CDP error leaves that field
/// null rather than failing the shutdown.
pub async fn final_capture(cdp: &Arc<dyn CdpConnection>) -> Value {
    let dom = capture_call(cdp, "DOM.getDocument", json!({"depth": -1, "pierce": true})).await;
    let accessibility = capture_call(cdp, "Accessibility.getFullAXTree", json!({})).await;
    json!({
        "dom": dom,
        "accessibility": accessibility,
    })
}

async fn capture_call(cdp: &Arc<dyn CdpConnection>, method: &str, params: Value) -> Value {
    match tokio::time::timeout(CAPTURE_TIMEOUT, cdp.call(method, params)).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("final capture: {method} failed: {e}");
            Value::Null
        }
        Err(_) => {
            warn!("final capture: {method} timed out");
            Value::Null
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;

    struct HalfBrokenCdp;

    #[async_trait]
    impl CdpConnection for HalfBrokenCdp {
        async fn call(&self, method: &str, _params: Value) -> pagetap_cdp::Result<Value> {
            if method == "DOM.getDocument" {
                Ok(json!({"root": {"nodeId": 1}}))
            } else {
                Err(pagetap_cdp::CdpError::Cdp("domain not enabled".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn capture_keeps_going_past_a_failing_domain() {
        let cdp: Arc<dyn CdpConnection> = Arc::new(HalfBrokenCdp);
        let snapshot = final_capture(&cdp).await;
        assert_eq!(1, snapshot["dom"]["root"]["nodeId"].as_i64().unwrap());
        assert_eq!(Value::Null, snapshot["accessibility"]);
    }
}
