//! chromiumoxide-backed implementation of the CDP seam.
//!
//! Connects over an explicit WebSocket URL, drains the handler stream in a
//! background task, attaches to the first page target, and forwards the
//! typed chromiumoxide events the telemetry engine consumes through one
//! `mpsc` channel as [`CdpEvent`]s.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Browser;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network as cdp_network;
use chromiumoxide::cdp::browser_protocol::page as cdp_page;
use chromiumoxide::cdp::js_protocol::runtime as cdp_runtime;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use crate::CdpConnection;
use crate::CdpError;
use crate::CdpEvent;
use crate::Result;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ChromiumCdp {
    page: Arc<Page>,
    // Keeps the connection alive; dropping the browser closes the socket.
    _browser: Browser,
}

impl ChromiumCdp {
    /// Connect to a running browser and return the call handle plus the
    /// event receiver for the worker's select loop.
    pub async fn connect(ws_url: &str) -> Result<(Self, mpsc::UnboundedReceiver<CdpEvent>)> {
        let ws = ws_url.to_string();
        let connect = tokio::spawn(async move { Browser::connect(ws).await });
        let (browser, mut handler) = match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(Ok(pair))) => pair,
            Ok(Ok(Err(e))) => return Err(CdpError::Cdp(format!("WebSocket connect failed: {e}"))),
            Ok(Err(join)) => return Err(CdpError::Cdp(format!("connect task failed: {join}"))),
            Err(_) => {
                return Err(CdpError::Timeout(format!(
                    "connecting to {ws_url} took longer than {CONNECT_TIMEOUT:?}"
                )));
            }
        };

        // The handler stream must be polled for the connection to make
        // progress at all.
        tokio::spawn(async move { while let Some(_event) = handler.next().await {} });

        let page = match browser.pages().await?.into_iter().next() {
            Some(page) => page,
            None => browser.new_page("about:blank").await?,
        };
        let page = Arc::new(page);

        page.execute(cdp_network::EnableParams::default()).await?;
        page.execute(cdp_runtime::EnableParams::default()).await?;
        page.execute(cdp_page::EnableParams::default()).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_event_forwarders(&page, &tx);

        debug!("connected to browser page target");
        Ok((
            Self {
                page,
                _browser: browser,
            },
            rx,
        ))
    }
}

/// One forwarding task per event type: chromiumoxide's generated structs
/// serialize back to their wire shape, so re-parsing through
/// [`CdpEvent::parse`] keeps the adapter and the test fixtures on the same
/// code path.
macro_rules! forward_events {
    ($page:expr, $tx:expr, $( $event:ty ),+ $(,)?) => {
        $(
            {
                let page = Arc::clone($page);
                let tx = $tx.clone();
                tokio::spawn(async move {
                    let mut stream = match page.event_listener::<$event>().await {
                        Ok(stream) => stream,
                        Err(e) => {
                            warn!("failed to subscribe to {}: {e}", stringify!($event));
                            return;
                        }
                    };
                    while let Some(event) = stream.next().await {
                        let method =
                            <$event as chromiumoxide_types::MethodType>::method_id();
                        let Ok(params) = serde_json::to_value(event.as_ref()) else {
                            continue;
                        };
                        let Some(parsed) = CdpEvent::parse(method.as_ref(), &params) else {
                            continue;
                        };
                        if tx.send(parsed).is_err() {
                            break;
                        }
                    }
                });
            }
        )+
    };
}

fn spawn_event_forwarders(page: &Arc<Page>, tx: &mpsc::UnboundedSender<CdpEvent>) {
    forward_events!(
        page,
        tx,
        cdp_network::EventRequestWillBeSent,
        cdp_network::EventResponseReceived,
        cdp_network::EventLoadingFinished,
        cdp_network::EventLoadingFailed,
        cdp_network::EventWebSocketCreated,
        cdp_network::EventWebSocketHandshakeResponseReceived,
        cdp_network::EventWebSocketFrameSent,
        cdp_network::EventWebSocketFrameReceived,
        cdp_network::EventWebSocketClosed,
        cdp_runtime::EventConsoleApiCalled,
        cdp_page::EventFrameNavigated,
    );
}

// Raw command wrapper so arbitrary methods can be executed with JSON
// params; chromiumoxide's typed commands only cover what its codegen knows.
#[derive(Debug, Clone)]
struct RawCdpCommand {
    method: String,
    params: Value,
}

impl serde::Serialize for RawCdpCommand {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.params.serialize(serializer)
    }
}

impl chromiumoxide_types::Method for RawCdpCommand {
    fn identifier(&self) -> chromiumoxide_types::MethodId {
        self.method.clone().into()
    }
}

impl chromiumoxide_types::Command for RawCdpCommand {
    type Response = Value;
}

#[async_trait]
impl CdpConnection for ChromiumCdp {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let cmd = RawCdpCommand {
            method: method.to_string(),
            params,
        };
        let resp = self.page.execute(cmd).await?;
        Ok(resp.result)
    }
}
