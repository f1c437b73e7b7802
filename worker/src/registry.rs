//! The command registry: every command name maps to a typed handler over
//! the telemetry engine or a CDP passthrough.
//!
//! Handlers receive an explicit [`CommandContext`] instead of reaching for
//! globals, so tests inject a scripted CDP connection and a manual clock.

use std::sync::Arc;
use std::time::Duration;

use pagetap_cdp::CdpConnection;
use pagetap_protocol::Command;
use pagetap_protocol::CommandError;
use pagetap_protocol::DetailsParams;
use pagetap_protocol::HeadersParams;
use pagetap_protocol::NetworkRequestRecord;
use pagetap_protocol::PeekParams;
use pagetap_protocol::QueryNode;
use pagetap_protocol::QueryParams;
use pagetap_protocol::WireRequest;
use pagetap_protocol::WireResponse;
use pagetap_protocol::exit_code;
use pagetap_telemetry::TelemetryEngine;
use pagetap_telemetry::window;
use serde_json::Value;
use serde_json::json;

use crate::UsageHints;

const CDP_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Query results are capped; a selector matching half the DOM should not
/// produce a megabyte of node previews.
const MAX_QUERY_NODES: usize = 100;

pub struct CommandContext<'a> {
    pub engine: &'a mut TelemetryEngine,
    pub cdp: &'a Arc<dyn CdpConnection>,
    pub hints: &'a mut UsageHints,
}

/// Dispatch one request to its handler. `shutdown` is intercepted by the
/// runtime before reaching here; everything else resolves to a response
/// carrying the worker-side kind for its family.
pub async fn handle_command(ctx: CommandContext<'_>, request: &WireRequest) -> WireResponse {
    let id = request.request_id;
    let kind = request.command.worker_kind();
    let result = match &request.command {
        Command::Status(_) => Ok(status_payload(ctx.engine)),
        Command::Peek(params) => Ok(peek_payload(ctx.engine, params)),
        Command::HarData(_) => Ok(json!({"entries": ctx.engine.completed()})),
        Command::Details(params) => details(ctx.engine, params),
        Command::Headers(params) => headers(ctx.engine, params),
        Command::Query(params) => query(ctx.engine, ctx.cdp, params).await,
        Command::NavId(_) => Ok(json!({"navigationId": ctx.engine.navigation_id()})),
        Command::CdpCall(params) => {
            cdp_call(ctx.cdp, ctx.hints, &params.method, params.params.clone()).await
        }
        Command::Shutdown(_) => Err(CommandError::invalid_argument(
            "shutdown is handled by the worker runtime",
        )),
    };
    match result {
        Ok(data) => WireResponse::ok(id, kind, data),
        Err(error) => WireResponse::error(id, kind, error),
    }
}

fn status_payload(engine: &TelemetryEngine) -> Value {
    let mut data = serde_json::to_value(engine.status()).unwrap_or_else(|_| json!({}));
    if let Some(object) = data.as_object_mut() {
        object.insert("workerPid".to_string(), json!(std::process::id()));
    }
    data
}

fn peek_payload(engine: &TelemetryEngine, params: &PeekParams) -> Value {
    let requests = engine.completed();
    let console = engine.console_messages();
    let websockets = engine.websockets();

    let request_window = window(requests.len(), params.last_n, params.offset);
    let console_window = window(console.len(), params.last_n, params.offset);
    let websocket_window = window(websockets.len(), params.last_n, params.offset);

    json!({
        "requests": &requests[request_window.start..request_window.end],
        "consoleMessages": &console[console_window.start..console_window.end],
        "webSockets": &websockets[websocket_window.start..websocket_window.end],
        "hasMoreRequests": request_window.has_more(),
        "hasMoreConsole": console_window.has_more(),
        "hasMoreWebSockets": websocket_window.has_more(),
    })
}

fn lookup_completed<'a>(
    engine: &'a TelemetryEngine,
    id: usize,
) -> Result<&'a NetworkRequestRecord, CommandError> {
    let completed = engine.completed();
    if completed.is_empty() {
        return Err(CommandError::not_found("no completed requests captured yet")
            .with_suggestion("load a page first, then try `pagetap peek`"));
    }
    completed.get(id).ok_or_else(|| {
        CommandError::out_of_range(format!(
            "id {id} is out of range; valid range is 0-{}",
            completed.len() - 1
        ))
    })
}

fn details(engine: &TelemetryEngine, params: &DetailsParams) -> Result<Value, CommandError> {
    let record = lookup_completed(engine, params.id)?;
    serde_json::to_value(record)
        .map_err(|e| CommandError::new(format!("failed to encode record: {e}"), exit_code::PROTOCOL))
}

/// Response headers for an explicit id, or via the fallback priority
/// chain: current-navigation document request, then any HTML response,
/// then any response carrying headers at all.
fn headers(engine: &TelemetryEngine, params: &HeadersParams) -> Result<Value, CommandError> {
    let record = match params.id {
        Some(id) => lookup_completed(engine, id)?,
        None => headers_fallback(engine).ok_or_else(|| {
            CommandError::not_found("no captured response carries headers")
                .with_suggestion("navigate somewhere first, or pass an explicit id")
        })?,
    };
    Ok(json!({
        "requestId": record.request_id,
        "url": record.url,
        "status": record.status,
        "requestHeaders": record.request_headers,
        "responseHeaders": record.response_headers,
    }))
}

fn headers_fallback(engine: &TelemetryEngine) -> Option<&NetworkRequestRecord> {
    let completed = engine.completed();
    let navigation_id = engine.navigation_id();
    completed
        .iter()
        .rev()
        .find(|r| {
            r.navigation_id == navigation_id && r.resource_type.as_deref() == Some("Document")
        })
        .or_else(|| {
            completed.iter().rev().find(|r| {
                r.mime_type
                    .as_deref()
                    .is_some_and(|mime| mime.contains("html"))
            })
        })
        .or_else(|| completed.iter().rev().find(|r| !r.response_headers.is_empty()))
}

/// Run a CSS selector through CDP's DOM domain and describe each match.
async fn query(
    engine: &TelemetryEngine,
    cdp: &Arc<dyn CdpConnection>,
    params: &QueryParams,
) -> Result<Value, CommandError> {
    let document = call(cdp, "DOM.getDocument", json!({"depth": 0})).await?;
    let root_id = document
        .pointer("/root/nodeId")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            CommandError::new("DOM.getDocument returned no root node", exit_code::PROTOCOL)
        })?;

    let matches = call(
        cdp,
        "DOM.querySelectorAll",
        json!({"nodeId": root_id, "selector": params.selector}),
    )
    .await
    .map_err(|e| CommandError::invalid_argument(format!("query failed: {}", e.message)))?;
    let node_ids: Vec<i64> = matches
        .get("nodeIds")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    let mut nodes = Vec::with_capacity(node_ids.len().min(MAX_QUERY_NODES));
    for (position, node_id) in node_ids.iter().take(MAX_QUERY_NODES).enumerate() {
        nodes.push(describe_node(cdp, *node_id, position as u32 + 1).await);
    }

    Ok(json!({
        "selector": params.selector,
        "nodes": nodes,
        "navigationId": engine.navigation_id(),
        "totalMatches": node_ids.len(),
    }))
}

async fn describe_node(cdp: &Arc<dyn CdpConnection>, node_id: i64, index: u32) -> QueryNode {
    let mut node = QueryNode {
        index,
        node_id,
        tag: None,
        classes: None,
        preview: None,
    };
    let Ok(described) = call(cdp, "DOM.describeNode", json!({"nodeId": node_id})).await else {
        return node;
    };
    let tag = described
        .pointer("/node/nodeName")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase);
    let classes = described
        .pointer("/node/attributes")
        .and_then(Value::as_array)
        .and_then(|attributes| {
            attributes
                .chunks(2)
                .find(|pair| pair.first().and_then(Value::as_str) == Some("class"))
                .and_then(|pair| pair.get(1))
                .and_then(Value::as_str)
                .map(str::to_string)
        });
    node.preview = tag.as_ref().map(|tag| match &classes {
        Some(classes) => format!("<{tag} class=\"{classes}\">"),
        None => format!("<{tag}>"),
    });
    node.tag = tag;
    node.classes = classes;
    node
}

async fn cdp_call(
    cdp: &Arc<dyn CdpConnection>,
    hints: &mut UsageHints,
    method: &str,
    params: Value,
) -> Result<Value, CommandError> {
    let result = call(cdp, method, params).await?;
    let mut data = json!({"result": result});
    if let Some(hint) = hints.observe(method)
        && let Some(object) = data.as_object_mut()
    {
        object.insert("hint".to_string(), json!(hint));
    }
    Ok(data)
}

async fn call(
    cdp: &Arc<dyn CdpConnection>,
    method: &str,
    params: Value,
) -> Result<Value, CommandError> {
    match tokio::time::timeout(CDP_CALL_TIMEOUT, cdp.call(method, params)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CommandError::invalid_argument(format!(
            "CDP {method} failed: {e}"
        ))),
        Err(_) => Err(CommandError::new(
            format!("CDP {method} did not answer within {CDP_CALL_TIMEOUT:?}"),
            exit_code::CDP_TIMEOUT,
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use pagetap_cdp::CdpEvent;
    use pagetap_protocol::CdpCallParams;
    use pagetap_protocol::ResponseStatus;
    use pagetap_telemetry::TelemetryConfig;
    use pretty_assertions::assert_eq;

    use super::*;

    /// Scripted CDP connection: canned responses by method name.
    struct FakeCdp {
        responses: std::collections::HashMap<String, Value>,
    }

    #[async_trait]
    impl CdpConnection for FakeCdp {
        async fn call(&self, method: &str, _params: Value) -> pagetap_cdp::Result<Value> {
            self.responses
                .get(method)
                .cloned()
                .ok_or_else(|| pagetap_cdp::CdpError::Cdp(format!("unexpected method {method}")))
        }
    }

    fn fake_cdp(responses: &[(&str, Value)]) -> Arc<dyn CdpConnection> {
        Arc::new(FakeCdp {
            responses: responses
                .iter()
                .map(|(method, value)| (method.to_string(), value.clone()))
                .collect(),
        })
    }

    fn engine_with_requests(count: usize) -> TelemetryEngine {
        let mut engine = TelemetryEngine::new(TelemetryConfig::default(), Box::new(|| 0.0));
        for i in 0..count {
            feed_request(&mut engine, &format!("r{i}"), "application/json", "XHR");
        }
        engine
    }

    fn feed_request(engine: &mut TelemetryEngine, id: &str, mime: &str, resource_type: &str) {
        let send = serde_json::json!({
            "requestId": id,
            "request": {"url": format!("https://example.com/{id}"), "method": "GET",
                        "headers": {"accept": "*/*"}},
            "type": resource_type,
            "timestamp": 1.0,
            "wallTime": 1700000000.0,
        });
        let response = serde_json::json!({
            "requestId": id,
            "response": {"status": 200, "statusText": "OK", "mimeType": mime,
                         "headers": {"content-type": mime}},
            "timestamp": 1.2,
        });
        let finished = serde_json::json!({
            "requestId": id, "timestamp": 1.4, "encodedDataLength": 64.0,
        });
        for (method, params) in [
            ("Network.requestWillBeSent", send),
            ("Network.responseReceived", response),
            ("Network.loadingFinished", finished),
        ] {
            engine.handle_event(CdpEvent::parse(method, &params).unwrap());
        }
    }

    async fn run(
        engine: &mut TelemetryEngine,
        cdp: &Arc<dyn CdpConnection>,
        command: Command,
    ) -> WireResponse {
        let mut hints = UsageHints::new();
        let ctx = CommandContext {
            engine,
            cdp,
            hints: &mut hints,
        };
        handle_command(ctx, &WireRequest::new(1, command)).await
    }

    #[tokio::test]
    async fn details_out_of_range_names_the_valid_range() {
        let mut engine = engine_with_requests(3);
        let cdp = fake_cdp(&[]);
        let response = run(&mut engine, &cdp, Command::Details(DetailsParams { id: 9 })).await;
        assert_eq!(ResponseStatus::Error, response.status);
        let error = response.error.unwrap();
        assert_eq!(exit_code::OUT_OF_RANGE, error.exit_code);
        assert!(error.message.contains("0-2"), "message: {}", error.message);
    }

    #[tokio::test]
    async fn details_returns_the_full_record() {
        let mut engine = engine_with_requests(2);
        let cdp = fake_cdp(&[]);
        let response = run(&mut engine, &cdp, Command::Details(DetailsParams { id: 1 })).await;
        assert!(response.is_ok());
        let data = response.data.unwrap();
        assert_eq!("r1", data["requestId"].as_str().unwrap());
        assert_eq!("details_response", response.kind);
    }

    #[tokio::test]
    async fn peek_windows_the_tail_and_reports_has_more() {
        let mut engine = engine_with_requests(30);
        let cdp = fake_cdp(&[]);
        let response = run(
            &mut engine,
            &cdp,
            Command::Peek(PeekParams {
                last_n: Some(10),
                offset: None,
            }),
        )
        .await;
        let data = response.data.unwrap();
        assert_eq!(10, data["requests"].as_array().unwrap().len());
        assert_eq!(true, data["hasMoreRequests"].as_bool().unwrap());
        assert_eq!(false, data["hasMoreConsole"].as_bool().unwrap());
        assert_eq!("worker_peek", response.kind);
        // Window is the tail: last entry is the newest.
        assert_eq!(
            "r29",
            data["requests"].as_array().unwrap()[9]["requestId"]
                .as_str()
                .unwrap()
        );
    }

    #[tokio::test]
    async fn headers_fallback_prefers_the_current_navigation_document() {
        let mut engine = TelemetryEngine::new(TelemetryConfig::default(), Box::new(|| 0.0));
        feed_request(&mut engine, "doc", "text/html", "Document");
        feed_request(&mut engine, "xhr", "application/json", "XHR");
        let cdp = fake_cdp(&[]);

        let response = run(
            &mut engine,
            &cdp,
            Command::Headers(HeadersParams { id: None }),
        )
        .await;
        let data = response.data.unwrap();
        assert_eq!("doc", data["requestId"].as_str().unwrap());
    }

    #[tokio::test]
    async fn headers_fallback_reaches_html_then_any_headers() {
        let mut engine = TelemetryEngine::new(TelemetryConfig::default(), Box::new(|| 0.0));
        // Document was captured under navigation 1; bump navigation so the
        // first chain link misses.
        feed_request(&mut engine, "page", "text/html", "XHR");
        engine.handle_event(
            CdpEvent::parse(
                "Page.frameNavigated",
                &serde_json::json!({"frame": {"id": "A", "url": "https://example.com/next"}}),
            )
            .unwrap(),
        );
        let cdp = fake_cdp(&[]);
        let response = run(
            &mut engine,
            &cdp,
            Command::Headers(HeadersParams { id: None }),
        )
        .await;
        assert_eq!("page", response.data.unwrap()["requestId"].as_str().unwrap());
    }

    #[tokio::test]
    async fn headers_fallback_exhausted_is_not_found() {
        let mut engine = TelemetryEngine::new(TelemetryConfig::default(), Box::new(|| 0.0));
        let cdp = fake_cdp(&[]);
        let response = run(
            &mut engine,
            &cdp,
            Command::Headers(HeadersParams { id: None }),
        )
        .await;
        assert_eq!(ResponseStatus::Error, response.status);
        assert_eq!(exit_code::NOT_FOUND, response.error.unwrap().exit_code);
    }

    #[tokio::test]
    async fn query_builds_nodes_and_tags_the_navigation() {
        let mut engine = TelemetryEngine::new(TelemetryConfig::default(), Box::new(|| 0.0));
        let cdp = fake_cdp(&[
            ("DOM.getDocument", serde_json::json!({"root": {"nodeId": 1}})),
            (
                "DOM.querySelectorAll",
                serde_json::json!({"nodeIds": [11, 12]}),
            ),
            (
                "DOM.describeNode",
                serde_json::json!({"node": {
                    "nodeName": "DIV",
                    "attributes": ["class", "item active", "id", "first"],
                }}),
            ),
        ]);
        let response = run(
            &mut engine,
            &cdp,
            Command::Query(QueryParams {
                selector: "div.item".to_string(),
            }),
        )
        .await;
        let data = response.data.unwrap();
        assert_eq!("div.item", data["selector"].as_str().unwrap());
        assert_eq!(1, data["navigationId"].as_u64().unwrap());
        let nodes = data["nodes"].as_array().unwrap();
        assert_eq!(2, nodes.len());
        assert_eq!(1, nodes[0]["index"].as_u64().unwrap());
        assert_eq!(11, nodes[0]["nodeId"].as_i64().unwrap());
        assert_eq!("div", nodes[0]["tag"].as_str().unwrap());
        assert_eq!("item active", nodes[0]["classes"].as_str().unwrap());
        assert_eq!(
            "<div class=\"item active\">",
            nodes[0]["preview"].as_str().unwrap()
        );
    }

    #[tokio::test]
    async fn cdp_call_attaches_hints_after_the_threshold() {
        let mut engine = TelemetryEngine::new(TelemetryConfig::default(), Box::new(|| 0.0));
        let cdp = fake_cdp(&[("Network.getResponseBody", serde_json::json!({"body": ""}))]);
        let mut hints = UsageHints::new();
        let command = Command::CdpCall(CdpCallParams {
            method: "Network.getResponseBody".to_string(),
            params: serde_json::json!({"requestId": "r1"}),
        });

        let mut hinted = Vec::new();
        for i in 0..4 {
            let ctx = CommandContext {
                engine: &mut engine,
                cdp: &cdp,
                hints: &mut hints,
            };
            let response = handle_command(ctx, &WireRequest::new(i, command.clone())).await;
            hinted.push(response.data.unwrap().get("hint").is_some());
        }
        assert_eq!(vec![false, false, true, true], hinted);
    }

    #[tokio::test]
    async fn nav_id_reports_the_engine_counter() {
        let mut engine = TelemetryEngine::new(TelemetryConfig::default(), Box::new(|| 0.0));
        let cdp = fake_cdp(&[]);
        let response = run(&mut engine, &cdp, Command::NavId(Default::default())).await;
        assert_eq!(
            1,
            response.data.unwrap()["navigationId"].as_u64().unwrap()
        );
    }

    #[tokio::test]
    async fn status_uses_the_worker_kind() {
        let mut engine = engine_with_requests(1);
        let cdp = fake_cdp(&[]);
        let response = run(&mut engine, &cdp, Command::Status(Default::default())).await;
        assert_eq!("worker_status", response.kind);
        let data = response.data.unwrap();
        assert_eq!(1, data["completedRequests"].as_u64().unwrap());
        assert!(data["workerPid"].as_u64().is_some());
    }
}
