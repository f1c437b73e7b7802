//! Worker event loop.
//!
//! One `select!` over four sources: command lines on stdin, CDP events,
//! completed body fetches, and the stale-entry sweep tick. Body fetches run
//! in spawned tasks so a slow `Network.getResponseBody` never stalls event
//! ingestion; their results funnel back through a channel and are applied
//! between other work.

use std::sync::Arc;
use std::time::Duration;

use pagetap_cdp::CdpConnection;
use pagetap_cdp::ChromiumCdp;
use pagetap_protocol::Command;
use pagetap_protocol::WireRequest;
use pagetap_protocol::WireResponse;
use pagetap_session::PidFile;
use pagetap_session::SessionDir;
use pagetap_telemetry::FetchedBody;
use pagetap_telemetry::TelemetryConfig;
use pagetap_telemetry::TelemetryEngine;
use pagetap_telemetry::system_clock;
use serde_json::Value;
use serde_json::json;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::CommandContext;
use crate::Result;
use crate::UsageHints;
use crate::capture::final_capture;
use crate::registry::handle_command;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const BODY_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WorkerOptions {
    pub session: SessionDir,
    pub ws_url: String,
    pub telemetry: TelemetryConfig,
}

type BodyOutcome = (String, std::result::Result<FetchedBody, String>);

pub async fn run(options: WorkerOptions) -> Result<()> {
    let pid_file = PidFile::new(options.session.session_pid_file());
    pid_file.write_current()?;

    let (cdp, mut events) = ChromiumCdp::connect(&options.ws_url).await?;
    let cdp: Arc<dyn CdpConnection> = Arc::new(cdp);
    info!("worker attached to {}", options.ws_url);

    let mut engine = TelemetryEngine::new(options.telemetry, system_clock());
    let mut hints = UsageHints::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let (body_tx, mut body_rx) = mpsc::unbounded_channel::<BodyOutcome>();
    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        let request: WireRequest = match serde_json::from_str(&line) {
                            Ok(request) => request,
                            Err(e) => {
                                warn!("dropping malformed request line: {e}");
                                continue;
                            }
                        };
                        if let Command::Shutdown(params) = &request.command {
                            let capture = if params.capture {
                                final_capture(&cdp).await
                            } else {
                                Value::Null
                            };
                            shutdown(&options.session, &mut engine, capture, &request, &mut stdout)
                                .await?;
                            break;
                        }
                        let ctx = CommandContext {
                            engine: &mut engine,
                            cdp: &cdp,
                            hints: &mut hints,
                        };
                        let response = handle_command(ctx, &request).await;
                        write_response(&mut stdout, &response).await?;
                    }
                    None => {
                        // The daemon closed our stdin; persist what we have
                        // and leave without a snapshot.
                        info!("stdin closed, shutting down");
                        engine.flush_open_websockets();
                        write_output(&options.session, &engine, Value::Null)?;
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if let Some(fetch) = engine.handle_event(event) {
                            spawn_body_fetch(&cdp, fetch.request_id, body_tx.clone());
                        }
                    }
                    None => {
                        warn!("browser connection lost, shutting down");
                        engine.flush_open_websockets();
                        write_output(&options.session, &engine, Value::Null)?;
                        break;
                    }
                }
            }
            Some((request_id, outcome)) = body_rx.recv() => {
                engine.apply_body(&request_id, outcome);
            }
            _ = sweep.tick() => {
                let removed = engine.sweep_stale();
                if removed > 0 {
                    debug!("swept {removed} stale in-flight requests");
                }
            }
        }
    }

    pid_file.remove();
    Ok(())
}

fn spawn_body_fetch(
    cdp: &Arc<dyn CdpConnection>,
    request_id: String,
    tx: mpsc::UnboundedSender<BodyOutcome>,
) {
    let cdp = Arc::clone(cdp);
    tokio::spawn(async move {
        let params = json!({"requestId": request_id});
        let call = cdp.call("Network.getResponseBody", params);
        let outcome = match tokio::time::timeout(BODY_FETCH_TIMEOUT, call).await {
            Ok(Ok(value)) => Ok(FetchedBody {
                body: value
                    .get("body")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                base64_encoded: value
                    .get("base64Encoded")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("body fetch timed out".to_string()),
        };
        // The loop may have exited; a dead receiver just drops the result.
        let _ = tx.send((request_id, outcome));
    });
}

async fn shutdown(
    session: &SessionDir,
    engine: &mut TelemetryEngine,
    capture: Value,
    request: &WireRequest,
    stdout: &mut tokio::io::Stdout,
) -> Result<()> {
    engine.flush_open_websockets();
    write_output(session, engine, capture)?;
    let response = WireResponse::ok(
        request.request_id,
        request.command.worker_kind(),
        json!({"outputFile": session.output_file().display().to_string()}),
    );
    write_response(stdout, &response).await?;
    info!("worker shut down cleanly");
    Ok(())
}

/// Persist the session's full take to `output.json`: every completed
/// request, console message, and WebSocket record, plus the final snapshot
/// when one was captured.
fn write_output(session: &SessionDir, engine: &TelemetryEngine, capture: Value) -> Result<()> {
    let document = output_document(engine, capture);
    let rendered = serde_json::to_string_pretty(&document)?;
    std::fs::write(session.output_file(), rendered)?;
    Ok(())
}

fn output_document(engine: &TelemetryEngine, capture: Value) -> Value {
    json!({
        "status": engine.status(),
        "requests": engine.completed(),
        "consoleMessages": engine.console_messages(),
        "webSockets": engine.websockets(),
        "finalCapture": capture,
    })
}

async fn write_response(stdout: &mut tokio::io::Stdout, response: &WireResponse) -> Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn output_document_carries_the_snapshot_and_the_take() {
        let engine = TelemetryEngine::new(TelemetryConfig::default(), Box::new(|| 0.0));
        let document = output_document(&engine, json!({"dom": {"root": {}}}));
        assert_eq!(0, document["requests"].as_array().unwrap().len());
        assert_eq!(
            json!({"dom": {"root": {}}}),
            document["finalCapture"]
        );
        assert_eq!(0, document["status"]["completedRequests"].as_u64().unwrap());
    }
}
