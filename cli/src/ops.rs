//! User-facing subcommand implementations.
//!
//! Every command speaks to the session daemon through one
//! [`DaemonClient`] connection and prints its result as pretty JSON on
//! stdout; errors propagate as [`ClientError`] so the entry point can map
//! them to exit codes.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use pagetap_cdp::discover_websocket_url;
use pagetap_client::ClientError;
use pagetap_client::DaemonClient;
use pagetap_client::NavigationMemo;
use pagetap_client::QueryCache;
use pagetap_client::QueryCacheEntry;
use pagetap_client::Resolved;
use pagetap_client::Result;
use pagetap_client::resolve_with_refresh;
use pagetap_protocol::CdpCallParams;
use pagetap_protocol::Command;
use pagetap_protocol::CommandError;
use pagetap_protocol::DetailsParams;
use pagetap_protocol::HarDataParams;
use pagetap_protocol::HeadersParams;
use pagetap_protocol::NetworkRequestRecord;
use pagetap_protocol::PeekParams;
use pagetap_protocol::QueryParams;
use pagetap_protocol::ShutdownParams;
use pagetap_protocol::StatusParams;
use pagetap_session::PidFile;
use pagetap_session::SessionDir;
use pagetap_session::SessionMeta;
use pagetap_session::cleanup_session;
use pagetap_telemetry::build_har;
use serde_json::Value;
use serde_json::json;
use tracing::debug;

use crate::cli::Cmd;
use crate::cli::PeekArgs;
use crate::cli::SessionArg;
use crate::cli::StartArgs;
use crate::config;

const DAEMON_STARTUP_ATTEMPTS: usize = 40;
const DAEMON_STARTUP_DELAY: Duration = Duration::from_millis(250);

pub async fn run(command: Cmd) -> Result<()> {
    match command {
        Cmd::Start(args) => start(args).await,
        Cmd::Stop(session) => stop(&session).await,
        Cmd::Status(session) => forward(&session, Command::Status(StatusParams {})).await,
        Cmd::Peek(args) => peek(args).await,
        Cmd::Details { session, id } => {
            forward(&session, Command::Details(DetailsParams { id })).await
        }
        Cmd::Headers { session, id } => {
            forward(&session, Command::Headers(HeadersParams { id })).await
        }
        Cmd::Query { session, selector } => query(&session, selector).await,
        Cmd::Resolve { session, token } => resolve(&session, &token).await,
        Cmd::Har { session, out } => har(&session, &out).await,
        Cmd::Cdp {
            session,
            method,
            params,
        } => cdp(&session, method, params.as_deref()).await,
        Cmd::Cleanup(session) => cleanup(&session),
        Cmd::Daemon(_) | Cmd::Worker(_) => Err(ClientError::Protocol(
            "role subcommands are dispatched before the client path".to_string(),
        )),
    }
}

fn session_dir(session: &SessionArg) -> Result<SessionDir> {
    let dir = SessionDir::for_name(&session.session)?;
    dir.ensure_exists()?;
    Ok(dir)
}

async fn connect(dir: &SessionDir) -> Result<DaemonClient> {
    DaemonClient::connect(&dir.daemon_socket()).await
}

fn print_data(data: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(data)
        .map_err(|e| ClientError::Protocol(format!("failed to render output: {e}")))?;
    println!("{rendered}");
    Ok(())
}

/// Send one command over a fresh connection and print the payload.
async fn forward(session: &SessionArg, command: Command) -> Result<()> {
    let dir = session_dir(session)?;
    let mut client = connect(&dir).await?;
    let data = client.request_ok(command).await?;
    print_data(&data)
}

async fn start(args: StartArgs) -> Result<()> {
    let config = config::load(args.session.config.as_deref())
        .map_err(|e| ClientError::Protocol(format!("{e:#}")))?;
    let ws = match args.ws {
        Some(ws) => ws,
        None => {
            let host = config::resolve_host(args.host, &config);
            let port = config::resolve_port(args.port, &config);
            discover_websocket_url(&host, port)
                .await
                .map_err(|e| ClientError::Protocol(e.to_string()))?
        }
    };

    let dir = session_dir(&args.session)?;
    if PidFile::new(dir.daemon_pid_file()).read_live().is_some() {
        return Err(CommandError::invalid_argument(format!(
            "session `{}` already has a running daemon",
            args.session.session
        ))
        .with_suggestion("run `pagetap stop` or `pagetap cleanup` first")
        .into());
    }

    SessionMeta::new(&ws).store(&dir)?;
    spawn_daemon(&dir, &ws, args.session.config.as_deref())?;
    let mut client = await_daemon(&dir).await?;
    let data = client.request_ok(Command::Status(StatusParams {})).await?;
    print_data(&data)
}

/// Launch the hidden daemon role detached from this invocation; its
/// lifetime is tied to the session, not to us.
fn spawn_daemon(dir: &SessionDir, ws: &str, config: Option<&Path>) -> Result<()> {
    let exe = std::env::current_exe()?;
    let mut command = std::process::Command::new(exe);
    command
        .arg("daemon")
        .arg("--session")
        .arg(dir.path())
        .arg("--ws")
        .arg(ws)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    if let Some(path) = config {
        // The daemon passes this down to the worker by inheritance.
        command.env("PAGETAP_CONFIG", path);
    }
    let child = command.spawn()?;
    debug!("spawned daemon pid {}", child.id());
    Ok(())
}

async fn await_daemon(dir: &SessionDir) -> Result<DaemonClient> {
    for _ in 0..DAEMON_STARTUP_ATTEMPTS {
        match connect(dir).await {
            Ok(client) => return Ok(client),
            Err(_) => tokio::time::sleep(DAEMON_STARTUP_DELAY).await,
        }
    }
    Err(ClientError::DaemonUnreachable(format!(
        "daemon did not come up within {:?}; see {}",
        DAEMON_STARTUP_DELAY * DAEMON_STARTUP_ATTEMPTS as u32,
        dir.daemon_log_file().display()
    )))
}

async fn stop(session: &SessionArg) -> Result<()> {
    let dir = session_dir(session)?;
    let mut client = connect(&dir).await?;
    let data = client
        .request_ok(Command::Shutdown(ShutdownParams::default()))
        .await?;
    print_data(&data)
}

async fn peek(args: PeekArgs) -> Result<()> {
    forward(
        &args.session,
        Command::Peek(PeekParams {
            last_n: args.last_n,
            offset: args.offset,
        }),
    )
    .await
}

async fn query(session: &SessionArg, selector: String) -> Result<()> {
    let dir = session_dir(session)?;
    let mut client = connect(&dir).await?;
    let data = client
        .request_ok(Command::Query(QueryParams { selector }))
        .await?;
    let entry: QueryCacheEntry = serde_json::from_value(data.clone())
        .map_err(|e| ClientError::Protocol(format!("malformed query response: {e}")))?;
    QueryCache::new(dir).store(&entry)?;
    print_data(&data)
}

async fn resolve(session: &SessionArg, token: &str) -> Result<()> {
    let dir = session_dir(session)?;
    let cache = QueryCache::new(dir.clone());
    let mut client = connect(&dir).await?;
    let mut memo = NavigationMemo::new();
    let resolved = resolve_with_refresh(&cache, &mut client, &mut memo, token).await?;
    let data = match resolved {
        Resolved::Node {
            selector,
            index,
            node_id,
        } => json!({
            "success": true,
            "kind": "node",
            "selector": selector,
            "index": index,
            "nodeId": node_id,
        }),
        Resolved::Selector(selector) => json!({
            "success": true,
            "kind": "selector",
            "selector": selector,
        }),
    };
    print_data(&data)
}

async fn har(session: &SessionArg, out: &Path) -> Result<()> {
    let dir = session_dir(session)?;
    let mut client = connect(&dir).await?;
    let data = client.request_ok(Command::HarData(HarDataParams {})).await?;
    let records: Vec<NetworkRequestRecord> = serde_json::from_value(
        data.get("requests").cloned().unwrap_or_else(|| json!([])),
    )
    .map_err(|e| ClientError::Protocol(format!("malformed har_data response: {e}")))?;

    let (browser_name, browser_version) = browser_version(&mut client).await;
    let har = build_har(&records, &browser_name, &browser_version);
    let rendered = serde_json::to_string_pretty(&har)
        .map_err(|e| ClientError::Protocol(format!("failed to encode HAR: {e}")))?;
    std::fs::write(out, rendered)?;
    print_data(&json!({
        "path": out.display().to_string(),
        "entries": records.len(),
    }))
}

/// Best-effort `Browser.getVersion`; HAR metadata falls back to a
/// placeholder rather than failing the export.
async fn browser_version(client: &mut DaemonClient) -> (String, String) {
    let fallback = ("unknown".to_string(), "unknown".to_string());
    let result = client
        .request_ok(Command::CdpCall(CdpCallParams {
            method: "Browser.getVersion".to_string(),
            params: json!({}),
        }))
        .await;
    let Ok(data) = result else {
        return fallback;
    };
    let Some(product) = data.pointer("/result/product").and_then(Value::as_str) else {
        return fallback;
    };
    match product.split_once('/') {
        Some((name, version)) => (name.to_string(), version.to_string()),
        None => (product.to_string(), "unknown".to_string()),
    }
}

async fn cdp(session: &SessionArg, method: String, params: Option<&str>) -> Result<()> {
    let params = match params {
        None => json!({}),
        Some(raw) => serde_json::from_str(raw).map_err(|e| {
            ClientError::Command(CommandError::invalid_argument(format!(
                "params is not valid JSON: {e}"
            )))
        })?,
    };
    forward(session, Command::CdpCall(CdpCallParams { method, params })).await
}

fn cleanup(session: &SessionArg) -> Result<()> {
    let dir = session_dir(session)?;
    cleanup_session(&dir);
    print_data(&json!({
        "cleaned": dir.path().display().to_string(),
    }))
}
