//! Unix-socket server and daemon lifecycle.
//!
//! The daemon binds the session's socket, spawns the worker, and runs two
//! loops: the broker loop over [`BrokerMsg`] and the accept loop handing
//! each client connection its own task. Worker exit cancels the accept
//! loop, so the daemon never outlives its worker.

use std::time::Instant;

use pagetap_protocol::CommandError;
use pagetap_protocol::WireRequest;
use pagetap_protocol::WireResponse;
use pagetap_protocol::exit_code;
use pagetap_session::PidFile;
use pagetap_session::SessionDir;
use pagetap_session::acquire_lock;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Broker;
use crate::BrokerMsg;
use crate::CarryState;
use crate::Result;
use crate::WorkerHandle;

pub struct DaemonOptions {
    pub session: SessionDir,
    pub ws_url: String,
}

/// Facts folded into each dispatch, read fresh so a restarted worker's
/// pid shows up without daemon involvement.
struct CarrySource {
    session: SessionDir,
    socket_path: String,
    started: Instant,
}

impl CarrySource {
    fn capture(&self) -> CarryState {
        CarryState {
            daemon_pid: std::process::id(),
            session_pid: PidFile::new(self.session.session_pid_file()).read_live(),
            socket_path: self.socket_path.clone(),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }
}

pub async fn run(options: DaemonOptions) -> Result<()> {
    options.session.ensure_exists()?;
    let _lock = acquire_lock(&options.session.daemon_lock_file())?;
    let pid_file = PidFile::new(options.session.daemon_pid_file());
    pid_file.write_current()?;

    let socket_path = options.session.daemon_socket();
    match std::fs::remove_file(&socket_path) {
        Ok(()) => warn!("removed stale socket at {}", socket_path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!("daemon listening on {}", socket_path.display());

    let (broker_tx, broker_rx) = mpsc::unbounded_channel();
    let worker = WorkerHandle::spawn(&options.session, &options.ws_url, broker_tx.clone())?;
    let broker = Broker::new(worker.stdin_tx());
    let carry = CarrySource {
        session: options.session.clone(),
        socket_path: socket_path.display().to_string(),
        started: Instant::now(),
    };

    let shutdown = CancellationToken::new();
    let broker_task = tokio::spawn(broker_loop(broker, broker_rx, carry, shutdown.clone()));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        tokio::spawn(serve_connection(stream, broker_tx.clone()));
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                    }
                }
            }
        }
    }

    // Pending requests were already synthesized by the exit handler.
    broker_task.abort();
    drop(listener);
    let _ = std::fs::remove_file(&socket_path);
    pid_file.remove();
    info!("daemon exiting");
    Ok(())
}

async fn broker_loop(
    mut broker: Broker,
    mut rx: mpsc::UnboundedReceiver<BrokerMsg>,
    carry: CarrySource,
    shutdown: CancellationToken,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            BrokerMsg::Dispatch { request, reply } => {
                broker.dispatch(carry.capture(), request, reply);
                // `stop` against an already-dead worker still ends the
                // daemon; the client got its fail-fast reply above.
                if broker.shutdown_requested() && !broker.worker_alive() {
                    shutdown.cancel();
                }
            }
            BrokerMsg::WorkerLine(line) => broker.handle_worker_line(&line),
            BrokerMsg::WorkerExited => {
                broker.handle_worker_exit();
                if broker.shutdown_requested() {
                    shutdown.cancel();
                } else {
                    // Stay up in fail-fast mode; clients get a transport
                    // error instead of a connection refusal.
                    warn!("worker exited unexpectedly, daemon staying up");
                }
            }
        }
    }
}

/// One task per client connection: read request lines, await the broker's
/// reply for each, write the response line back.
async fn serve_connection(stream: UnixStream, broker_tx: mpsc::UnboundedSender<BrokerMsg>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("client read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if broker_tx
                    .send(BrokerMsg::Dispatch {
                        request,
                        reply: reply_tx,
                    })
                    .is_err()
                {
                    break;
                }
                match reply_rx.await {
                    Ok(response) => response,
                    Err(_) => break,
                }
            }
            Err(e) => WireResponse::error(
                0,
                "protocol_error",
                CommandError::new(format!("malformed request: {e}"), exit_code::PROTOCOL),
            ),
        };
        let Ok(mut rendered) = serde_json::to_string(&response) else {
            break;
        };
        rendered.push('\n');
        if write.write_all(rendered.as_bytes()).await.is_err() || write.flush().await.is_err() {
            break;
        }
    }
}
