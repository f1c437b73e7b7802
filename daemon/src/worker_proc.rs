//! Worker process supervision.
//!
//! The daemon re-executes its own binary with the hidden `worker`
//! subcommand, wires the stdio hop, and turns the child's lifecycle into
//! broker messages: every stdout line becomes [`BrokerMsg::WorkerLine`],
//! and process exit becomes [`BrokerMsg::WorkerExited`] exactly once.

use std::process::Stdio;

use pagetap_session::SessionDir;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::BrokerMsg;
use crate::DaemonError;
use crate::Result;

pub struct WorkerHandle {
    stdin_tx: mpsc::UnboundedSender<String>,
    pid: Option<u32>,
}

impl WorkerHandle {
    pub fn spawn(
        session: &SessionDir,
        ws_url: &str,
        broker_tx: mpsc::UnboundedSender<BrokerMsg>,
    ) -> Result<Self> {
        let exe = std::env::current_exe()?;
        let mut child = Command::new(exe)
            .arg("worker")
            .arg("--session")
            .arg(session.path())
            .arg("--ws")
            .arg(ws_url)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DaemonError::WorkerSpawn(e.to_string()))?;

        let pid = child.id();
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DaemonError::WorkerSpawn("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DaemonError::WorkerSpawn("no stdout pipe".to_string()))?;
        info!("spawned worker pid {pid:?}");

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            while let Some(mut line) = stdin_rx.recv().await {
                line.push('\n');
                if stdin.write_all(line.as_bytes()).await.is_err()
                    || stdin.flush().await.is_err()
                {
                    // The exit path is reported by the wait task.
                    break;
                }
            }
        });

        let line_tx = broker_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line_tx.send(BrokerMsg::WorkerLine(line)).is_err() {
                    break;
                }
            }
            debug!("worker stdout closed");
        });

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("worker exited with {status}"),
                Err(e) => warn!("failed waiting on worker: {e}"),
            }
            let _ = broker_tx.send(BrokerMsg::WorkerExited);
        });

        Ok(Self { stdin_tx, pid })
    }

    /// Sender feeding the worker's stdin, one JSON request per line.
    pub fn stdin_tx(&self) -> mpsc::UnboundedSender<String> {
        self.stdin_tx.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}
