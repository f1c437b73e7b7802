//! The `pagetap` multitool binary.
//!
//! One executable carries all three roles: the user-facing client
//! subcommands, plus the hidden `daemon` and `worker` entry points the
//! processes spawn each other through. Role dispatch happens before any
//! logging setup because each role logs somewhere different.

use std::process::ExitCode;

use clap::Parser;
use pagetap_daemon::DaemonOptions;
use pagetap_session::SessionDir;
use pagetap_worker::WorkerOptions;
use tracing::error;

mod cli;
mod config;
mod logging;
mod ops;

use cli::Cli;
use cli::Cmd;
use cli::RoleArgs;

fn main() -> ExitCode {
    let parsed = Cli::parse();
    match parsed.command {
        Cmd::Daemon(args) => run_daemon_role(args),
        Cmd::Worker(args) => run_worker_role(args),
        command => run_client(command),
    }
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}

fn run_client(command: Cmd) -> ExitCode {
    logging::init_client();
    let rt = match runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match rt.block_on(ops::run(command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            if let Some(hint) = err.suggestion() {
                eprintln!("hint: {hint}");
            }
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

fn run_daemon_role(args: RoleArgs) -> ExitCode {
    let session = SessionDir::new(args.session);
    let _guard = logging::init_role(&session.daemon_log_file());
    let result: anyhow::Result<()> = (|| {
        let rt = runtime()?;
        rt.block_on(pagetap_daemon::run(DaemonOptions {
            session,
            ws_url: args.ws,
        }))?;
        Ok(())
    })();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("daemon failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_worker_role(args: RoleArgs) -> ExitCode {
    let session = SessionDir::new(args.session);
    let _guard = logging::init_role(&session.worker_log_file());
    let result: anyhow::Result<()> = (|| {
        // `pagetap start` exports PAGETAP_CONFIG; inherited through the
        // daemon, so the worker sees the same file the user named.
        let config = config::load(None)?;
        let rt = runtime()?;
        rt.block_on(pagetap_worker::run(WorkerOptions {
            session,
            ws_url: args.ws,
            telemetry: config.telemetry,
        }))?;
        Ok(())
    })();
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("worker failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}
