use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;

/// Drive and observe a live browser over the Chrome DevTools Protocol.
#[derive(Parser, Debug)]
#[command(name = "pagetap", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Cmd,
}

/// Session selector shared by every user-facing subcommand.
#[derive(Args, Debug)]
pub struct SessionArg {
    /// Session name under the state root.
    #[arg(long, short = 's', default_value = "default")]
    pub session: String,

    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Attach to a running browser and start the session daemon.
    Start(StartArgs),

    /// Shut the session down, capturing a final page snapshot.
    Stop(SessionArg),

    /// Collection counters, caps, and session process info.
    Status(SessionArg),

    /// Recent network requests, console messages, and WebSocket activity.
    Peek(PeekArgs),

    /// Full detail of one completed request by index.
    Details {
        #[command(flatten)]
        session: SessionArg,
        /// 0-based index into the completed request list.
        id: usize,
    },

    /// Request/response headers for a request, or the main document.
    Headers {
        #[command(flatten)]
        session: SessionArg,
        /// 0-based index; omitted picks the current document response.
        id: Option<usize>,
    },

    /// Run a CSS selector in the page and cache the matched nodes.
    Query {
        #[command(flatten)]
        session: SessionArg,
        selector: String,
    },

    /// Resolve a cached node index or selector, refreshing a stale cache.
    Resolve {
        #[command(flatten)]
        session: SessionArg,
        /// A node index from the last query, or a literal CSS selector.
        token: String,
    },

    /// Export the session's network activity as a HAR 1.2 file.
    Har {
        #[command(flatten)]
        session: SessionArg,
        /// Output path, e.g. `capture.har`.
        out: PathBuf,
    },

    /// Raw CDP passthrough.
    Cdp {
        #[command(flatten)]
        session: SessionArg,
        /// Fully qualified method, e.g. `Runtime.evaluate`.
        method: String,
        /// JSON-encoded params object.
        params: Option<String>,
    },

    /// Remove session state, terminating any leftover processes.
    Cleanup(SessionArg),

    /// Daemon role entry point (spawned by `pagetap start`).
    #[command(hide = true)]
    Daemon(RoleArgs),

    /// Worker role entry point (spawned by the daemon).
    #[command(hide = true)]
    Worker(RoleArgs),
}

#[derive(Args, Debug)]
pub struct StartArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// Browser WebSocket URL (`ws://...`). Skips endpoint discovery.
    #[arg(long)]
    pub ws: Option<String>,

    /// DevTools port to discover the WebSocket URL from.
    #[arg(long, conflicts_with = "ws")]
    pub port: Option<u16>,

    /// Host the DevTools endpoint listens on.
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Args, Debug)]
pub struct RoleArgs {
    /// Session directory path (not a name; roles are given the resolved dir).
    #[arg(long)]
    pub session: PathBuf,

    /// Browser WebSocket URL.
    #[arg(long)]
    pub ws: String,
}

#[derive(Args, Debug)]
pub struct PeekArgs {
    #[command(flatten)]
    pub session: SessionArg,

    /// How many entries per category, newest last.
    #[arg(long)]
    pub last_n: Option<usize>,

    /// Skip this many entries from the tail first.
    #[arg(long)]
    pub offset: Option<usize>,
}
