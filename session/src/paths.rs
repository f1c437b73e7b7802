use std::path::Path;
use std::path::PathBuf;

use crate::Result;
use crate::SessionError;

/// Root under which all session directories live:
/// `$PAGETAP_STATE_DIR`, else `~/.pagetap/sessions`.
pub fn state_root() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("PAGETAP_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(SessionError::NoStateRoot)?;
    Ok(home.join(".pagetap").join("sessions"))
}

/// One directory per session. The accessors are the single source of truth
/// for the file layout; nothing else hardcodes these names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDir {
    root: PathBuf,
}

impl SessionDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn for_name(name: &str) -> Result<Self> {
        Ok(Self::new(state_root()?.join(name)))
    }

    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn session_pid_file(&self) -> PathBuf {
        self.root.join("session.pid")
    }

    pub fn session_lock_file(&self) -> PathBuf {
        self.root.join("session.lock")
    }

    pub fn session_meta_file(&self) -> PathBuf {
        self.root.join("session.json")
    }

    pub fn daemon_pid_file(&self) -> PathBuf {
        self.root.join("daemon.pid")
    }

    pub fn daemon_socket(&self) -> PathBuf {
        self.root.join("daemon.sock")
    }

    pub fn daemon_lock_file(&self) -> PathBuf {
        self.root.join("daemon.lock")
    }

    pub fn query_cache_file(&self) -> PathBuf {
        self.root.join("query-cache.json")
    }

    pub fn output_file(&self) -> PathBuf {
        self.root.join("output.json")
    }

    pub fn daemon_log_file(&self) -> PathBuf {
        self.root.join("daemon.log")
    }

    pub fn worker_log_file(&self) -> PathBuf {
        self.root.join("worker.log")
    }
}
