use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use crate::Result;

/// Liveness check for a recorded PID.
///
/// On Linux this is a `/proc` existence probe; elsewhere on Unix it is
/// `kill(pid, 0)`. A probe failure is reported as alive: treating an
/// unknown process as dead could reclaim state out from under a holder.
#[cfg(target_os = "linux")]
pub fn pid_is_alive(pid: i32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn pid_is_alive(pid: i32) -> bool {
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(errno) => errno != libc::ESRCH,
        None => true,
    }
}

#[cfg(not(unix))]
pub fn pid_is_alive(_pid: i32) -> bool {
    true
}

/// A file recording the PID of the process that owns some piece of session
/// state. A recorded PID that is no longer alive marks the file stale and
/// reclaimable.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_current(&self) -> Result<()> {
        std::fs::write(&self.path, format!("{}\n", std::process::id()))?;
        Ok(())
    }

    pub fn read(&self) -> Option<i32> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        contents.trim().parse().ok()
    }

    /// The recorded PID, only if that process is still alive.
    pub fn read_live(&self) -> Option<i32> {
        let pid = self.read()?;
        if pid_is_alive(pid) { Some(pid) } else { None }
    }

    /// Remove the file if its recorded PID is dead or unreadable. Returns
    /// whether the file was reclaimed. Best-effort: IO failures are logged
    /// and swallowed.
    pub fn reclaim_if_stale(&self) -> bool {
        if !self.path.exists() {
            return false;
        }
        if self.read_live().is_some() {
            return false;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("reclaimed stale pid file {}", self.path.display());
                true
            }
            Err(e) => {
                debug!("could not remove stale pid file {}: {e}", self.path.display());
                false
            }
        }
    }

    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(pid_is_alive(std::process::id() as i32));
    }

    #[test]
    fn pid_file_round_trips_and_reads_live() {
        let dir = tempfile::tempdir().unwrap();
        let file = PidFile::new(dir.path().join("session.pid"));
        file.write_current().unwrap();
        assert_eq!(Some(std::process::id() as i32), file.read());
        assert_eq!(Some(std::process::id() as i32), file.read_live());
        assert!(!file.reclaim_if_stale());
    }

    #[test]
    fn dead_pid_file_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let file = PidFile::new(dir.path().join("daemon.pid"));
        // PID values beyond the kernel's pid_max cannot be alive.
        std::fs::write(file.path(), "99999999\n").unwrap();
        assert_eq!(None, file.read_live());
        assert!(file.reclaim_if_stale());
        assert!(!file.path().exists());
    }

    #[test]
    fn garbage_contents_count_as_stale() {
        let dir = tempfile::tempdir().unwrap();
        let file = PidFile::new(dir.path().join("daemon.pid"));
        std::fs::write(file.path(), "not-a-pid\n").unwrap();
        assert_eq!(None, file.read());
        assert!(file.reclaim_if_stale());
    }
}
