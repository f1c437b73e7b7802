use tracing::debug;
use tracing::info;

use crate::PidFile;
use crate::SessionDir;

/// Remove a session's runtime state, terminating a still-running daemon
/// first. Idempotent: every step is best-effort and tolerates the file
/// already being gone, so a half-cleaned directory can be cleaned again.
pub fn cleanup_session(dir: &SessionDir) {
    let daemon_pid = PidFile::new(dir.daemon_pid_file());
    if let Some(pid) = daemon_pid.read_live() {
        info!("terminating daemon pid {pid}");
        terminate(pid);
    }
    let session_pid = PidFile::new(dir.session_pid_file());
    if let Some(pid) = session_pid.read_live() {
        info!("terminating worker pid {pid}");
        terminate(pid);
    }

    for path in [
        dir.daemon_socket(),
        dir.daemon_pid_file(),
        dir.daemon_lock_file(),
        dir.session_pid_file(),
        dir.session_lock_file(),
        dir.query_cache_file(),
    ] {
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("could not remove {}: {e}", path.display()),
        }
    }
}

/// Best-effort SIGTERM; an already-dead process is not an error.
#[cfg(unix)]
fn terminate(pid: i32) {
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result != 0 {
        debug!(
            "kill({pid}) failed: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn terminate(_pid: i32) {}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_tolerates_any_subset_of_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path());

        // Empty directory: nothing to do.
        cleanup_session(&dir);

        // Partial state, including a dead recorded PID.
        std::fs::write(dir.daemon_pid_file(), "99999999\n").unwrap();
        std::fs::write(dir.query_cache_file(), "{}").unwrap();
        cleanup_session(&dir);
        assert!(!dir.daemon_pid_file().exists());
        assert!(!dir.query_cache_file().exists());

        // Running it again is a no-op.
        cleanup_session(&dir);
    }
}
