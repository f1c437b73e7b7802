use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;

use crate::Result;
use crate::SessionError;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

const MAX_RETRIES: usize = 10;
const RETRY_SLEEP: Duration = Duration::from_millis(100);

/// Holds an exclusive advisory lock for its lifetime; the OS releases the
/// lock when the file handle drops, including on crash, so a dead holder
/// never blocks a later acquirer.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
}

/// Acquire an exclusive advisory lock with a bounded retry loop, so a
/// busy holder delays us briefly rather than indefinitely. The lock file
/// is created `0o600` if missing.
pub fn acquire_lock(path: &Path) -> Result<LockGuard> {
    let mut options = OpenOptions::new();
    options.write(true).read(true).create(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let file = options.open(path)?;

    for _ in 0..MAX_RETRIES {
        match fs2::FileExt::try_lock_exclusive(&file) {
            Ok(()) => return Ok(LockGuard { _file: file }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(RETRY_SLEEP);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(SessionError::LockBusy(path.display().to_string()))
}
