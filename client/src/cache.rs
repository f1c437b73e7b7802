use pagetap_protocol::QueryNode;
use pagetap_session::SessionDir;
use pagetap_session::acquire_lock;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::Result;

/// Persisted result of the most recent `query` command, readable by any
/// later CLI invocation in the same session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCacheEntry {
    pub selector: String,
    pub nodes: Vec<QueryNode>,
    /// Navigation the query ran under. Entries written before this field
    /// existed have none and are treated as valid (legacy-permissive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_id: Option<u64>,
}

/// File-backed cache in the session directory. Reads and writes hold the
/// session lock, closing the race between concurrent CLI invocations.
#[derive(Debug, Clone)]
pub struct QueryCache {
    dir: SessionDir,
}

impl QueryCache {
    pub fn new(dir: SessionDir) -> Self {
        Self { dir }
    }

    pub fn load(&self) -> Result<Option<QueryCacheEntry>> {
        let _lock = acquire_lock(&self.dir.session_lock_file())?;
        let path = self.dir.query_cache_file();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&contents) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // A corrupt cache is equivalent to no cache.
                debug!("discarding unreadable query cache: {e}");
                Ok(None)
            }
        }
    }

    pub fn store(&self, entry: &QueryCacheEntry) -> Result<()> {
        let _lock = acquire_lock(&self.dir.session_lock_file())?;
        let contents = serde_json::to_string_pretty(entry)
            .map_err(|e| crate::ClientError::Protocol(format!("failed to encode cache: {e}")))?;
        std::fs::write(self.dir.query_cache_file(), contents)?;
        Ok(())
    }
}
