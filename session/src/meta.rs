use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::Result;
use crate::SessionDir;

/// `session.json`: identity of the session and the browser endpoint the
/// worker is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub id: Uuid,
    pub ws_url: String,
    pub created_at: DateTime<Utc>,
}

impl SessionMeta {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ws_url: ws_url.into(),
            created_at: Utc::now(),
        }
    }

    pub fn load(dir: &SessionDir) -> Result<Self> {
        let contents = std::fs::read_to_string(dir.session_meta_file())?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn store(&self, dir: &SessionDir) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.session_meta_file(), contents)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn meta_round_trips_through_the_session_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = SessionDir::new(tmp.path());
        let meta = SessionMeta::new("ws://127.0.0.1:9222/devtools/browser/abc");
        meta.store(&dir).unwrap();
        assert_eq!(meta, SessionMeta::load(&dir).unwrap());
    }
}
