//! Durable storage behind a narrow seam.
//!
//! The agent persists exactly two things: the serialized `AgentState` blob
//! (key `"state"`) and the next alarm time. Storage failures propagate — a
//! failed save aborts the tick and the work is retried on the next alarm.

use crate::error::{GambitError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_state(&self) -> Result<Option<serde_json::Value>>;
    async fn save_state(&self, state: &serde_json::Value) -> Result<()>;
    async fn load_alarm(&self) -> Result<Option<DateTime<Utc>>>;
    async fn save_alarm(&self, at: DateTime<Utc>) -> Result<()>;
    async fn clear_alarm(&self) -> Result<()>;
}

/// File-backed store: `state.json` and `alarm` under a data directory.
/// Writes go through a temp file and an atomic rename so a crash mid-write
/// can never corrupt the blob.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join("state.json")
    }

    fn alarm_path(&self) -> PathBuf {
        self.dir.join("alarm")
    }

    async fn write_atomic(&self, path: &PathBuf, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GambitError::Storage(format!("create {}: {e}", self.dir.display())))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| GambitError::Storage(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| GambitError::Storage(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load_state(&self) -> Result<Option<serde_json::Value>> {
        match tokio::fs::read(self.state_path()).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes)?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GambitError::Storage(format!("read state: {e}"))),
        }
    }

    async fn save_state(&self, state: &serde_json::Value) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.write_atomic(&self.state_path(), &bytes).await?;
        debug!("state saved ({} bytes)", bytes.len());
        Ok(())
    }

    async fn load_alarm(&self) -> Result<Option<DateTime<Utc>>> {
        match tokio::fs::read_to_string(self.alarm_path()).await {
            Ok(text) => Ok(text.trim().parse::<DateTime<Utc>>().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GambitError::Storage(format!("read alarm: {e}"))),
        }
    }

    async fn save_alarm(&self, at: DateTime<Utc>) -> Result<()> {
        self.write_atomic(&self.alarm_path(), at.to_rfc3339().as_bytes())
            .await
    }

    async fn clear_alarm(&self) -> Result<()> {
        match tokio::fs::remove_file(self.alarm_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GambitError::Storage(format!("clear alarm: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrips_state_and_alarm() {
        let dir = std::env::temp_dir().join(format!("gambit-store-{}", std::process::id()));
        let store = FileStore::new(&dir);

        assert!(store.load_state().await.unwrap().is_none());
        let blob = serde_json::json!({"enabled": true, "dex_paper_balance_sol": 10.0});
        store.save_state(&blob).await.unwrap();
        assert_eq!(store.load_state().await.unwrap().unwrap(), blob);

        assert!(store.load_alarm().await.unwrap().is_none());
        let at = Utc::now();
        store.save_alarm(at).await.unwrap();
        let loaded = store.load_alarm().await.unwrap().unwrap();
        assert!((loaded - at).num_milliseconds().abs() < 10);
        store.clear_alarm().await.unwrap();
        assert!(store.load_alarm().await.unwrap().is_none());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
