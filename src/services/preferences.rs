//! # Listener Preference Store
//!
//! Durable per-listener record of the last stream the listener settled on. The skill
//! reads it when a session starts (or before replaying a stream) and writes it only when
//! a listener gets a first stream or confirms a switch.
//!
//! ## Backends:
//! - **memory**: `HashMap` behind a `tokio::sync::RwLock`. Lost on restart; meant for
//!   development and tests.
//! - **file**: a single JSON document keyed by listener id. Writes go to a temporary
//!   file first and are renamed over the original, so a crash mid-write leaves the
//!   previous document intact.

use crate::services::catalog::StreamDescriptor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("preference store I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("preference store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("preference store did not answer within {0} ms")]
    Timeout(u64),
}

/// The stream a listener last selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerPreference {
    pub listener_id: String,
    pub stream: StreamDescriptor,
    pub updated_at: DateTime<Utc>,
}

impl ListenerPreference {
    pub fn new(listener_id: impl Into<String>, stream: StreamDescriptor) -> Self {
        Self {
            listener_id: listener_id.into(),
            stream,
            updated_at: Utc::now(),
        }
    }
}

/// Persistence seam for listener preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Stored preference, `None` for a listener never seen before.
    async fn get(&self, listener_id: &str) -> Result<Option<ListenerPreference>, StoreError>;

    /// Create or overwrite the listener's preference.
    async fn put(&self, listener_id: &str, stream: &StreamDescriptor) -> Result<(), StoreError>;

    /// Backend name for logs and the health endpoint.
    fn backend(&self) -> &'static str;
}

#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    records: RwLock<HashMap<String, ListenerPreference>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, listener_id: &str) -> Result<Option<ListenerPreference>, StoreError> {
        Ok(self.records.read().await.get(listener_id).cloned())
    }

    async fn put(&self, listener_id: &str, stream: &StreamDescriptor) -> Result<(), StoreError> {
        self.records.write().await.insert(
            listener_id.to_string(),
            ListenerPreference::new(listener_id, stream.clone()),
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// JSON-document store. All access goes through one mutex; the skill handles one
/// event per listener at a time and the document is small.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn read_all(&self) -> Result<HashMap<String, ListenerPreference>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(self.io_error(err)),
        }
    }

    async fn write_all(
        &self,
        records: &HashMap<String, ListenerPreference>,
    ) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn get(&self, listener_id: &str) -> Result<Option<ListenerPreference>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        Ok(records.remove(listener_id))
    }

    async fn put(&self, listener_id: &str, stream: &StreamDescriptor) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(
            listener_id.to_string(),
            ListenerPreference::new(listener_id, stream.clone()),
        );
        self.write_all(&records).await?;
        debug!(listener_id = %listener_id, path = %self.path.display(), "Preference written");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}
