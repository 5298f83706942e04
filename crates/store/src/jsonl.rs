//! JSONL state sink: durable, human-inspectable completion records.
//!
//! Each line is one JSON-encoded `CompletionResult`. Records are loaded
//! into memory on creation and the file is rewritten on every mutation.
//!
//! Default location: `~/.switchyard/completions.jsonl`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use switchyard_core::error::{Failure, SinkError};
use switchyard_core::{CompletionResult, StateSink};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::apply_failure;

pub struct JsonlStateSink {
    path: PathBuf,
    records: Arc<RwLock<Vec<CompletionResult>>>,
}

impl JsonlStateSink {
    /// Open a sink at `path`, loading any existing records. A missing file
    /// starts empty and is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = records.len(), "JSONL state sink loaded");
        Self {
            path,
            records: Arc::new(RwLock::new(records)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<CompletionResult> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<CompletionResult>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted completion record");
                    None
                }
            })
            .collect()
    }

    async fn flush(&self, records: &[CompletionResult]) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::Storage(format!("Failed to create store directory: {e}")))?;
        }

        let mut content = String::new();
        for record in records {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }

        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| SinkError::Storage(format!("Failed to write {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl StateSink for JsonlStateSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn create(&self, result: &CompletionResult) -> Result<String, SinkError> {
        let id = Uuid::new_v4().to_string();
        let mut record = result.clone();
        record.id = id.clone();

        let mut records = self.records.write().await;
        records.push(record);
        self.flush(&records).await?;
        Ok(id)
    }

    async fn update(&self, id: &str, result: &CompletionResult) -> Result<(), SinkError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SinkError::NotFound(id.to_string()))?;
        *record = result.clone();
        record.id = id.to_string();
        self.flush(&records).await
    }

    async fn mark_failed(&self, id: &str, failure: &Failure, retry_count: u32) -> Result<(), SinkError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SinkError::NotFound(id.to_string()))?;
        if apply_failure(record, failure, retry_count) {
            self.flush(&records).await?;
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CompletionResult>, SinkError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }
}
