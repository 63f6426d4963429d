use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::io::AsyncWriteExt;

/// Sink of last resort for attack payloads that could not be persisted.
///
/// Implementations must never lose the payload silently; a failed append is
/// the caller's cue to log the loss.
#[async_trait]
pub trait RawLogSink: Send + Sync {
    async fn append(&self, payload: &serde_json::Value) -> anyhow::Result<()>;
}

/// Date-partitioned JSON-lines files under a configured directory.
///
/// Each call appends one `{"received_at", "payload"}` line to `{UTC date}.json`,
/// creating the directory on demand.
pub struct FileRawLogSink {
    dir: PathBuf,
}

impl FileRawLogSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RawLogSink for FileRawLogSink {
    async fn append(&self, payload: &serde_json::Value) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file_name = format!("{}.json", Utc::now().format("%Y-%m-%d"));
        let line = json!({
            "received_at": Utc::now().to_rfc3339(),
            "payload": payload,
        });

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file_name))
            .await?;
        file.write_all(line.to_string().as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

/// In-memory sink used by tests.
#[derive(Default, Clone)]
pub struct MemoryRawLogSink {
    entries: Arc<StdMutex<Vec<serde_json::Value>>>,
}

impl MemoryRawLogSink {
    pub fn entries(&self) -> Vec<serde_json::Value> {
        self.entries.lock().expect("lock sidelog entries").clone()
    }
}

#[async_trait]
impl RawLogSink for MemoryRawLogSink {
    async fn append(&self, payload: &serde_json::Value) -> anyhow::Result<()> {
        self.entries
            .lock()
            .expect("lock sidelog entries")
            .push(payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_sink_appends_one_line_per_payload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FileRawLogSink::new(dir.path().join("raw"));

        sink.append(&json!({"ip_address": "1.2.3.4"}))
            .await
            .expect("first append");
        sink.append(&json!({"ip_address": "5.6.7.8"}))
            .await
            .expect("second append");

        let file_name = format!("{}.json", Utc::now().format("%Y-%m-%d"));
        let contents = std::fs::read_to_string(dir.path().join("raw").join(file_name))
            .expect("read side log");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("valid json line");
        assert_eq!(first["payload"]["ip_address"], "1.2.3.4");
        assert!(first["received_at"].is_string());
    }

    #[tokio::test]
    async fn memory_sink_records_payloads() {
        let sink = MemoryRawLogSink::default();
        sink.append(&json!({"k": 1})).await.expect("append");
        assert_eq!(sink.entries().len(), 1);
        assert_eq!(sink.entries()[0]["k"], 1);
    }
}
