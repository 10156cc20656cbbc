//! FileSink - appends one JSON line per event, rotating by size

use std::path::{Path, PathBuf};

use contracts::{ContractError, DeliveryError, DeliveryOutcome, Event, EventSink, FileConfig, SinkKind};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::render_payload;
use crate::template::Layout;

/// Sink that writes events to a JSON lines file
pub struct FileSink {
    name: String,
    path: PathBuf,
    max_size_bytes: u64,
    max_backups: usize,
    layout: Option<Layout>,
    /// Open handle and its current size, opened lazily
    file: Option<(File, u64)>,
}

impl FileSink {
    /// Create a new FileSink
    ///
    /// The file is opened on the first delivery.
    pub fn new(name: impl Into<String>, config: &FileConfig) -> Result<Self, ContractError> {
        let name = name.into();
        if config.path.trim().is_empty() {
            return Err(ContractError::sink_construction(&name, "file path cannot be empty"));
        }
        let layout = config
            .layout
            .as_ref()
            .map(Layout::compile)
            .transpose()
            .map_err(|e| ContractError::sink_construction(&name, format!("layout: {e}")))?;

        Ok(Self {
            name,
            path: PathBuf::from(&config.path),
            max_size_bytes: config.max_size_bytes.max(1),
            max_backups: config.max_backups,
            layout,
            file: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> std::io::Result<(File, u64)> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let size = file.metadata().await?.len();
        Ok((file, size))
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    /// Shift `path.N` to `path.N+1`, dropping the oldest, then move the
    /// live file to `path.1`
    #[instrument(name = "file_sink_rotate", skip(self), fields(sink = %self.name))]
    async fn rotate(&mut self) -> std::io::Result<()> {
        if let Some((mut file, _)) = self.file.take() {
            file.flush().await?;
        }
        if self.max_backups == 0 {
            fs::remove_file(&self.path).await?;
            return Ok(());
        }
        let oldest = self.backup_path(self.max_backups);
        if fs::try_exists(&oldest).await? {
            fs::remove_file(&oldest).await?;
        }
        for index in (1..self.max_backups).rev() {
            let from = self.backup_path(index);
            if fs::try_exists(&from).await? {
                fs::rename(&from, self.backup_path(index + 1)).await?;
            }
        }
        fs::rename(&self.path, self.backup_path(1)).await?;
        info!(path = %self.path.display(), "Rotated event file");
        Ok(())
    }

    async fn append(&mut self, event: &Event) -> Result<(), DeliveryError> {
        let (_, body) = render_payload(self.layout.as_ref(), event)?;
        let mut line = serde_json::to_vec(&body)?;
        line.push(b'\n');
        let len = line.len() as u64;

        if self.file.is_none() {
            self.file = Some(self.open().await?);
        }
        let needs_rotation = self
            .file
            .as_ref()
            .is_some_and(|(_, size)| *size > 0 && size + len > self.max_size_bytes);
        if needs_rotation {
            self.rotate().await?;
            self.file = Some(self.open().await?);
        }

        if let Some((file, size)) = self.file.as_mut() {
            file.write_all(&line).await?;
            file.flush().await?;
            *size += len;
        }
        Ok(())
    }
}

impl EventSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, event_id = %event.id())
    )]
    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
        let result = self.append(event).await;
        if result.is_err() {
            // reopen on the next attempt
            self.file = None;
        }
        result.into()
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn release(&mut self) -> Result<(), ContractError> {
        if let Some((mut file, _)) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| ContractError::sink_release(&self.name, e.to_string()))?;
            file.sync_all()
                .await
                .map_err(|e| ContractError::sink_release(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn config(path: &Path, max_size_bytes: u64, max_backups: usize) -> FileConfig {
        FileConfig {
            path: path.to_string_lossy().into_owned(),
            max_size_bytes,
            max_backups,
            layout: None,
        }
    }

    fn event(reason: &str) -> Event {
        Event {
            reason: reason.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_file_sink_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let mut sink = FileSink::new("test_file", &config(&path, 1 << 20, 3)).unwrap();

        assert!(sink.deliver(&event("Started")).await.is_delivered());
        assert!(sink.deliver(&event("Killing")).await.is_delivered());
        sink.release().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Event> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].reason, "Killing");
    }

    #[tokio::test]
    async fn test_file_sink_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut cfg = config(&path, 1 << 20, 1);
        cfg.layout = Some(json!({ "r": "{{ .reason }}" }));
        let mut sink = FileSink::new("layout", &cfg).unwrap();

        sink.deliver(&event("BackOff")).await;
        sink.release().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"r\":\"BackOff\"}\n");
    }

    #[tokio::test]
    async fn test_file_sink_rotation_keeps_bounded_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        // every line is larger than the limit, so each write rotates
        let mut sink = FileSink::new("rotate", &config(&path, 10, 2)).unwrap();

        for reason in ["a", "b", "c", "d"] {
            assert!(sink.deliver(&event(reason)).await.is_delivered());
        }
        sink.release().await.unwrap();

        let read = |p: PathBuf| -> Event {
            serde_json::from_str(std::fs::read_to_string(p).unwrap().trim()).unwrap()
        };
        assert_eq!(read(path.clone()).reason, "d");
        assert_eq!(read(sink.backup_path(1)).reason, "c");
        assert_eq!(read(sink.backup_path(2)).reason, "b");
        assert!(!sink.backup_path(3).exists());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut sink = FileSink::new("idem", &config(&dir.path().join("e.jsonl"), 100, 1)).unwrap();
        sink.release().await.unwrap();
        sink.release().await.unwrap();
    }
}
