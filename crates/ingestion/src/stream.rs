//! JSON-lines event source
//!
//! Reads one JSON document per line, as produced by
//! `kubectl get events -w -o json | jq -c .`. Accepted shapes:
//! - a bare Event object
//! - a watch envelope `{"type": "ADDED", "object": {...}}`; deletions and
//!   bookmarks are skipped
//! - a list `{"items": [...]}`, emitted item by item

use std::path::Path;

use contracts::{ContractError, Event, EventHandler, EventSource};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{IngestionMetrics, MetricsSnapshot};
use crate::error::{IngestionError, Result};

/// What one line turned into
#[derive(Debug)]
enum Record {
    Events(Vec<Event>),
    Skipped(&'static str),
}

fn parse_line(line: &str) -> std::result::Result<Record, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;

    if let (Some(kind), Some(object)) = (
        value.get("type").and_then(Value::as_str),
        value.get("object"),
    ) {
        return match kind {
            "ADDED" | "MODIFIED" => Ok(Record::Events(vec![serde_json::from_value(object.clone())?])),
            "DELETED" => Ok(Record::Skipped("deleted")),
            "BOOKMARK" => Ok(Record::Skipped("bookmark")),
            _ => Ok(Record::Skipped("unknown watch event")),
        };
    }

    if let Some(items) = value.get("items").and_then(Value::as_array) {
        let events = items
            .iter()
            .map(|item| serde_json::from_value(item.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        return Ok(Record::Events(events));
    }

    Ok(Record::Events(vec![serde_json::from_value(value)?]))
}

/// Event source over any buffered async reader
pub struct StreamEventSource<R> {
    name: String,
    reader: R,
    metrics: IngestionMetrics,
}

impl StreamEventSource<BufReader<Stdin>> {
    /// Read events from standard input
    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(tokio::io::stdin()))
    }
}

impl StreamEventSource<BufReader<File>> {
    /// Read events from a file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|source| IngestionError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(path.display().to_string(), BufReader::new(file)))
    }
}

impl<R> StreamEventSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        let name = name.into();
        Self {
            metrics: IngestionMetrics::new(&name),
            name,
            reader,
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn pump<H>(&mut self, handler: &H) -> Result<u64>
    where
        H: EventHandler + Sync,
    {
        let mut emitted = 0u64;
        let mut line_no = 0u64;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|source| IngestionError::Read {
                    source_name: self.name.clone(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    self.metrics.record_malformed();
                    warn!(source = %self.name, line = line_no, error = %e, "Non UTF-8 record skipped");
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match parse_line(trimmed) {
                Ok(Record::Events(events)) => {
                    for event in events {
                        trace!(line = line_no, event_id = %event.id(), "Event read");
                        self.metrics.record_emitted();
                        handler.on_event(event).await;
                        emitted += 1;
                    }
                }
                Ok(Record::Skipped(why)) => {
                    self.metrics.record_skipped();
                    debug!(line = line_no, why, "Record skipped");
                }
                Err(e) => {
                    self.metrics.record_malformed();
                    warn!(source = %self.name, line = line_no, error = %e, "Malformed record skipped");
                }
            }
        }
        Ok(emitted)
    }
}

impl<R> EventSource for StreamEventSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "stream_source_run", skip(self, handler), fields(source = %self.name))]
    async fn run<H>(&mut self, handler: &H) -> std::result::Result<u64, ContractError>
    where
        H: EventHandler + Sync,
    {
        info!("Stream source started");
        let emitted = self.pump(handler).await?;
        let snapshot = self.metrics.snapshot();
        info!(
            emitted,
            malformed = snapshot.malformed,
            skipped = snapshot.skipped,
            "Stream source exhausted"
        );
        Ok(emitted)
    }
}
