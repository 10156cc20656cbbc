//! InMemorySink - keeps every delivered event in a shared list
//!
//! Test-only destination. Retention is unbounded, so it must never be used
//! in production.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{ContractError, DeliveryOutcome, Event, EventSink, SinkKind};
use tokio::sync::Notify;
use tracing::instrument;

#[derive(Debug, Default)]
struct StoreInner {
    events: Mutex<Vec<Event>>,
    releases: AtomicU64,
    changed: Notify,
}

/// Observable side of an in-memory destination
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far, in delivery order
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of times the owning sink was released
    pub fn release_count(&self) -> u64 {
        self.inner.releases.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` events were received
    pub async fn wait_for(&self, count: usize) {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if self.len() >= count {
                return;
            }
            changed.await;
        }
    }

    fn push(&self, event: Event) {
        self.lock().push(event);
        self.inner.changed.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Sink appending to an [`InMemoryStore`]
pub struct InMemorySink {
    name: String,
    store: InMemoryStore,
    released: bool,
}

impl InMemorySink {
    pub fn new(name: impl Into<String>, store: InMemoryStore) -> Self {
        Self {
            name: name.into(),
            store,
            released: false,
        }
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }
}

impl EventSink for InMemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkKind {
        SinkKind::InMemory
    }

    #[instrument(
        name = "in_memory_sink_deliver",
        skip(self, event),
        fields(sink = %self.name)
    )]
    async fn deliver(&mut self, event: &Event) -> DeliveryOutcome {
        if self.released {
            return DeliveryOutcome::Fatal("sink released".to_string());
        }
        self.store.push(event.clone());
        DeliveryOutcome::Delivered
    }

    async fn release(&mut self) -> Result<(), ContractError> {
        if !self.released {
            self.released = true;
            self.store.inner.releases.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_sink_records_events() {
        let store = InMemoryStore::new();
        let mut sink = InMemorySink::new("mem", store.clone());

        let event = Event {
            reason: "Started".into(),
            ..Default::default()
        };
        assert!(sink.deliver(&event).await.is_delivered());
        store.wait_for(1).await;
        assert_eq!(store.events()[0].reason, "Started");
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = InMemoryStore::new();
        let mut sink = InMemorySink::new("mem", store.clone());
        sink.release().await.unwrap();
        sink.release().await.unwrap();
        assert_eq!(store.release_count(), 1);
        assert!(matches!(
            sink.deliver(&Event::default()).await,
            DeliveryOutcome::Fatal(_)
        ));
    }
}
