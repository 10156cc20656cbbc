//! Dispatcher - routes events to per-destination workers

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use contracts::{DispatchSettings, Event, EventHandler, EventSink, ExporterConfig};
use futures::future::join_all;
use metrics::counter;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace};

use crate::error::DispatcherError;
use crate::factory::SinkFactory;
use crate::handle::{SinkHandle, SinkReport};
use crate::metrics::MetricsSnapshot;
use crate::queue::EnqueueOutcome;
use crate::routing::RouteTable;

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: ExporterConfig,
    factory: SinkFactory,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: ExporterConfig) -> Self {
        Self {
            config,
            factory: SinkFactory::default(),
        }
    }

    /// Use `factory` to construct sinks (keeps access to its in-memory stores)
    pub fn sink_factory(mut self, factory: SinkFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Build every sink and start its worker
    ///
    /// Fails without starting anything when a receiver is duplicated, a
    /// route is invalid, or a sink cannot be constructed.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(receivers = self.config.receivers.len(), routes = self.config.routes.len())
    )]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let mut names = HashSet::new();
        for receiver in &self.config.receivers {
            if !names.insert(receiver.name.as_str()) {
                return Err(DispatcherError::DuplicateReceiver {
                    name: receiver.name.clone(),
                });
            }
        }

        let routes = RouteTable::compile(&self.config.routes, names.iter().copied())?;

        let mut sinks = Vec::with_capacity(self.config.receivers.len());
        for receiver in &self.config.receivers {
            let settings = self
                .config
                .dispatch
                .with_overrides(receiver.delivery.as_ref());
            sinks.push((self.factory.build(receiver)?, settings));
        }

        let force_stop = CancellationToken::new();
        let handles = sinks
            .into_iter()
            .map(|(sink, settings)| spawn_handle(sink, settings, &force_stop))
            .collect();

        let dispatcher = Dispatcher::assemble(
            handles,
            routes,
            self.config.dispatch.drain_timeout(),
            force_stop,
        );
        info!(
            sinks = dispatcher.handles.len(),
            routes = dispatcher.routes.len(),
            "Dispatcher started"
        );
        Ok(dispatcher)
    }
}

fn spawn_handle<S: EventSink + 'static>(
    sink: S,
    settings: DispatchSettings,
    force_stop: &CancellationToken,
) -> SinkHandle {
    debug!(sink = %sink.name(), kind = %sink.kind(), capacity = settings.queue_capacity, "Spawning sink worker");
    SinkHandle::spawn(sink, settings, force_stop.child_token())
}

/// Per-event routing result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Enqueue outcome per matched destination, in routing order
    pub outcomes: Vec<(String, EnqueueOutcome)>,
}

impl DispatchReport {
    /// No route matched the event
    pub fn is_unrouted(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Destinations whose queue accepted the event
    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_accepted()).count()
    }
}

/// Engine-level counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub received: u64,
    pub unrouted: u64,
    /// Destination enqueues accepted (one event may count several times)
    pub enqueued: u64,
}

#[derive(Debug, Default)]
struct EngineCounters {
    received: AtomicU64,
    unrouted: AtomicU64,
    enqueued: AtomicU64,
}

/// Result of [`Dispatcher::stop`]
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub stats: EngineStats,
    /// One entry per destination, in configuration order
    pub sinks: Vec<SinkReport>,
    pub elapsed: Duration,
}

impl ShutdownReport {
    /// Destinations that had to be force-stopped
    pub fn forced(&self) -> impl Iterator<Item = &SinkReport> {
        self.sinks.iter().filter(|s| s.forced)
    }

    pub fn delivered_total(&self) -> u64 {
        self.sinks.iter().map(|s| s.metrics.delivered).sum()
    }

    pub fn dropped_total(&self) -> u64 {
        self.sinks.iter().map(|s| s.metrics.dropped_total()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.sinks.iter().all(|s| !s.forced && s.released)
    }
}

/// The dispatch engine
///
/// The route table and the name to worker mapping are fixed once built;
/// `dispatch` may be called concurrently.
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    index: HashMap<String, usize>,
    routes: RouteTable,
    counters: EngineCounters,
    drain_timeout: Duration,
    force_stop: CancellationToken,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    ///
    /// Handles should be spawned with a child of a token the caller keeps
    /// if force-stop is expected to reach them.
    pub fn with_handles(handles: Vec<SinkHandle>, routes: RouteTable) -> Self {
        Self::assemble(
            handles,
            routes,
            DispatchSettings::default().drain_timeout(),
            CancellationToken::new(),
        )
    }

    fn assemble(
        handles: Vec<SinkHandle>,
        routes: RouteTable,
        drain_timeout: Duration,
        force_stop: CancellationToken,
    ) -> Self {
        let index = handles
            .iter()
            .enumerate()
            .map(|(i, h)| (h.name().to_string(), i))
            .collect();
        Self {
            handles,
            index,
            routes,
            counters: EngineCounters::default(),
            drain_timeout,
            force_stop,
        }
    }

    /// Names of the configured destinations
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(|h| h.name())
    }

    /// Route one event and enqueue it to every matching destination
    ///
    /// Enqueues run concurrently, so blocking destinations cost the longest
    /// block timeout rather than their sum. Returns once every enqueue
    /// finished; delivery happens on the destination workers.
    pub async fn dispatch(&self, event: Event) -> DispatchReport {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        counter!("event_exporter_events_received_total").increment(1);

        let destinations = self.routes.destinations_for(&event);
        if destinations.is_empty() {
            self.counters.unrouted.fetch_add(1, Ordering::Relaxed);
            counter!("event_exporter_events_unrouted_total").increment(1);
            trace!(event_id = %event.id(), reason = %event.reason, "No route matched");
            return DispatchReport::default();
        }

        let event = Arc::new(event);
        let enqueues = destinations.into_iter().filter_map(|name| {
            // route names were checked against the receivers at build time
            let Some(handle) = self.index.get(name).map(|&i| &self.handles[i]) else {
                error!(sink = %name, "Route references a destination without a worker");
                return None;
            };
            let event = Arc::clone(&event);
            Some(async move { (name.to_string(), handle.enqueue(event).await) })
        });
        let outcomes = join_all(enqueues).await;

        let accepted = outcomes.iter().filter(|(_, o)| o.is_accepted()).count() as u64;
        self.counters.enqueued.fetch_add(accepted, Ordering::Relaxed);
        DispatchReport { outcomes }
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            received: self.counters.received.load(Ordering::Relaxed),
            unrouted: self.counters.unrouted.load(Ordering::Relaxed),
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
        }
    }

    /// Drain and stop with the configured grace period
    pub async fn stop(self) -> ShutdownReport {
        let grace = self.drain_timeout;
        self.stop_with_grace(grace).await
    }

    /// Close every queue, wait up to `grace` for the workers to drain, then
    /// force-stop the rest
    ///
    /// Every sink is released exactly once, whichever way its worker ends.
    #[instrument(name = "dispatcher_stop", skip(self), fields(sinks = self.handles.len()))]
    pub async fn stop_with_grace(self, grace: Duration) -> ShutdownReport {
        let started = Instant::now();
        let deadline = started + grace;
        let stats = self.stats();

        for handle in &self.handles {
            handle.begin_drain();
        }
        info!(grace_ms = grace.as_millis() as u64, "Dispatcher draining");

        let mut stopping = JoinSet::new();
        for (i, handle) in self.handles.into_iter().enumerate() {
            stopping.spawn(async move { (i, handle.stop_at(deadline).await) });
        }

        let mut sinks = Vec::with_capacity(stopping.len());
        while let Some(joined) = stopping.join_next().await {
            match joined {
                Ok(entry) => sinks.push(entry),
                Err(e) => error!(error = ?e, "Sink shutdown task failed"),
            }
        }
        sinks.sort_by_key(|(i, _)| *i);
        // the handles' tokens are children; nothing may outlive the engine
        self.force_stop.cancel();

        let report = ShutdownReport {
            stats,
            sinks: sinks.into_iter().map(|(_, report)| report).collect(),
            elapsed: started.elapsed(),
        };
        info!(
            delivered = report.delivered_total(),
            dropped = report.dropped_total(),
            forced = report.forced().count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Dispatcher shutdown complete"
        );
        report
    }
}

impl EventHandler for Dispatcher {
    async fn on_event(&self, event: Event) {
        self.dispatch(event).await;
    }
}

/// Convenience function to create a dispatcher from the exporter config
#[instrument(name = "dispatcher_create", skip(config))]
pub async fn create_dispatcher(config: ExporterConfig) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(config).build().await
}
