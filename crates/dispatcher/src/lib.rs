//! # Dispatcher
//!
//! Event dispatch engine.
//!
//! - Routes each event to its destination set via the route table
//! - One bounded queue and delivery worker per destination, so a slow or
//!   failing destination never stalls the others
//! - Retries with capped exponential backoff, drains and releases sinks on
//!   shutdown

pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod handle;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod routing;
pub mod sinks;
pub mod template;

pub use contracts::{Event, EventHandler, EventSink};
pub use dispatcher::{
    DispatchReport, Dispatcher, DispatcherBuilder, EngineStats, ShutdownReport, create_dispatcher,
};
pub use error::DispatcherError;
pub use factory::SinkFactory;
pub use handle::{SinkHandle, SinkReport};
pub use self::metrics::{MetricsSnapshot, SinkMetrics, WorkerState};
pub use queue::{DeliveryQueue, EnqueueOutcome};
pub use retry::Backoff;
pub use routing::RouteTable;
pub use sinks::{BuiltSink, InMemorySink, InMemoryStore};
