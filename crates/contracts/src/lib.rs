//! # Contracts
//!
//! Shared interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Data Flow
//! - `EventSource` pushes [`Event`]s into an `EventHandler` (the dispatcher)
//! - The dispatcher routes each event to named receivers, one `EventSink` per receiver

mod config;
mod destination;
mod error;
mod event;
mod sink;
mod source;

pub use config::*;
pub use destination::*;
pub use error::*;
pub use event::*;
pub use sink::*;
pub use source::{EventHandler, EventSource, LocalEventHandler, LocalEventSource};
