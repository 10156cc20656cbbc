//! EventSource trait - Event source abstraction
//!
//! The platform watch lives outside this workspace; sources push each event
//! into an [`EventHandler`] (the dispatcher in production).

use crate::{ContractError, Event};

/// Receiver side of the push interface
///
/// Must tolerate concurrent calls from several producers.
#[trait_variant::make(EventHandler: Send)]
pub trait LocalEventHandler {
    /// Accept one event
    async fn on_event(&self, event: Event);
}

/// Event source trait
///
/// `run` pushes events until the source is exhausted. Dropping the future
/// stops the source, which is how the process stops producing on shutdown.
#[trait_variant::make(EventSource: Send)]
pub trait LocalEventSource {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Push events into `handler`, returning the number of events produced
    async fn run<H>(&mut self, handler: &H) -> Result<u64, ContractError>
    where
        H: EventHandler + Sync;
}
