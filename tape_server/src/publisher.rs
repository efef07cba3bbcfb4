//! Price update fan-out.
//!
//! The `UpdatePublisher` hands every published `UpdateEvent` to all current subscribers
//! over `crossbeam_channel`. Subscribers register with `subscribe` and read from the
//! returned receiver at their own pace.
//!
//! Event model:
//! - `UpdateEvent::Price(PriceUpdate)`: one successful lookup.
//! - `UpdateEvent::Shutdown`: signal for consumers to terminate gracefully.
//!
//! Delivery notes:
//! - Publishing holds the subscriber list lock for the whole fan-out, so every
//!   subscriber sees events in the same order they were published.
//! - Nothing is coalesced: one event per published update.
//! - Best-effort: a subscriber whose receiver was dropped is removed on the next publish.

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::debug;
use tape_common::PriceUpdate;

/// Message delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    /// New price for a particular symbol.
    Price(PriceUpdate),
    /// Global shutdown notification for all consumers.
    Shutdown,
}

/// Fan-out point between the scheduler and its observers.
#[derive(Debug, Default)]
pub struct UpdatePublisher {
    subscribers: Mutex<Vec<Sender<UpdateEvent>>>,
}

impl UpdatePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its event stream.
    pub fn subscribe(&self) -> Receiver<UpdateEvent> {
        let (tx, rx) = unbounded();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.push(tx);
        debug!("Publisher: new subscriber. Total subscribers: {}", subscribers.len());
        rx
    }

    /// Delivers `update` to every subscriber.
    pub fn publish(&self, update: PriceUpdate) {
        self.broadcast(UpdateEvent::Price(update));
    }

    /// Tells every subscriber to stop.
    pub fn shutdown(&self) {
        self.broadcast(UpdateEvent::Shutdown);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn broadcast(&self, event: UpdateEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.len() != before {
            debug!(
                "Publisher: dropped {} disconnected subscriber(s)",
                before - subscribers.len()
            );
        }
    }
}
