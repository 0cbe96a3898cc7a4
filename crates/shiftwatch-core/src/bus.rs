//! Broadcast channel for engine events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. Each published [`Event`] is
//! stamped with a sequence number; numbering and sending happen under one
//! lock, so receivers see `seq` strictly increasing.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::events::{Envelope, Event};

#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
    next_seq: Arc<Mutex<u64>>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_seq: Arc::new(Mutex::new(1)),
        }
    }

    /// Publish to every current subscriber. Returns the assigned sequence number.
    ///
    /// Having no subscribers is not an error.
    pub fn publish(&self, event: Event) -> u64 {
        let mut next = match self.next_seq.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let seq = *next;
        *next += 1;
        let _ = self.tx.send(Envelope { seq, event });
        seq
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
