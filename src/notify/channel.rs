// src/notify/channel.rs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::BoxFuture;

use super::{Event, NotificationSink, ObserverId};

/// In-process sink fanning events out to subscribed mpsc receivers.
///
/// Sends never wait: an observer whose buffer is full misses the event, and
/// an observer whose receiver was dropped is unsubscribed.
#[derive(Debug)]
pub struct ChannelSink {
    observers: Mutex<BTreeMap<ObserverId, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Register a new observer and return its handle and event receiver.
    pub fn subscribe(&self) -> (ObserverId, mpsc::Receiver<Event>) {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().insert(id, tx);
        debug!(%id, "observer subscribed");
        (id, rx)
    }

    pub fn unsubscribe(&self, observer: ObserverId) -> bool {
        self.lock().remove(&observer).is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ObserverId, mpsc::Sender<Event>>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to deliver; returns `false` if the observer is gone.
    fn deliver(id: ObserverId, tx: &mpsc::Sender<Event>, event: Event) -> bool {
        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(%id, kind = event.kind.tag(), "observer buffer full; dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl Default for ChannelSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl NotificationSink for ChannelSink {
    fn broadcast(&self, event: Event) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut observers = self.lock();
            let mut closed = Vec::new();

            for (id, tx) in observers.iter() {
                if !Self::deliver(*id, tx, event.clone()) {
                    closed.push(*id);
                }
            }

            for id in closed {
                debug!(%id, "observer closed; unsubscribing");
                observers.remove(&id);
            }
        })
    }

    fn send_to(&self, observer: ObserverId, event: Event) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut observers = self.lock();

            let Some(tx) = observers.get(&observer) else {
                warn!(
                    %observer,
                    kind = event.kind.tag(),
                    "targeted event for unknown observer; dropping"
                );
                return;
            };

            if !Self::deliver(observer, tx, event) {
                debug!(%observer, "observer closed; unsubscribing");
                observers.remove(&observer);
            }
        })
    }
}
