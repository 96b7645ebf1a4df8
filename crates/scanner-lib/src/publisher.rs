//! Result publisher
//!
//! A single slot holding the current [`ResolvedResult`]. Every publish
//! replaces it wholesale and notifies all subscribers; nothing is queued.
//! Publications carry a generation so a result computed for an older tick
//! can never overwrite a newer one.

use crate::resolver::ResolvedResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::trace;

/// Identifies a subscription for later removal
pub type SubscriptionId = u64;

type Callback = Arc<dyn Fn(&Publication) + Send + Sync>;

/// The current result together with when and for which tick it was published
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub generation: u64,
    pub result: ResolvedResult,
    pub published_at: DateTime<Utc>,
}

impl Publication {
    fn initial() -> Self {
        Self {
            generation: 0,
            result: ResolvedResult::Empty,
            published_at: Utc::now(),
        }
    }
}

struct Inner {
    latest: Mutex<Publication>,
    subscribers: Mutex<Vec<(SubscriptionId, Callback)>>,
    /// Held across a whole publish so callbacks see publications in order
    delivery: Mutex<()>,
    next_id: AtomicU64,
    tx: watch::Sender<Publication>,
}

/// Cloneable handle to the shared result slot
#[derive(Clone)]
pub struct ResultPublisher {
    inner: Arc<Inner>,
}

impl Default for ResultPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultPublisher {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Publication::initial());
        Self {
            inner: Arc::new(Inner {
                latest: Mutex::new(Publication::initial()),
                subscribers: Mutex::new(Vec::new()),
                delivery: Mutex::new(()),
                next_id: AtomicU64::new(1),
                tx,
            }),
        }
    }

    /// Publish unconditionally as the next generation
    pub fn publish(&self, result: ResolvedResult) {
        let _delivery = self.inner.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let generation = self.latest().generation + 1;
        self.deliver(generation, result);
    }

    /// Publish for a specific tick generation.
    ///
    /// Returns `false` and leaves the slot untouched when `generation` is
    /// older than the last accepted one.
    pub fn publish_at(&self, generation: u64, result: ResolvedResult) -> bool {
        let _delivery = self.inner.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let current = self.latest().generation;
        if generation < current {
            trace!(generation, current, "Discarding stale publication");
            return false;
        }
        self.deliver(generation, result);
        true
    }

    /// Register a callback invoked on every publish, including Empty.
    ///
    /// Callbacks run on the publishing thread and must not publish.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Publication) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Most recent accepted publication
    pub fn latest(&self) -> Publication {
        self.inner
            .latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Async view of the slot for consumers that prefer to await changes
    pub fn watch(&self) -> watch::Receiver<Publication> {
        self.inner.tx.subscribe()
    }

    fn deliver(&self, generation: u64, result: ResolvedResult) {
        let publication = Publication {
            generation,
            result,
            published_at: Utc::now(),
        };

        *self.inner.latest.lock().unwrap_or_else(|e| e.into_inner()) = publication.clone();
        self.inner.tx.send_replace(publication.clone());

        let callbacks: Vec<Callback> = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in callbacks {
            callback(&publication);
        }
    }
}
