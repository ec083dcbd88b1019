use std::{
    collections::{HashSet, VecDeque},
    sync::Mutex,
};

use tokio::sync::Notify;

use crate::common::ResourceKey;

/// Set-backed dedup queue keyed by owning-resource identity. A key already
/// queued collapses re-enqueues; a key being worked on is marked dirty and
/// re-queued when its pass finishes, so at most one pass per key is ever in
/// flight.
#[derive(Default)]
pub struct WorkQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

#[derive(Default)]
struct Inner {
    order: VecDeque<ResourceKey>,
    queued: HashSet<ResourceKey>,
    in_flight: HashSet<ResourceKey>,
    dirty: HashSet<ResourceKey>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, key: ResourceKey) {
        {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            if inner.queued.contains(&key) {
                return;
            }
            if inner.in_flight.contains(&key) {
                inner.dirty.insert(key);
                return;
            }
            inner.queued.insert(key.clone());
            inner.order.push_back(key);
        }
        self.notify.notify_one();
    }

    /// Waits for the next key and marks it in flight.
    pub async fn next(&self) -> ResourceKey {
        loop {
            let notified = self.notify.notified();
            if let Some(key) = self.try_next() {
                return key;
            }
            notified.await;
        }
    }

    fn try_next(&self) -> Option<ResourceKey> {
        let mut inner = self.inner.lock().expect("queue lock poisoned");
        let key = inner.order.pop_front()?;
        inner.queued.remove(&key);
        inner.in_flight.insert(key.clone());
        Some(key)
    }

    /// True when a newer change arrived for a key whose pass is running;
    /// the running pass should abandon and let the replacement re-derive.
    pub fn superseded(&self, key: &ResourceKey) -> bool {
        self.inner.lock().expect("queue lock poisoned").dirty.contains(key)
    }

    /// Finishes a pass; a dirty key goes straight back on the queue.
    pub fn done(&self, key: &ResourceKey) {
        let requeue = {
            let mut inner = self.inner.lock().expect("queue lock poisoned");
            inner.in_flight.remove(key);
            if inner.dirty.remove(key) {
                inner.queued.insert(key.clone());
                inner.order.push_back(key.clone());
                true
            } else {
                false
            }
        };
        if requeue {
            self.notify.notify_one();
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").order.len()
    }
}
