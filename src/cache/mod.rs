use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};

use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;

use crate::{common::ResourceKey, resources::GatewayRoute};

#[derive(Debug, Error)]
#[error("resource cache did not become ready within {0:?}")]
pub struct CacheNotReady(pub Duration);

/// Read-only view of the cluster mirror the translator resolves lookups
/// against. Injected so the core is testable with a fixture-populated cache.
pub trait ResourceCache: Send + Sync {
    fn get_route(&self, key: &ResourceKey) -> Option<Arc<GatewayRoute>>;
    fn get_secret(&self, key: &ResourceKey) -> Option<Arc<Secret>>;
    fn list_secrets(&self, namespace: &str) -> Vec<Arc<Secret>>;
}

/// Local mirror of watched resources, kept current by the controllers.
/// Reads before the initial watch synchronization are held back by the
/// readiness barrier rather than answered with empty data.
pub struct MemoryResourceCache {
    routes: RwLock<BTreeMap<ResourceKey, Arc<GatewayRoute>>>,
    secrets: RwLock<BTreeMap<ResourceKey, Arc<Secret>>>,
    pending_syncs: AtomicUsize,
    ready: AtomicBool,
    ready_notify: Notify,
}

impl Default for MemoryResourceCache {
    fn default() -> Self {
        Self::expecting(1)
    }
}

impl MemoryResourceCache {
    /// A cache fed by several watchers is ready once each of them finished
    /// its initial listing.
    pub fn expecting(initial_syncs: usize) -> Self {
        Self {
            routes: RwLock::default(),
            secrets: RwLock::default(),
            pending_syncs: AtomicUsize::new(initial_syncs.max(1)),
            ready: AtomicBool::new(false),
            ready_notify: Notify::new(),
        }
    }

    pub fn upsert_route(&self, key: ResourceKey, route: GatewayRoute) {
        self.routes.write().expect("cache lock poisoned").insert(key, Arc::new(route));
    }

    pub fn remove_route(&self, key: &ResourceKey) {
        self.routes.write().expect("cache lock poisoned").remove(key);
    }

    pub fn upsert_secret(&self, key: ResourceKey, secret: Secret) {
        self.secrets.write().expect("cache lock poisoned").insert(key, Arc::new(secret));
    }

    pub fn remove_secret(&self, key: &ResourceKey) {
        self.secrets.write().expect("cache lock poisoned").remove(key);
    }

    pub fn route_keys(&self) -> Vec<ResourceKey> {
        self.routes.read().expect("cache lock poisoned").keys().cloned().collect()
    }

    pub fn secret_keys(&self) -> Vec<ResourceKey> {
        self.secrets.read().expect("cache lock poisoned").keys().cloned().collect()
    }

    /// Records one completed initial sync. Watcher restarts re-announce
    /// their sync; once ready the cache stays ready.
    pub fn mark_ready(&self) {
        if self.is_ready() {
            return;
        }
        let remaining = self
            .pending_syncs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| pending.checked_sub(1))
            .unwrap_or(1);
        if remaining <= 1 {
            self.ready.store(true, Ordering::SeqCst);
            debug!("resource cache ready");
            self.ready_notify.notify_waiters();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Blocks until the initial synchronization happened. Bounded: a cache
    /// that never warms up is a startup failure, not an empty answer.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), CacheNotReady> {
        if self.is_ready() {
            return Ok(());
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.ready_notify.notified();
            if self.is_ready() {
                return Ok(());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(CacheNotReady(timeout));
            }
            if self.is_ready() {
                return Ok(());
            }
        }
    }
}

impl ResourceCache for MemoryResourceCache {
    fn get_route(&self, key: &ResourceKey) -> Option<Arc<GatewayRoute>> {
        self.routes.read().expect("cache lock poisoned").get(key).cloned()
    }

    fn get_secret(&self, key: &ResourceKey) -> Option<Arc<Secret>> {
        self.secrets.read().expect("cache lock poisoned").get(key).cloned()
    }

    fn list_secrets(&self, namespace: &str) -> Vec<Arc<Secret>> {
        self.secrets
            .read()
            .expect("cache lock poisoned")
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .map(|(_, secret)| Arc::clone(secret))
            .collect()
    }
}

/// Secret to owners reverse index. A late-appearing or edited secret
/// re-triggers exactly the owners whose TLS bindings reference it.
#[derive(Default)]
pub struct ReferenceIndex {
    inner: tokio::sync::Mutex<ReferenceMaps>,
}

#[derive(Default)]
struct ReferenceMaps {
    dependents: BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
    dependencies: BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the owner's declared secret references.
    pub async fn set_dependencies(&self, owner: &ResourceKey, secrets: BTreeSet<ResourceKey>) {
        let mut maps = self.inner.lock().await;
        if let Some(previous) = maps.dependencies.remove(owner) {
            for secret in previous {
                if let Some(owners) = maps.dependents.get_mut(&secret) {
                    owners.remove(owner);
                    if owners.is_empty() {
                        maps.dependents.remove(&secret);
                    }
                }
            }
        }
        for secret in &secrets {
            maps.dependents.entry(secret.clone()).or_default().insert(owner.clone());
        }
        if !secrets.is_empty() {
            maps.dependencies.insert(owner.clone(), secrets);
        }
    }

    pub async fn remove_owner(&self, owner: &ResourceKey) {
        self.set_dependencies(owner, BTreeSet::new()).await;
    }

    pub async fn dependents_of(&self, secret: &ResourceKey) -> BTreeSet<ResourceKey> {
        self.inner.lock().await.dependents.get(secret).cloned().unwrap_or_default()
    }
}
