use std::{
    collections::BTreeSet,
    sync::Arc,
    time::Duration,
};

use futures::{future::BoxFuture, FutureExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use super::{status::StatusUpdate, work_queue::WorkQueue};
use crate::{
    cache::{MemoryResourceCache, ReferenceIndex, ResourceCache},
    common::{ResourceEvent, ResourceKey, SyncStatus, ROUTE_KIND, SECRET_KIND},
    differ,
    state::LocalStateStore,
    sync::SyncEngine,
    translator::Translator,
};

/// Event-driven reconciler: coalesces change notifications into the work
/// queue and runs full translate/diff/apply passes on a bounded worker
/// pool. Different keys reconcile in parallel; the queue guarantees one
/// pass per key.
#[derive(TypedBuilder)]
pub struct ReconcilerService {
    event_receiver: mpsc::Receiver<ResourceEvent>,
    queue: Arc<WorkQueue>,
    cache: Arc<MemoryResourceCache>,
    references: Arc<ReferenceIndex>,
    translator: Arc<Translator>,
    sync_engine: Arc<SyncEngine>,
    state: LocalStateStore,
    status_sender: mpsc::Sender<StatusUpdate>,
    #[builder(default = 4)]
    workers: usize,
    #[builder(default = Duration::from_secs(60))]
    cache_warm_timeout: Duration,
    #[builder(default = Duration::from_secs(30))]
    resync_period: Duration,
}

impl ReconcilerService {
    pub async fn start(self) -> crate::Result<()> {
        let ReconcilerService {
            mut event_receiver,
            queue,
            cache,
            references,
            translator,
            sync_engine,
            state,
            status_sender,
            workers,
            cache_warm_timeout,
            resync_period,
        } = self;

        let pass = Arc::new(PassContext {
            queue,
            cache,
            references,
            translator,
            sync_engine,
            state,
            status_sender,
            failed: Mutex::new(BTreeSet::new()),
        });

        // Dispatch drains events from the very start. The watchers emit one
        // event per initial listing entry before they announce their sync, so
        // a dispatch loop gated on readiness would let a large listing fill
        // the channel and hold the barrier hostage.
        let dispatch_pass = Arc::clone(&pass);
        let dispatch = tokio::spawn(async move {
            while let Some(event) = event_receiver.recv().await {
                dispatch_pass.dispatch(event).await;
            }
        });

        // Refusing to reconcile against a cold mirror beats answering from
        // empty data; a cache that never warms is a startup failure.
        pass.cache.wait_ready(cache_warm_timeout).await?;
        info!("reconciler starting with {workers} workers");

        let mut tasks: Vec<BoxFuture<()>> = Vec::new();
        for worker in 0..workers {
            let pass = Arc::clone(&pass);
            tasks.push(
                async move {
                    debug!("worker {worker} started");
                    loop {
                        let key = pass.queue.next().await;
                        pass.run_pass(&key).await;
                        pass.queue.done(&key);
                    }
                }
                .boxed(),
            );
        }

        let resync_pass = Arc::clone(&pass);
        tasks.push(
            async move {
                let mut interval = tokio::time::interval(resync_period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let failed = resync_pass.failed.lock().await.clone();
                    for key in failed {
                        debug!("resync requeue of {key}");
                        resync_pass.queue.enqueue(key);
                    }
                }
            }
            .boxed(),
        );

        futures::future::join_all(tasks).await;
        dispatch.abort();
        Ok(())
    }
}

pub(crate) struct PassContext {
    pub queue: Arc<WorkQueue>,
    pub cache: Arc<MemoryResourceCache>,
    pub references: Arc<ReferenceIndex>,
    pub translator: Arc<Translator>,
    pub sync_engine: Arc<SyncEngine>,
    pub state: LocalStateStore,
    pub status_sender: mpsc::Sender<StatusUpdate>,
    pub failed: Mutex<BTreeSet<ResourceKey>>,
}

impl PassContext {
    /// Routes enqueue themselves; secrets enqueue every owner whose TLS
    /// bindings reference them, which is how a late-appearing secret
    /// re-triggers translation without polling.
    pub async fn dispatch(&self, event: ResourceEvent) {
        debug!("event {:?} for {}", event.change_type, event.key);
        match event.key.kind.as_str() {
            ROUTE_KIND => self.queue.enqueue(event.key),
            SECRET_KIND => {
                for owner in self.references.dependents_of(&event.key).await {
                    self.queue.enqueue(owner);
                }
            }
            other => warn!("ignoring event for unwatched kind {other}"),
        }
    }

    /// One full reconciliation pass for one owner key. Always re-derives
    /// the complete desired set; a deleted owner yields an empty set and
    /// therefore an all-delete change set over its recorded ids.
    pub async fn run_pass(&self, key: &ResourceKey) {
        let route = self.cache.get_route(key);
        let owner_exists = route.is_some();

        let desired = match route {
            Some(route) => {
                let secrets: BTreeSet<ResourceKey> = Translator::secret_dependencies(&route).collect();
                self.references.set_dependencies(key, secrets).await;
                match self.translator.translate(&route) {
                    Ok(objects) => objects,
                    Err(error) => {
                        warn!("translation for {key} failed: {error}");
                        self.mark_failed(key, true).await;
                        self.send_status(key, SyncStatus::SyncFailed(error.to_string())).await;
                        return;
                    }
                }
            }
            None => {
                self.references.remove_owner(key).await;
                Vec::new()
            }
        };

        let view = self.state.view().await;
        let change_set = differ::diff(key, desired, &view);
        if change_set.is_empty() {
            debug!("{key} already converged");
            self.mark_failed(key, false).await;
            if owner_exists {
                self.send_status(key, SyncStatus::Synced).await;
            }
            return;
        }

        let report = self.sync_engine.apply_unless(key, change_set, || self.queue.superseded(key)).await;
        let status = report.status();
        info!("pass for {key}: {}/{} applied, status {status}", report.applied(), report.items.len());

        self.mark_failed(key, matches!(status, SyncStatus::SyncFailed(_))).await;
        if owner_exists {
            self.send_status(key, status).await;
        }
    }

    async fn send_status(&self, key: &ResourceKey, status: SyncStatus) {
        let _ = self
            .status_sender
            .send(StatusUpdate {
                owner: key.clone(),
                status,
            })
            .await;
    }

    async fn mark_failed(&self, key: &ResourceKey, failed: bool) {
        let mut set = self.failed.lock().await;
        if failed {
            set.insert(key.clone());
        } else {
            set.remove(key);
        }
    }
}
