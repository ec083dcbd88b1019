use std::{collections::BTreeSet, sync::Arc};

use futures::StreamExt;
use kube::{
    api::Api,
    runtime::{watcher, watcher::Config},
    Client,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{
    cache::MemoryResourceCache,
    common::{ChangeType, ResourceEvent, ResourceKey},
    resources::GatewayRoute,
};

/// Mirrors route resources into the cache and turns watch notifications
/// into reconciliation events. Runs until the watch stream ends.
#[derive(TypedBuilder)]
pub struct RouteWatcherService {
    client: Client,
    cache: Arc<MemoryResourceCache>,
    event_sender: mpsc::Sender<ResourceEvent>,
}

impl RouteWatcherService {
    pub async fn start(self) -> crate::Result<()> {
        let api: Api<GatewayRoute> = Api::all(self.client.clone());
        let stream = watcher(api, Config::default());
        futures::pin_mut!(stream);
        info!("route watcher started");

        // Keys seen during the current relist. Entries the relist did not
        // revisit were deleted while the watch was down.
        let mut relisted: Option<BTreeSet<ResourceKey>> = None;

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Apply(route)) => {
                    let key = ResourceKey::from(&route);
                    self.cache.upsert_route(key.clone(), route);
                    self.send(key, ChangeType::Update).await;
                }
                Ok(watcher::Event::InitApply(route)) => {
                    let key = ResourceKey::from(&route);
                    if let Some(relisted) = relisted.as_mut() {
                        relisted.insert(key.clone());
                    }
                    self.cache.upsert_route(key.clone(), route);
                    self.send(key, ChangeType::Add).await;
                }
                Ok(watcher::Event::Delete(route)) => {
                    let key = ResourceKey::from(&route);
                    debug!("route {key} deleted");
                    self.cache.remove_route(&key);
                    self.send(key, ChangeType::Delete).await;
                }
                Ok(watcher::Event::Init) => {
                    debug!("route relist started");
                    relisted = Some(BTreeSet::new());
                }
                Ok(watcher::Event::InitDone) => {
                    let relisted = relisted.take().unwrap_or_default();
                    for key in self.cache.route_keys() {
                        if !relisted.contains(&key) {
                            debug!("route {key} vanished during relist");
                            self.cache.remove_route(&key);
                            self.send(key, ChangeType::Delete).await;
                        }
                    }
                    info!("route watcher synchronized, {} routes", relisted.len());
                    self.cache.mark_ready();
                }
                Err(error) => warn!("route watcher error: {error}"),
            }
        }
        Ok(())
    }

    async fn send(&self, key: ResourceKey, change_type: ChangeType) {
        if self.event_sender.send(ResourceEvent { key, change_type }).await.is_err() {
            warn!("event channel closed, dropping route notification");
        }
    }
}
