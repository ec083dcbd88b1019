use std::{collections::BTreeSet, sync::Arc};

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
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
    translator::secret_has_key_material,
};

/// Mirrors TLS-capable secrets into the cache. Secrets without certificate
/// and key entries are skipped, they can never satisfy a TLS binding and
/// would only bloat the mirror.
#[derive(TypedBuilder)]
pub struct SecretWatcherService {
    client: Client,
    cache: Arc<MemoryResourceCache>,
    event_sender: mpsc::Sender<ResourceEvent>,
}

impl SecretWatcherService {
    pub async fn start(self) -> crate::Result<()> {
        let api: Api<Secret> = Api::all(self.client.clone());
        let stream = watcher(api, Config::default());
        futures::pin_mut!(stream);
        info!("secret watcher started");

        let mut relisted: Option<BTreeSet<ResourceKey>> = None;

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Apply(secret)) => {
                    if let Some(key) = self.admit(secret, ChangeType::Update).await {
                        debug!("secret {key} updated");
                    }
                }
                Ok(watcher::Event::InitApply(secret)) => {
                    let key = self.admit(secret, ChangeType::Add).await;
                    if let (Some(relisted), Some(key)) = (relisted.as_mut(), key) {
                        relisted.insert(key);
                    }
                }
                Ok(watcher::Event::Delete(secret)) => {
                    let key = ResourceKey::from(&secret);
                    debug!("secret {key} deleted");
                    self.cache.remove_secret(&key);
                    self.send(key, ChangeType::Delete).await;
                }
                Ok(watcher::Event::Init) => {
                    debug!("secret relist started");
                    relisted = Some(BTreeSet::new());
                }
                Ok(watcher::Event::InitDone) => {
                    let relisted = relisted.take().unwrap_or_default();
                    for key in self.cache.secret_keys() {
                        if !relisted.contains(&key) {
                            debug!("secret {key} vanished during relist");
                            self.cache.remove_secret(&key);
                            self.send(key, ChangeType::Delete).await;
                        }
                    }
                    info!("secret watcher synchronized, {} secrets", relisted.len());
                    self.cache.mark_ready();
                }
                Err(error) => warn!("secret watcher error: {error}"),
            }
        }
        Ok(())
    }

    /// Caches the secret and reports its key if it carries key material.
    /// An edit that strips the key material is treated as a removal so
    /// dependent owners re-translate and fail loudly.
    async fn admit(&self, secret: Secret, change_type: ChangeType) -> Option<ResourceKey> {
        let key = ResourceKey::from(&secret);
        if secret_has_key_material(&secret) {
            self.cache.upsert_secret(key.clone(), secret);
            self.send(key.clone(), change_type).await;
            Some(key)
        } else {
            self.cache.remove_secret(&key);
            self.send(key, ChangeType::Delete).await;
            None
        }
    }

    async fn send(&self, key: ResourceKey, change_type: ChangeType) {
        if self.event_sender.send(ResourceEvent { key, change_type }).await.is_err() {
            warn!("event channel closed, dropping secret notification");
        }
    }
}
