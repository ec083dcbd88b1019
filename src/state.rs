use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::Mutex;

use crate::common::{ContentHash, GatewayObject, ObjectId, ResourceKey};

/// One gateway object as last confirmed by the admin API.
#[derive(Clone, Debug)]
pub struct AppliedObject {
    pub object: GatewayObject,
    pub content_hash: ContentHash,
    pub gateway_version: String,
}

/// Point-in-time snapshot used for diffing; owner provenance is embedded in
/// every id, so deletion entries can be produced after the source resource
/// is gone.
#[derive(Clone, Debug, Default)]
pub struct LocalStateView {
    entries: BTreeMap<ObjectId, ContentHash>,
}

impl LocalStateView {
    pub fn hash_of(&self, id: &ObjectId) -> Option<ContentHash> {
        self.entries.get(id).copied()
    }

    pub fn ids_for_owner<'a>(&'a self, owner: &'a ResourceKey) -> impl Iterator<Item = &'a ObjectId> + 'a {
        self.entries.keys().filter(move |id| &id.owner == owner)
    }

    #[cfg(test)]
    pub fn from_entries(entries: impl IntoIterator<Item = (ObjectId, ContentHash)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }
}

/// Last-known-applied gateway configuration. The lock is held per operation,
/// never across an admin call, so passes for different owners proceed in
/// parallel on their disjoint id sets.
#[derive(Clone, Default)]
pub struct LocalStateStore {
    objects: Arc<Mutex<BTreeMap<ObjectId, AppliedObject>>>,
}

impl LocalStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn view(&self) -> LocalStateView {
        let objects = self.objects.lock().await;
        LocalStateView {
            entries: objects.iter().map(|(id, applied)| (id.clone(), applied.content_hash)).collect(),
        }
    }

    /// Records a confirmed apply. One id maps to at most one object.
    pub async fn upsert(&self, object: GatewayObject, gateway_version: String) {
        let applied = AppliedObject {
            content_hash: object.content_hash(),
            object,
            gateway_version,
        };
        self.objects.lock().await.insert(applied.object.id().clone(), applied);
    }

    /// Records a confirmed delete.
    pub async fn remove(&self, id: &ObjectId) {
        self.objects.lock().await.remove(id);
    }

    pub async fn get(&self, id: &ObjectId) -> Option<AppliedObject> {
        self.objects.lock().await.get(id).cloned()
    }

    pub async fn ids_for_owner(&self, owner: &ResourceKey) -> Vec<ObjectId> {
        self.objects.lock().await.keys().filter(|id| &id.owner == owner).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}
