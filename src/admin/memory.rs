use std::{
    collections::{BTreeMap, VecDeque},
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{object_path, AdminClient, AdminError, VersionedObject};
use crate::common::{GatewayObject, ObjectId};

/// In-memory admin API with monotonic version tokens and injectable
/// failures. Backs tests and local dry runs; the production transport is an
/// external collaborator behind the same trait.
#[derive(Default)]
pub struct MemoryAdminClient {
    objects: Mutex<BTreeMap<ObjectId, VersionedObject>>,
    failures: Mutex<VecDeque<AdminError>>,
    version_counter: AtomicU64,
}

impl MemoryAdminClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error returned by the next admin call.
    pub async fn inject_failure(&self, error: AdminError) {
        self.failures.lock().await.push_back(error);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn stored(&self, id: &ObjectId) -> Option<VersionedObject> {
        self.objects.lock().await.get(id).cloned()
    }

    async fn take_failure(&self) -> Option<AdminError> {
        self.failures.lock().await.pop_front()
    }

    fn next_version(&self) -> String {
        format!("v{}", self.version_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl AdminClient for MemoryAdminClient {
    async fn put_object(&self, object: &GatewayObject) -> Result<String, AdminError> {
        if let Some(error) = self.take_failure().await {
            return Err(error);
        }
        let version = self.next_version();
        debug!("PUT {} -> {version}", object_path(object.id()));
        self.objects.lock().await.insert(
            object.id().clone(),
            VersionedObject {
                object: object.clone(),
                version: version.clone(),
            },
        );
        Ok(version)
    }

    async fn delete_object(&self, id: &ObjectId) -> Result<(), AdminError> {
        if let Some(error) = self.take_failure().await {
            return Err(error);
        }
        debug!("DELETE {}", object_path(id));
        // Deleting an absent id is a no-op; the store is idempotent.
        self.objects.lock().await.remove(id);
        Ok(())
    }

    async fn get_object(&self, id: &ObjectId) -> Result<Option<VersionedObject>, AdminError> {
        if let Some(error) = self.take_failure().await {
            return Err(error);
        }
        Ok(self.objects.lock().await.get(id).cloned())
    }
}
