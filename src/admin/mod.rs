mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

pub use memory::MemoryAdminClient;

use crate::common::{GatewayObject, ObjectId};

#[derive(Clone, Debug, Error)]
pub enum AdminError {
    #[error("admin API unavailable: {0}")]
    Unavailable(String),
    #[error("admin API rejected the request with status {0}")]
    Rejected(u16),
    #[error("conflicting write for {0}")]
    Conflict(ObjectId),
    #[error("admin API call timed out")]
    Timeout,
}

impl AdminError {
    /// Client-side rejections are deterministic; retrying them only delays
    /// the `SyncFailed` surface.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdminError::Unavailable(_) | AdminError::Timeout | AdminError::Conflict(_) => true,
            AdminError::Rejected(status) => *status >= 500,
        }
    }
}

/// Process-wide admin API coordinates, injected once at startup and passed
/// explicitly into the sync engine.
#[derive(Clone, Debug, Deserialize, TypedBuilder)]
pub struct AdminConfig {
    pub endpoint: String,
    #[builder(default)]
    #[serde(default)]
    pub token: Option<String>,
    #[builder(default = 5)]
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    5
}

impl AdminConfig {
    /// Timeout applies per admin call, not per reconciliation pass.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Clone, Debug)]
pub struct VersionedObject {
    pub object: GatewayObject,
    pub version: String,
}

/// Logical contract of the gateway admin API: an idempotent key-value
/// object store with per-object version tokens. `PUT /{collection}/{id}`
/// has create-or-replace semantics; there is no batch endpoint.
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn put_object(&self, object: &GatewayObject) -> Result<String, AdminError>;
    async fn delete_object(&self, id: &ObjectId) -> Result<(), AdminError>;
    async fn get_object(&self, id: &ObjectId) -> Result<Option<VersionedObject>, AdminError>;
}

/// Admin path for one object, e.g. `/routes/default_web_route_0`.
pub fn object_path(id: &ObjectId) -> String {
    format!("/{}/{id}", id.kind.collection())
}
