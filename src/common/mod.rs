mod gateway_object;
mod intent;
mod resource_key;
#[cfg(test)]
mod test;

use std::fmt::Display;

pub use gateway_object::{
    ChangeSet, ContentHash, GatewayObject, GatewayObjectKind, ObjectId, PluginConfigObject, PluginEntry, ResolveGranularity, RouteObject, SslObject,
    UpstreamObject, VarPredicate,
};
pub use intent::{RouteIntent, TlsBinding};
pub use resource_key::{ResourceKey, ROUTE_KIND, SECRET_KIND};

/// Change notification for one watched resource. The core's only obligation
/// is to enqueue the owner key; a delete produces a pass with an empty
/// desired set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeType {
    Add,
    Update,
    Delete,
}

#[derive(Clone, Debug)]
pub struct ResourceEvent {
    pub key: ResourceKey,
    pub change_type: ChangeType,
}

/// Per-owner sync status exposed through the resource's status subresource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SyncStatus {
    Pending,
    Synced,
    SyncFailed(String),
}

impl SyncStatus {
    pub fn phase(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "Pending",
            SyncStatus::Synced => "Synced",
            SyncStatus::SyncFailed(_) => "SyncFailed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SyncStatus::Pending | SyncStatus::Synced => None,
            SyncStatus::SyncFailed(reason) => Some(reason),
        }
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending | SyncStatus::Synced => write!(f, "{}", self.phase()),
            SyncStatus::SyncFailed(reason) => write!(f, "SyncFailed({reason})"),
        }
    }
}
