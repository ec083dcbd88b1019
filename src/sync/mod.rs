use std::{sync::Arc, time::Duration};

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use crate::{
    admin::{AdminClient, AdminError},
    common::{ChangeSet, GatewayObject, ObjectId, ResourceKey, SyncStatus},
    state::LocalStateStore,
};

/// Bounded exponential backoff applied per change-set item.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ItemAction {
    Create,
    Update,
    Delete,
}

/// Per-item state machine: Pending -> Applying -> {Applied | Failed}.
/// Abandoned items stay Pending; the superseding pass re-derives them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ItemState {
    Pending,
    Applying,
    Applied,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct ItemReport {
    pub id: ObjectId,
    pub action: ItemAction,
    pub state: ItemState,
    pub attempts: u32,
}

#[derive(Clone, Debug)]
pub struct SyncReport {
    pub owner: ResourceKey,
    pub items: Vec<ItemReport>,
    pub superseded: bool,
}

impl SyncReport {
    pub fn status(&self) -> SyncStatus {
        if self.superseded {
            return SyncStatus::Pending;
        }
        for item in &self.items {
            if let ItemState::Failed(reason) = &item.state {
                return SyncStatus::SyncFailed(format!("{}: {reason}", item.id));
            }
        }
        SyncStatus::Synced
    }

    pub fn applied(&self) -> usize {
        self.items.iter().filter(|item| item.state == ItemState::Applied).count()
    }
}

/// Applies one owner's change set against the admin API, recording each
/// confirmed write in the local state store. Never assumes transactional
/// multi-object apply; convergence comes from re-deriving full desired
/// state on every pass.
#[derive(TypedBuilder)]
pub struct SyncEngine {
    admin: Arc<dyn AdminClient>,
    state: LocalStateStore,
    #[builder(default)]
    retry: RetryPolicy,
    #[builder(default = Duration::from_secs(5))]
    call_timeout: Duration,
}

impl SyncEngine {
    pub async fn apply(&self, owner: &ResourceKey, change_set: ChangeSet) -> SyncReport {
        self.apply_unless(owner, change_set, || false).await
    }

    /// `is_superseded` is polled between items; a pass with a newer queued
    /// change for the same key abandons its remaining work rather than
    /// racing the pass that will replace it. In-flight admin calls always
    /// run to completion.
    pub async fn apply_unless(&self, owner: &ResourceKey, change_set: ChangeSet, is_superseded: impl Fn() -> bool) -> SyncReport {
        let mut report = SyncReport {
            owner: owner.clone(),
            items: Vec::with_capacity(change_set.len()),
            superseded: false,
        };

        let upserts = change_set
            .creates
            .into_iter()
            .map(|object| (ItemAction::Create, object))
            .chain(change_set.updates.into_iter().map(|(_, object)| (ItemAction::Update, object)));

        for (action, object) in upserts {
            if is_superseded() {
                report.superseded = true;
                report.items.push(ItemReport {
                    id: object.id().clone(),
                    action,
                    state: ItemState::Pending,
                    attempts: 0,
                });
                continue;
            }
            report.items.push(self.apply_upsert(action, object).await);
        }

        // Deletes go last for this owner so a renamed route never has a
        // window with zero coverage. Other owners' passes interleave freely.
        for id in change_set.deletes {
            if report.superseded || is_superseded() {
                report.superseded = true;
                report.items.push(ItemReport {
                    id,
                    action: ItemAction::Delete,
                    state: ItemState::Pending,
                    attempts: 0,
                });
                continue;
            }
            report.items.push(self.apply_delete(id).await);
        }

        report
    }

    async fn apply_upsert(&self, action: ItemAction, object: GatewayObject) -> ItemReport {
        let id = object.id().clone();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.put_once(&object).await {
                Ok(version) => {
                    // Store entry and admin confirmation move together.
                    self.state.upsert(object, version).await;
                    return ItemReport {
                        id,
                        action,
                        state: ItemState::Applied,
                        attempts,
                    };
                }
                Err(error) => {
                    if error.is_retryable() && attempts < self.retry.max_attempts {
                        let delay = self.retry.delay(attempts);
                        debug!("apply of {id} failed ({error}), retrying in {delay:?}");
                        sleep(delay).await;
                        continue;
                    }
                    warn!("apply of {id} failed after {attempts} attempts: {error}");
                    return ItemReport {
                        id,
                        action,
                        state: ItemState::Failed(error.to_string()),
                        attempts,
                    };
                }
            }
        }
    }

    async fn apply_delete(&self, id: ObjectId) -> ItemReport {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.delete_once(&id).await {
                Ok(()) => {
                    self.state.remove(&id).await;
                    return ItemReport {
                        id,
                        action: ItemAction::Delete,
                        state: ItemState::Applied,
                        attempts,
                    };
                }
                Err(error) => {
                    if error.is_retryable() && attempts < self.retry.max_attempts {
                        let delay = self.retry.delay(attempts);
                        debug!("delete of {id} failed ({error}), retrying in {delay:?}");
                        sleep(delay).await;
                        continue;
                    }
                    warn!("delete of {id} failed after {attempts} attempts: {error}");
                    return ItemReport {
                        id,
                        action: ItemAction::Delete,
                        state: ItemState::Failed(error.to_string()),
                        attempts,
                    };
                }
            }
        }
    }

    async fn put_once(&self, object: &GatewayObject) -> Result<String, AdminError> {
        match timeout(self.call_timeout, self.admin.put_object(object)).await {
            Ok(result) => result,
            Err(_) => Err(AdminError::Timeout),
        }
    }

    async fn delete_once(&self, id: &ObjectId) -> Result<(), AdminError> {
        match timeout(self.call_timeout, self.admin.delete_object(id)).await {
            Ok(result) => result,
            Err(_) => Err(AdminError::Timeout),
        }
    }
}

#[cfg(test)]
mod test;
