use kube::{
    api::{Patch, PatchParams},
    Api, Client,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use crate::{
    common::{ResourceKey, SyncStatus},
    resources::{GatewayRoute, GatewayRouteStatus},
};

#[derive(Clone, Debug)]
pub struct StatusUpdate {
    pub owner: ResourceKey,
    pub status: SyncStatus,
}

/// Writes per-owner sync status back to the resource's status subresource
/// with server-side apply, the controller name acting as field manager.
#[derive(TypedBuilder)]
pub struct StatusPatcherService {
    client: Client,
    receiver: mpsc::Receiver<StatusUpdate>,
    controller_name: String,
}

impl StatusPatcherService {
    pub async fn start(mut self) -> crate::Result<()> {
        while let Some(StatusUpdate { owner, status }) = self.receiver.recv().await {
            let api: Api<GatewayRoute> = Api::namespaced(self.client.clone(), &owner.namespace);
            let patch = serde_json::json!({
                "apiVersion": "gatewarden.dev/v1alpha1",
                "kind": "GatewayRoute",
                "status": GatewayRouteStatus::from(&status),
            });
            let patch_params = PatchParams::apply(&self.controller_name).force();
            match api.patch_status(&owner.name, &patch_params, &Patch::Apply(&patch)).await {
                Ok(_) => info!("status of {owner} set to {status}"),
                Err(error) => warn!("status patch for {owner} failed: {error:?}"),
            }
        }
        Ok(())
    }
}
