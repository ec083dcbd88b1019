use crate::{
    common::{ChangeSet, GatewayObject, ResourceKey},
    state::LocalStateView,
};

/// Compares one owner's freshly translated desired set against the applied
/// state. Only ids belonging to `owner` are eligible for deletion: a pass
/// over one resource must never touch objects derived from another, no
/// matter how the two owners' states interleave.
pub fn diff(owner: &ResourceKey, desired: Vec<GatewayObject>, current: &LocalStateView) -> ChangeSet {
    let mut change_set = ChangeSet::default();
    let mut desired_ids = std::collections::BTreeSet::new();

    for object in desired {
        debug_assert_eq!(object.owner(), owner);
        desired_ids.insert(object.id().clone());
        match current.hash_of(object.id()) {
            None => change_set.creates.push(object),
            Some(applied_hash) => {
                if applied_hash != object.content_hash() {
                    change_set.updates.push((object.id().clone(), object));
                }
            }
        }
    }

    for id in current.ids_for_owner(owner) {
        if !desired_ids.contains(id) {
            change_set.deletes.push(id.clone());
        }
    }

    change_set
}
