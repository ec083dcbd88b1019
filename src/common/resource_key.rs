use std::fmt::Display;

use k8s_openapi::api::core::v1::Secret;
use kube::{Resource, ResourceExt};

use crate::resources::GatewayRoute;

pub const DEFAULT_NAMESPACE_NAME: &str = "default";
pub const ROUTE_KIND: &str = "GatewayRoute";
pub const SECRET_KIND: &str = "Secret";

/// Identity of a watched cluster resource. Owners of gateway objects are
/// always keyed this way, independent of whether the resource still exists.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn route(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: ROUTE_KIND.to_owned(),
        }
    }

    pub fn secret(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: SECRET_KIND.to_owned(),
        }
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE_NAME.to_owned(),
            name: String::default(),
            kind: ROUTE_KIND.to_owned(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

impl From<&GatewayRoute> for ResourceKey {
    fn from(value: &GatewayRoute) -> Self {
        let namespace = value.meta().namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        Self {
            namespace,
            name: value.name_any(),
            kind: ROUTE_KIND.to_owned(),
        }
    }
}

impl From<&Secret> for ResourceKey {
    fn from(value: &Secret) -> Self {
        let namespace = value.meta().namespace.clone().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
        Self {
            namespace,
            name: value.name_any(),
            kind: SECRET_KIND.to_owned(),
        }
    }
}
