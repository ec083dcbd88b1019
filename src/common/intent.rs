use super::ResourceKey;
use crate::resources::{GatewayRoute, RouteRule, TlsSpec};

/// Desired routing rule rebuilt from the owning resource on every pass.
/// Identity is `(owner, rule_index)`; nothing here is ever persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteIntent {
    pub owner: ResourceKey,
    pub rule_index: u32,
    pub hosts: Vec<String>,
    pub paths: Vec<String>,
    pub methods: Vec<String>,
    pub remote_addrs: Vec<String>,
    pub predicates: Vec<AttributePredicate>,
    pub backend: BackendRef,
    pub plugins: Vec<PluginAttachment>,
}

/// Request-attribute predicate as declared on the resource; the operator is
/// kept verbatim and mapped (or rejected) at translation time.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributePredicate {
    pub subject: String,
    pub operator: String,
    pub value: String,
    pub negate: bool,
}

/// Reference to a routable target, never resolved to endpoints here.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendRef {
    pub service: String,
    pub port: u16,
    pub weight: Option<u32>,
    pub resolve_granularity: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PluginAttachment {
    pub name: String,
    pub config: serde_json::Value,
}

/// Desired certificate binding: owner identity, secret reference and the
/// SNI set the certificate should serve.
#[derive(Clone, Debug, PartialEq)]
pub struct TlsBinding {
    pub owner: ResourceKey,
    pub index: u32,
    pub secret_name: String,
    pub hosts: Vec<String>,
}

impl RouteIntent {
    /// Builds the per-rule intents for one resource. Plugin payloads are
    /// structurally cloned so no buffer is shared with the cached resource.
    pub fn from_route(route: &GatewayRoute) -> Vec<RouteIntent> {
        let owner = ResourceKey::from(route);
        route
            .spec
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| Self::from_rule(&owner, u32::try_from(index).unwrap_or(u32::MAX), rule))
            .collect()
    }

    fn from_rule(owner: &ResourceKey, rule_index: u32, rule: &RouteRule) -> RouteIntent {
        RouteIntent {
            owner: owner.clone(),
            rule_index,
            hosts: rule.hosts.clone().unwrap_or_default(),
            paths: rule.paths.clone(),
            methods: rule.methods.clone().unwrap_or_default(),
            remote_addrs: rule.remote_addrs.clone().unwrap_or_default(),
            predicates: rule
                .exprs
                .iter()
                .flatten()
                .map(|expr| AttributePredicate {
                    subject: expr.subject.clone(),
                    operator: expr.op.clone(),
                    value: expr.value.clone(),
                    negate: expr.negate.unwrap_or(false),
                })
                .collect(),
            backend: BackendRef {
                service: rule.backend.service.clone(),
                port: rule.backend.port,
                weight: rule.backend.weight,
                resolve_granularity: rule.backend.resolve_granularity.clone(),
            },
            plugins: rule
                .plugins
                .iter()
                .flatten()
                .map(|plugin| PluginAttachment {
                    name: plugin.name.clone(),
                    config: plugin.config.clone().unwrap_or(serde_json::Value::Object(serde_json::Map::new())),
                })
                .collect(),
        }
    }
}

impl TlsBinding {
    pub fn from_route(route: &GatewayRoute) -> Vec<TlsBinding> {
        let owner = ResourceKey::from(route);
        route
            .spec
            .tls
            .iter()
            .flatten()
            .enumerate()
            .map(|(index, tls)| Self::from_spec(&owner, u32::try_from(index).unwrap_or(u32::MAX), tls))
            .collect()
    }

    fn from_spec(owner: &ResourceKey, index: u32, tls: &TlsSpec) -> TlsBinding {
        TlsBinding {
            owner: owner.clone(),
            index,
            secret_name: tls.secret_name.clone(),
            hosts: tls.hosts.clone(),
        }
    }

    /// Secrets this binding depends on, keyed in the owner's namespace.
    pub fn secret_key(&self) -> ResourceKey {
        ResourceKey::secret(&self.owner.namespace, &self.secret_name)
    }
}
