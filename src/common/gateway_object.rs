use std::fmt::Display;

use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use super::ResourceKey;

/// Gateway object families the admin API knows about.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum GatewayObjectKind {
    Route,
    Upstream,
    Ssl,
    PluginConfig,
}

impl GatewayObjectKind {
    /// Collection segment in admin API paths, e.g. `PUT /routes/{id}`.
    pub fn collection(self) -> &'static str {
        match self {
            GatewayObjectKind::Route => "routes",
            GatewayObjectKind::Upstream => "upstreams",
            GatewayObjectKind::Ssl => "ssl",
            GatewayObjectKind::PluginConfig => "plugin_configs",
        }
    }
}

impl Display for GatewayObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            GatewayObjectKind::Route => "route",
            GatewayObjectKind::Upstream => "upstream",
            GatewayObjectKind::Ssl => "ssl",
            GatewayObjectKind::PluginConfig => "plugin_config",
        };
        write!(f, "{kind}")
    }
}

/// Stable identity of one gateway object. Derived purely from the owning
/// cluster resource plus a structural index, so re-translating an unchanged
/// resource always yields the same ids, and ids can be attributed back to
/// their owner after the source resource is gone.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ObjectId {
    pub owner: ResourceKey,
    pub kind: GatewayObjectKind,
    pub index: u32,
}

impl ObjectId {
    pub fn new(owner: &ResourceKey, kind: GatewayObjectKind, index: u32) -> Self {
        Self {
            owner: owner.clone(),
            kind,
            index,
        }
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_{}_{}", self.owner.namespace, self.owner.name, self.kind, self.index)
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Deterministic fingerprint of a gateway object's content, used for change
/// detection independent of the admin API's own version tokens.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Generic variable predicate in the gateway's native form.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct VarPredicate {
    pub subject: String,
    pub operator: String,
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveGranularity {
    Service,
    Endpoint,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RouteObject {
    pub id: ObjectId,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    pub uris: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remote_addrs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<VarPredicate>,
    pub upstream_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_config_id: Option<String>,
}

/// Backend carried through unresolved; the gateway's service discovery
/// resolves the service name to endpoints at the data plane.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UpstreamObject {
    pub id: ObjectId,
    pub name: String,
    pub service_name: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    pub resolve_granularity: ResolveGranularity,
}

/// Certificate binding for TLS termination. `snis` is non-empty and
/// deduplicated; `cert`/`key` are a validated PEM pair.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SslObject {
    pub id: ObjectId,
    pub cert: String,
    pub key: String,
    pub snis: Vec<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PluginEntry {
    pub name: String,
    pub config: serde_json::Value,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PluginConfigObject {
    pub id: ObjectId,
    pub plugins: Vec<PluginEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GatewayObject {
    Route(RouteObject),
    Upstream(UpstreamObject),
    Ssl(SslObject),
    PluginConfig(PluginConfigObject),
}

impl GatewayObject {
    pub fn id(&self) -> &ObjectId {
        match self {
            GatewayObject::Route(route) => &route.id,
            GatewayObject::Upstream(upstream) => &upstream.id,
            GatewayObject::Ssl(ssl) => &ssl.id,
            GatewayObject::PluginConfig(plugin_config) => &plugin_config.id,
        }
    }

    pub fn kind(&self) -> GatewayObjectKind {
        self.id().kind
    }

    pub fn owner(&self) -> &ResourceKey {
        &self.id().owner
    }

    pub fn content_hash(&self) -> ContentHash {
        // String-keyed structs serialize deterministically; serde_json maps
        // are BTreeMaps so plugin payload key order is canonical.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        ContentHash::of(&bytes)
    }
}

/// Delta between desired and applied gateway state for one owner's pass.
#[derive(Clone, Debug, Default)]
pub struct ChangeSet {
    pub creates: Vec<GatewayObject>,
    pub updates: Vec<(ObjectId, GatewayObject)>,
    pub deletes: Vec<ObjectId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }
}
