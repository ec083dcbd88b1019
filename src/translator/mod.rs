mod tls;

#[cfg(test)]
mod test;

use std::sync::Arc;

use itertools::Itertools;
use thiserror::Error;

pub use tls::secret_has_key_material;

use crate::{
    cache::ResourceCache,
    common::{
        GatewayObject, GatewayObjectKind, ObjectId, PluginConfigObject, PluginEntry, ResolveGranularity, ResourceKey, RouteIntent, RouteObject,
        TlsBinding, UpstreamObject, VarPredicate,
    },
    resources::GatewayRoute,
};

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("unsupported predicate operator {0:?}")]
    UnsupportedPredicateOperator(String),
    #[error("secret {0} not found")]
    SecretNotFound(ResourceKey),
    #[error("secret {0} is malformed: {1}")]
    MalformedSecret(ResourceKey, String),
    #[error("certificate/key pair is invalid: {0}")]
    InvalidCertificateKeyPair(String),
    #[error("backend cannot be translated: {0}")]
    UnresolvableBackend(String),
    #[error("TLS binding of {0} has no hosts")]
    EmptyHostList(ResourceKey),
}

/// Pure resource-to-gateway-object translation. The only I/O is resource
/// cache reads for secret resolution; re-running on unchanged input yields
/// byte-identical objects.
pub struct Translator {
    cache: Arc<dyn ResourceCache>,
}

impl Translator {
    pub fn new(cache: Arc<dyn ResourceCache>) -> Self {
        Self { cache }
    }

    /// Translates one resource into its full desired gateway object set.
    /// Any error aborts the whole pass; no partial set is returned.
    pub fn translate(&self, route: &GatewayRoute) -> Result<Vec<GatewayObject>, TranslationError> {
        let mut objects = Vec::new();
        for intent in RouteIntent::from_route(route) {
            objects.extend(Self::translate_rule(&intent)?);
        }
        for binding in TlsBinding::from_route(route) {
            objects.push(GatewayObject::Ssl(self.translate_tls_binding(&binding)?));
        }
        Ok(objects)
    }

    /// Secrets the resource's TLS bindings depend on, used to maintain the
    /// secret reference index even when translation fails early.
    pub fn secret_dependencies(route: &GatewayRoute) -> impl Iterator<Item = ResourceKey> + '_ {
        TlsBinding::from_route(route).into_iter().map(|binding| binding.secret_key())
    }

    fn translate_rule(intent: &RouteIntent) -> Result<Vec<GatewayObject>, TranslationError> {
        let owner = &intent.owner;
        let index = intent.rule_index;
        let object_name = format!("{}_{}_{index}", owner.namespace, owner.name);

        let upstream = Self::translate_backend(intent, &object_name)?;

        let vars = intent
            .predicates
            .iter()
            .map(|predicate| {
                Ok(VarPredicate {
                    subject: predicate.subject.clone(),
                    operator: Self::map_operator(&predicate.operator)?.to_owned(),
                    value: predicate.value.clone(),
                    negated: predicate.negate,
                })
            })
            .collect::<Result<Vec<_>, TranslationError>>()?;

        let plugin_config = Self::translate_plugins(intent);

        let route = RouteObject {
            id: ObjectId::new(owner, GatewayObjectKind::Route, index),
            name: object_name,
            hosts: intent.hosts.clone(),
            // Path order is significant to the gateway's matcher.
            uris: intent.paths.clone(),
            methods: intent.methods.iter().map(|method| method.to_uppercase()).unique().collect(),
            remote_addrs: intent.remote_addrs.clone(),
            vars,
            upstream_id: upstream.id.to_string(),
            plugin_config_id: plugin_config.as_ref().map(|config| config.id.to_string()),
        };

        let mut objects = vec![GatewayObject::Route(route), GatewayObject::Upstream(upstream)];
        if let Some(plugin_config) = plugin_config {
            objects.push(GatewayObject::PluginConfig(plugin_config));
        }
        Ok(objects)
    }

    fn translate_backend(intent: &RouteIntent, object_name: &str) -> Result<UpstreamObject, TranslationError> {
        let backend = &intent.backend;
        if backend.service.is_empty() {
            return Err(TranslationError::UnresolvableBackend(format!(
                "rule {} of {} has an empty service name",
                intent.rule_index, intent.owner
            )));
        }
        if backend.port == 0 {
            return Err(TranslationError::UnresolvableBackend(format!(
                "rule {} of {} references port 0",
                intent.rule_index, intent.owner
            )));
        }
        let resolve_granularity = match backend.resolve_granularity.as_deref() {
            None | Some("endpoint") => ResolveGranularity::Endpoint,
            Some("service") => ResolveGranularity::Service,
            Some(other) => {
                return Err(TranslationError::UnresolvableBackend(format!(
                    "unknown resolve granularity {other:?} on rule {} of {}",
                    intent.rule_index, intent.owner
                )))
            }
        };
        Ok(UpstreamObject {
            id: ObjectId::new(&intent.owner, GatewayObjectKind::Upstream, intent.rule_index),
            name: object_name.to_owned(),
            service_name: backend.service.clone(),
            port: backend.port,
            weight: backend.weight,
            resolve_granularity,
        })
    }

    fn translate_plugins(intent: &RouteIntent) -> Option<PluginConfigObject> {
        if intent.plugins.is_empty() {
            return None;
        }
        // Payloads are structurally cloned; the output must not alias
        // buffers retained by the resource cache.
        let plugins = intent
            .plugins
            .iter()
            .map(|attachment| PluginEntry {
                name: attachment.name.clone(),
                config: attachment.config.clone(),
            })
            .collect();
        Some(PluginConfigObject {
            id: ObjectId::new(&intent.owner, GatewayObjectKind::PluginConfig, intent.rule_index),
            plugins,
        })
    }

    fn map_operator(operator: &str) -> Result<&'static str, TranslationError> {
        match operator {
            "Equal" | "eq" => Ok("=="),
            "NotEqual" | "ne" => Ok("~="),
            "GreaterThan" | "gt" => Ok(">"),
            "LessThan" | "lt" => Ok("<"),
            "RegexMatch" | "regex" => Ok("~~"),
            "In" | "in" => Ok("in"),
            other => Err(TranslationError::UnsupportedPredicateOperator(other.to_owned())),
        }
    }
}
