use std::{collections::BTreeMap, sync::Arc};

use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta, ByteString};

use super::{TranslationError, Translator};
use crate::{
    cache::{MemoryResourceCache, ResourceCache},
    common::{GatewayObject, ResourceKey},
    resources::{BackendSpec, ExprSpec, GatewayRoute, GatewayRouteSpec, PluginSpec, RouteRule, TlsSpec},
};

const TEST_CERT: &str = include_str!("../../test_fixtures/tls/test_com.crt");
const TEST_KEY: &str = include_str!("../../test_fixtures/tls/test_com.key");

fn make_rule(port: u16) -> RouteRule {
    RouteRule {
        hosts: Some(vec!["example.com".to_owned()]),
        paths: vec!["/api".to_owned(), "/".to_owned()],
        methods: None,
        remote_addrs: None,
        exprs: None,
        backend: BackendSpec {
            service: "httpbin".to_owned(),
            port,
            weight: None,
            resolve_granularity: None,
        },
        plugins: None,
    }
}

fn make_route(rules: Vec<RouteRule>, tls: Option<Vec<TlsSpec>>) -> GatewayRoute {
    let mut route = GatewayRoute::new("web", GatewayRouteSpec { rules, tls });
    route.metadata.namespace = Some("apps".to_owned());
    route
}

fn tls_secret(cert_entry: &str, key_entry: &str) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(cert_entry.to_owned(), ByteString(TEST_CERT.as_bytes().to_vec()));
    data.insert(key_entry.to_owned(), ByteString(TEST_KEY.as_bytes().to_vec()));
    Secret {
        metadata: ObjectMeta {
            name: Some("web-tls".to_owned()),
            namespace: Some("apps".to_owned()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

fn translator() -> (Arc<MemoryResourceCache>, Translator) {
    let cache = Arc::new(MemoryResourceCache::default());
    let translator = Translator::new(Arc::clone(&cache) as Arc<dyn ResourceCache>);
    (cache, translator)
}

#[test]
pub fn test_rule_becomes_route_and_upstream() {
    let (_, translator) = translator();
    let mut rule = make_rule(80);
    rule.methods = Some(vec!["get".to_owned(), "GET".to_owned(), "post".to_owned()]);
    rule.plugins = Some(vec![PluginSpec {
        name: "limit-count".to_owned(),
        config: Some(serde_json::json!({"count": 10, "time_window": 60})),
    }]);

    let objects = translator.translate(&make_route(vec![rule], None)).unwrap();
    assert_eq!(objects.len(), 3);

    let GatewayObject::Route(route) = &objects[0] else {
        panic!("expected route first, got {:?}", objects[0]);
    };
    assert_eq!(route.id.to_string(), "apps_web_route_0");
    assert_eq!(route.name, "apps_web_0");
    assert_eq!(route.uris, vec!["/api", "/"]);
    assert_eq!(route.methods, vec!["GET", "POST"]);
    assert_eq!(route.upstream_id, "apps_web_upstream_0");
    assert_eq!(route.plugin_config_id.as_deref(), Some("apps_web_plugin_config_0"));

    let GatewayObject::Upstream(upstream) = &objects[1] else {
        panic!("expected upstream second, got {:?}", objects[1]);
    };
    assert_eq!(upstream.service_name, "httpbin");
    assert_eq!(upstream.port, 80);

    let GatewayObject::PluginConfig(plugin_config) = &objects[2] else {
        panic!("expected plugin config third, got {:?}", objects[2]);
    };
    assert_eq!(plugin_config.plugins[0].name, "limit-count");
    assert_eq!(plugin_config.plugins[0].config["count"], 10);
}

#[test]
pub fn test_translation_is_deterministic() {
    let (cache, translator) = translator();
    cache.upsert_secret(ResourceKey::secret("apps", "web-tls"), tls_secret("cert", "key"));
    let route = make_route(
        vec![make_rule(80), make_rule(8080)],
        Some(vec![TlsSpec {
            secret_name: "web-tls".to_owned(),
            hosts: vec!["test.com".to_owned()],
        }]),
    );

    let first = translator.translate(&route).unwrap();
    let second = translator.translate(&route).unwrap();

    assert_eq!(first, second);
    let hashes = |objects: &[GatewayObject]| objects.iter().map(GatewayObject::content_hash).collect::<Vec<_>>();
    assert_eq!(hashes(&first), hashes(&second));
}

#[test]
pub fn test_tls_round_trip() {
    let (cache, translator) = translator();
    cache.upsert_secret(ResourceKey::secret("apps", "web-tls"), tls_secret("cert", "key"));

    let certificate = translator
        .translate_ingress_tls("apps", "web", "web-tls", &["test.com".to_owned(), "test.com".to_owned()])
        .unwrap();

    // The PEM payload survives byte for byte; duplicated hosts collapse.
    assert_eq!(certificate.cert, TEST_CERT);
    assert_eq!(certificate.key, TEST_KEY);
    assert_eq!(certificate.snis, vec!["test.com"]);
}

#[test]
pub fn test_protocol_standard_secret_keys_accepted() {
    let (cache, translator) = translator();
    cache.upsert_secret(ResourceKey::secret("apps", "web-tls"), tls_secret("tls.crt", "tls.key"));

    let certificate = translator.translate_ingress_tls("apps", "web", "web-tls", &["test.com".to_owned()]).unwrap();
    assert_eq!(certificate.cert, TEST_CERT);
}

#[test]
pub fn test_missing_secret_aborts_translation() {
    let (_, translator) = translator();
    let route = make_route(
        vec![make_rule(80)],
        Some(vec![TlsSpec {
            secret_name: "absent".to_owned(),
            hosts: vec!["test.com".to_owned()],
        }]),
    );

    let error = translator.translate(&route).unwrap_err();
    assert!(matches!(error, TranslationError::SecretNotFound(key) if key == ResourceKey::secret("apps", "absent")));
}

#[test]
pub fn test_secret_without_key_material_is_malformed() {
    let (cache, translator) = translator();
    let mut secret = tls_secret("cert", "key");
    secret.data.as_mut().unwrap().remove("key");
    cache.upsert_secret(ResourceKey::secret("apps", "web-tls"), secret);

    let error = translator.translate_ingress_tls("apps", "web", "web-tls", &["test.com".to_owned()]).unwrap_err();
    assert!(matches!(error, TranslationError::MalformedSecret(_, _)));
}

#[test]
pub fn test_garbage_certificate_is_rejected() {
    let (cache, translator) = translator();
    let mut secret = tls_secret("cert", "key");
    secret
        .data
        .as_mut()
        .unwrap()
        .insert("cert".to_owned(), ByteString(b"not a certificate".to_vec()));
    cache.upsert_secret(ResourceKey::secret("apps", "web-tls"), secret);

    let error = translator.translate_ingress_tls("apps", "web", "web-tls", &["test.com".to_owned()]).unwrap_err();
    assert!(matches!(error, TranslationError::InvalidCertificateKeyPair(_)));
}

#[test]
pub fn test_garbage_key_is_rejected() {
    let (cache, translator) = translator();
    let mut secret = tls_secret("cert", "key");
    secret.data.as_mut().unwrap().insert("key".to_owned(), ByteString(b"not a key".to_vec()));
    cache.upsert_secret(ResourceKey::secret("apps", "web-tls"), secret);

    let error = translator.translate_ingress_tls("apps", "web", "web-tls", &["test.com".to_owned()]).unwrap_err();
    assert!(matches!(error, TranslationError::InvalidCertificateKeyPair(_)));
}

#[test]
pub fn test_tls_binding_without_hosts_is_rejected() {
    let (cache, translator) = translator();
    cache.upsert_secret(ResourceKey::secret("apps", "web-tls"), tls_secret("cert", "key"));
    let route = make_route(
        vec![],
        Some(vec![TlsSpec {
            secret_name: "web-tls".to_owned(),
            hosts: vec![],
        }]),
    );

    let error = translator.translate(&route).unwrap_err();
    assert!(matches!(error, TranslationError::EmptyHostList(_)));
}

#[test]
pub fn test_unsupported_operator_is_rejected() {
    let (_, translator) = translator();
    let mut rule = make_rule(80);
    rule.exprs = Some(vec![ExprSpec {
        subject: "arg_env".to_owned(),
        op: "Contains".to_owned(),
        value: "staging".to_owned(),
        negate: None,
    }]);

    let error = translator.translate(&make_route(vec![rule], None)).unwrap_err();
    assert!(matches!(error, TranslationError::UnsupportedPredicateOperator(op) if op == "Contains"));
}

#[test]
pub fn test_operator_mapping() {
    let (_, translator) = translator();
    let cases = [("Equal", "=="), ("ne", "~="), ("GreaterThan", ">"), ("lt", "<"), ("RegexMatch", "~~"), ("in", "in")];
    for (op, expected) in cases {
        let mut rule = make_rule(80);
        rule.exprs = Some(vec![ExprSpec {
            subject: "arg_env".to_owned(),
            op: op.to_owned(),
            value: "staging".to_owned(),
            negate: Some(op == "ne"),
        }]);
        let objects = translator.translate(&make_route(vec![rule], None)).unwrap();
        let GatewayObject::Route(route) = &objects[0] else {
            panic!("expected route first");
        };
        assert_eq!(route.vars[0].operator, expected);
        assert_eq!(route.vars[0].negated, op == "ne");
    }
}

#[test]
pub fn test_unresolvable_backends_are_rejected() {
    let (_, translator) = translator();

    let mut empty_service = make_rule(80);
    empty_service.backend.service = String::new();
    let error = translator.translate(&make_route(vec![empty_service], None)).unwrap_err();
    assert!(matches!(error, TranslationError::UnresolvableBackend(_)));

    let zero_port = make_rule(0);
    let error = translator.translate(&make_route(vec![zero_port], None)).unwrap_err();
    assert!(matches!(error, TranslationError::UnresolvableBackend(_)));

    let mut unknown_granularity = make_rule(80);
    unknown_granularity.backend.resolve_granularity = Some("node".to_owned());
    let error = translator.translate(&make_route(vec![unknown_granularity], None)).unwrap_err();
    assert!(matches!(error, TranslationError::UnresolvableBackend(_)));
}

#[test]
pub fn test_plugin_payload_does_not_alias_the_resource() {
    let (_, translator) = translator();
    let mut rule = make_rule(80);
    rule.plugins = Some(vec![PluginSpec {
        name: "limit-count".to_owned(),
        config: Some(serde_json::json!({"count": 10})),
    }]);
    let mut route = make_route(vec![rule], None);

    let objects = translator.translate(&route).unwrap();
    route.spec.rules[0].plugins.as_mut().unwrap()[0].config = Some(serde_json::json!({"count": 99}));

    let GatewayObject::PluginConfig(plugin_config) = &objects[2] else {
        panic!("expected plugin config third");
    };
    assert_eq!(plugin_config.plugins[0].config["count"], 10);
}
