use super::{GatewayObject, GatewayObjectKind, ObjectId, ResolveGranularity, ResourceKey, RouteIntent, TlsBinding, UpstreamObject};
use crate::resources::GatewayRoute;

const ROUTE_YAML: &str = r"
apiVersion: gatewarden.dev/v1alpha1
kind: GatewayRoute
metadata:
  name: web
  namespace: apps
spec:
  rules:
    - hosts:
        - example.com
      paths:
        - /api
        - /
      methods:
        - get
        - GET
      exprs:
        - subject: arg_env
          op: Equal
          value: staging
      backend:
        service: httpbin
        port: 80
      plugins:
        - name: limit-count
          config:
            count: 10
            time_window: 60
  tls:
    - secretName: web-tls
      hosts:
        - example.com
";

#[test]
pub fn test_route_parsing() {
    let route: GatewayRoute = serde_yaml::from_str(ROUTE_YAML).unwrap();
    assert_eq!(route.spec.rules.len(), 1);
    assert_eq!(route.spec.rules[0].backend.service, "httpbin");
    assert_eq!(route.spec.tls.as_ref().unwrap()[0].secret_name, "web-tls");

    let key = ResourceKey::from(&route);
    assert_eq!(key, ResourceKey::route("apps", "web"));
    println!("{key}");
}

#[test]
pub fn test_route_intents() {
    let route: GatewayRoute = serde_yaml::from_str(ROUTE_YAML).unwrap();
    let intents = RouteIntent::from_route(&route);
    assert_eq!(intents.len(), 1);

    let intent = &intents[0];
    assert_eq!(intent.rule_index, 0);
    assert_eq!(intent.paths, vec!["/api", "/"]);
    assert_eq!(intent.predicates[0].operator, "Equal");
    assert!(!intent.predicates[0].negate);
    assert_eq!(intent.plugins[0].config["count"], 10);

    let bindings = TlsBinding::from_route(&route);
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].secret_key(), ResourceKey::secret("apps", "web-tls"));
}

#[test]
pub fn test_route_without_namespace_lands_in_default() {
    let route: GatewayRoute = serde_yaml::from_str(
        r"
apiVersion: gatewarden.dev/v1alpha1
kind: GatewayRoute
metadata:
  name: web
spec:
  rules: []
",
    )
    .unwrap();
    assert_eq!(ResourceKey::from(&route), ResourceKey::route("default", "web"));
}

#[test]
pub fn test_object_id_format() {
    let id = ObjectId::new(&ResourceKey::route("apps", "web"), GatewayObjectKind::Route, 2);
    assert_eq!(id.to_string(), "apps_web_route_2");
    assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("apps_web_route_2"));
}

#[test]
pub fn test_content_hash_tracks_content() {
    let upstream = |port| {
        GatewayObject::Upstream(UpstreamObject {
            id: ObjectId::new(&ResourceKey::route("apps", "web"), GatewayObjectKind::Upstream, 0),
            name: "apps_web_0".to_owned(),
            service_name: "httpbin".to_owned(),
            port,
            weight: None,
            resolve_granularity: ResolveGranularity::Endpoint,
        })
    };

    assert_eq!(upstream(80).content_hash(), upstream(80).content_hash());
    assert_ne!(upstream(80).content_hash(), upstream(8080).content_hash());
}
