//! Shared fixture: a product catalog graph mounted over a `MemoryStore`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use model_crud::{
    register_all, AppState, ControllerOverride, Extensions, MemoryStore, ModelGraph, OptionResolver,
    OverrideRegistry, PluginOptions, Registration, RegistrationContext, Store,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const MODELS: &str = r#"[
    {
        "name": "product",
        "attributes": ["name", "inventory"],
        "scopes": { "outOfStock": { "inventory": 0 } },
        "associations": [
            { "key": "productCategory", "type": "BelongsTo", "target": "productCategory" },
            { "key": "tags", "type": "BelongsToMany", "target": "tag", "through": { "table": "productTag" } }
        ]
    },
    {
        "name": "productCategory",
        "plural": "productCategories",
        "attributes": ["name"],
        "associations": [
            { "key": "products", "type": "HasMany", "target": "product" }
        ]
    },
    { "name": "tag", "attributes": ["label"] },
    { "name": "product_tag", "singular": "productTag", "table": "productTag", "attributes": ["productId", "tagId"] }
]"#;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub graph: Arc<ModelGraph>,
    pub routes: Vec<String>,
}

impl TestApp {
    /// Insert a row directly through the store.
    pub async fn seed(&self, model: &str, values: Value) -> Value {
        let model = match self.graph.get(model) {
            Some(m) => Arc::clone(m),
            None => panic!("unknown fixture model {model}"),
        };
        let values: Map<String, Value> = match values {
            Value::Object(map) => map,
            other => panic!("seed values must be an object, got {other}"),
        };
        match self.store.create(&model, values).await {
            Ok(v) => v,
            Err(e) => panic!("seed failed: {e}"),
        }
    }

    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_with(method, uri, body, None).await
    }

    pub async fn send_with(&self, method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(v) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(v.to_string())),
            None => builder.body(Body::empty()),
        };
        let req = match req {
            Ok(r) => r,
            Err(e) => panic!("failed to build request: {e}"),
        };
        let resp = match self.router.clone().oneshot(req).await {
            Ok(r) => r,
            Err(e) => panic!("handler error: {e}"),
        };
        let status = resp.status();
        let bytes = match axum::body::to_bytes(resp.into_body(), 1024 * 1024).await {
            Ok(b) => b,
            Err(e) => panic!("failed to read body: {e}"),
        };
        if bytes.is_empty() {
            return (status, Value::Null);
        }
        // Rejections raised by axum itself carry plain text.
        match serde_json::from_slice(&bytes) {
            Ok(v) => (status, v),
            Err(_) => (status, Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        }
    }
}

pub fn graph() -> Arc<ModelGraph> {
    match ModelGraph::from_json_str(MODELS) {
        Ok(g) => Arc::new(g),
        Err(e) => panic!("fixture graph: {e}"),
    }
}

pub fn resolver(overrides: &[(&str, Value)]) -> OptionResolver {
    let mut registry = OverrideRegistry::default();
    for (name, value) in overrides {
        match ControllerOverride::from_value(value) {
            Ok(over) => registry.insert(name, over),
            Err(e) => panic!("override for {name}: {e}"),
        }
    }
    OptionResolver::new(registry)
}

pub fn register(
    graph: &ModelGraph,
    options: &PluginOptions,
    overrides: &[(&str, Value)],
    extensions: &Extensions,
) -> Registration {
    let resolver = resolver(overrides);
    let ctx = RegistrationContext {
        options,
        resolver: &resolver,
        extensions,
    };
    match register_all(graph, ctx) {
        Ok(r) => r,
        Err(e) => panic!("registration failed: {e}"),
    }
}

pub fn app_with(options: PluginOptions, overrides: &[(&str, Value)], extensions: Extensions) -> TestApp {
    let graph = graph();
    let registration = register(&graph, &options, overrides, &extensions);
    let routes = registration.route_strings();
    let store = Arc::new(MemoryStore::new(Arc::clone(&graph)));
    let state = AppState::new(store.clone(), Arc::clone(&graph));
    let router = registration.into_router(state, options.body_limit);
    TestApp {
        router,
        store,
        graph,
        routes,
    }
}

pub fn app() -> TestApp {
    app_with(PluginOptions::default(), &[], Extensions::new())
}
