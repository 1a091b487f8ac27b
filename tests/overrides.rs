mod support;

use async_trait::async_trait;
use axum::http::StatusCode;
use model_crud::{
    AppError, AppState, AuthSetting, BearerTokenAuth, CustomHandler, Extensions, ModelState, PluginOptions,
    PreHandler, RouteRequest,
};
use serde_json::{json, Value};
use support::{app_with, graph, register};

struct Echo;

#[async_trait]
impl CustomHandler for Echo {
    async fn handle(&self, _state: &AppState, request: &RouteRequest) -> Result<Value, AppError> {
        Ok(json!({
            "model": request.model.name,
            "path": request.path,
            "id": request.params.get("id"),
            "body": request.body,
        }))
    }
}

struct Fixed(Value);

#[async_trait]
impl PreHandler for Fixed {
    async fn run(&self, _state: &AppState, _request: &RouteRequest) -> Result<Value, AppError> {
        Ok(self.0.clone())
    }
}

#[test]
fn disabling_destroy_keeps_other_crud_routes() {
    let graph = graph();
    let reg = register(
        &graph,
        &PluginOptions::default(),
        &[("product", json!({ "destroy": false }))],
        &Extensions::new(),
    );
    let routes = reg.route_strings();
    assert!(!routes.contains(&"/products/{id}|DELETE".to_string()));
    for kept in ["/products|GET", "/products/{id}|GET", "/products|POST", "/products/{id}|PUT", "/products/count|GET"] {
        assert!(routes.contains(&kept.to_string()), "{kept}");
    }
    // Association destroy routes are a separate family.
    assert!(routes.contains(&"/products/{id}/tags/{aid}|DELETE".to_string()));
}

#[test]
fn wildcards_cascade_from_default_to_association_leaf() {
    let graph = graph();
    let overrides = [
        ("_default", json!({ "*": { "count": false } })),
        (
            "product",
            json!({
                "associations": {
                    "*": { "destroyMany": false },
                    "tags": { "count": true }
                }
            }),
        ),
        ("tag", json!({ "*": false })),
    ];
    let reg = register(&graph, &PluginOptions::default(), &overrides, &Extensions::new());
    let routes = reg.route_strings();

    assert!(!routes.contains(&"/products/count|GET".to_string()));
    assert!(!routes.contains(&"/productCategories/{id}/products/count|GET".to_string()));
    assert!(routes.contains(&"/products/{id}/tags/count|GET".to_string()));
    assert!(!routes.contains(&"/products/{id}/tags|DELETE".to_string()));
    assert!(routes.contains(&"/products/{id}/tags/{aid}|DELETE".to_string()));
    assert!(!routes.iter().any(|r| r.starts_with("/tags")));
    assert_eq!(reg.model("tag").map(|m| m.state.clone()), Some(ModelState::Skipped("disabled".into())));
}

#[test]
fn prefix_and_snake_case_shape_paths() {
    let graph = graph();
    let options = PluginOptions {
        prefix: "/api/".into(),
        snake_case: true,
        scope_prefix: "scope".into(),
        ..Default::default()
    };
    let routes = register(&graph, &options, &[], &Extensions::new()).route_strings();
    assert!(routes.contains(&"/api/product_categories/{id}/products|GET".to_string()));
    assert!(routes.contains(&"/api/products/{id}/product_category/{aid}|PUT".to_string()));
    assert!(routes.contains(&"/api/products/scope/{scope}|GET".to_string()));
}

#[tokio::test]
async fn overlay_path_replaces_the_generated_path() {
    let app = app_with(
        PluginOptions::default(),
        &[("product", json!({ "index": { "path": "/catalog" } }))],
        Extensions::new(),
    );
    app.seed("product", json!({ "name": "lamp", "inventory": 1 })).await;
    let (status, rows) = app.send("GET", "/catalog", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows[0]["name"], json!("lamp"));
    let (status, _) = app.send("GET", "/products", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn custom_handler_replaces_the_built_in_operation() {
    let app = app_with(
        PluginOptions::default(),
        &[("product", json!({ "update": { "handler": "echo" } }))],
        Extensions::new().with_handler("echo", Echo),
    );
    let (status, body) = app.send("PUT", "/products/7", Some(json!({ "name": "x" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "model": "product", "path": "/products/{id}", "id": "7", "body": { "name": "x" } })
    );
}

#[tokio::test]
async fn pre_hooks_supply_the_instance_and_scopes() {
    let extensions = Extensions::new()
        .with_pre("pinned", Fixed(json!({ "id": 42, "name": "pinned" })))
        .with_pre("onlyOutOfStock", Fixed(json!([["outOfStock"], null])));
    let overrides = [(
        "product",
        json!({
            "get": { "config": { "pre": [{ "method": "pinned", "assign": "model" }] } },
            "index": { "config": { "pre": [{ "method": "onlyOutOfStock", "assign": "scope" }] } }
        }),
    )];
    let app = app_with(PluginOptions::default(), &overrides, extensions);
    for (name, inventory) in [("a", 0), ("b", 4)] {
        app.seed("product", json!({ "name": name, "inventory": inventory })).await;
    }

    let (status, got) = app.send("GET", "/products/99", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["name"], json!("pinned"));

    let (_, list) = app.send("GET", "/products", None).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));
    assert_eq!(list[0]["name"], json!("a"));
}

#[tokio::test]
async fn association_pre_hook_scopes_narrow_the_source() {
    let extensions = Extensions::new().with_pre("outOfStockOnly", Fixed(json!("outOfStock")));
    let overrides = [(
        "product",
        json!({
            "associations": {
                "tags": { "index": { "config": { "pre": [{ "method": "outOfStockOnly", "assign": "scope" }] } } }
            }
        }),
    )];
    let app = app_with(PluginOptions::default(), &overrides, extensions);
    app.seed("product", json!({ "name": "stocked", "inventory": 5 })).await;
    app.seed("product", json!({ "name": "empty", "inventory": 0 })).await;
    app.seed("tag", json!({ "label": "sale" })).await;
    let (status, _) = app.send("PUT", "/products/2/tags/1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send("GET", "/products/1/tags", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], json!("not found: product 1 not found"));

    // The scope names a product scope, so the tag query must not see it.
    let (status, tags) = app.send("GET", "/products/2/tags", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tags[0]["label"], json!("sale"));
}

#[tokio::test]
async fn auth_guards_configured_routes() {
    let options = PluginOptions::default();
    let overrides = [
        ("product", json!({ "destroy": { "config": { "auth": true } } })),
        ("tag", json!({ "index": { "config": { "auth": "admin" } } })),
    ];
    let extensions = Extensions::new()
        .with_authenticator("default", BearerTokenAuth::new(["secret"]))
        .with_authenticator("admin", BearerTokenAuth::new(["root"]));
    let app = app_with(options, &overrides, extensions);
    app.seed("product", json!({ "name": "a", "inventory": 1 })).await;

    let (status, body) = app.send("DELETE", "/products/1", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("unauthorized"));
    let (status, _) = app.send_with("DELETE", "/products/1", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send_with("DELETE", "/products/1", None, Some("secret")).await;
    assert_eq!(status, StatusCode::OK);

    // Unguarded routes stay open.
    let (status, _) = app.send("GET", "/products", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send_with("GET", "/tags", None, Some("secret")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send_with("GET", "/tags", None, Some("root")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn global_auth_applies_unless_a_route_opts_out() {
    let options = PluginOptions {
        auth: AuthSetting::Enabled(true),
        ..Default::default()
    };
    let overrides = [("product", json!({ "index": { "config": { "auth": false } } }))];
    let app = app_with(options, &overrides, Extensions::new().with_authenticator("default", BearerTokenAuth::new(["t"])));

    let (status, _) = app.send("GET", "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.send("GET", "/products/count", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let options = PluginOptions {
        body_limit: 64,
        ..Default::default()
    };
    let app = app_with(options, &[], Extensions::new());
    let (status, _) = app
        .send("POST", "/products", Some(json!({ "name": "x".repeat(200) })))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
