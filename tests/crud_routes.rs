mod support;

use axum::http::StatusCode;
use serde_json::json;
use support::app;

#[tokio::test]
async fn create_get_update_destroy() {
    let app = app();

    let (status, created) = app.send("POST", "/products", Some(json!({ "name": "lamp", "inventory": 3 }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["id"], json!(1));
    assert_eq!(created["name"], json!("lamp"));

    let (status, got) = app.send("GET", "/products/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["inventory"], json!(3));

    let (status, updated) = app.send("PUT", "/products/1", Some(json!({ "inventory": 0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["inventory"], json!(0));
    assert_eq!(updated["name"], json!("lamp"));

    let (status, deleted) = app.send("DELETE", "/products/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"], json!(1));

    let (status, list) = app.send("GET", "/products", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn missing_instance_is_not_found() {
    let app = app();
    let (status, body) = app.send("GET", "/products/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));

    let (status, _) = app.send("PUT", "/products/99", Some(json!({ "name": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("DELETE", "/products/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_pages_and_filters() {
    let app = app();
    for (name, inventory) in [("a", 0), ("b", 4), ("c", 0)] {
        app.seed("product", json!({ "name": name, "inventory": inventory })).await;
    }

    let (_, page) = app.send("GET", "/products?limit=2", None).await;
    assert_eq!(page.as_array().map(Vec::len), Some(2));
    let (_, rest) = app.send("GET", "/products?offset=2&limit=2", None).await;
    assert_eq!(rest[0]["name"], json!("c"));

    let (status, filtered) = app.send("GET", "/products?filter[inventory]=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(filtered.as_array().map(Vec::len), Some(2));

    let (status, by_json) = app.send("GET", "/products?filter=%7B%22name%22%3A%22b%22%7D", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_json[0]["name"], json!("b"));

    let (status, count) = app.send("GET", "/products/count?filter[inventory]=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count, json!({ "count": 2 }));
}

#[tokio::test]
async fn invalid_queries_are_rejected() {
    let app = app();
    app.seed("product", json!({ "name": "a", "inventory": 1 })).await;

    for uri in [
        "/products?limit=1000",
        "/products?limit=0",
        "/products?offset=-1",
        "/products?limit=ten",
        "/products?sort=name",
        "/products?filter=5",
        "/products?filter[colour]=red",
        "/products?include=warehouse",
        "/products/abc",
        "/products/0",
    ] {
        let (status, body) = app.send("GET", uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], json!("bad_request"), "{uri}");
    }

    let (status, _) = app.send("POST", "/products", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scope_routes_apply_the_named_scope() {
    let app = app();
    for (name, inventory) in [("a", 0), ("b", 4)] {
        app.seed("product", json!({ "name": name, "inventory": inventory })).await;
    }

    let (status, scoped) = app.send("GET", "/products/s/outOfStock", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(scoped, json!([{ "id": 1, "name": "a", "inventory": 0, "productCategoryId": null }]));

    let (status, _) = app.send("GET", "/products/s/discontinued", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Models without scopes have no scope route.
    assert!(!app.routes.iter().any(|r| r.starts_with("/tags/s/")));
}

#[tokio::test]
async fn include_loads_related_rows() {
    let app = app();
    app.seed("productCategory", json!({ "name": "lighting" })).await;
    app.seed("product", json!({ "name": "lamp", "inventory": 1, "productCategoryId": 1 })).await;

    let (status, got) = app.send("GET", "/products/1?include=productCategory", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(got["productCategory"]["name"], json!("lighting"));

    // Target model names resolve to the association key.
    let (status, list) = app.send("GET", "/productCategories?include=product", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["products"][0]["name"], json!("lamp"));
}

#[tokio::test]
async fn join_models_get_no_routes() {
    let app = app();
    assert!(!app.routes.iter().any(|r| r.starts_with("/product_tag") || r.starts_with("/productTag")));
    assert!(app.routes.contains(&"/productCategories/{id}/products/count|GET".to_string()));
}
