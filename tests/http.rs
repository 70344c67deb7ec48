//! HTTP surface: routing, payload assembly, status codes, body limit.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use endpoint_sdk::{
    common_routes, AppState, Engine, EndpointRouter, Field, FieldRegistry, MemoryStore, ModelEndpoint, RunType,
    TableSpec,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn fields() -> FieldRegistry {
    FieldRegistry::builder()
        .field(Field::new("id").rules("integer").filterable().sortable())
        .field(Field::new("name").rules("string").filterable().sortable())
        .field(Field::new("age").rules("integer").filterable().sortable())
        .freeze()
        .unwrap()
}

fn app(body_limit: usize) -> Router {
    let store = MemoryStore::new();
    store.define(TableSpec::new("users")).unwrap();
    let users = Arc::new(store.table("users").unwrap());
    let endpoint = |name: &str, run_type| Arc::new(ModelEndpoint::new(name, users.clone(), run_type, fields()));
    let engine = Engine::builder()
        .transactions(Arc::new(store.clone()))
        .endpoint("users.index", endpoint("users.index", RunType::ReadAll))
        .endpoint("users.create", Arc::new(ModelEndpoint::new("users.create", users.clone(), RunType::Create, fields()).bulk("bulk")))
        .endpoint("users.show", endpoint("users.show", RunType::Read))
        .endpoint("users.delete", endpoint("users.delete", RunType::Delete))
        .build()
        .unwrap();
    EndpointRouter::new()
        .get("/users", "users.index")
        .post("/users", "users.create")
        .get("/users/:id", "users.show")
        .delete("/users/:id", "users.delete")
        .body_limit(body_limit)
        .into_router(AppState::new(engine))
        .merge(common_routes())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = send(&app(1024), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_then_list_with_query_string() {
    let app = app(64 * 1024);
    for (name, age) in [("ann", 30), ("bob", 12), ("cat", 41)] {
        let (status, body) = send(&app, "POST", "/users", Some(json!({"name": name, "age": age}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], name);
    }

    let uri = "/users?filter[0][field]=age&filter[0][type]=gte&filter[0][value]=18&sort=-name&page[size]=1";
    let (status, body) = send(&app, "GET", uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "cat");
    assert_eq!(body["meta"]["pagination"]["total"], 2);
    assert_eq!(body["meta"]["pagination"]["per_page"], 1);
}

#[tokio::test]
async fn validation_errors_are_422() {
    let (status, body) = send(&app(1024), "POST", "/users", Some(json!({"age": "old"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["details"]["age"].is_array());
}

#[tokio::test]
async fn bulk_returns_one_slot_per_item() {
    let app = app(64 * 1024);
    let (status, body) = send(
        &app,
        "POST",
        "/users",
        Some(json!({"bulk": [{"name": "ann"}, {"name": 5}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "ann");
    assert_eq!(body["data"][1]["error"]["code"], "validation_error");
}

#[tokio::test]
async fn path_parameters_address_records() {
    let app = app(64 * 1024);
    send(&app, "POST", "/users", Some(json!({"name": "ann"}))).await;

    let (status, body) = send(&app, "GET", "/users/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "ann");

    let (status, body) = send(&app, "DELETE", "/users/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["acknowledged"], true);

    let (status, body) = send(&app, "GET", "/users/1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let big = json!({"name": "x".repeat(256)});
    let (status, _) = send(&app(64), "POST", "/users", Some(big)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let request = Request::builder()
        .method("POST")
        .uri("/users")
        .body(Body::from("{nope"))
        .unwrap();
    let response = app(1024).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
