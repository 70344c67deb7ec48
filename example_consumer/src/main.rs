//! Example consumer: users and posts served from the in-memory store.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`
//!
//! Try `POST /signup` with `{"user": {"name": "ann", "email": "ann@example.com"}, "post": {"title": "hi"}}`
//! then `GET /users?include=posts&sort=-name&page[size]=10`.

use endpoint_sdk::{
    common_routes, init_tracing,
    model::{KeyKind, Relation},
    AppState, CompositeEndpoint, ConfigError, Engine, EngineConfig, EndpointRouter, Field, FieldRegistry,
    MemoryStore, ModelEndpoint, RunType, TableSpec,
};
use std::sync::Arc;
use tokio::net::TcpListener;

fn user_fields(create: bool) -> Result<FieldRegistry, ConfigError> {
    let required = if create { "required|" } else { "" };
    FieldRegistry::builder()
        .field(Field::new("id").rules("integer").filterable().sortable())
        .field(Field::new("name").rules(format!("{}string|max:255", required)).filterable().sortable())
        .field(Field::new("email").rules(format!("{}email", required)).filterable())
        .field(Field::new("age").rules("nullable|integer|min:0").filterable().sortable())
        .freeze()
}

fn post_fields() -> Result<FieldRegistry, ConfigError> {
    FieldRegistry::builder()
        .field(Field::new("id").rules("uuid").filterable())
        .field(Field::new("user_id").rules("required|integer").filterable())
        .field(Field::new("title").rules("required|string|max:140").filterable().sortable())
        .freeze()
}

fn build_engine(config: EngineConfig, store: &MemoryStore) -> Result<Engine, Box<dyn std::error::Error>> {
    let users = Arc::new(store.table("users")?);
    let posts = Arc::new(store.table("posts")?);

    let signup = CompositeEndpoint::new()
        .add_api(
            "user",
            "users.create",
            CompositeEndpoint::callback(|user, payload| {
                payload.set("post.user_id", user["id"].clone());
                Ok(())
            }),
            &[],
        )
        .add_api("post", "posts.create", None, &["user_id"]);

    let engine = Engine::builder()
        .config(config)
        .transactions(Arc::new(store.clone()))
        .endpoint(
            "users.index",
            Arc::new(ModelEndpoint::new("users.index", users.clone(), RunType::ReadAll, user_fields(false)?)),
        )
        .endpoint(
            "users.show",
            Arc::new(ModelEndpoint::new("users.show", users.clone(), RunType::Read, user_fields(false)?)),
        )
        .endpoint(
            "users.create",
            Arc::new(ModelEndpoint::new("users.create", users.clone(), RunType::Create, user_fields(true)?).bulk("bulk")),
        )
        .endpoint(
            "users.update",
            Arc::new(ModelEndpoint::new("users.update", users.clone(), RunType::Update, user_fields(false)?)),
        )
        .endpoint(
            "users.delete",
            Arc::new(ModelEndpoint::new("users.delete", users, RunType::Delete, user_fields(false)?)),
        )
        .endpoint(
            "posts.index",
            Arc::new(ModelEndpoint::new("posts.index", posts.clone(), RunType::ReadAll, post_fields()?)),
        )
        .endpoint(
            "posts.create",
            Arc::new(ModelEndpoint::new("posts.create", posts, RunType::Create, post_fields()?)),
        )
        .endpoint("signup", Arc::new(signup))
        .build()?;
    Ok(engine)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("endpoint_sdk=info,example_consumer=info");

    let config = EngineConfig::from_env()?;
    let store = MemoryStore::new();
    store
        .define(TableSpec::new("users").relation(Relation::to_many("posts", "posts", "id", "user_id")))?
        .define(
            TableSpec::new("posts")
                .key("id", KeyKind::Uuid)
                .relation(Relation::to_one("author", "users", "user_id", "id")),
        )?;

    let state = AppState::new(build_engine(config, &store)?);
    tracing::info!(endpoints = ?state.engine.endpoints().names().collect::<Vec<_>>(), "engine ready");

    let app = EndpointRouter::new()
        .get("/users", "users.index")
        .post("/users", "users.create")
        .get("/users/:id", "users.show")
        .patch("/users/:id", "users.update")
        .delete("/users/:id", "users.delete")
        .get("/posts", "posts.index")
        .post("/posts", "posts.create")
        .post("/signup", "signup")
        .into_router(state)
        .merge(common_routes());

    let addr = std::env::var("APP_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
