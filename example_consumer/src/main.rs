//! Demo server: mounts generated routes for the models in `models.json`.
//!
//! Run from this directory (models.json and controllers/ are read relative to it): `cargo run`
//! Set `DATABASE_URL` to serve from PostgreSQL instead of memory.

use model_crud::{
    register_all, AppState, BearerTokenAuth, Extensions, MemoryStore, ModelGraph, OptionResolver,
    OverrideRegistry, PgStore, PluginOptions, RegistrationContext, Store,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("model_crud=info,example_consumer=info")),
        )
        .init();

    let models_path = std::env::var("MODELS_PATH").unwrap_or_else(|_| "models.json".into());
    let graph = Arc::new(ModelGraph::from_json_str(&std::fs::read_to_string(&models_path)?)?);

    let options = PluginOptions {
        prefix: std::env::var("API_PREFIX").unwrap_or_else(|_| "/api".into()),
        private: vec!["product_tag".into()],
        ..Default::default()
    };
    let registry = OverrideRegistry::load_files(&options.controllers, &graph)?;
    let resolver = OptionResolver::new(registry);

    let token = std::env::var("API_TOKEN").unwrap_or_else(|_| "dev-token".into());
    let extensions = Extensions::new().with_authenticator("default", BearerTokenAuth::new([token]));

    let registration = register_all(
        &graph,
        RegistrationContext {
            options: &options,
            resolver: &resolver,
            extensions: &extensions,
        },
    )?;
    for route in registration.route_strings() {
        tracing::debug!(route = %route, "mounted");
    }

    let store: Arc<dyn Store> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await?;
            Arc::new(PgStore::new(pool, Arc::clone(&graph)))
        }
        Err(_) => Arc::new(MemoryStore::new(Arc::clone(&graph))),
    };
    let state = AppState::new(store, graph);
    let app = registration.into_router(state, options.body_limit);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
