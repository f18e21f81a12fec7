use std::sync::Arc;

use axum::{routing::get, serve, Router};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use notehub::{api, config};
use notehub_core::auth::{Hs256Verifier, RemoteJwksVerifier, TokenVerifier};
use notehub_core::events::EventBus;
use notehub_core::store::DocumentStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = config::Config::parse();

    let store = Arc::new(RwLock::new(DocumentStore::new(&cfg.data_dir)?));
    let events = EventBus::new();
    let verifier: Arc<dyn TokenVerifier> = match &cfg.jwks_url {
        Some(url) => Arc::new(RemoteJwksVerifier::new(url.clone())),
        None => Arc::new(Hs256Verifier::new(cfg.jwt_secret.clone())),
    };

    let app = Router::new()
        .merge(api::router(store, events, verifier, cfg.cascade_on_delete))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(cfg.bind).await?;
    tracing::info!(addr = %cfg.bind, data_dir = %cfg.data_dir.display(), "listening");
    serve(listener, app.into_make_service()).await?;
    Ok(())
}
