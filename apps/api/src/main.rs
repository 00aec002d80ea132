mod auth;
mod config;
mod db;
mod errors;
mod export;
mod generation;
mod llm_client;
mod models;
mod rate_limit;
mod render;
mod routes;
mod schema;
mod state;
mod store;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::TrustedHeaderIdentity;
use crate::config::Config;
use crate::db::create_pool;
use crate::generation::reconcile::spawn_reconciler;
use crate::llm_client::{GeneratorRegistry, LlmClient};
use crate::rate_limit::{CounterStore, MemoryCounterStore, RateLimiter, RedisCounterStore};
use crate::render::pdf::PdfRenderer;
use crate::routes::build_router;
use crate::schema::SchemaValidators;
use crate::state::AppState;
use crate::store::{PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(db));

    // Rate limit counters: Redis when shared across instances, in-process otherwise
    let counters: Arc<dyn CounterStore> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let counters = RedisCounterStore::connect(&client).await?;
            info!("Rate limit counters backed by Redis");
            Arc::new(counters)
        }
        None => {
            info!("REDIS_URL not set; rate limit counters are per-process");
            Arc::new(MemoryCounterStore::default())
        }
    };
    let limiter = Arc::new(RateLimiter::new(config.rate_limits, counters));

    // Initialize LLM tiers
    let default_tier = LlmClient::new(config.anthropic_api_key.clone(), config.ai_model.clone())?;
    let pro_tier = LlmClient::new(config.anthropic_api_key.clone(), config.ai_model_pro.clone())?;
    info!(
        "LLM client initialized (model: {}, pro: {})",
        config.ai_model, config.ai_model_pro
    );
    let generators = GeneratorRegistry::new(Arc::new(default_tier), Arc::new(pro_tier));

    let validators = Arc::new(SchemaValidators::load()?);
    let identity = Arc::new(TrustedHeaderIdentity::new(&config.identity_header)?);
    info!("Caller identity read from '{}' header", config.identity_header);

    spawn_reconciler(
        store.clone(),
        config.stale_generation_after,
        config.reconcile_interval,
    );

    // Build app state
    let state = AppState {
        store,
        limiter,
        generators,
        validators,
        renderer: Arc::new(PdfRenderer::default()),
        identity,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
