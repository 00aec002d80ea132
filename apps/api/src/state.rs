use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::llm_client::GeneratorRegistry;
use crate::rate_limit::RateLimiter;
use crate::render::DocumentRenderer;
use crate::schema::SchemaValidators;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub limiter: Arc<RateLimiter>,
    /// Default and pro generator tiers, resolved per request.
    pub generators: GeneratorRegistry,
    pub validators: Arc<SchemaValidators>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Config,
}
