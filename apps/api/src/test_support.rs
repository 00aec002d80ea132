//! Shared fixtures: a scripted generator and an `AppState` wired to in-memory backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{Caller, TrustedHeaderIdentity};
use crate::config::Config;
use crate::llm_client::{GeneratedObject, Generator, GeneratorRegistry, LlmError, TextStream};
use crate::models::generation::TokenUsage;
use crate::rate_limit::{MemoryCounterStore, RateLimiter};
use crate::render::pdf::PdfRenderer;
use crate::schema::{SchemaValidator, SchemaValidators};
use crate::state::AppState;
use crate::store::MemoryStore;

pub enum Reply {
    Object(Value),
    Fail(String),
    /// Never resolves; exercises the generation timeout.
    Hang,
}

/// Generator double that replays a fixed reply and chunk sequence.
pub struct ScriptedGenerator {
    model: String,
    reply: Reply,
    chunks: Vec<Result<String, String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(reply: Reply) -> Self {
        Self {
            model: "scripted-model".to_string(),
            reply,
            chunks: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn returning(object: Value) -> Self {
        Self::new(Reply::Object(object))
    }

    pub fn with_chunks(mut self, chunks: &[Result<&str, &str>]) -> Self {
        self.chunks = chunks
            .iter()
            .map(|c| c.map(str::to_string).map_err(str::to_string))
            .collect();
        self
    }

    /// Number of generator invocations (structured and streaming).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        _prompt: &str,
        _target_schema: &SchemaValidator,
    ) -> Result<GeneratedObject, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Object(object) => Ok(GeneratedObject {
                object: object.clone(),
                usage: TokenUsage::new(120, 80),
            }),
            Reply::Fail(message) => Err(LlmError::Api {
                status: 500,
                message: message.clone(),
            }),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<TextStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items: Vec<Result<String, LlmError>> = self
            .chunks
            .iter()
            .cloned()
            .map(|c| c.map_err(LlmError::Stream))
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
}

pub fn harness(generator: ScriptedGenerator) -> Harness {
    harness_with_config(generator, Config::for_tests())
}

pub fn harness_with_config(generator: ScriptedGenerator, config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(generator);
    let tier: Arc<dyn Generator> = generator.clone();

    let state = AppState {
        store: store.clone(),
        limiter: Arc::new(RateLimiter::new(
            config.rate_limits,
            Arc::new(MemoryCounterStore::default()),
        )),
        generators: GeneratorRegistry::new(tier.clone(), tier),
        validators: Arc::new(SchemaValidators::load().unwrap()),
        renderer: Arc::new(PdfRenderer::default()),
        identity: Arc::new(TrustedHeaderIdentity::new(&config.identity_header).unwrap()),
        config,
    };

    Harness {
        state,
        store,
        generator,
    }
}

pub fn caller() -> Caller {
    Caller {
        user_id: Uuid::new_v4(),
        origin: Some("203.0.113.10".to_string()),
    }
}
