//! Rate limiting: independent sliding windows per caller identity and per origin.
//!
//! The identity window is the looser, longer one; the origin window is stricter
//! and shorter since many identities can share one address. Counters never
//! interact: tripping one leaves the other untouched.
//!
//! Atomicity is delegated to the `CounterStore`. `RedisCounterStore` is required
//! when more than one instance serves traffic; `MemoryCounterStore` is the
//! single-instance substitute.

pub mod memory;
pub mod redis_store;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use self::memory::MemoryCounterStore;
pub use self::redis_store::RedisCounterStore;

/// Which counter denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitScope {
    User,
    Ip,
}

impl RateLimitScope {
    fn key_prefix(self) -> &'static str {
        match self {
            RateLimitScope::User => "rl:user",
            RateLimitScope::Ip => "rl:ip",
        }
    }
}

impl fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitScope::User => f.write_str("user"),
            RateLimitScope::Ip => f.write_str("ip"),
        }
    }
}

/// Threshold and window length for one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub max_requests: u32,
    pub window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub user: WindowConfig,
    pub ip: WindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user: WindowConfig {
                max_requests: 20,
                window: Duration::from_secs(60),
            },
            ip: WindowConfig {
                max_requests: 15,
                window: Duration::from_secs(10),
            },
        }
    }
}

/// Outcome of recording one hit against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    Allowed { remaining: u32 },
    Denied { retry_after: Duration },
}

/// Overall verdict for a (identity, origin) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    Deny {
        scope: RateLimitScope,
        retry_after_secs: u64,
    },
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("counter backend returned an unexpected reply: {0}")]
    Protocol(String),

    #[error("counter store is full ({tracked} keys tracked)")]
    AtCapacity { tracked: usize },
}

/// Atomic sliding-window counter backend.
///
/// `hit` records the request only when it is allowed; a denied request does not
/// extend its own window.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> Result<WindowDecision, RateLimitError>;
}

/// Gate consulted before any generator spend.
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    /// Checks the identity counter, then the origin counter. A missing key skips
    /// that counter only.
    pub async fn check(&self, user_id: Option<&str>, origin: Option<&str>) -> RateLimitDecision {
        let checks = [
            (RateLimitScope::User, user_id, self.config.user),
            (RateLimitScope::Ip, origin, self.config.ip),
        ];

        for (scope, key, window) in checks {
            let Some(key) = key.filter(|k| !k.is_empty()) else {
                continue;
            };
            if let Some(retry_after_secs) = self.hit(scope, key, window).await {
                warn!("Rate limit exceeded: scope={scope} retry_after={retry_after_secs}s");
                return RateLimitDecision::Deny {
                    scope,
                    retry_after_secs,
                };
            }
        }

        RateLimitDecision::Allow
    }

    /// Returns the retry-after in whole seconds when the window is exhausted.
    async fn hit(&self, scope: RateLimitScope, key: &str, window: WindowConfig) -> Option<u64> {
        let counter_key = format!("{}:{}", scope.key_prefix(), key);
        match self
            .store
            .hit(&counter_key, window.max_requests, window.window)
            .await
        {
            Ok(WindowDecision::Allowed { .. }) => None,
            Ok(WindowDecision::Denied { retry_after }) => Some(retry_after_secs(retry_after)),
            Err(e) => {
                // Fail open for this counter only; the other counter still applies.
                warn!("Rate limit counter unavailable for scope={scope}: {e}");
                None
            }
        }
    }
}

/// Rounds a reset delay up to whole seconds, never below one.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn hit(&self, _: &str, _: u32, _: Duration) -> Result<WindowDecision, RateLimitError> {
            Err(RateLimitError::Protocol("backend down".to_string()))
        }
    }

    fn limiter(user_max: u32, ip_max: u32) -> RateLimiter {
        RateLimiter::new(
            RateLimitConfig {
                user: WindowConfig {
                    max_requests: user_max,
                    window: Duration::from_secs(60),
                },
                ip: WindowConfig {
                    max_requests: ip_max,
                    window: Duration::from_secs(10),
                },
            },
            Arc::new(MemoryCounterStore::default()),
        )
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_user_scope_trips_after_limit() {
        let limiter = limiter(3, 100);
        for _ in 0..3 {
            assert_eq!(limiter.check(Some("u1"), Some("1.2.3.4")).await, RateLimitDecision::Allow);
        }
        match limiter.check(Some("u1"), Some("1.2.3.4")).await {
            RateLimitDecision::Deny {
                scope,
                retry_after_secs,
            } => {
                assert_eq!(scope, RateLimitScope::User);
                assert!(retry_after_secs > 0);
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ip_scope_trips_across_identities() {
        let limiter = limiter(100, 2);
        assert_eq!(limiter.check(Some("a"), Some("10.0.0.1")).await, RateLimitDecision::Allow);
        assert_eq!(limiter.check(Some("b"), Some("10.0.0.1")).await, RateLimitDecision::Allow);
        assert!(matches!(
            limiter.check(Some("c"), Some("10.0.0.1")).await,
            RateLimitDecision::Deny {
                scope: RateLimitScope::Ip,
                ..
            }
        ));
        // Another origin is unaffected.
        assert_eq!(limiter.check(Some("c"), Some("10.0.0.2")).await, RateLimitDecision::Allow);
    }

    #[tokio::test]
    async fn test_missing_origin_skips_ip_counter_only() {
        let limiter = limiter(2, 1);
        assert_eq!(limiter.check(Some("u"), None).await, RateLimitDecision::Allow);
        assert_eq!(limiter.check(Some("u"), None).await, RateLimitDecision::Allow);
        assert!(matches!(
            limiter.check(Some("u"), None).await,
            RateLimitDecision::Deny {
                scope: RateLimitScope::User,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_counters_are_independent() {
        let limiter = limiter(1, 5);
        assert_eq!(limiter.check(Some("u"), Some("ip")).await, RateLimitDecision::Allow);
        // User is now exhausted; the denial must not consume or reset the ip window.
        assert!(matches!(
            limiter.check(Some("u"), Some("ip")).await,
            RateLimitDecision::Deny {
                scope: RateLimitScope::User,
                ..
            }
        ));
        for other in ["v", "w", "x", "y"] {
            assert_eq!(limiter.check(Some(other), Some("ip")).await, RateLimitDecision::Allow);
        }
        assert!(matches!(
            limiter.check(Some("z"), Some("ip")).await,
            RateLimitDecision::Deny {
                scope: RateLimitScope::Ip,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_fails_open() {
        let limiter = RateLimiter::new(RateLimitConfig::default(), Arc::new(FailingStore));
        assert_eq!(limiter.check(Some("u"), Some("ip")).await, RateLimitDecision::Allow);
    }

    #[tokio::test]
    async fn test_full_counter_store_never_denies_an_untouched_counter() {
        let limiter = RateLimiter::new(
            RateLimitConfig::default(),
            Arc::new(MemoryCounterStore::new(1_000, 4)),
        );
        // Rotating origins fill every tracked slot.
        for i in 0..4 {
            let origin = format!("198.51.100.{i}");
            assert_eq!(limiter.check(None, Some(&origin)).await, RateLimitDecision::Allow);
        }

        assert_eq!(
            limiter.check(Some("fresh-user"), None).await,
            RateLimitDecision::Allow
        );
        assert_eq!(
            limiter.check(Some("fresh-user"), Some("198.51.100.99")).await,
            RateLimitDecision::Allow
        );
    }

    #[test]
    fn test_scope_serializes_lowercase() {
        assert_eq!(serde_json::to_value(RateLimitScope::User).unwrap(), "user");
        assert_eq!(serde_json::to_value(RateLimitScope::Ip).unwrap(), "ip");
    }
}
