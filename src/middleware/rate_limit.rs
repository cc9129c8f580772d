use crate::context::Context;
use crate::error::ServerError;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_PRUNE_EVERY: u64 = 1024;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
    /// Key clients by `X-Forwarded-For` / `X-Real-IP` instead of the peer
    /// address. Only enable this behind a proxy that overwrites those headers.
    pub trust_forwarded: bool,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
            trust_forwarded: false,
        }
    }
}

struct HitTable {
    hits: HashMap<String, Vec<Instant>>,
    checks: u64,
    prune_every: u64,
}

impl HitTable {
    fn prune(&mut self, now: Instant, window: Duration) {
        self.hits.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < window);
            !timestamps.is_empty()
        });
    }
}

/// Request timestamps per client, shared by every limiter built on it.
///
/// Create one store per limit you want to enforce and hand clones of it to
/// the middleware; clones share the same table. Idle clients are swept out
/// every `prune_every` checks.
#[derive(Clone)]
pub struct RateLimitStore {
    table: Arc<Mutex<HitTable>>,
}

impl Default for RateLimitStore {
    fn default() -> Self {
        Self::with_prune_interval(DEFAULT_PRUNE_EVERY)
    }
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prune_interval(prune_every: u64) -> Self {
        Self {
            table: Arc::new(Mutex::new(HitTable {
                hits: HashMap::new(),
                checks: 0,
                prune_every: prune_every.max(1),
            })),
        }
    }

    /// Records a hit for `client` unless it already made `limit` requests
    /// within `window`. Returns whether the hit was admitted.
    pub async fn check(&self, client: &str, limit: usize, window: Duration) -> bool {
        let now = Instant::now();
        let mut table = self.table.lock().await;
        table.checks += 1;
        if table.checks % table.prune_every == 0 {
            table.prune(now, window);
        }

        let timestamps = table.hits.entry(client.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < window);
        if timestamps.len() >= limit {
            return false;
        }
        timestamps.push(now);
        true
    }

    /// Drops clients with no hit inside `window`.
    pub async fn prune(&self, window: Duration) {
        self.table.lock().await.prune(Instant::now(), window);
    }

    pub async fn tracked_clients(&self) -> usize {
        self.table.lock().await.hits.len()
    }
}

/// Sliding-window limiter keyed by the peer address, or by the forwarded
/// client address when [`RateLimitConfig::trust_forwarded`] is set.
#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: RateLimitStore, config: RateLimitConfig) -> Self {
        Self { store, config }
    }
}

fn client_key(ctx: &Context, trust_forwarded: bool) -> String {
    let client = if trust_forwarded {
        ctx.client_ip()
    } else {
        ctx.remote_addr().map(|addr| addr.ip().to_string())
    };
    client.unwrap_or_else(|| "unknown".to_string())
}

impl Middleware for RateLimiter {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        let store = self.store.clone();
        let limit = self.config.max_requests;
        let window = self.config.window();
        let trust_forwarded = self.config.trust_forwarded;
        Box::pin(async move {
            let client = client_key(&ctx, trust_forwarded);
            if !store.check(&client, limit, window).await {
                tracing::debug!(client = %client, path = %ctx.path(), "rate limit exceeded");
                return Err(ServerError::TooManyRequests);
            }
            next.handle(ctx).await
        })
    }
}
