//! Whole-response cache for GET requests.
//!
//! Entries are keyed by the full request URL plus the values of every request
//! header the stored response names in `Vary`, so clients that negotiated a
//! different representation never see each other's copy. Responses with
//! `Vary: *` are not stored. Each entry carries its own expiry instant, checked
//! when it is read; nothing runs in the background. `moka` provides the
//! concurrent maps and bounds their size, and every entry is published as one
//! `Arc`, so readers see either the old entry or the complete new one.

use crate::http::Response;
use moka::future::Cache;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// A stored response plus the instant after which it must not be served.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub expires_at: Instant,
}

impl CachedResponse {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    pub fn to_response(&self) -> Response {
        let mut response = Response::new(self.status);
        response.headers = self.headers.clone();
        response.body = self.body.clone();
        response
    }
}

#[derive(Clone)]
pub struct ResponseCache {
    entries: Cache<String, Arc<CachedResponse>>,
    // url -> lowercased header names from the last stored response's `Vary`
    variants: Cache<String, Arc<Vec<String>>>,
    fills: Cache<String, Arc<Mutex<()>>>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        let entries = Cache::builder().max_capacity(config.max_entries).build();
        let variants = Cache::builder().max_capacity(config.max_entries).build();
        let fills = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_idle(Duration::from_secs(60))
            .build();
        Self {
            entries,
            variants,
            fills,
        }
    }

    /// Returns the fresh entry stored for `url` under the request's values of
    /// the varying headers. A stale entry is
    /// a miss and stays in place until the next store replaces it.
    pub async fn lookup(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Option<Arc<CachedResponse>> {
        let names = self.variants.get(url).await;
        let names: &[String] = names.as_deref().map(Vec::as_slice).unwrap_or(&[]);
        let key = variant_key(url, names, headers);
        let entry = self.entries.get(&key).await?;
        if entry.is_fresh(Instant::now()) {
            Some(entry)
        } else {
            None
        }
    }

    /// Stores a copy of `response` that stays valid for `ttl`. Returns `false`
    /// without storing when the response varies on `*`.
    pub async fn store(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        response: &Response,
        ttl: Duration,
    ) -> bool {
        let names = response.vary_names();
        if names.iter().any(|name| name == "*") {
            return false;
        }
        let entry = CachedResponse {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            expires_at: Instant::now() + ttl,
        };
        let key = variant_key(url, &names, headers);
        self.variants.insert(url.to_string(), Arc::new(names)).await;
        self.entries.insert(key, Arc::new(entry)).await;
        true
    }

    /// Whether a response for `url` has been stored before.
    pub async fn knows(&self, url: &str) -> bool {
        self.variants.contains_key(url)
    }

    /// Serializes fills of one URL. A caller that missed takes the guard,
    /// looks up again, and only then produces the response.
    pub async fn fill_guard(&self, url: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .fills
            .get_with(url.to_string(), async { Arc::new(Mutex::new(())) })
            .await;
        lock.lock_owned().await
    }
}

fn variant_key(url: &str, names: &[String], headers: &HashMap<String, String>) -> String {
    let mut key = url.to_string();
    for name in names {
        key.push('\n');
        key.push_str(name);
        key.push(':');
        let value = headers.get(name).or_else(|| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        });
        key.push_str(value.map(String::as_str).unwrap_or(""));
    }
    key
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
