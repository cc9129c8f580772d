use crate::context::Context;
use crate::middleware::{Middleware, MiddlewareResult, Next};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Latency {
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

/// Request counters shared by one or more [`PerformanceMonitor`]s.
#[derive(Default)]
pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    active: AtomicU64,
    latency: Mutex<Latency>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub error_count: u64,
    pub active_requests: u64,
    pub average_latency_us: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
    /// Percentage of completed requests that returned an error.
    pub error_rate: f64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, latency: Duration, is_error: bool) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let mut stats = self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total += latency;
        stats.min = Some(stats.min.map_or(latency, |min| min.min(latency)));
        stats.max = stats.max.max(latency);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.requests.load(Ordering::Relaxed);
        let error_count = self.errors.load(Ordering::Relaxed);
        let stats = self.latency.lock().unwrap_or_else(PoisonError::into_inner);

        let average = if total_requests > 0 {
            stats.total.as_micros() as u64 / total_requests
        } else {
            0
        };
        let error_rate = if total_requests > 0 {
            error_count as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };

        MetricsSnapshot {
            total_requests,
            error_count,
            active_requests: self.active.load(Ordering::Relaxed),
            average_latency_us: average,
            min_latency_us: stats.min.unwrap_or_default().as_micros() as u64,
            max_latency_us: stats.max.as_micros() as u64,
            error_rate,
        }
    }
}

// Keeps the active gauge honest when the request future is dropped early.
struct ActiveGuard(Arc<Metrics>);

impl ActiveGuard {
    fn enter(metrics: Arc<Metrics>) -> Self {
        metrics.active.fetch_add(1, Ordering::Relaxed);
        ActiveGuard(metrics)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Feeds request latency and outcome into a shared [`Metrics`].
#[derive(Clone)]
pub struct PerformanceMonitor {
    metrics: Arc<Metrics>,
}

impl PerformanceMonitor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

impl Middleware for PerformanceMonitor {
    fn call(&self, ctx: Context, next: Next) -> MiddlewareResult {
        let metrics = Arc::clone(&self.metrics);
        Box::pin(async move {
            let _active = ActiveGuard::enter(Arc::clone(&metrics));
            let start = Instant::now();
            let result = next.handle(ctx).await;
            metrics.record(start.elapsed(), result.is_err());
            result
        })
    }
}
