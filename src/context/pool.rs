use crate::context::{Context, ContextState};
use crate::http::Request;
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on parked contexts; extra states are freed on release.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_idle: 1024 }
    }
}

/// Counters describing how the pool has been used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: usize,
    pub reused: usize,
    pub idle: usize,
}

/// Recycles per-request context state so the maps inside it keep their
/// allocations across requests.
#[derive(Clone)]
pub struct ContextPool {
    inner: Arc<Mutex<ContextPoolInner>>,
}

struct ContextPoolInner {
    states: Vec<ContextState>,
    max_idle: usize,
    created: usize,
    reused: usize,
}

impl ContextPool {
    pub fn new(config: PoolConfig) -> Self {
        ContextPool {
            inner: Arc::new(Mutex::new(ContextPoolInner {
                states: Vec::new(),
                max_idle: config.max_idle,
                created: 0,
                reused: 0,
            })),
        }
    }

    /// Takes a parked state (or makes a new one) and fills every field from `req`.
    /// The returned context hands its state back when dropped.
    pub fn acquire(&self, req: Request) -> Context {
        let mut state = {
            let mut inner = self.lock();
            match inner.states.pop() {
                Some(state) => {
                    inner.reused += 1;
                    state
                }
                None => {
                    inner.created += 1;
                    ContextState::default()
                }
            }
        };
        state.populate(req);
        Context {
            state,
            pool: Some(self.clone()),
        }
    }

    pub(crate) fn release(&self, mut state: ContextState) {
        state.reset();
        let mut inner = self.lock();
        if inner.states.len() < inner.max_idle {
            inner.states.push(state);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.lock();
        PoolStats {
            created: inner.created,
            reused: inner.reused,
            idle: inner.states.len(),
        }
    }

    // Release runs inside Drop, possibly while unwinding; a poisoned lock must not abort.
    fn lock(&self) -> MutexGuard<'_, ContextPoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
