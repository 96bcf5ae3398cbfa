//! HTTP server

pub mod http;

use std::sync::Arc;

use crate::config::Args;
use crate::limiter::RateLimiter;
use crate::store::{BoardStore, MemoryStore};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub store: Arc<dyn BoardStore>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(args: Args, store: Arc<dyn BoardStore>) -> Self {
        Self {
            args,
            store,
            limiter: Arc::new(RateLimiter::new()),
        }
    }

    /// In-memory state with default config, for route-core tests.
    pub fn for_tests() -> Self {
        Self::new(Args::for_tests(), Arc::new(MemoryStore::new()))
    }
}
