//! `SourceContext` breaks the cycle between caches, breakers, and clients
//! (spec §9 "Cyclic collaborators"): a client borrows the three collaborators
//! it needs instead of owning or constructing them.

use std::sync::Arc;

use crate::circuit_breaker::CircuitBreaker;
use crate::rate_limiter::RateLimiter;
use crate::response_cache::ResponseCache;
use crate::retry::RetryPolicy;

/// The collaborators a single source client consults on every call, per the
/// request skeleton of §4.5: `cache → breaker → limiter → retry`.
#[derive(Clone)]
pub struct SourceContext {
    pub cache: Arc<ResponseCache>,
    pub limiter: Arc<RateLimiter>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: Arc<RetryPolicy>,
}
