//! Shared application state for Axum routers.

use std::time::Instant;

use fanout_engine::Aggregator;

use crate::types::QueryDefaults;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Engine handle. Owns the shared cache, permit pool and counters.
    pub aggregator: Aggregator,
    /// Fallbacks for `/repositories` query parameters.
    pub defaults: QueryDefaults,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(aggregator: Aggregator, defaults: QueryDefaults) -> Self {
        Self {
            aggregator,
            defaults,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Aggregator, aggregator);
crate::impl_from_ref!(QueryDefaults, defaults);
crate::impl_from_ref!(Instant, start_time);
