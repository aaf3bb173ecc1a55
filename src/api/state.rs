use std::sync::Arc;

use crate::core::{MetricsProvider, RuleBook};

/// Shared state for all handlers
pub struct AppState {
    // Cached provider; the cache handle lives inside it
    pub provider: Arc<dyn MetricsProvider>,

    // Loaded on first use, then shared for the process lifetime
    pub rules: Arc<RuleBook>,
}

impl AppState {
    pub fn new(provider: Arc<dyn MetricsProvider>, rules: Arc<RuleBook>) -> Arc<Self> {
        Arc::new(Self { provider, rules })
    }
}
