//! Core business logic: metrics, rules, evaluation and caching

pub mod cache;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod log;
pub mod metrics;
pub mod portfolio;
pub mod provider;
pub mod rules;

// Re-export main types for cleaner imports
pub use cache::{Clock, FreshnessCache, SystemClock};
pub use error::ErrorCode;
pub use evaluation::{Evaluation, KpiStatus, Rating, evaluate};
pub use metrics::{Metric, MetricSet, MetricValue};
pub use provider::{MetricsProvider, MetricsReport};
pub use rules::{RuleBook, RuleSet, RuleSource};
