//! Provider abstractions and the report they produce

use crate::core::metrics::MetricSet;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub value: Option<f64>,
    pub currency: Option<String>,
    pub as_of: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub fundamentals_used_from_cache: bool,
    pub fundamentals_fetched_at: Option<DateTime<Utc>>,
}

/// Metrics for one symbol as returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub symbol: String,
    pub company_name: String,
    pub fetched_at: DateTime<Utc>,
    pub source: String,
    #[serde(rename = "data")]
    pub metrics: MetricSet,
    pub price: Option<PriceQuote>,
    #[serde(default)]
    pub cache: CacheInfo,
    pub error_message: Option<String>,
}

impl MetricsReport {
    /// All-null report carrying the reason the fetch failed.
    pub fn fallback(symbol: &str, source: &str, error: &str, at: DateTime<Utc>) -> Self {
        let as_of = at.date_naive().to_string();
        Self {
            symbol: symbol.to_string(),
            company_name: symbol.to_string(),
            fetched_at: at,
            source: source.to_string(),
            metrics: MetricSet::empty(&as_of, source),
            price: None,
            cache: CacheInfo::default(),
            error_message: Some(error.to_string()),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.error_message.is_some()
    }
}

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Name reported as the `source` of every metric.
    fn name(&self) -> &str;

    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricsReport>;
}
