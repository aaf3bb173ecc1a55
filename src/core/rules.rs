//! Rule configuration: KPI thresholds and ordered role ranges.

use crate::core::metrics::safe_number;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

/// Rules shipped with the binary, used when no rule file is configured.
pub const DEFAULT_RULES: &str = include_str!("../../docs/rules.json");

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(safe_number))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct KpiThresholds {
    #[serde(deserialize_with = "lenient_number")]
    pub fcf_payout_max: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub eps_payout_max: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub debt_to_ebitda_max: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub interest_coverage_min: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub roic_min: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoleRange {
    #[serde(deserialize_with = "lenient_number")]
    pub dividend_yield_min: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub dividend_yield_max: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub dividend_growth_min: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub dividend_growth_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub name: String,
    pub range: RoleRange,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    #[serde(deserialize_with = "lenient_thresholds")]
    pub kpi_thresholds: KpiThresholds,
    /// Roles in the order they are declared in the rules document.
    #[serde(deserialize_with = "ordered_roles")]
    pub roles: Vec<Role>,
}

fn lenient_thresholds<'de, D>(deserializer: D) -> Result<KpiThresholds, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn ordered_roles<'de, D>(deserializer: D) -> Result<Vec<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let roles = match Value::deserialize(deserializer)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(name, range)| Role {
                name,
                range: serde_json::from_value(range).unwrap_or_default(),
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(roles)
}

impl RuleSet {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse rules document")
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }
}

/// Where the rules document comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSource {
    Embedded,
    Path(PathBuf),
    Url(String),
}

impl std::fmt::Display for RuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleSource::Embedded => write!(f, "built-in rules"),
            RuleSource::Path(p) => write!(f, "{}", p.display()),
            RuleSource::Url(u) => write!(f, "{u}"),
        }
    }
}

/// Loads the rules document at most once per process.
///
/// A failed load is not remembered, so the next caller tries again.
pub struct RuleBook {
    source: RuleSource,
    rules: OnceCell<Arc<RuleSet>>,
}

impl RuleBook {
    pub fn new(source: RuleSource) -> Self {
        Self {
            source,
            rules: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &RuleSource {
        &self.source
    }

    pub async fn get(&self) -> Result<Arc<RuleSet>> {
        self.rules
            .get_or_try_init(|| async { self.load().await.map(Arc::new) })
            .await
            .cloned()
    }

    #[instrument(name = "RulesLoad", skip(self), fields(source = %self.source))]
    async fn load(&self) -> Result<RuleSet> {
        let document = match &self.source {
            RuleSource::Embedded => DEFAULT_RULES.to_string(),
            RuleSource::Path(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read rules file: {}", path.display()))?,
            RuleSource::Url(url) => {
                debug!("Requesting rules from {}", url);
                let response = reqwest::get(url)
                    .await
                    .map_err(|e| anyhow!("Request error: {} for rules URL: {}", e, url))?;
                if !response.status().is_success() {
                    return Err(anyhow!(
                        "HTTP error: {} for rules URL: {}",
                        response.status(),
                        url
                    ));
                }
                response.text().await?
            }
        };

        let rules = RuleSet::from_json(&document)?;
        info!(roles = rules.roles.len(), "Loaded rules");
        Ok(rules)
    }
}
