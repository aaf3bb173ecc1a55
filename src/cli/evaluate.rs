use super::ui;
use crate::core::rules::{RoleRange, RuleSet};
use crate::core::{
    ErrorCode, Evaluation, KpiStatus, Metric, MetricsProvider, MetricsReport, RuleBook, evaluate,
};
use anyhow::Result;
use chrono::Utc;
use comfy_table::Cell;
use futures::future::{join, join_all};
use std::sync::Arc;
use tracing::{debug, error};

/// Outcome for one symbol. Failures carry the all-null fallback report.
#[derive(Debug, Clone)]
pub struct SymbolEvaluation {
    pub report: MetricsReport,
    pub rules: Option<Arc<RuleSet>>,
    pub evaluation: Option<Evaluation>,
    pub errors: Vec<(ErrorCode, String)>,
}

impl SymbolEvaluation {
    pub fn status(&self, metric: Metric) -> KpiStatus {
        self.evaluation
            .as_ref()
            .map_or(KpiStatus::Neutral, |e| e.status(metric))
    }
}

/// Fetches metrics and rules concurrently and evaluates one symbol.
pub async fn evaluate_symbol(
    symbol: &str,
    provider: &dyn MetricsProvider,
    rules: &RuleBook,
) -> SymbolEvaluation {
    let (report, rule_set) = join(provider.fetch_metrics(symbol), rules.get()).await;
    let mut errors = Vec::new();

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            error!(%symbol, error = %e, "Metrics fetch failed");
            let message = format!("{e:#}");
            errors.push((ErrorCode::classify(&e), message.clone()));
            MetricsReport::fallback(
                &symbol.trim().to_uppercase(),
                provider.name(),
                &message,
                Utc::now(),
            )
        }
    };

    let rule_set = match rule_set {
        Ok(rule_set) => Some(rule_set),
        Err(e) => {
            error!(error = %e, "Rules unavailable");
            errors.push((ErrorCode::ConfigUnavailable, format!("{e:#}")));
            None
        }
    };

    let evaluation = rule_set.as_ref().map(|r| evaluate(&report.metrics, r));
    debug!(%symbol, role = ?evaluation.as_ref().and_then(|e| e.role.clone()), "Evaluated");

    SymbolEvaluation {
        report,
        rules: rule_set,
        evaluation,
        errors,
    }
}

pub async fn evaluate_symbols(
    symbols: &[String],
    provider: &dyn MetricsProvider,
    rules: &RuleBook,
) -> Vec<SymbolEvaluation> {
    let pb = ui::new_progress_bar(symbols.len() as u64, true);
    pb.set_message("Evaluating...");

    let futures = symbols.iter().map(|symbol| {
        let pb_clone = pb.clone();
        async move {
            let result = evaluate_symbol(symbol, provider, rules).await;
            pb_clone.inc(1);
            result
        }
    });

    let results = join_all(futures).await;
    pb.finish_and_clear();
    results
}

pub async fn run(
    symbols: &[String],
    provider: &dyn MetricsProvider,
    rules: &RuleBook,
) -> Result<()> {
    let results = evaluate_symbols(symbols, provider, rules).await;

    let count = results.len();
    for (i, result) in results.iter().enumerate() {
        println!("{}", display_evaluation(result));
        if i + 1 < count {
            ui::print_separator();
        }
    }
    Ok(())
}

fn format_value(metric: Metric, value: f64) -> String {
    if metric.is_percentage() {
        format!("{:.2}%", value * 100.0)
    } else {
        format!("{value:.2}x")
    }
}

fn bound_text(metric: Metric, min: Option<f64>, max: Option<f64>) -> Option<String> {
    match (min, max) {
        (Some(lo), Some(hi)) => Some(format!(
            "{} – {}",
            format_value(metric, lo),
            format_value(metric, hi)
        )),
        (Some(lo), None) => Some(format!("≥ {}", format_value(metric, lo))),
        (None, Some(hi)) => Some(format!("≤ {}", format_value(metric, hi))),
        (None, None) => None,
    }
}

/// Threshold shown next to a KPI. Yield and growth use the matched role's range.
pub fn threshold_text(metric: Metric, rules: &RuleSet, role: Option<&str>) -> Option<String> {
    let t = &rules.kpi_thresholds;
    let range = role
        .and_then(|name| rules.role(name))
        .map(|r| r.range.clone())
        .unwrap_or_else(RoleRange::default);

    match metric {
        Metric::FcfPayout => bound_text(metric, None, t.fcf_payout_max),
        Metric::EpsPayout => bound_text(metric, None, t.eps_payout_max),
        Metric::DebtToEbitda => bound_text(metric, None, t.debt_to_ebitda_max),
        Metric::InterestCoverage => bound_text(metric, t.interest_coverage_min, None),
        Metric::Roic => bound_text(metric, t.roic_min, None),
        Metric::DividendYield => {
            bound_text(metric, range.dividend_yield_min, range.dividend_yield_max)
        }
        Metric::DividendGrowth => {
            bound_text(metric, range.dividend_growth_min, range.dividend_growth_max)
        }
    }
}

pub fn display_evaluation(result: &SymbolEvaluation) -> String {
    let report = &result.report;
    let role = result.evaluation.as_ref().and_then(|e| e.role.as_deref());

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("KPI"),
        ui::header_cell("Value"),
        ui::header_cell("Threshold"),
        ui::header_cell("Status"),
    ]);

    for metric in Metric::ALL {
        let threshold = result
            .rules
            .as_ref()
            .and_then(|rules| threshold_text(metric, rules, role));
        table.add_row(vec![
            Cell::new(metric.label()),
            ui::format_optional_cell(report.metrics.value(metric), |v| format_value(metric, v)),
            ui::format_optional_cell(threshold, |t| t),
            ui::status_cell(result.status(metric)),
        ]);
    }

    let mut output = format!(
        "{} {}\n",
        ui::style_text(&report.symbol, ui::StyleType::Title),
        ui::style_text(&report.company_name, ui::StyleType::Subtle)
    );

    for (code, message) in &result.errors {
        output.push_str(&ui::style_text(
            &format!("Error ({code}): {message}\n"),
            ui::StyleType::Error,
        ));
    }
    if report.cache.fundamentals_used_from_cache {
        if let Some(at) = report.cache.fundamentals_fetched_at {
            output.push_str(&ui::style_text(
                &format!("Fundamentals cached at {}\n", at.format("%Y-%m-%d %H:%M UTC")),
                ui::StyleType::Subtle,
            ));
        }
    }

    output.push('\n');
    output.push_str(&table.to_string());

    if let Some(evaluation) = &result.evaluation {
        output.push_str(&format!(
            "\n\n{} {}",
            ui::style_text("Role:", ui::StyleType::TotalLabel),
            match &evaluation.role {
                Some(role) => ui::style_text(role, ui::StyleType::TotalValue),
                None => ui::style_text("no matching role", ui::StyleType::Error),
            }
        ));
        output.push_str(&format!(
            "\n{} {}",
            ui::style_text("Rating:", ui::StyleType::TotalLabel),
            ui::style_rating(evaluation.rating())
        ));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::MetricSet;
    use crate::core::provider::CacheInfo;
    use crate::core::rules::RuleSource;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct StaticProvider;

    #[async_trait]
    impl MetricsProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_metrics(&self, symbol: &str) -> Result<MetricsReport> {
            if symbol == "FAIL" {
                return Err(anyhow!("No metrics found for symbol: FAIL"));
            }
            Ok(MetricsReport {
                symbol: symbol.to_string(),
                company_name: format!("{symbol} Inc."),
                fetched_at: Utc::now(),
                source: "static".to_string(),
                metrics: MetricSet::from_values(
                    [
                        (Metric::DividendYield, Some(0.035)),
                        (Metric::DividendGrowth, Some(0.05)),
                        (Metric::FcfPayout, Some(0.5)),
                        (Metric::EpsPayout, Some(0.5)),
                        (Metric::DebtToEbitda, Some(1.5)),
                        (Metric::InterestCoverage, Some(12.0)),
                        (Metric::Roic, Some(0.2)),
                    ],
                    "2024-01-01",
                    "static",
                ),
                price: None,
                cache: CacheInfo::default(),
                error_message: None,
            })
        }
    }

    #[tokio::test]
    async fn test_evaluate_symbol_with_default_rules() {
        let rules = RuleBook::new(RuleSource::Embedded);
        let result = evaluate_symbol("KO", &StaticProvider, &rules).await;

        assert!(result.errors.is_empty());
        let evaluation = result.evaluation.as_ref().unwrap();
        assert_eq!(evaluation.role.as_deref(), Some("Core Income"));
        assert_eq!(result.status(Metric::Roic), KpiStatus::Success);

        let output = display_evaluation(&result);
        assert!(output.contains("Core Income"));
        assert!(output.contains("3.50%"));
    }

    #[tokio::test]
    async fn test_evaluate_symbol_provider_failure_uses_fallback() {
        let rules = RuleBook::new(RuleSource::Embedded);
        let result = evaluate_symbol("FAIL", &StaticProvider, &rules).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, ErrorCode::ProviderFailed);
        assert!(result.report.is_fallback());
        for metric in Metric::ALL {
            assert_eq!(result.report.metrics.value(metric), None);
        }
        let evaluation = result.evaluation.as_ref().unwrap();
        assert_eq!(evaluation.role, None);
        assert!(display_evaluation(&result).contains("provider_failed"));
    }

    #[tokio::test]
    async fn test_evaluate_symbol_rules_unavailable() {
        let rules = RuleBook::new(RuleSource::Path("/nonexistent/rules.json".into()));
        let result = evaluate_symbol("KO", &StaticProvider, &rules).await;

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, ErrorCode::ConfigUnavailable);
        assert!(result.evaluation.is_none());
        assert_eq!(result.status(Metric::Roic), KpiStatus::Neutral);
        assert_eq!(result.report.metrics.value(Metric::Roic), Some(0.2));
    }

    #[tokio::test]
    async fn test_evaluate_symbols_keeps_order() {
        let rules = RuleBook::new(RuleSource::Embedded);
        let symbols = vec!["KO".to_string(), "FAIL".to_string(), "PEP".to_string()];
        let results = evaluate_symbols(&symbols, &StaticProvider, &rules).await;

        let names: Vec<&str> = results.iter().map(|r| r.report.symbol.as_str()).collect();
        assert_eq!(names, vec!["KO", "FAIL", "PEP"]);
    }

    #[test]
    fn test_threshold_text() {
        let rules = RuleSet::from_json(crate::core::rules::DEFAULT_RULES).unwrap();
        assert_eq!(
            threshold_text(Metric::FcfPayout, &rules, None).as_deref(),
            Some("≤ 70.00%")
        );
        assert_eq!(
            threshold_text(Metric::InterestCoverage, &rules, None).as_deref(),
            Some("≥ 5.00x")
        );
        assert_eq!(threshold_text(Metric::DividendYield, &rules, None), None);
        assert_eq!(
            threshold_text(Metric::DividendYield, &rules, Some("Core Income")).as_deref(),
            Some("2.50% – 5.00%")
        );
    }
}
