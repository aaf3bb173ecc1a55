use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::metrics::{RawFundamentals, normalize, safe_number};
use crate::core::provider::{CacheInfo, MetricsProvider, MetricsReport, PriceQuote};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const SOURCE: &str = "yahoo-finance";

const MODULES: &str = "price,summaryDetail,defaultKeyStatistics,financialData,cashflowStatementHistory,incomeStatementHistory";

/// Twelve characters, a two letter country prefix, alphanumeric.
pub fn looks_like_isin(symbol: &str) -> bool {
    symbol.len() == 12
        && symbol.chars().take(2).all(|c| c.is_ascii_alphabetic())
        && symbol.chars().all(|c| c.is_ascii_alphanumeric())
}

pub struct YahooFinanceProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("divrole/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Maps an ISIN to a ticker via Yahoo search. Falls back to the input.
    pub async fn resolve_symbol(&self, symbol: &str) -> String {
        if !looks_like_isin(symbol) {
            return symbol.to_string();
        }

        match self.search(symbol).await {
            Ok(Some(resolved)) => {
                debug!("Resolved ISIN {} to {}", symbol, resolved);
                resolved
            }
            Ok(None) => symbol.to_string(),
            Err(e) => {
                debug!("ISIN lookup failed for {}: {}", symbol, e);
                symbol.to_string()
            }
        }
    }

    async fn search(&self, isin: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/v1/finance/search?q={}&quotesCount=6&newsCount=0",
            self.base_url, isin
        );
        debug!("Requesting symbol search from {}", url);

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let data = response.json::<SearchResponse>().await?;

        let equity = data
            .quotes
            .iter()
            .find(|q| q.quote_type.as_deref() == Some("EQUITY") && q.symbol.is_some());
        Ok(equity
            .or_else(|| data.quotes.first())
            .and_then(|q| q.symbol.clone()))
    }
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<SearchQuote>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SearchQuote {
    symbol: Option<String>,
    quote_type: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummary,
}

#[derive(Deserialize, Debug)]
struct QuoteSummary {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryItem>>,
    #[serde(default)]
    error: Option<QuoteSummaryError>,
}

#[derive(Deserialize, Debug)]
struct QuoteSummaryError {
    description: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct QuoteSummaryItem {
    price: PriceModule,
    summary_detail: SummaryDetail,
    default_key_statistics: KeyStatistics,
    financial_data: FinancialData,
    cashflow_statement_history: CashflowHistory,
    income_statement_history: IncomeHistory,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct PriceModule {
    long_name: Option<String>,
    short_name: Option<String>,
    currency: Option<String>,
    regular_market_price: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct SummaryDetail {
    dividend_yield: Option<Value>,
    payout_ratio: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct KeyStatistics {
    payout_ratio: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct FinancialData {
    free_cashflow: Option<Value>,
    total_debt: Option<Value>,
    ebitda: Option<Value>,
    return_on_equity: Option<Value>,
    return_on_investment_capital: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct CashflowHistory {
    cashflow_statements: Vec<CashflowStatement>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct CashflowStatement {
    dividends_paid: Option<Value>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct IncomeHistory {
    income_statement_history: Vec<IncomeStatement>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct IncomeStatement {
    operating_income: Option<Value>,
    interest_expense: Option<Value>,
}

/// Present values only; provider nulls must not shadow a fallback.
fn present(value: &Option<Value>) -> Option<Value> {
    value.as_ref().filter(|v| safe_number(v).is_some()).cloned()
}

impl QuoteSummaryItem {
    fn raw_fundamentals(&self) -> RawFundamentals {
        let latest_income = self.income_statement_history.income_statement_history.first();

        RawFundamentals {
            dividend_yield: self.summary_detail.dividend_yield.clone(),
            payout_ratio: present(&self.summary_detail.payout_ratio)
                .or_else(|| self.default_key_statistics.payout_ratio.clone()),
            free_cash_flow: self.financial_data.free_cashflow.clone(),
            // Cash flow statements report dividends as outflows.
            dividends_paid: self
                .cashflow_statement_history
                .cashflow_statements
                .iter()
                .map(|s| {
                    s.dividends_paid
                        .as_ref()
                        .and_then(safe_number)
                        .map_or(Value::Null, |v| Value::from(v.abs()))
                })
                .collect(),
            total_debt: self.financial_data.total_debt.clone(),
            ebitda: self.financial_data.ebitda.clone(),
            operating_income: latest_income.and_then(|s| s.operating_income.clone()),
            interest_expense: latest_income.and_then(|s| s.interest_expense.clone()),
            interest_coverage: None,
            return_on_invested_capital: self.financial_data.return_on_investment_capital.clone(),
            return_on_equity: self.financial_data.return_on_equity.clone(),
        }
    }
}

#[async_trait]
impl MetricsProvider for YahooFinanceProvider {
    fn name(&self) -> &str {
        SOURCE
    }

    #[instrument(
        name = "YahooMetricsFetch",
        skip(self),
        fields(symbol = %symbol)
    )]
    async fn fetch_metrics(&self, symbol: &str) -> Result<MetricsReport> {
        let symbol = self.resolve_symbol(symbol.trim()).await;
        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules={}",
            self.base_url, symbol, MODULES
        );
        debug!("Requesting fundamentals from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request error for symbol: {symbol}"))?;

        debug!(response = ?response, "Received Yahoo response");

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let text = response.text().await?;
        let data: QuoteSummaryResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        if let Some(description) = data.quote_summary.error.and_then(|e| e.description) {
            return Err(anyhow!("Provider error for {}: {}", symbol, description));
        }

        let item = data
            .quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| anyhow!("No metrics found for symbol: {}", symbol))?;

        let fetched_at = Utc::now();
        let as_of = fetched_at.date_naive().to_string();
        let metrics = normalize(&item.raw_fundamentals(), &as_of, SOURCE);

        let company_name = item
            .price
            .long_name
            .clone()
            .or_else(|| item.price.short_name.clone())
            .unwrap_or_else(|| symbol.clone());

        let price = PriceQuote {
            value: item.price.regular_market_price.as_ref().and_then(safe_number),
            currency: item.price.currency.clone(),
            as_of,
        };

        Ok(MetricsReport {
            symbol,
            company_name,
            fetched_at,
            source: SOURCE.to_string(),
            metrics,
            price: Some(price),
            cache: CacheInfo {
                fundamentals_used_from_cache: false,
                fundamentals_fetched_at: Some(fetched_at),
            },
            error_message: None,
        })
    }
}
