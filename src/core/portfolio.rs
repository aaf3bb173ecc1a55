//! Parses portfolio CSV exports and summarizes them.
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

pub const PORTFOLIO_COLUMNS: [&str; 13] = [
    "Ticker",
    "Name",
    "Rolle",
    "Stueck",
    "Einstandskurs",
    "Marktwert",
    "Waehrung",
    "Dividendenrendite",
    "Dividendenwachstum",
    "ROIC",
    "Payout_FCF",
    "NetDebt_EBITDA",
    "Interest_Coverage",
];

pub const PERCENT_HOLDINGS_COLUMNS: [&str; 4] = ["ID", "Name", "Anteil (in %)", "Wert"];

pub const UNKNOWN_ROLE: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvSchema {
    Portfolio,
    PercentHoldings,
    Invalid { missing_columns: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRow {
    pub ticker: String,
    pub name: String,
    pub role: String,
    pub units: f64,
    pub cost_basis: f64,
    pub market_value: f64,
    pub currency: String,
    pub dividend_yield: f64,
    pub dividend_growth: f64,
    pub roic: f64,
    pub fcf_payout: f64,
    pub net_debt_to_ebitda: f64,
    pub interest_coverage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingRow {
    pub id: String,
    pub name: String,
    pub share_pct: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CsvUpload {
    Portfolio(Vec<PortfolioRow>),
    PercentHoldings(Vec<HoldingRow>),
    Invalid { missing_columns: Vec<String> },
}

/// Semicolon when the header line has more semicolons than commas.
pub fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let commas = header.matches(',').count();
    let semicolons = header.matches(';').count();
    if semicolons > commas { b';' } else { b',' }
}

fn missing<'a>(required: &[&'a str], headers: &[&str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|column| !headers.contains(column))
        .collect()
}

pub fn detect_schema(headers: &[&str]) -> CsvSchema {
    let missing_portfolio = missing(&PORTFOLIO_COLUMNS, headers);
    if missing_portfolio.is_empty() {
        return CsvSchema::Portfolio;
    }
    let missing_holdings = missing(&PERCENT_HOLDINGS_COLUMNS, headers);
    if missing_holdings.is_empty() {
        return CsvSchema::PercentHoldings;
    }

    // Report against whichever schema the file resembles more.
    let closest = if missing_holdings.len() < missing_portfolio.len() {
        missing_holdings
    } else {
        missing_portfolio
    };
    CsvSchema::Invalid {
        missing_columns: closest.into_iter().map(String::from).collect(),
    }
}

/// Parses `1234.5`, `1234,5` and `1.234,5`; anything else counts as zero.
pub fn parse_decimal(raw: &str) -> f64 {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    let normalized = if trimmed.contains(',') {
        trimmed.replace('.', "").replace(',', ".")
    } else {
        trimmed.to_string()
    };
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

struct Columns(HashMap<String, usize>);

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        Self(
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.to_string(), i))
                .collect(),
        )
    }

    fn text(&self, record: &StringRecord, column: &str) -> String {
        self.0
            .get(column)
            .and_then(|i| record.get(*i))
            .unwrap_or_default()
            .to_string()
    }

    fn number(&self, record: &StringRecord, column: &str) -> f64 {
        parse_decimal(&self.text(record, column))
    }
}

fn portfolio_row(columns: &Columns, record: &StringRecord) -> PortfolioRow {
    PortfolioRow {
        ticker: columns.text(record, "Ticker"),
        name: columns.text(record, "Name"),
        role: columns.text(record, "Rolle"),
        units: columns.number(record, "Stueck"),
        cost_basis: columns.number(record, "Einstandskurs"),
        market_value: columns.number(record, "Marktwert"),
        currency: columns.text(record, "Waehrung"),
        dividend_yield: columns.number(record, "Dividendenrendite"),
        dividend_growth: columns.number(record, "Dividendenwachstum"),
        roic: columns.number(record, "ROIC"),
        fcf_payout: columns.number(record, "Payout_FCF"),
        net_debt_to_ebitda: columns.number(record, "NetDebt_EBITDA"),
        interest_coverage: columns.number(record, "Interest_Coverage"),
    }
}

fn holding_row(columns: &Columns, record: &StringRecord) -> HoldingRow {
    HoldingRow {
        id: columns.text(record, "ID"),
        name: columns.text(record, "Name"),
        share_pct: columns.number(record, "Anteil (in %)"),
        value: columns.number(record, "Wert"),
    }
}

/// Parses CSV text into one of the supported schemas.
///
/// Errors only on malformed CSV; unknown layouts come back as `Invalid`.
pub fn parse_csv(text: &str) -> Result<CsvUpload> {
    let delimiter = detect_delimiter(text);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .context("Failed to read CSV header")?
        .clone();
    let header_names: Vec<&str> = headers.iter().collect();
    let schema = detect_schema(&header_names);
    debug!(delimiter = %(delimiter as char), ?schema, "Detected CSV layout");

    let columns = Columns::new(&headers);
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.context("Failed to read CSV record")?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        records.push(record);
    }

    Ok(match schema {
        CsvSchema::Portfolio => CsvUpload::Portfolio(
            records.iter().map(|r| portfolio_row(&columns, r)).collect(),
        ),
        CsvSchema::PercentHoldings => CsvUpload::PercentHoldings(
            records.iter().map(|r| holding_row(&columns, r)).collect(),
        ),
        CsvSchema::Invalid { missing_columns } => CsvUpload::Invalid { missing_columns },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleTotal {
    pub role: String,
    pub market_value: f64,
    pub weight_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleSummary {
    pub roles: Vec<RoleTotal>,
    pub total_market_value: f64,
}

/// Market value per role in first-seen order, with weights of the total.
pub fn summarize_roles(rows: &[PortfolioRow]) -> RoleSummary {
    let mut totals: Vec<(String, f64)> = Vec::new();
    for row in rows {
        let role = if row.role.is_empty() {
            UNKNOWN_ROLE
        } else {
            row.role.as_str()
        };
        match totals.iter_mut().find(|(name, _)| name == role) {
            Some((_, total)) => *total += row.market_value,
            None => totals.push((role.to_string(), row.market_value)),
        }
    }

    let total_market_value: f64 = totals.iter().map(|(_, v)| v).sum();
    let roles = totals
        .into_iter()
        .map(|(role, market_value)| RoleTotal {
            weight_pct: if total_market_value != 0.0 {
                market_value / total_market_value * 100.0
            } else {
                0.0
            },
            role,
            market_value,
        })
        .collect();

    RoleSummary {
        roles,
        total_market_value,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingsSummary {
    pub total_value: f64,
    pub total_share_pct: f64,
    pub count: usize,
}

pub fn summarize_holdings(rows: &[HoldingRow]) -> HoldingsSummary {
    HoldingsSummary {
        total_value: rows.iter().map(|r| r.value).sum(),
        total_share_pct: rows.iter().map(|r| r.share_pct).sum(),
        count: rows.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORTFOLIO_CSV: &str = "\
Ticker,Name,Rolle,Stueck,Einstandskurs,Marktwert,Waehrung,Dividendenrendite,Dividendenwachstum,ROIC,Payout_FCF,NetDebt_EBITDA,Interest_Coverage
KO,Coca-Cola,Core Income,10,50,600,USD,0.03,0.04,0.15,0.7,2.1,9
PEP,PepsiCo,Core Income,5,150,800,USD,0.028,0.06,0.14,0.65,2.3,8
O,Realty Income,High Yield,20,55,600,USD,0.055,0.03,0.05,0.8,5.5,4
XYZ,Mystery,,1,1,,EUR,,,,,,
";

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a,b,c\n1;2;3;4"), b',');
        assert_eq!(detect_delimiter("ID;Name;Anteil (in %);Wert"), b';');
        assert_eq!(detect_delimiter("single"), b',');
        assert_eq!(detect_delimiter(""), b',');
    }

    #[test]
    fn test_detect_schema() {
        assert_eq!(detect_schema(&PORTFOLIO_COLUMNS), CsvSchema::Portfolio);
        assert_eq!(
            detect_schema(&["Wert", "ID", "Name", "Anteil (in %)"]),
            CsvSchema::PercentHoldings
        );
        assert_eq!(
            detect_schema(&["ID", "Name", "Wert"]),
            CsvSchema::Invalid {
                missing_columns: vec!["Anteil (in %)".to_string()]
            }
        );
        match detect_schema(&["Ticker", "Name", "Rolle", "Marktwert"]) {
            CsvSchema::Invalid { missing_columns } => {
                assert_eq!(missing_columns.len(), 9);
                assert!(missing_columns.contains(&"Stueck".to_string()));
            }
            other => panic!("Expected invalid schema, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1234.5"), 1234.5);
        assert_eq!(parse_decimal("1234,5"), 1234.5);
        assert_eq!(parse_decimal("1.234,5"), 1234.5);
        assert_eq!(parse_decimal(" 12,5 % "), 12.5);
        assert_eq!(parse_decimal(""), 0.0);
        assert_eq!(parse_decimal("n/a"), 0.0);
    }

    #[test]
    fn test_parse_portfolio_and_summarize() {
        let upload = parse_csv(PORTFOLIO_CSV).unwrap();
        let CsvUpload::Portfolio(rows) = upload else {
            panic!("Expected portfolio schema");
        };
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].ticker, "KO");
        assert_eq!(rows[1].market_value, 800.0);

        let summary = summarize_roles(&rows);
        assert_eq!(summary.total_market_value, 2000.0);
        let names: Vec<&str> = summary.roles.iter().map(|r| r.role.as_str()).collect();
        assert_eq!(names, vec!["Core Income", "High Yield", UNKNOWN_ROLE]);
        assert_eq!(summary.roles[0].market_value, 1400.0);
        assert!((summary.roles[0].weight_pct - 70.0).abs() < 1e-9);
        assert!((summary.roles[1].weight_pct - 30.0).abs() < 1e-9);
        assert_eq!(summary.roles[2].weight_pct, 0.0);
    }

    #[test]
    fn test_parse_semicolon_holdings() {
        let csv = "ID;Name;Anteil (in %);Wert\n1;Alpha;60,5;1.210,00\n2;Beta;39,5;790\n\n";
        let CsvUpload::PercentHoldings(rows) = parse_csv(csv).unwrap() else {
            panic!("Expected percent holdings schema");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].share_pct, 60.5);
        assert_eq!(rows[0].value, 1210.0);

        let summary = summarize_holdings(&rows);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.total_value, 2000.0);
        assert!((summary.total_share_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_invalid_layout() {
        let upload = parse_csv("Symbol,Amount\nKO,1\n").unwrap();
        let CsvUpload::Invalid { missing_columns } = upload else {
            panic!("Expected invalid upload");
        };
        assert_eq!(
            missing_columns,
            vec!["ID", "Name", "Anteil (in %)", "Wert"]
        );
    }

    #[test]
    fn test_zero_total_weights() {
        let rows = vec![PortfolioRow {
            ticker: "X".into(),
            name: "X".into(),
            role: "Core".into(),
            units: 0.0,
            cost_basis: 0.0,
            market_value: 0.0,
            currency: "EUR".into(),
            dividend_yield: 0.0,
            dividend_growth: 0.0,
            roic: 0.0,
            fcf_payout: 0.0,
            net_debt_to_ebitda: 0.0,
            interest_coverage: 0.0,
        }];
        let summary = summarize_roles(&rows);
        assert_eq!(summary.roles[0].weight_pct, 0.0);
    }
}
