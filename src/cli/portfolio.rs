use super::ui;
use crate::core::portfolio::{
    CsvUpload, HoldingRow, PortfolioRow, summarize_holdings, summarize_roles,
};
use anyhow::{Context, Result};
use comfy_table::Cell;
use std::path::Path;
use tracing::debug;

pub fn run(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;
    let upload = crate::core::portfolio::parse_csv(&text)?;
    println!("{}", display_upload(&upload));
    Ok(())
}

pub fn display_upload(upload: &CsvUpload) -> String {
    match upload {
        CsvUpload::Portfolio(rows) => {
            debug!(rows = rows.len(), "Portfolio upload");
            display_portfolio(rows)
        }
        CsvUpload::PercentHoldings(rows) => {
            debug!(rows = rows.len(), "Holdings upload");
            display_holdings(rows)
        }
        CsvUpload::Invalid { missing_columns } => ui::style_text(
            &format!(
                "Unrecognized CSV layout. Missing columns: {}",
                missing_columns.join(", ")
            ),
            ui::StyleType::Error,
        ),
    }
}

fn display_portfolio(rows: &[PortfolioRow]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("Role"),
        ui::header_cell("Market Value"),
        ui::header_cell("Yield"),
        ui::header_cell("Growth"),
        ui::header_cell("ROIC"),
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.ticker),
            Cell::new(&row.name),
            Cell::new(&row.role),
            ui::number_cell(format!("{:.2} {}", row.market_value, row.currency)),
            ui::number_cell(format!("{:.2}%", row.dividend_yield)),
            ui::number_cell(format!("{:.2}%", row.dividend_growth)),
            ui::number_cell(format!("{:.2}%", row.roic)),
        ]);
    }

    let summary = summarize_roles(rows);
    let mut roles = ui::new_styled_table();
    roles.set_header(vec![
        ui::header_cell("Role"),
        ui::header_cell("Market Value"),
        ui::header_cell("Weight"),
    ]);
    for total in &summary.roles {
        roles.add_row(vec![
            Cell::new(&total.role),
            ui::number_cell(format!("{:.2}", total.market_value)),
            ui::number_cell(format!("{:.1}%", total.weight_pct)),
        ]);
    }

    format!(
        "{}\n\n{}\n\n{}\n\n{} {}",
        ui::style_text("Portfolio", ui::StyleType::Title),
        table,
        roles,
        ui::style_text("Total Market Value:", ui::StyleType::TotalLabel),
        ui::style_text(
            &format!("{:.2}", summary.total_market_value),
            ui::StyleType::TotalValue
        )
    )
}

fn display_holdings(rows: &[HoldingRow]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("ID"),
        ui::header_cell("Name"),
        ui::header_cell("Share"),
        ui::header_cell("Value"),
    ]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.id),
            Cell::new(&row.name),
            ui::number_cell(format!("{:.2}%", row.share_pct)),
            ui::number_cell(format!("{:.2}", row.value)),
        ]);
    }

    let summary = summarize_holdings(rows);
    format!(
        "{}\n\n{}\n\n{} {}\n{} {}",
        ui::style_text("Holdings", ui::StyleType::Title),
        table,
        ui::style_text("Positions:", ui::StyleType::TotalLabel),
        summary.count,
        ui::style_text("Total Value:", ui::StyleType::TotalLabel),
        ui::style_text(&format!("{:.2}", summary.total_value), ui::StyleType::TotalValue)
    )
}
