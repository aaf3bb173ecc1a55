use super::ui;
use crate::core::rules::RuleSet;
use crate::core::RuleBook;
use anyhow::Result;
use comfy_table::Cell;

fn percent(value: Option<f64>) -> Option<String> {
    value.map(|v| format!("{:.2}%", v * 100.0))
}

pub async fn run(rules: &RuleBook) -> Result<()> {
    let rule_set = rules.get().await?;
    println!(
        "{} {}\n",
        ui::style_text("Rules", ui::StyleType::Title),
        ui::style_text(&format!("({})", rules.source()), ui::StyleType::Subtle)
    );
    println!("{}", display_rules(&rule_set));
    Ok(())
}

pub fn display_rules(rules: &RuleSet) -> String {
    let t = &rules.kpi_thresholds;
    let mut thresholds = ui::new_styled_table();
    thresholds.set_header(vec![ui::header_cell("KPI"), ui::header_cell("Threshold")]);
    let rows = [
        ("FCF Payout (max)", percent(t.fcf_payout_max)),
        ("EPS Payout (max)", percent(t.eps_payout_max)),
        (
            "Debt / EBITDA (max)",
            t.debt_to_ebitda_max.map(|v| format!("{v:.2}x")),
        ),
        (
            "Interest Coverage (min)",
            t.interest_coverage_min.map(|v| format!("{v:.2}x")),
        ),
        ("ROIC (min)", percent(t.roic_min)),
    ];
    for (label, value) in rows {
        thresholds.add_row(vec![Cell::new(label), ui::format_optional_cell(value, |v| v)]);
    }

    let mut roles = ui::new_styled_table();
    roles.set_header(vec![
        ui::header_cell("Role"),
        ui::header_cell("Yield Min"),
        ui::header_cell("Yield Max"),
        ui::header_cell("Growth Min"),
        ui::header_cell("Growth Max"),
    ]);
    for role in &rules.roles {
        roles.add_row(vec![
            Cell::new(&role.name),
            ui::format_optional_cell(percent(role.range.dividend_yield_min), |v| v),
            ui::format_optional_cell(percent(role.range.dividend_yield_max), |v| v),
            ui::format_optional_cell(percent(role.range.dividend_growth_min), |v| v),
            ui::format_optional_cell(percent(role.range.dividend_growth_max), |v| v),
        ]);
    }

    format!("{thresholds}\n\n{roles}")
}
