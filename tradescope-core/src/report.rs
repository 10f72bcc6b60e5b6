//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering
//! - Byte-for-byte identical output across runs
//! - Percentages at one decimal place, scores as integers, values in thousands of USD

use crate::analysis::{AnalysisReport, DisruptionAnalysis};
use crate::metrics::TOP_CONCENTRATION_MIN_SUPPLIERS;
use crate::record::Product;
use crate::summary::DatasetSummary;
use anyhow::{Context, Result};
use serde::Serialize;

/// Render any report as pretty JSON
pub fn render_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize report")
}

fn rule(output: &mut String, title: &str) {
    output.push_str(&format!("{}\n{}\n", title, "=".repeat(80)));
}

/// Render a product search result
pub fn render_products_text(term: &str, products: &[Product]) -> String {
    let mut output = String::new();
    if products.is_empty() {
        output.push_str(&format!("No products match '{}'\n", term));
        return output;
    }

    output.push_str(&format!("{:<10} {}\n", "CODE", "PRODUCT"));
    for p in products {
        output.push_str(&format!(
            "{:<10} {}\n",
            p.product_code,
            truncate_or_pad(&p.product_name, 68).trim_end()
        ));
    }
    output.push_str(&format!("\n{} products match '{}'\n", products.len(), term));
    output
}

/// Render an analysis as text
pub fn render_analysis_text(report: &AnalysisReport) -> String {
    let m = &report.metrics;
    let o = &report.aggregates.overview;
    let market = &report.reference_market;
    let mut output = String::new();

    rule(
        &mut output,
        &format!(
            "Supply chain analysis: {} ({} imports, {}, {}-{})",
            report.term,
            market,
            report.time_range,
            report.years.start,
            report.years.end
        ),
    );
    output.push_str(&format!(
        "Products matched: {}    Records: {}\n\n",
        report.products.len(),
        report.record_count
    ));

    output.push_str("Metrics\n");
    output.push_str(&format!(
        "  Risk score:            {:.0}/100 ({} risk)\n",
        m.risk_score,
        report.risk_level.label()
    ));
    output.push_str(&format!("  Diversity score:       {:.1}/100\n", m.diversity_score));
    output.push_str(&format!("  Substitutability:      {:.1}/100\n", m.substitutability));
    output.push_str(&format!("  Top supplier share:    {:.1}%\n", m.top_supplier_share));
    if m.num_suppliers < TOP_CONCENTRATION_MIN_SUPPLIERS {
        output.push_str(&format!(
            "  Top 3 concentration:   {:.1}% (not computed: fewer than {} suppliers)\n",
            m.top_3_concentration, TOP_CONCENTRATION_MIN_SUPPLIERS
        ));
    } else {
        output.push_str(&format!("  Top 3 concentration:   {:.1}%\n", m.top_3_concentration));
    }
    output.push_str(&format!(
        "  Suppliers:             {} of {} global exporters\n",
        m.num_suppliers, m.global_supplier_count
    ));
    output.push_str(&format!("  {} market share:      {:.1}%\n", market, m.us_market_share));
    output.push_str(&format!("  YoY import growth:     {:.1}%\n", m.yoy_growth));
    output.push_str(&format!("  Trade balance:         ${:.1}K\n", m.trade_balance));
    output.push_str(&format!("  Top exporters:         {}\n", join_or_dash(&m.top_exporters)));
    output.push_str(&format!("  Top importers:         {}\n", join_or_dash(&m.top_importers)));

    if !report.aggregates.yearly_trade.is_empty() {
        output.push_str(&format!(
            "\n{:<6} {:>16} {:>16} {:>16}\n",
            "YEAR", "IMPORTS", "EXPORTS", "BALANCE"
        ));
        for t in &report.aggregates.yearly_trade {
            output.push_str(&format!(
                "{:<6} {:>16} {:>16} {:>16.1}\n",
                t.year,
                money_or_dash(t.imports),
                money_or_dash(t.exports),
                t.trade_balance
            ));
        }
        output.push_str(&format!(
            "Average balance ${:.1}K, trend {}\n",
            o.average_balance,
            o.balance_trend.as_str()
        ));
    }

    if !report.aggregates.top_suppliers.is_empty() {
        output.push_str(&format!("\nTop suppliers to {}\n", market));
        for (rank, s) in report.aggregates.top_suppliers.iter().enumerate() {
            let share = if o.total_imports != 0.0 {
                s.total_value / o.total_imports * 100.0
            } else {
                0.0
            };
            output.push_str(&format!(
                "  {:>2}. {} ${:.1}K ({:.1}%)\n",
                rank + 1,
                truncate_or_pad(&s.exporter, 30),
                s.total_value,
                share
            ));
        }
    }

    output
}

/// Render a disruption simulation as text
pub fn render_disruption_text(analysis: &DisruptionAnalysis) -> String {
    let r = &analysis.report;
    let mut output = String::new();

    rule(
        &mut output,
        &format!(
            "Disruption: remove {} from {} imports of {} ({})",
            r.removed_supplier, r.reference_market, analysis.term, analysis.time_range
        ),
    );
    output.push_str(&format!(
        "Removed value: ${:.1}K ({:.1}% of imports)\n",
        r.removed_value, r.removed_share
    ));
    if let Some(ref s) = r.successor {
        output.push_str(&format!(
            "Next largest supplier: {} ({:.1}% of baseline imports)\n",
            s.exporter,
            s.share * 100.0
        ));
    }
    output.push('\n');

    output.push_str(&format!(
        "{:<22} {:>12} {:>12} {:>12}\n",
        "METRIC", "BEFORE", "AFTER", "CHANGE"
    ));
    let rows: [(&str, f64, f64, f64); 7] = [
        ("Risk score", r.baseline.risk_score, r.disrupted.risk_score, r.delta.risk_score),
        (
            "Diversity score",
            r.baseline.diversity_score,
            r.disrupted.diversity_score,
            r.delta.diversity_score,
        ),
        (
            "Substitutability",
            r.baseline.substitutability,
            r.disrupted.substitutability,
            r.delta.substitutability,
        ),
        (
            "Top supplier share",
            r.baseline.top_supplier_share,
            r.disrupted.top_supplier_share,
            r.delta.top_supplier_share,
        ),
        (
            "Top 3 concentration",
            r.baseline.top_3_concentration,
            r.disrupted.top_3_concentration,
            r.delta.top_3_concentration,
        ),
        (
            "Market share",
            r.baseline.us_market_share,
            r.disrupted.us_market_share,
            r.delta.us_market_share,
        ),
        (
            "Trade balance",
            r.baseline.trade_balance,
            r.disrupted.trade_balance,
            r.delta.trade_balance,
        ),
    ];
    for (name, before, after, change) in rows {
        output.push_str(&format!(
            "{:<22} {:>12.1} {:>12.1} {:>+12.1}\n",
            name, before, after, change
        ));
    }
    output.push_str(&format!(
        "{:<22} {:>12} {:>12} {:>+12}\n",
        "Suppliers",
        r.baseline.num_suppliers, r.disrupted.num_suppliers, r.delta.num_suppliers
    ));
    output.push_str(&format!(
        "\nRisk level: {} -> {}\n",
        analysis.baseline_risk_level.label(),
        analysis.disrupted_risk_level.label()
    ));

    output
}

/// Render the dataset summary as text
pub fn render_summary_text(summary: &DatasetSummary) -> String {
    let mut output = String::new();
    rule(&mut output, "Trade dataset summary");
    output.push_str(&format!("Records:   {}\n", summary.record_count));
    output.push_str(&format!("Years:     {}\n", summary.year_count));
    output.push_str(&format!("Exporters: {}\n", summary.exporter_count));
    output.push_str(&format!("Importers: {}\n", summary.importer_count));
    output.push_str(&format!("Products:  {}\n", summary.product_count));

    output.push_str(&format!(
        "\nTop {} products by trade value\n",
        summary.top_products.len()
    ));
    for p in &summary.top_products {
        output.push_str(&format!(
            "  {:<8} {} {:>18.1}\n",
            p.product_code,
            truncate_or_pad(p.product_name.as_deref().unwrap_or("-"), 48),
            p.total_value
        ));
    }

    output.push_str(&format!(
        "\nTop {} exporter-importer pairs\n",
        summary.top_flows.len()
    ));
    for f in &summary.top_flows {
        output.push_str(&format!(
            "  {} -> {} {:>18.1}\n",
            truncate_or_pad(&f.exporter, 24),
            truncate_or_pad(&f.importer, 24),
            f.total_value
        ));
    }

    output.push_str("\nTotal trade value by year\n");
    for y in &summary.yearly_totals {
        output.push_str(&format!("  {:<6} {:>18.1}\n", y.year, y.total_value));
    }

    output
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn money_or_dash(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v))
}

/// Truncate or pad string to fixed width (in characters)
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}
