//! Supplier concentration metrics for a trade slice
//!
//! Global invariants enforced:
//! - Pure function of the input slice (no state, no I/O, no clocks)
//! - Identical input yields identical output
//! - Zero reference-market import value yields the zero result, never a division error
//! - Ties between equal totals keep the input's first-appearance order
//! - No rounding (presentation rounds for display)

use crate::record::{total_value, TradeRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Number of entries kept in `top_exporters` / `top_importers`
pub const TOP_PARTNERS: usize = 5;

/// Supplier count at which `diversity_score` saturates at 100
pub const DIVERSITY_SATURATION: usize = 10;

/// Suppliers required before `top_3_concentration` is reported
pub const TOP_CONCENTRATION_MIN_SUPPLIERS: usize = 3;

/// Summary statistics for one slice and reference market.
///
/// Percentages are on a 0-100 scale; `trade_balance` is in thousands of USD.
/// The `us_*` names are kept for consumers that expect them even when the
/// reference market is not the United States.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TradeMetrics {
    pub risk_score: f64,
    pub diversity_score: f64,
    pub substitutability: f64,
    pub top_supplier_share: f64,
    pub top_3_concentration: f64,
    pub num_suppliers: usize,
    pub global_supplier_count: usize,
    pub us_supplier_count: usize,
    pub top_exporters: Vec<String>,
    pub top_importers: Vec<String>,
    pub us_market_share: f64,
    pub yoy_growth: f64,
    pub trade_balance: f64,
}

impl TradeMetrics {
    /// The all-zero result returned for slices without reference-market imports
    pub fn zero() -> Self {
        TradeMetrics::default()
    }
}

/// One exporter's slice of the reference market's imports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupplierShare {
    pub exporter: String,
    pub value: f64,
    /// Fraction of total imports, 0-1
    pub share: f64,
}

/// Sum `value` per key, keeping keys in order of first appearance
pub(crate) fn group_sum<'a, F>(
    records: impl IntoIterator<Item = &'a TradeRecord>,
    key: F,
) -> Vec<(String, f64)>
where
    F: Fn(&TradeRecord) -> &str,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, f64)> = Vec::new();
    for record in records {
        let k = key(record);
        match index.get(k) {
            Some(&i) => groups[i].1 += record.value,
            None => {
                index.insert(k, groups.len());
                groups.push((k.to_string(), record.value));
            }
        }
    }
    groups
}

/// Stable descending sort by value (ties keep their current order)
pub(crate) fn rank_descending(mut groups: Vec<(String, f64)>) -> Vec<(String, f64)> {
    groups.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    groups
}

/// Top `n` keys by summed value over the whole slice
fn top_keys<F>(records: &[TradeRecord], key: F, n: usize) -> Vec<String>
where
    F: Fn(&TradeRecord) -> &str,
{
    rank_descending(group_sum(records, key))
        .into_iter()
        .take(n)
        .map(|(k, _)| k)
        .collect()
}

/// Reference-market import shares per exporter, largest first.
///
/// Returns an empty vector when the market has no import value.
pub fn supplier_shares(records: &[TradeRecord], reference_importer: &str) -> Vec<SupplierShare> {
    let imports: Vec<&TradeRecord> = records
        .iter()
        .filter(|r| r.is_import_to(reference_importer))
        .collect();
    let total_imports = total_value(imports.iter().copied());
    if total_imports == 0.0 {
        return Vec::new();
    }

    rank_descending(group_sum(imports.iter().copied(), |r| r.exporter.as_str()))
        .into_iter()
        .map(|(exporter, value)| SupplierShare {
            exporter,
            value,
            share: value / total_imports,
        })
        .collect()
}

/// Inverse Herfindahl-Hirschman index on a 0-100 scale
///
/// `shares` are fractions summing to 1. A single supplier scores 0; an even
/// split across many suppliers approaches 100.
pub fn inverse_hhi(shares: &[f64]) -> f64 {
    let hhi: f64 = shares.iter().map(|s| s * s).sum();
    ((1.0 - hhi) * 100.0).clamp(0.0, 100.0)
}

/// Supplier-count signal saturating at `DIVERSITY_SATURATION`
pub fn diversity_score(supplier_count: usize) -> f64 {
    ((supplier_count as f64 / DIVERSITY_SATURATION as f64) * 100.0).min(100.0)
}

/// Percent change of the latest year over the one before it.
///
/// `yearly` must be keyed by year. Fewer than two years, or a prior year
/// total of exactly zero, yields 0.
pub fn year_over_year_growth(yearly: &BTreeMap<i32, f64>) -> f64 {
    let mut latest = yearly.values().rev();
    match (latest.next(), latest.next()) {
        (Some(&last), Some(&previous)) if previous != 0.0 => {
            ((last - previous) / previous) * 100.0
        }
        _ => 0.0,
    }
}

fn distinct_exporters<'a>(records: impl IntoIterator<Item = &'a TradeRecord>) -> usize {
    records
        .into_iter()
        .map(|r| r.exporter.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// Compute supplier concentration and risk metrics for `records` as seen by
/// `reference_importer`.
///
/// `records` must already be filtered to the products and years of interest.
/// Never fails: degenerate input yields zeroed fields.
pub fn compute_metrics(records: &[TradeRecord], reference_importer: &str) -> TradeMetrics {
    let imports: Vec<&TradeRecord> = records
        .iter()
        .filter(|r| r.is_import_to(reference_importer))
        .collect();
    let total_imports = total_value(imports.iter().copied());
    let total_exports = total_value(
        records
            .iter()
            .filter(|r| r.is_export_from(reference_importer)),
    );

    if total_imports == 0.0 {
        return TradeMetrics::zero();
    }

    // Concentration
    let shares: Vec<f64> = supplier_shares(records, reference_importer)
        .into_iter()
        .map(|s| s.share)
        .collect();
    let num_suppliers = shares.len();
    let risk_score = inverse_hhi(&shares);
    let top_supplier_share = shares.first().map(|s| s * 100.0).unwrap_or(0.0);
    let top_3_concentration = if num_suppliers >= TOP_CONCENTRATION_MIN_SUPPLIERS {
        shares.iter().take(3).sum::<f64>() * 100.0
    } else {
        0.0
    };

    // Whole-slice partners
    let top_exporters = top_keys(records, |r| r.exporter.as_str(), TOP_PARTNERS);
    let top_importers = top_keys(records, |r| r.importer.as_str(), TOP_PARTNERS);

    let slice_total = total_value(records);
    let us_market_share = if slice_total != 0.0 {
        total_imports / slice_total * 100.0
    } else {
        0.0
    };

    let mut yearly: BTreeMap<i32, f64> = BTreeMap::new();
    for r in &imports {
        *yearly.entry(r.year).or_insert(0.0) += r.value;
    }
    let yoy_growth = year_over_year_growth(&yearly);

    let us_supplier_count = distinct_exporters(imports.iter().copied());
    let global_supplier_count = distinct_exporters(records);
    let substitutability =
        (us_supplier_count as f64 / global_supplier_count.max(1) as f64 * 100.0).min(100.0);

    TradeMetrics {
        risk_score,
        diversity_score: diversity_score(num_suppliers),
        substitutability,
        top_supplier_share,
        top_3_concentration,
        num_suppliers,
        global_supplier_count,
        us_supplier_count,
        top_exporters,
        top_importers,
        us_market_share,
        yoy_growth,
        trade_balance: total_exports - total_imports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn imports(shares: &[(&str, f64)]) -> Vec<TradeRecord> {
        shares
            .iter()
            .map(|(exporter, value)| TradeRecord::new(2023, *exporter, "USA", "p", *value))
            .collect()
    }

    #[test]
    fn test_single_supplier() {
        let m = compute_metrics(&imports(&[("CHN", 100.0)]), "USA");
        assert_eq!(m.risk_score, 0.0);
        assert!((m.top_supplier_share - 100.0).abs() < EPS);
        assert_eq!(m.top_3_concentration, 0.0);
        assert_eq!(m.num_suppliers, 1);
        assert!((m.diversity_score - 10.0).abs() < EPS);
    }

    #[test]
    fn test_three_suppliers() {
        let m = compute_metrics(
            &imports(&[("MEX", 30.0), ("CHN", 50.0), ("CAN", 20.0)]),
            "USA",
        );
        assert!((m.risk_score - 62.0).abs() < EPS);
        assert!((m.top_supplier_share - 50.0).abs() < EPS);
        assert!((m.top_3_concentration - 100.0).abs() < EPS);
        assert_eq!(m.num_suppliers, 3);
    }

    #[test]
    fn test_ten_equal_suppliers() {
        let names = ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"];
        let records: Vec<_> = names
            .iter()
            .map(|n| TradeRecord::new(2023, *n, "USA", "p", 7.0))
            .collect();
        let m = compute_metrics(&records, "USA");
        assert_eq!(m.diversity_score, 100.0);
        assert!((m.risk_score - 90.0).abs() < EPS);
    }

    #[test]
    fn test_two_suppliers_keep_zero_top_three() {
        let m = compute_metrics(&imports(&[("CHN", 60.0), ("MEX", 40.0)]), "USA");
        assert_eq!(m.top_3_concentration, 0.0);
        assert!((m.top_supplier_share - 60.0).abs() < EPS);
    }

    #[test]
    fn test_zero_imports_is_zero_result() {
        let records = vec![
            TradeRecord::new(2023, "USA", "CAN", "p", 40.0),
            TradeRecord::new(2023, "CHN", "DEU", "p", 10.0),
        ];
        assert_eq!(compute_metrics(&records, "USA"), TradeMetrics::zero());
        assert_eq!(compute_metrics(&[], "USA"), TradeMetrics::zero());
    }

    #[test]
    fn test_partners_and_market_share() {
        let records = vec![
            TradeRecord::new(2023, "CHN", "USA", "p", 50.0),
            TradeRecord::new(2023, "CHN", "DEU", "p", 30.0),
            TradeRecord::new(2023, "USA", "MEX", "p", 15.0),
            TradeRecord::new(2023, "KOR", "JPN", "p", 5.0),
        ];
        let m = compute_metrics(&records, "USA");
        assert_eq!(m.top_exporters, vec!["CHN", "USA", "KOR"]);
        assert_eq!(m.top_importers, vec!["USA", "DEU", "MEX", "JPN"]);
        assert!((m.us_market_share - 50.0).abs() < EPS);
        assert!((m.trade_balance - (15.0 - 50.0)).abs() < EPS);
        assert_eq!(m.us_supplier_count, 1);
        assert_eq!(m.global_supplier_count, 3);
        assert!((m.substitutability - 100.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_top_partners_ties_keep_input_order() {
        let records = vec![
            TradeRecord::new(2023, "BRA", "USA", "p", 10.0),
            TradeRecord::new(2023, "ARG", "USA", "p", 10.0),
            TradeRecord::new(2023, "CHL", "USA", "p", 10.0),
        ];
        let m = compute_metrics(&records, "USA");
        assert_eq!(m.top_exporters, vec!["BRA", "ARG", "CHL"]);
    }

    #[test]
    fn test_top_partners_truncated_to_five() {
        let records: Vec<_> = (0..8)
            .map(|i| TradeRecord::new(2023, format!("X{i}"), "USA", "p", (i + 1) as f64))
            .collect();
        let m = compute_metrics(&records, "USA");
        assert_eq!(m.top_exporters, vec!["X7", "X6", "X5", "X4", "X3"]);
    }

    #[test]
    fn test_yoy_growth() {
        let records = vec![
            TradeRecord::new(2021, "CHN", "USA", "p", 80.0),
            TradeRecord::new(2022, "CHN", "USA", "p", 100.0),
            TradeRecord::new(2023, "CHN", "USA", "p", 50.0),
            TradeRecord::new(2023, "MEX", "USA", "p", 70.0),
        ];
        let m = compute_metrics(&records, "USA");
        assert!((m.yoy_growth - 20.0).abs() < EPS);
    }

    #[test]
    fn test_yoy_growth_degenerate_cases() {
        let mut yearly = BTreeMap::new();
        assert_eq!(year_over_year_growth(&yearly), 0.0);
        yearly.insert(2023, 10.0);
        assert_eq!(year_over_year_growth(&yearly), 0.0);
        yearly.insert(2022, 0.0);
        assert_eq!(year_over_year_growth(&yearly), 0.0);
    }

    #[test]
    fn test_supplier_shares_sorted() {
        let shares = supplier_shares(
            &imports(&[("MEX", 30.0), ("CHN", 50.0), ("MEX", 10.0)]),
            "USA",
        );
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].exporter, "CHN");
        assert!((shares[0].share - 50.0 / 90.0).abs() < EPS);
        assert!((shares[1].value - 40.0).abs() < EPS);
    }

    #[test]
    fn test_inverse_hhi_clamps() {
        assert_eq!(inverse_hhi(&[1.0]), 0.0);
        assert_eq!(inverse_hhi(&[1.0000001]), 0.0);
        assert_eq!(inverse_hhi(&[]), 100.0);
    }
}
