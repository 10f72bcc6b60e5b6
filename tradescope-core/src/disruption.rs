//! Supplier disruption simulation
//!
//! Compares metrics for a baseline slice against the same slice with one
//! exporter's shipments into the reference market removed.
//!
//! Global invariants enforced:
//! - Both sides are computed by `compute_metrics`; no separate algorithm
//! - Inputs are never mutated (the disrupted slice is a new vector)
//! - Deltas are disrupted minus baseline

use crate::metrics::{compute_metrics, supplier_shares, SupplierShare, TradeMetrics};
use crate::record::TradeRecord;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Signed per-field change (disrupted minus baseline)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsDelta {
    pub risk_score: f64,
    pub diversity_score: f64,
    pub substitutability: f64,
    pub top_supplier_share: f64,
    pub top_3_concentration: f64,
    pub num_suppliers: i64,
    pub global_supplier_count: i64,
    pub us_supplier_count: i64,
    pub us_market_share: f64,
    pub yoy_growth: f64,
    pub trade_balance: f64,
}

impl MetricsDelta {
    pub fn between(before: &TradeMetrics, after: &TradeMetrics) -> Self {
        MetricsDelta {
            risk_score: after.risk_score - before.risk_score,
            diversity_score: after.diversity_score - before.diversity_score,
            substitutability: after.substitutability - before.substitutability,
            top_supplier_share: after.top_supplier_share - before.top_supplier_share,
            top_3_concentration: after.top_3_concentration - before.top_3_concentration,
            num_suppliers: count_delta(before.num_suppliers, after.num_suppliers),
            global_supplier_count: count_delta(
                before.global_supplier_count,
                after.global_supplier_count,
            ),
            us_supplier_count: count_delta(before.us_supplier_count, after.us_supplier_count),
            us_market_share: after.us_market_share - before.us_market_share,
            yoy_growth: after.yoy_growth - before.yoy_growth,
            trade_balance: after.trade_balance - before.trade_balance,
        }
    }
}

fn count_delta(before: usize, after: usize) -> i64 {
    after as i64 - before as i64
}

/// Baseline vs modified metrics for two record sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsComparison {
    pub baseline: TradeMetrics,
    pub modified: TradeMetrics,
    pub delta: MetricsDelta,
}

/// Compute metrics for two independent slices and their difference.
pub fn compare_slices(
    baseline: &[TradeRecord],
    modified: &[TradeRecord],
    reference_importer: &str,
) -> MetricsComparison {
    let baseline = compute_metrics(baseline, reference_importer);
    let modified = compute_metrics(modified, reference_importer);
    let delta = MetricsDelta::between(&baseline, &modified);
    MetricsComparison {
        baseline,
        modified,
        delta,
    }
}

/// Copy of `records` without `supplier`'s shipments into `reference_importer`.
///
/// The supplier's trade with other markets stays in the slice.
pub fn without_supplier(
    records: &[TradeRecord],
    reference_importer: &str,
    supplier: &str,
) -> Vec<TradeRecord> {
    records
        .iter()
        .filter(|r| !(r.is_import_to(reference_importer) && r.exporter == supplier))
        .cloned()
        .collect()
}

/// Full disruption result handed to reporting and narration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DisruptionReport {
    pub reference_market: String,
    pub removed_supplier: String,
    /// Removed supplier's import value (thousands of USD)
    pub removed_value: f64,
    /// Removed supplier's share of baseline imports, 0-100
    pub removed_share: f64,
    /// Largest remaining supplier, with its share of the *baseline* total
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successor: Option<SupplierShare>,
    pub baseline: TradeMetrics,
    pub disrupted: TradeMetrics,
    pub delta: MetricsDelta,
}

/// Largest supplier into the reference market, if any
pub fn top_supplier(records: &[TradeRecord], reference_importer: &str) -> Option<SupplierShare> {
    supplier_shares(records, reference_importer)
        .into_iter()
        .next()
}

/// Remove `supplier` from the reference market's imports and recompute.
///
/// Errors when `supplier` does not ship to the reference market in this slice.
pub fn simulate_disruption(
    records: &[TradeRecord],
    reference_importer: &str,
    supplier: &str,
) -> Result<DisruptionReport> {
    let shares = supplier_shares(records, reference_importer);
    let removed = shares
        .iter()
        .find(|s| s.exporter == supplier)
        .with_context(|| {
            format!(
                "supplier {} has no recorded exports to {} in this slice",
                supplier, reference_importer
            )
        })?;
    let successor = shares.iter().find(|s| s.exporter != supplier).cloned();

    let disrupted_slice = without_supplier(records, reference_importer, supplier);
    let comparison = compare_slices(records, &disrupted_slice, reference_importer);

    tracing::debug!(
        supplier,
        removed_rows = records.len() - disrupted_slice.len(),
        risk_delta = comparison.delta.risk_score,
        "simulated supplier disruption"
    );

    Ok(DisruptionReport {
        reference_market: reference_importer.to_string(),
        removed_supplier: supplier.to_string(),
        removed_value: removed.value,
        removed_share: removed.share * 100.0,
        successor,
        baseline: comparison.baseline,
        disrupted: comparison.modified,
        delta: comparison.delta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn scenario_b() -> Vec<TradeRecord> {
        vec![
            TradeRecord::new(2023, "CHN", "USA", "p", 50.0),
            TradeRecord::new(2023, "MEX", "USA", "p", 30.0),
            TradeRecord::new(2023, "CAN", "USA", "p", 20.0),
            TradeRecord::new(2023, "CHN", "DEU", "p", 40.0),
        ]
    }

    #[test]
    fn test_without_supplier_keeps_other_markets() {
        let records = scenario_b();
        let slice = without_supplier(&records, "USA", "CHN");
        assert_eq!(slice.len(), 3);
        assert!(slice
            .iter()
            .any(|r| r.exporter == "CHN" && r.importer == "DEU"));
        assert_eq!(records.len(), 4, "input must not be mutated");
    }

    #[test]
    fn test_remove_top_supplier() {
        let records = scenario_b();
        let report = simulate_disruption(&records, "USA", "CHN").unwrap();

        assert_eq!(report.removed_supplier, "CHN");
        assert!((report.removed_value - 50.0).abs() < EPS);
        assert!((report.removed_share - 50.0).abs() < EPS);

        // The 30.0 "top share after removal" figure is the successor's share of the baseline total
        let successor = report.successor.as_ref().unwrap();
        assert_eq!(successor.exporter, "MEX");
        assert!((successor.share * 100.0 - 30.0).abs() < EPS);

        // Remaining 30/20 split renormalizes to 60/40
        assert!((report.disrupted.top_supplier_share - 60.0).abs() < EPS);
        assert!((report.disrupted.risk_score - 48.0).abs() < EPS);
        assert!((report.delta.risk_score - (48.0 - 62.0)).abs() < EPS);
        assert_eq!(report.delta.num_suppliers, -1);
        assert_eq!(report.disrupted.top_3_concentration, 0.0);
    }

    #[test]
    fn test_unknown_supplier_is_error() {
        let err = simulate_disruption(&scenario_b(), "USA", "BRA").unwrap_err();
        assert!(err.to_string().contains("BRA"));
    }

    #[test]
    fn test_removing_only_supplier_zeroes_metrics() {
        let records = vec![TradeRecord::new(2023, "CHN", "USA", "p", 10.0)];
        let report = simulate_disruption(&records, "USA", "CHN").unwrap();
        assert_eq!(report.disrupted, TradeMetrics::zero());
        assert!(report.successor.is_none());
    }

    #[test]
    fn test_compare_identical_slices_has_zero_delta() {
        let records = scenario_b();
        let cmp = compare_slices(&records, &records, "USA");
        assert_eq!(cmp.baseline, cmp.modified);
        assert_eq!(cmp.delta, MetricsDelta::default());
    }
}
