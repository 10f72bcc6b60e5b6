//! Chart-ready aggregates for a slice
//!
//! Computes the yearly series and supplier rankings the presentation layer
//! plots, plus the overview figures narration quotes alongside the metrics.
//!
//! Global invariants enforced:
//! - Aggregates are strictly derived (never stored, always computed)
//! - Years ascending; rankings descending by value with stable ties

use crate::metrics::{group_sum, rank_descending};
use crate::record::TradeRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Total value for one year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct YearlyValue {
    pub year: i32,
    pub total_value: f64,
}

/// Imports and exports of the reference market for one year.
///
/// A side with no rows that year is `None`; the balance treats it as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct YearlyTrade {
    pub year: i32,
    pub imports: Option<f64>,
    pub exports: Option<f64>,
    pub trade_balance: f64,
}

/// One exporter's total into the reference market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupplierTotal {
    pub exporter: String,
    pub total_value: f64,
}

/// Direction of the most recent change in trade balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceTrend {
    Improving,
    Worsening,
}

impl BalanceTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceTrend::Improving => "improving",
            BalanceTrend::Worsening => "worsening",
        }
    }
}

/// Headline figures derived from the yearly series and supplier ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TradeOverview {
    pub total_imports: f64,
    pub total_exports: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_import: Option<YearlyValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leading_supplier: Option<SupplierTotal>,
    /// Share of the three largest suppliers within the ranked supplier list, 0-100
    pub top_3_supplier_share: f64,
    pub average_balance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_deficit: Option<YearlyValue>,
    pub balance_trend: BalanceTrend,
}

/// Aggregates container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TradeAggregates {
    pub yearly_imports: Vec<YearlyValue>,
    pub yearly_exports: Vec<YearlyValue>,
    pub yearly_trade: Vec<YearlyTrade>,
    pub top_suppliers: Vec<SupplierTotal>,
    pub overview: TradeOverview,
}

/// Sum values per year for records matching `keep`
fn yearly_totals<F>(records: &[TradeRecord], keep: F) -> Vec<YearlyValue>
where
    F: Fn(&TradeRecord) -> bool,
{
    let mut by_year: BTreeMap<i32, f64> = BTreeMap::new();
    for r in records.iter().filter(|r| keep(*r)) {
        *by_year.entry(r.year).or_insert(0.0) += r.value;
    }
    by_year
        .into_iter()
        .map(|(year, total_value)| YearlyValue { year, total_value })
        .collect()
}

/// Reference-market imports per year, ascending
pub fn yearly_imports(records: &[TradeRecord], reference_market: &str) -> Vec<YearlyValue> {
    yearly_totals(records, |r| r.is_import_to(reference_market))
}

/// Reference-market exports per year, ascending
pub fn yearly_exports(records: &[TradeRecord], reference_market: &str) -> Vec<YearlyValue> {
    yearly_totals(records, |r| r.is_export_from(reference_market))
}

/// Outer join of imports and exports on year with the per-year balance
pub fn yearly_trade(imports: &[YearlyValue], exports: &[YearlyValue]) -> Vec<YearlyTrade> {
    let mut joined: BTreeMap<i32, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for v in imports {
        joined.entry(v.year).or_insert((None, None)).0 = Some(v.total_value);
    }
    for v in exports {
        joined.entry(v.year).or_insert((None, None)).1 = Some(v.total_value);
    }
    joined
        .into_iter()
        .map(|(year, (imports, exports))| YearlyTrade {
            year,
            imports,
            exports,
            trade_balance: exports.unwrap_or(0.0) - imports.unwrap_or(0.0),
        })
        .collect()
}

/// Largest `limit` exporters into the reference market
pub fn top_suppliers(
    records: &[TradeRecord],
    reference_market: &str,
    limit: usize,
) -> Vec<SupplierTotal> {
    let imports = records.iter().filter(|r| r.is_import_to(reference_market));
    rank_descending(group_sum(imports, |r| r.exporter.as_str()))
        .into_iter()
        .take(limit)
        .map(|(exporter, total_value)| SupplierTotal {
            exporter,
            total_value,
        })
        .collect()
}

/// Derive headline figures from already-computed series
pub fn compute_overview(
    imports: &[YearlyValue],
    exports: &[YearlyValue],
    trade: &[YearlyTrade],
    suppliers: &[SupplierTotal],
) -> TradeOverview {
    let total_imports: f64 = imports.iter().map(|v| v.total_value).sum();
    let total_exports: f64 = exports.iter().map(|v| v.total_value).sum();

    // First maximum wins on ties
    let peak_import = imports
        .iter()
        .fold(None::<&YearlyValue>, |best, v| match best {
            Some(b) if b.total_value >= v.total_value => Some(b),
            _ => Some(v),
        })
        .cloned();

    let ranked_total: f64 = suppliers.iter().map(|s| s.total_value).sum();
    let top_3_supplier_share = if ranked_total != 0.0 {
        suppliers.iter().take(3).map(|s| s.total_value).sum::<f64>() / ranked_total * 100.0
    } else {
        0.0
    };

    let average_balance = if trade.is_empty() {
        0.0
    } else {
        trade.iter().map(|t| t.trade_balance).sum::<f64>() / trade.len() as f64
    };

    let largest_deficit = trade
        .iter()
        .fold(None::<&YearlyTrade>, |worst, t| match worst {
            Some(w) if w.trade_balance <= t.trade_balance => Some(w),
            _ => Some(t),
        })
        .map(|t| YearlyValue {
            year: t.year,
            total_value: t.trade_balance,
        });

    let balance_trend = match trade {
        [.., previous, last] if last.trade_balance > previous.trade_balance => {
            BalanceTrend::Improving
        }
        _ => BalanceTrend::Worsening,
    };

    TradeOverview {
        total_imports,
        total_exports,
        peak_import,
        first_year: imports.first().map(|v| v.year),
        last_year: imports.last().map(|v| v.year),
        leading_supplier: suppliers.first().cloned(),
        top_3_supplier_share,
        average_balance,
        largest_deficit,
        balance_trend,
    }
}

/// Compute every aggregate for a slice
pub fn compute_trade_aggregates(
    records: &[TradeRecord],
    reference_market: &str,
    supplier_limit: usize,
) -> TradeAggregates {
    let yearly_imports = yearly_imports(records, reference_market);
    let yearly_exports = yearly_exports(records, reference_market);
    let yearly_trade = yearly_trade(&yearly_imports, &yearly_exports);
    let top_suppliers = top_suppliers(records, reference_market, supplier_limit);
    let overview = compute_overview(
        &yearly_imports,
        &yearly_exports,
        &yearly_trade,
        &top_suppliers,
    );

    TradeAggregates {
        yearly_imports,
        yearly_exports,
        yearly_trade,
        top_suppliers,
        overview,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<TradeRecord> {
        vec![
            TradeRecord::new(2021, "CHN", "USA", "p", 100.0),
            TradeRecord::new(2021, "USA", "MEX", "p", 20.0),
            TradeRecord::new(2022, "CHN", "USA", "p", 150.0),
            TradeRecord::new(2022, "DEU", "USA", "p", 50.0),
            TradeRecord::new(2023, "MEX", "USA", "p", 60.0),
            TradeRecord::new(2023, "USA", "CAN", "p", 80.0),
            TradeRecord::new(2023, "CHN", "JPN", "p", 999.0),
        ]
    }

    #[test]
    fn test_yearly_series() {
        let records = sample();
        let imports = yearly_imports(&records, "USA");
        assert_eq!(
            imports,
            vec![
                YearlyValue { year: 2021, total_value: 100.0 },
                YearlyValue { year: 2022, total_value: 200.0 },
                YearlyValue { year: 2023, total_value: 60.0 },
            ]
        );
        let exports = yearly_exports(&records, "USA");
        assert_eq!(exports.len(), 2);
        assert_eq!(exports[1].year, 2023);
    }

    #[test]
    fn test_yearly_trade_outer_join() {
        let imports = vec![YearlyValue { year: 2022, total_value: 10.0 }];
        let exports = vec![YearlyValue { year: 2023, total_value: 4.0 }];
        let trade = yearly_trade(&imports, &exports);
        assert_eq!(trade.len(), 2);
        assert_eq!(trade[0].exports, None);
        assert_eq!(trade[0].trade_balance, -10.0);
        assert_eq!(trade[1].imports, None);
        assert_eq!(trade[1].trade_balance, 4.0);
    }

    #[test]
    fn test_top_suppliers_ranked_and_limited() {
        let suppliers = top_suppliers(&sample(), "USA", 2);
        assert_eq!(suppliers.len(), 2);
        assert_eq!(suppliers[0].exporter, "CHN");
        assert_eq!(suppliers[0].total_value, 250.0);
        assert_eq!(suppliers[1].exporter, "MEX");
    }

    #[test]
    fn test_overview() {
        let agg = compute_trade_aggregates(&sample(), "USA", 10);
        let o = &agg.overview;
        assert_eq!(o.total_imports, 360.0);
        assert_eq!(o.total_exports, 100.0);
        assert_eq!(o.peak_import.as_ref().unwrap().year, 2022);
        assert_eq!(o.first_year, Some(2021));
        assert_eq!(o.last_year, Some(2023));
        assert_eq!(o.leading_supplier.as_ref().unwrap().exporter, "CHN");
        // Three suppliers: the top three hold everything
        assert!((o.top_3_supplier_share - 100.0).abs() < 1e-9);
        // Balances: -80, -200, +20
        assert!((o.average_balance - (-260.0 / 3.0)).abs() < 1e-9);
        assert_eq!(o.largest_deficit.as_ref().unwrap().year, 2022);
        assert_eq!(o.balance_trend, BalanceTrend::Improving);
    }

    #[test]
    fn test_overview_of_empty_slice() {
        let agg = compute_trade_aggregates(&[], "USA", 10);
        assert!(agg.yearly_trade.is_empty());
        assert_eq!(agg.overview.total_imports, 0.0);
        assert!(agg.overview.peak_import.is_none());
        assert!(agg.overview.largest_deficit.is_none());
        assert_eq!(agg.overview.top_3_supplier_share, 0.0);
        assert_eq!(agg.overview.balance_trend, BalanceTrend::Worsening);
    }
}
