//! Analysis orchestration - ties together product search, slice loading, metrics, and aggregates

use crate::aggregates::{compute_trade_aggregates, TradeAggregates};
use crate::cache::{AnalysisCache, CacheStats, CachedSlice, SliceKey};
use crate::config::{ResolvedConfig, DEFAULT_REFERENCE_MARKET, DEFAULT_TOP_SUPPLIERS};
use crate::disruption::{self, DisruptionReport};
use crate::metrics::TradeMetrics;
use crate::query::{TradeQuery, YearRange};
use crate::record::Product;
use crate::risk::{assign_risk_level_with_thresholds, RiskLevel, RiskLevelThresholds};
use crate::store::TradeSource;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Parameters shared by every analysis in a session
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub reference_market: String,
    pub years: YearRange,
    pub top_suppliers: usize,
    pub thresholds: RiskLevelThresholds,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            reference_market: DEFAULT_REFERENCE_MARKET.to_string(),
            years: YearRange::trailing(
                crate::config::DEFAULT_CURRENT_YEAR,
                crate::config::DEFAULT_WINDOW_YEARS,
            ),
            top_suppliers: DEFAULT_TOP_SUPPLIERS,
            thresholds: RiskLevelThresholds::default(),
        }
    }
}

impl From<&ResolvedConfig> for AnalysisSettings {
    fn from(config: &ResolvedConfig) -> Self {
        AnalysisSettings {
            reference_market: config.reference_market.clone(),
            years: config.years(),
            top_suppliers: config.top_suppliers,
            thresholds: config.risk_thresholds(),
        }
    }
}

/// Everything computed for one search term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisReport {
    pub term: String,
    pub reference_market: String,
    pub years: YearRange,
    pub time_range: String,
    pub products: Vec<Product>,
    pub record_count: usize,
    pub metrics: TradeMetrics,
    pub risk_level: RiskLevel,
    pub aggregates: TradeAggregates,
}

impl AnalysisReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize analysis report")
    }
}

/// A disruption simulation with the session context it ran in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DisruptionAnalysis {
    pub term: String,
    pub years: YearRange,
    pub time_range: String,
    pub baseline_risk_level: RiskLevel,
    pub disrupted_risk_level: RiskLevel,
    pub report: DisruptionReport,
}

impl DisruptionAnalysis {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize disruption report")
    }
}

/// One analysis session over a trade source.
///
/// Loaded slices are cached per session; `reset` starts a fresh one.
pub struct Analyzer<S: TradeSource> {
    source: S,
    settings: AnalysisSettings,
    cache: AnalysisCache,
}

impl<S: TradeSource> Analyzer<S> {
    pub fn new(source: S, settings: AnalysisSettings) -> Self {
        Analyzer {
            source,
            settings,
            cache: AnalysisCache::new(),
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Products whose name contains `term`
    pub fn find_products(&self, term: &str) -> Result<Vec<Product>> {
        let term = term.trim();
        if term.is_empty() {
            anyhow::bail!("search term must not be empty");
        }
        self.source.search_products(term)
    }

    fn resolve_slice(&mut self, term: &str) -> Result<(Vec<Product>, Arc<CachedSlice>)> {
        let products = self.find_products(term)?;
        if products.is_empty() {
            anyhow::bail!("no products match '{}'", term.trim());
        }

        let query = TradeQuery::new(
            products.iter().map(|p| p.product_code.clone()),
            self.settings.years,
        );
        let key = SliceKey::new(query, self.settings.reference_market.clone());
        let source = &self.source;
        let slice = self
            .cache
            .get_or_load(&key, |q| source.load_slice(q))
            .with_context(|| format!("failed to load trade data for '{}'", term.trim()))?;

        tracing::debug!(
            term,
            products = products.len(),
            rows = slice.records.len(),
            "resolved slice"
        );
        if slice.records.is_empty() {
            anyhow::bail!(
                "no trade data for '{}' in {} ({}-{})",
                term.trim(),
                self.settings.years.label(),
                self.settings.years.start,
                self.settings.years.end
            );
        }
        Ok((products, slice))
    }

    /// Metrics, risk level and aggregates for every product matching `term`
    pub fn analyze(&mut self, term: &str) -> Result<AnalysisReport> {
        let (products, slice) = self.resolve_slice(term)?;
        let settings = &self.settings;

        let aggregates = compute_trade_aggregates(
            &slice.records,
            &settings.reference_market,
            settings.top_suppliers,
        );
        let risk_level =
            assign_risk_level_with_thresholds(slice.metrics.risk_score, &settings.thresholds);

        Ok(AnalysisReport {
            term: term.trim().to_string(),
            reference_market: settings.reference_market.clone(),
            years: settings.years,
            time_range: settings.years.label(),
            products,
            record_count: slice.records.len(),
            metrics: slice.metrics.clone(),
            risk_level,
            aggregates,
        })
    }

    /// Remove one supplier from the slice for `term` and compare.
    ///
    /// `supplier` defaults to the largest supplier into the reference market.
    pub fn simulate_disruption(
        &mut self,
        term: &str,
        supplier: Option<&str>,
    ) -> Result<DisruptionAnalysis> {
        let (_, slice) = self.resolve_slice(term)?;
        let settings = &self.settings;
        let market = settings.reference_market.as_str();

        let supplier = match supplier {
            Some(s) => s.to_string(),
            None => disruption::top_supplier(&slice.records, market)
                .map(|s| s.exporter)
                .with_context(|| {
                    format!("no supplier exports '{}' to {}", term.trim(), market)
                })?,
        };

        let report = disruption::simulate_disruption(&slice.records, market, &supplier)?;
        Ok(DisruptionAnalysis {
            term: term.trim().to_string(),
            years: settings.years,
            time_range: settings.years.label(),
            baseline_risk_level: assign_risk_level_with_thresholds(
                report.baseline.risk_score,
                &settings.thresholds,
            ),
            disrupted_risk_level: assign_risk_level_with_thresholds(
                report.disrupted.risk_score,
                &settings.thresholds,
            ),
            report,
        })
    }

    /// Forget every cached slice
    pub fn reset(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TradeRecord;
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new(
            vec![
                TradeRecord::new(2022, "CHN", "USA", "7208", 50.0),
                TradeRecord::new(2022, "MEX", "USA", "7208", 30.0),
                TradeRecord::new(2023, "CAN", "USA", "7302", 20.0),
                TradeRecord::new(2023, "USA", "CAN", "7302", 15.0),
                TradeRecord::new(2010, "JPN", "USA", "7208", 500.0),
                TradeRecord::new(2023, "CHL", "USA", "7403", 80.0),
                TradeRecord::new(2010, "AUS", "USA", "2601", 40.0),
            ],
            vec![
                Product::new("7208", "Flat-rolled products of iron or steel"),
                Product::new("7302", "Railway track construction material of iron or steel"),
                Product::new("7403", "Refined copper"),
                Product::new("2601", "Iron ores and concentrates"),
            ],
        )
    }

    #[test]
    fn test_analyze_combines_matching_products() {
        let mut analyzer = Analyzer::new(store(), AnalysisSettings::default());
        let report = analyzer.analyze("  Steel ").unwrap();

        assert_eq!(report.term, "Steel");
        assert_eq!(report.products.len(), 2);
        // 2010 falls outside 2018..=2023
        assert_eq!(report.record_count, 4);
        assert!((report.metrics.risk_score - 62.0).abs() < 1e-9);
        assert_eq!(report.risk_level, RiskLevel::Moderate);
        assert_eq!(report.time_range, "Past 5 Years");
        assert_eq!(report.aggregates.top_suppliers[0].exporter, "CHN");
        assert_eq!(report.aggregates.overview.total_exports, 15.0);
    }

    #[test]
    fn test_unknown_term_is_error() {
        let mut analyzer = Analyzer::new(store(), AnalysisSettings::default());
        let err = analyzer.analyze("titanium").unwrap_err();
        assert!(err.to_string().contains("no products match"));
        assert!(analyzer.analyze("   ").is_err());
    }

    #[test]
    fn test_matching_products_without_trade_in_window_is_error() {
        let mut analyzer = Analyzer::new(store(), AnalysisSettings::default());
        // Only a 2010 row exists for iron ores
        let err = analyzer.analyze("iron ores").unwrap_err();
        assert!(err
            .to_string()
            .contains("no trade data for 'iron ores' in Past 5 Years (2018-2023)"));
        assert!(analyzer.simulate_disruption("iron ores", None).is_err());
        assert!(analyzer
            .simulate_disruption("iron ores", Some("AUS"))
            .unwrap_err()
            .to_string()
            .contains("no trade data"));
    }

    #[test]
    fn test_repeat_analysis_uses_cache_until_reset() {
        let mut analyzer = Analyzer::new(store(), AnalysisSettings::default());
        let first = analyzer.analyze("steel").unwrap();
        let second = analyzer.analyze("STEEL").unwrap();
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(analyzer.cache_stats().hits, 1);

        analyzer.reset();
        assert_eq!(analyzer.cache_stats(), CacheStats::default());
        analyzer.analyze("steel").unwrap();
        assert_eq!(analyzer.cache_stats().misses, 1);
    }

    #[test]
    fn test_disruption_defaults_to_top_supplier() {
        let mut analyzer = Analyzer::new(store(), AnalysisSettings::default());
        let result = analyzer.simulate_disruption("steel", None).unwrap();
        assert_eq!(result.report.removed_supplier, "CHN");
        assert_eq!(result.baseline_risk_level, RiskLevel::Moderate);
        assert_eq!(result.disrupted_risk_level, RiskLevel::High);
        assert_eq!(result.report.delta.num_suppliers, -1);
    }

    #[test]
    fn test_disruption_with_explicit_and_unknown_supplier() {
        let mut analyzer = Analyzer::new(store(), AnalysisSettings::default());
        let result = analyzer.simulate_disruption("steel", Some("CAN")).unwrap();
        assert!((result.report.removed_share - 20.0).abs() < 1e-9);
        assert!(analyzer.simulate_disruption("steel", Some("BRA")).is_err());
    }

    #[test]
    fn test_reference_market_from_settings() {
        let settings = AnalysisSettings {
            reference_market: "CAN".to_string(),
            ..AnalysisSettings::default()
        };
        let mut analyzer = Analyzer::new(store(), settings);
        let report = analyzer.analyze("steel").unwrap();
        assert_eq!(report.metrics.num_suppliers, 1);
        assert_eq!(report.metrics.top_supplier_share, 100.0);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert!(analyzer.simulate_disruption("copper", None).is_err());
    }
}
