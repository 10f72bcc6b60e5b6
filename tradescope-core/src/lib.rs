//! Tradescope core library - supplier concentration and disruption risk for bilateral trade data

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Metrics are a pure function of the input slice
// - No global mutable state (caches belong to an `Analyzer` session)
// - Degenerate input yields zeroed fields, never an error or a panic
// - Ties in rankings keep first-appearance order
// - Identical input yields byte-for-byte identical output

pub mod aggregates;
pub mod analysis;
pub mod cache;
pub mod config;
pub mod disruption;
pub mod ingest;
pub mod metrics;
pub mod narration;
pub mod query;
pub mod record;
pub mod report;
pub mod risk;
pub mod store;
pub mod summary;

pub use analysis::{AnalysisReport, AnalysisSettings, Analyzer, DisruptionAnalysis};
pub use config::ResolvedConfig;
pub use disruption::{compare_slices, simulate_disruption, DisruptionReport, MetricsDelta};
pub use metrics::{compute_metrics, TradeMetrics};
pub use query::{TradeQuery, YearRange};
pub use record::{Product, TradeRecord};
pub use risk::RiskLevel;
pub use store::{MemoryStore, TradeSource, TradeStore};
