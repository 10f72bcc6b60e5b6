//! Slice selection: which products and years an analysis looks at

use crate::record::TradeRecord;
use serde::{Deserialize, Serialize};

/// Inclusive year range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        YearRange { start, end }
    }

    /// The trailing window ending at `current_year`, e.g. 2018..=2023 for (2023, 5)
    pub fn trailing(current_year: i32, window_years: u32) -> Self {
        YearRange {
            start: current_year - window_years as i32,
            end: current_year,
        }
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }

    /// Human label used in reports and prompts
    pub fn label(&self) -> String {
        format!("Past {} Years", self.end - self.start)
    }
}

/// Filter describing one analysis slice.
///
/// Product codes are kept sorted and deduplicated so two queries selecting the
/// same products compare (and hash) equal regardless of search order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TradeQuery {
    product_codes: Vec<String>,
    pub years: YearRange,
}

impl TradeQuery {
    pub fn new<I, S>(product_codes: I, years: YearRange) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut codes: Vec<String> = product_codes.into_iter().map(Into::into).collect();
        codes.sort();
        codes.dedup();
        TradeQuery {
            product_codes: codes,
            years,
        }
    }

    pub fn product_codes(&self) -> &[String] {
        &self.product_codes
    }

    pub fn matches(&self, record: &TradeRecord) -> bool {
        self.years.contains(record.year)
            && self
                .product_codes
                .binary_search(&record.product_code)
                .is_ok()
    }

    /// Apply the filter to an in-memory table, preserving input order
    pub fn apply(&self, records: &[TradeRecord]) -> Vec<TradeRecord> {
        records
            .iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect()
    }
}
