//! Trade records and product catalogue entries
//!
//! Records are immutable facts sourced from the store; nothing in this crate
//! mutates a record after it has been loaded.

use serde::{Deserialize, Serialize};

/// One bilateral trade flow: `exporter` shipped `value` (thousands of USD)
/// of `product_code` to `importer` during `year`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TradeRecord {
    pub year: i32,
    pub exporter: String,
    pub importer: String,
    pub product_code: String,
    #[serde(rename = "value_1000usd")]
    pub value: f64,
}

impl TradeRecord {
    pub fn new(
        year: i32,
        exporter: impl Into<String>,
        importer: impl Into<String>,
        product_code: impl Into<String>,
        value: f64,
    ) -> Self {
        TradeRecord {
            year,
            exporter: exporter.into(),
            importer: importer.into(),
            product_code: product_code.into(),
            value,
        }
    }

    /// True when this flow lands in `market`
    pub fn is_import_to(&self, market: &str) -> bool {
        self.importer == market
    }

    /// True when this flow leaves `market`
    pub fn is_export_from(&self, market: &str) -> bool {
        self.exporter == market
    }
}

/// Product catalogue entry (HS code and its description)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Product {
    pub product_code: String,
    pub product_name: String,
}

impl Product {
    pub fn new(product_code: impl Into<String>, product_name: impl Into<String>) -> Self {
        Product {
            product_code: product_code.into(),
            product_name: product_name.into(),
        }
    }

    /// Case-insensitive literal substring match on the product name
    pub fn matches(&self, term: &str) -> bool {
        self.product_name
            .to_lowercase()
            .contains(&term.to_lowercase())
    }
}

/// Sum `value` over a set of records
pub fn total_value<'a>(records: impl IntoIterator<Item = &'a TradeRecord>) -> f64 {
    records.into_iter().map(|r| r.value).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_predicates() {
        let r = TradeRecord::new(2022, "CHN", "USA", "720851", 10.0);
        assert!(r.is_import_to("USA"));
        assert!(!r.is_import_to("CHN"));
        assert!(r.is_export_from("CHN"));
        assert!(!r.is_export_from("USA"));
    }

    #[test]
    fn test_product_match_is_case_insensitive() {
        let p = Product::new("720851", "Flat-rolled products of iron or non-alloy Steel");
        assert!(p.matches("steel"));
        assert!(p.matches("STEEL"));
        assert!(!p.matches("copper"));
    }

    #[test]
    fn test_value_column_name() {
        let r = TradeRecord::new(2021, "DEU", "USA", "850440", 1.5);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["value_1000usd"], 1.5);
        assert!(json.get("value").is_none());
    }
}
