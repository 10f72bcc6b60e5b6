//! Descriptive statistics over the whole trade table

use crate::aggregates::YearlyValue;
use crate::store::TradeStore;
use anyhow::{Context, Result};
use rusqlite::params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProductTotal {
    pub product_code: String,
    /// None when the product is missing from the catalogue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FlowTotal {
    pub exporter: String,
    pub importer: String,
    pub total_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatasetSummary {
    pub record_count: usize,
    pub year_count: usize,
    pub exporter_count: usize,
    pub importer_count: usize,
    pub product_count: usize,
    pub top_products: Vec<ProductTotal>,
    pub top_flows: Vec<FlowTotal>,
    pub yearly_totals: Vec<YearlyValue>,
}

impl DatasetSummary {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize dataset summary")
    }
}

fn count(store: &TradeStore, sql: &str) -> Result<usize> {
    let n: i64 = store
        .connection()
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("summary query failed: {}", sql))?;
    Ok(n as usize)
}

/// Summarize the store, keeping `top` entries in each ranking.
///
/// Rankings order by total value descending, then by key ascending.
pub fn summarize(store: &TradeStore, top: usize) -> Result<DatasetSummary> {
    let conn = store.connection();
    let limit = top as i64;

    let mut stmt = conn.prepare(
        "SELECT t.product_code, p.product_name, SUM(t.value_1000usd) AS total
         FROM trade t LEFT JOIN products p ON p.product_code = t.product_code
         GROUP BY t.product_code
         ORDER BY total DESC, t.product_code ASC
         LIMIT ?1",
    )?;
    let top_products = stmt
        .query_map(params![limit], |row| {
            Ok(ProductTotal {
                product_code: row.get(0)?,
                product_name: row.get(1)?,
                total_value: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to rank products")?;

    let mut stmt = conn.prepare(
        "SELECT exporter, importer, SUM(value_1000usd) AS total
         FROM trade
         GROUP BY exporter, importer
         ORDER BY total DESC, exporter ASC, importer ASC
         LIMIT ?1",
    )?;
    let top_flows = stmt
        .query_map(params![limit], |row| {
            Ok(FlowTotal {
                exporter: row.get(0)?,
                importer: row.get(1)?,
                total_value: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to rank exporter-importer pairs")?;

    let mut stmt = conn.prepare(
        "SELECT year, SUM(value_1000usd) FROM trade GROUP BY year ORDER BY year",
    )?;
    let yearly_totals = stmt
        .query_map([], |row| {
            Ok(YearlyValue {
                year: row.get(0)?,
                total_value: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to total trade by year")?;

    Ok(DatasetSummary {
        record_count: store.record_count()?,
        year_count: count(store, "SELECT COUNT(DISTINCT year) FROM trade")?,
        exporter_count: count(store, "SELECT COUNT(DISTINCT exporter) FROM trade")?,
        importer_count: count(store, "SELECT COUNT(DISTINCT importer) FROM trade")?,
        product_count: count(store, "SELECT COUNT(DISTINCT product_code) FROM trade")?,
        top_products,
        top_flows,
        yearly_totals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Product, TradeRecord};

    #[test]
    fn test_summary_counts_and_rankings() {
        let mut store = TradeStore::open_in_memory().unwrap();
        store
            .upsert_products(&[Product::new("0101", "Horses, live")])
            .unwrap();
        store
            .insert_records(&[
                TradeRecord::new(2021, "CHN", "USA", "0101", 10.0),
                TradeRecord::new(2021, "CHN", "USA", "0101", 5.0),
                TradeRecord::new(2022, "MEX", "USA", "0202", 40.0),
                TradeRecord::new(2022, "USA", "CAN", "0303", 1.0),
            ])
            .unwrap();

        let summary = summarize(&store, 2).unwrap();
        assert_eq!(summary.record_count, 4);
        assert_eq!(summary.year_count, 2);
        assert_eq!(summary.exporter_count, 3);
        assert_eq!(summary.importer_count, 2);
        assert_eq!(summary.product_count, 3);

        assert_eq!(summary.top_products.len(), 2);
        assert_eq!(summary.top_products[0].product_code, "0202");
        assert_eq!(summary.top_products[0].product_name, None);
        assert_eq!(
            summary.top_products[1].product_name.as_deref(),
            Some("Horses, live")
        );
        assert_eq!(summary.top_products[1].total_value, 15.0);

        assert_eq!(summary.top_flows[0].exporter, "MEX");
        assert_eq!(summary.top_flows[1].total_value, 15.0);

        assert_eq!(
            summary.yearly_totals,
            vec![
                YearlyValue { year: 2021, total_value: 15.0 },
                YearlyValue { year: 2022, total_value: 41.0 },
            ]
        );
    }

    #[test]
    fn test_summary_of_empty_store() {
        let store = TradeStore::open_in_memory().unwrap();
        let summary = summarize(&store, 10).unwrap();
        assert_eq!(summary.record_count, 0);
        assert!(summary.top_products.is_empty());
        assert!(summary.yearly_totals.is_empty());
    }
}
