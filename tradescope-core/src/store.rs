//! Trade table storage
//!
//! The metrics engine only needs filter and group-by over the trade table;
//! `TradeSource` is that contract. `TradeStore` backs it with SQLite,
//! `MemoryStore` with plain vectors.
//!
//! Global invariants enforced:
//! - Slices come back in insertion order (stable input for tie-breaking)
//! - Product search is a case-insensitive literal substring match
//! - Store schema version is checked on open

use crate::query::TradeQuery;
use crate::record::{Product, TradeRecord};
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;

/// Schema version stored in `PRAGMA user_version`
pub const STORE_SCHEMA_VERSION: u32 = 2;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trade (
    year          INTEGER NOT NULL,
    exporter      TEXT    NOT NULL,
    importer      TEXT    NOT NULL,
    product_code  TEXT    NOT NULL,
    value_1000usd REAL    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trade_product_year ON trade (product_code, year);
CREATE TABLE IF NOT EXISTS products (
    product_code TEXT PRIMARY KEY,
    product_name TEXT NOT NULL,
    -- Unicode lowercase of product_name; SQLite lower() folds ASCII only
    name_folded  TEXT NOT NULL
);
";

/// Queryable source of trade records and the product catalogue
pub trait TradeSource {
    /// Products whose name contains `term` (case-insensitive), ordered by code
    fn search_products(&self, term: &str) -> Result<Vec<Product>>;

    /// All records matching `query`, in source order
    fn load_slice(&self, query: &TradeQuery) -> Result<Vec<TradeRecord>>;
}

/// SQLite-backed trade table
pub struct TradeStore {
    conn: Connection,
}

impl TradeStore {
    /// Open (or create) a store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory: {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open trade database: {}", path.display()))?;
        Self::init(conn)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create trade schema")?;

        let version: u32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("failed to read store schema version")?;
        if version == 0 {
            conn.pragma_update(None, "user_version", STORE_SCHEMA_VERSION)
                .context("failed to write store schema version")?;
        } else if version != STORE_SCHEMA_VERSION {
            anyhow::bail!(
                "trade store schema version mismatch: expected {}, got {}",
                STORE_SCHEMA_VERSION,
                version
            );
        }

        Ok(TradeStore { conn })
    }

    /// Underlying connection, for read-only reporting queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Append records in a single transaction; returns the number inserted
    pub fn insert_records(&mut self, records: &[TradeRecord]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .context("failed to begin insert transaction")?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO trade (year, exporter, importer, product_code, value_1000usd)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for r in records {
                stmt.execute(params![r.year, r.exporter, r.importer, r.product_code, r.value])
                    .context("failed to insert trade record")?;
            }
        }
        tx.commit().context("failed to commit trade records")?;
        Ok(records.len())
    }

    /// Insert or rename products; returns the number written
    pub fn upsert_products(&mut self, products: &[Product]) -> Result<usize> {
        let tx = self
            .conn
            .transaction()
            .context("failed to begin product transaction")?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO products (product_code, product_name, name_folded) VALUES (?1, ?2, ?3)
                 ON CONFLICT(product_code) DO UPDATE SET
                     product_name = excluded.product_name,
                     name_folded = excluded.name_folded",
            )?;
            for p in products {
                stmt.execute(params![
                    p.product_code,
                    p.product_name,
                    p.product_name.to_lowercase()
                ])
                    .context("failed to upsert product")?;
            }
        }
        tx.commit().context("failed to commit products")?;
        Ok(products.len())
    }

    /// Remove every trade record (products are kept)
    pub fn clear_trade(&self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM trade", [])
            .context("failed to clear trade table")?;
        Ok(removed)
    }

    pub fn record_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM trade", [], |row| row.get(0))
            .context("failed to count trade records")?;
        Ok(count as usize)
    }

    pub fn product_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))
            .context("failed to count products")?;
        Ok(count as usize)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<TradeRecord> {
    Ok(TradeRecord {
        year: row.get(0)?,
        exporter: row.get(1)?,
        importer: row.get(2)?,
        product_code: row.get(3)?,
        value: row.get(4)?,
    })
}

impl TradeSource for TradeStore {
    fn search_products(&self, term: &str) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT product_code, product_name FROM products
             WHERE instr(name_folded, ?1) > 0
             ORDER BY product_code",
        )?;
        let rows = stmt.query_map([term.to_lowercase()], |row| {
            Ok(Product {
                product_code: row.get(0)?,
                product_name: row.get(1)?,
            })
        })?;
        let products = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to search products")?;
        Ok(products)
    }

    fn load_slice(&self, query: &TradeQuery) -> Result<Vec<TradeRecord>> {
        let codes = query.product_codes();
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        // ?1 and ?2 are the year bounds; product codes follow
        let placeholders = (0..codes.len())
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT year, exporter, importer, product_code, value_1000usd FROM trade
             WHERE year BETWEEN ?1 AND ?2 AND product_code IN ({})
             ORDER BY rowid",
            placeholders
        );

        let mut values = vec![
            Value::Integer(i64::from(query.years.start)),
            Value::Integer(i64::from(query.years.end)),
        ];
        values.extend(codes.iter().cloned().map(Value::Text));

        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("failed to prepare slice query")?;
        let rows = stmt.query_map(params_from_iter(values.iter()), record_from_row)?;
        let records = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to load trade slice")?;

        tracing::debug!(
            products = codes.len(),
            start = query.years.start,
            end = query.years.end,
            rows = records.len(),
            "loaded trade slice"
        );
        Ok(records)
    }
}

/// In-memory trade table
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<TradeRecord>,
    products: Vec<Product>,
}

impl MemoryStore {
    pub fn new(records: Vec<TradeRecord>, products: Vec<Product>) -> Self {
        MemoryStore { records, products }
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }
}

impl TradeSource for MemoryStore {
    fn search_products(&self, term: &str) -> Result<Vec<Product>> {
        let mut matches: Vec<Product> = self
            .products
            .iter()
            .filter(|p| p.matches(term))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.product_code.cmp(&b.product_code));
        matches.dedup_by(|a, b| a.product_code == b.product_code);
        Ok(matches)
    }

    fn load_slice(&self, query: &TradeQuery) -> Result<Vec<TradeRecord>> {
        Ok(query.apply(&self.records))
    }
}
