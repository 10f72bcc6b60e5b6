//! CSV ingestion into the trade store
//!
//! Two layouts are supported:
//! - BACI raw release: country codes, product codes and one file per year
//! - Normalized tables: `year,exporter,importer,product_code,value_1000usd`
//!   and `product_code,product_name`
//!
//! Product codes are always read as text so leading zeros survive.

use crate::record::{Product, TradeRecord};
use crate::store::TradeStore;
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

pub const DEFAULT_RELEASE: &str = "V202501";
pub const DEFAULT_CLASSIFICATION: &str = "HS92";

/// File naming for one BACI release directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaciLayout {
    pub dir: PathBuf,
    pub classification: String,
    pub release: String,
}

impl BaciLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        BaciLayout {
            dir: dir.into(),
            classification: DEFAULT_CLASSIFICATION.to_string(),
            release: DEFAULT_RELEASE.to_string(),
        }
    }

    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = release.into();
        self
    }

    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = classification.into();
        self
    }

    pub fn country_codes_path(&self) -> PathBuf {
        self.dir.join(format!("country_codes_{}.csv", self.release))
    }

    pub fn product_codes_path(&self) -> PathBuf {
        self.dir.join(format!(
            "product_codes_{}_{}.csv",
            self.classification, self.release
        ))
    }

    pub fn year_path(&self, year: i32) -> PathBuf {
        self.dir.join(format!(
            "BACI_{}_Y{}_{}.csv",
            self.classification, year, self.release
        ))
    }
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open CSV: {}", path.display()))
}

/// Numeric BACI country code to country name
#[derive(Debug, Clone, Default)]
pub struct CountryMap {
    names: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CountryRow {
    country_code: String,
    country_name: String,
}

impl CountryMap {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv_reader(path)?;
        let mut names = HashMap::new();
        for (idx, row) in reader.deserialize::<CountryRow>().enumerate() {
            let row = row.with_context(|| {
                format!("{}: bad country row at line {}", path.display(), idx + 2)
            })?;
            names.insert(row.country_code, row.country_name);
        }
        Ok(CountryMap { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for CountryMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        CountryMap {
            names: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BaciProductRow {
    code: String,
    description: String,
}

/// Read the BACI product catalogue (`code,description`)
pub fn load_baci_products(path: &Path) -> Result<Vec<Product>> {
    let mut reader = csv_reader(path)?;
    let mut products = Vec::new();
    for (idx, row) in reader.deserialize::<BaciProductRow>().enumerate() {
        let row = row.with_context(|| {
            format!("{}: bad product row at line {}", path.display(), idx + 2)
        })?;
        products.push(Product::new(row.code, row.description));
    }
    Ok(products)
}

#[derive(Debug, Deserialize)]
struct BaciTradeRow {
    i: String,
    j: String,
    k: String,
    v: f64,
}

/// Records parsed from one yearly BACI file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedYear {
    pub records: Vec<TradeRecord>,
    /// Country codes with no entry in the country map
    pub unmapped_codes: BTreeSet<String>,
}

/// Parse a yearly BACI file, stamping every row with `year`.
///
/// Unmapped country codes keep their numeric text.
pub fn parse_baci_year(path: &Path, year: i32, countries: &CountryMap) -> Result<ParsedYear> {
    let mut reader = csv_reader(path)?;
    let mut records = Vec::new();
    let mut unmapped_codes = BTreeSet::new();

    let resolve = |code: String, unmapped: &mut BTreeSet<String>| match countries.name(&code) {
        Some(name) => name.to_string(),
        None => {
            unmapped.insert(code.clone());
            code
        }
    };

    for (idx, row) in reader.deserialize::<BaciTradeRow>().enumerate() {
        let row = row
            .with_context(|| format!("{}: bad trade row at line {}", path.display(), idx + 2))?;
        let exporter = resolve(row.i, &mut unmapped_codes);
        let importer = resolve(row.j, &mut unmapped_codes);
        records.push(TradeRecord {
            year,
            exporter,
            importer,
            product_code: row.k,
            value: row.v,
        });
    }

    Ok(ParsedYear {
        records,
        unmapped_codes,
    })
}

/// Per-year result reported to the progress callback
#[derive(Debug, Clone, PartialEq)]
pub struct YearReport {
    pub year: i32,
    pub file: PathBuf,
    pub outcome: YearOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum YearOutcome {
    Loaded { rows: usize },
    Failed { error: String },
}

/// Totals for a BACI import
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaciImport {
    pub countries: usize,
    pub products: usize,
    pub rows: usize,
    pub years_loaded: Vec<i32>,
    pub years_failed: Vec<i32>,
    pub unmapped_codes: BTreeSet<String>,
}

/// Import a BACI release into `store`.
///
/// Country and product catalogues must load; a yearly file that fails to
/// parse is logged, reported through `progress` and skipped. Years are
/// parsed in parallel and inserted in ascending order.
pub fn import_baci<F>(
    store: &mut TradeStore,
    layout: &BaciLayout,
    years: RangeInclusive<i32>,
    mut progress: F,
) -> Result<BaciImport>
where
    F: FnMut(&YearReport),
{
    let countries = CountryMap::load(&layout.country_codes_path())
        .context("failed to load country codes")?;
    tracing::info!(countries = countries.len(), "loaded country map");

    let products = load_baci_products(&layout.product_codes_path())
        .context("failed to load product codes")?;
    store.upsert_products(&products)?;

    let parsed: Vec<(i32, Result<ParsedYear>)> = years
        .into_par_iter()
        .map(|year| (year, parse_baci_year(&layout.year_path(year), year, &countries)))
        .collect();

    let mut summary = BaciImport {
        countries: countries.len(),
        products: products.len(),
        ..BaciImport::default()
    };

    for (year, result) in parsed {
        let file = layout.year_path(year);
        let outcome = match result {
            Ok(parsed) => {
                let rows = store
                    .insert_records(&parsed.records)
                    .with_context(|| format!("failed to store trade rows for {}", year))?;
                summary.rows += rows;
                summary.years_loaded.push(year);
                summary.unmapped_codes.extend(parsed.unmapped_codes);
                tracing::debug!(year, rows, "imported year");
                YearOutcome::Loaded { rows }
            }
            Err(e) => {
                tracing::warn!(year, file = %file.display(), "skipping year: {:#}", e);
                summary.years_failed.push(year);
                YearOutcome::Failed {
                    error: format!("{:#}", e),
                }
            }
        };
        progress(&YearReport {
            year,
            file,
            outcome,
        });
    }

    if !summary.unmapped_codes.is_empty() {
        tracing::warn!(
            count = summary.unmapped_codes.len(),
            "country codes without a name were kept as numeric text"
        );
    }

    Ok(summary)
}

/// Read a normalized trade table
pub fn read_trade_csv(path: &Path) -> Result<Vec<TradeRecord>> {
    let mut reader = csv_reader(path)?;
    let mut records = Vec::new();
    for (idx, row) in reader.deserialize::<TradeRecord>().enumerate() {
        let record = row
            .with_context(|| format!("{}: bad trade row at line {}", path.display(), idx + 2))?;
        records.push(record);
    }
    Ok(records)
}

/// Read a normalized product table
pub fn read_products_csv(path: &Path) -> Result<Vec<Product>> {
    let mut reader = csv_reader(path)?;
    let mut products = Vec::new();
    for (idx, row) in reader.deserialize::<Product>().enumerate() {
        let product = row
            .with_context(|| format!("{}: bad product row at line {}", path.display(), idx + 2))?;
        products.push(product);
    }
    Ok(products)
}

/// Counts from a normalized import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvImport {
    pub rows: usize,
    pub products: usize,
}

/// Import normalized tables into `store`
pub fn import_csv(
    store: &mut TradeStore,
    records_path: &Path,
    products_path: Option<&Path>,
) -> Result<CsvImport> {
    let records = read_trade_csv(records_path)?;
    let rows = store.insert_records(&records)?;

    let products = match products_path {
        Some(path) => {
            let products = read_products_csv(path)?;
            store.upsert_products(&products)?
        }
        None => 0,
    };

    tracing::info!(rows, products, "imported normalized tables");
    Ok(CsvImport { rows, products })
}
