//! Session cache of loaded slices and their metrics.
//!
//! Key: `SliceKey { query, reference_market }`. Product codes inside the query
//! are sorted, so two searches resolving to the same products share an entry.
//!
//! **Eviction:** at most `MAX_CACHED_SLICES` entries are kept; the oldest
//! insertion goes first. A cache belongs to one `Analyzer` and is never shared
//! between sessions.

use crate::metrics::{compute_metrics, TradeMetrics};
use crate::query::TradeQuery;
use crate::record::TradeRecord;
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Maximum number of slices retained.
pub const MAX_CACHED_SLICES: usize = 32;

/// Identity of a cached slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SliceKey {
    pub query: TradeQuery,
    pub reference_market: String,
}

impl SliceKey {
    pub fn new(query: TradeQuery, reference_market: impl Into<String>) -> Self {
        SliceKey {
            query,
            reference_market: reference_market.into(),
        }
    }
}

/// A loaded slice with its metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSlice {
    pub records: Vec<TradeRecord>,
    pub metrics: TradeMetrics,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub struct AnalysisCache {
    entries: HashMap<SliceKey, Arc<CachedSlice>>,
    order: VecDeque<SliceKey>,
    hits: u64,
    misses: u64,
}

impl AnalysisCache {
    pub fn new() -> Self {
        AnalysisCache::default()
    }

    /// Return the cached slice for `key`, loading and measuring it on a miss.
    ///
    /// A failing `load` leaves the cache untouched.
    pub fn get_or_load<F>(&mut self, key: &SliceKey, load: F) -> Result<Arc<CachedSlice>>
    where
        F: FnOnce(&TradeQuery) -> Result<Vec<TradeRecord>>,
    {
        if let Some(hit) = self.entries.get(key) {
            self.hits += 1;
            tracing::debug!(market = %key.reference_market, "slice cache hit");
            return Ok(Arc::clone(hit));
        }

        self.misses += 1;
        tracing::debug!(market = %key.reference_market, "slice cache miss");
        let records = load(&key.query)?;
        let metrics = compute_metrics(&records, &key.reference_market);
        let slice = Arc::new(CachedSlice { records, metrics });

        if self.order.len() >= MAX_CACHED_SLICES {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key.clone(), Arc::clone(&slice));
        Ok(slice)
    }

    /// Drop one entry; returns true if it was present.
    pub fn invalidate(&mut self, key: &SliceKey) -> bool {
        self.order.retain(|k| k != key);
        self.entries.remove(key).is_some()
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }
}
