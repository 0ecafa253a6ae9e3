//! Session-owned cache of reference data.

use chrono::{DateTime, Duration, Utc};

use collo_allocation::{HistoricalAllocation, OrderLine};

/// Order lines and historical allocations of one destination, as last fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSet {
    pub order_lines: Vec<OrderLine>,
    pub historical: Vec<HistoricalAllocation>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: ReferenceSet,
    cached_at: DateTime<Utc>,
}

/// Explicit `get/set/clear` cache, with optional staleness bound.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCache {
    entry: Option<Entry>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached reference data, unless older than `max_age`.
    pub fn get(&self, max_age: Option<Duration>) -> Option<&ReferenceSet> {
        self.get_at(max_age, Utc::now())
    }

    fn get_at(&self, max_age: Option<Duration>, now: DateTime<Utc>) -> Option<&ReferenceSet> {
        let entry = self.entry.as_ref()?;
        if let Some(max_age) = max_age {
            if now - entry.cached_at > max_age {
                return None;
            }
        }
        Some(&entry.value)
    }

    pub fn set(&mut self, value: ReferenceSet) {
        self.entry = Some(Entry {
            value,
            cached_at: Utc::now(),
        });
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }

    pub fn cached_at(&self) -> Option<DateTime<Utc>> {
        self.entry.as_ref().map(|e| e.cached_at)
    }
}
