//! Cache statistics

use serde::Serialize;

use crate::resource::ResourceKind;

/// Snapshot of the registry for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub entries: usize,
    pub stylesheets: usize,
    pub scripts: usize,
    pub images: usize,
    pub audio: usize,
    pub fonts: usize,
    /// Sum of the sizes of all registered entries
    pub total_size: usize,
    /// Bytes held by unreferenced entries, the part subject to eviction
    pub ledger_size: usize,
    pub ledger_entries: usize,
    /// Removed entries still referenced by a client
    pub detached: usize,
    pub outstanding_requests: usize,
    pub max_size: usize,
}

impl CacheStatistics {
    pub(crate) fn record(&mut self, kind: ResourceKind, size: usize) {
        self.entries += 1;
        self.total_size += size;
        match kind {
            ResourceKind::Stylesheet => self.stylesheets += 1,
            ResourceKind::Script => self.scripts += 1,
            ResourceKind::Image => self.images += 1,
            ResourceKind::Audio => self.audio += 1,
            ResourceKind::Font => self.fonts += 1,
        }
    }

    /// Share of the budget used by the ledger, in percent
    pub fn ledger_usage_percent(&self) -> f64 {
        if self.max_size == 0 {
            return 0.0;
        }
        self.ledger_size as f64 / self.max_size as f64 * 100.0
    }
}
