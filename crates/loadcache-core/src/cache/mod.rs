//! Cache registry and its eviction bookkeeping

pub mod ledger;
mod registry;
mod stats;

pub use ledger::{EvictionLedger, NUM_BUCKETS, bucket_index};
pub use registry::Cache;
pub(crate) use registry::CacheShared;
pub use stats::CacheStatistics;
