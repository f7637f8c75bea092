//! Loadcache core
//!
//! Shared in-memory resource cache for a document engine: one record per URL,
//! deduplicated fetches through a pluggable transport, frequency and size
//! aware eviction, and per-document loading contexts.

pub mod cache;
pub mod config;
pub mod decode;
pub mod doc_loader;
pub mod error;
pub mod loader;
pub mod resource;

#[cfg(test)]
pub(crate) mod test_utils;

pub use cache::{Cache, CacheStatistics, EvictionLedger, bucket_index};
pub use config::{CacheConfig, DEFAULT_CACHE_SIZE};
pub use decode::{AnimationPolicy, ImageRect, is_acceptable_css_mimetype, is_supported_mimetype};
pub use doc_loader::{DocLoader, DocLoaderId, DocumentSettings, PreloadCounts, PreloadStats};
pub use error::{CoreError, DecodeError, ResourceError};
pub use loader::{Loader, LoaderEvent};
pub use resource::{
    CachedResource, ParseResourceKindError, PreloadResult, ResourceClient, ResourceHandle,
    ResourceId, ResourceKind, Status,
};
