//! Cache configuration

use loadcache_transport::CachePolicy;
use serde::{Deserialize, Serialize};

/// Default memory budget, 2096 KiB
pub const DEFAULT_CACHE_SIZE: usize = 2096 * 1024;

/// Configuration for the resource cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memory budget for unreferenced resources, in bytes
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Revalidation policy for new document loaders
    #[serde(default)]
    pub default_policy: CachePolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            default_policy: CachePolicy::default(),
        }
    }
}

fn default_max_size() -> usize {
    DEFAULT_CACHE_SIZE
}
