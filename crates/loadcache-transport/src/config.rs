//! Transport configuration

use serde::{Deserialize, Serialize};

/// Settings shared by the network fetchers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-request timeout, 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub skip_tls_verify: bool,
    /// Jobs allowed to run at once; further jobs wait in priority order
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            skip_tls_verify: false,
            max_concurrent: default_max_concurrent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("loadcache/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    6
}
