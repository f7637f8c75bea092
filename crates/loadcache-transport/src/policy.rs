//! Revalidation policies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error type for parsing a cache policy
#[derive(Debug, Clone)]
pub struct ParseCachePolicyError(String);

impl fmt::Display for ParseCachePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid cache policy: {}", self.0)
    }
}

impl std::error::Error for ParseCachePolicyError {}

/// Revalidation policy governing whether a cached resource must be re-fetched
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Only serve from cache, never touch the network
    CacheOnly,
    /// Use a cached copy whenever one exists, even if stale
    Cache,
    /// Re-fetch expired entries, reuse fresh ones
    #[default]
    Verify,
    /// Revalidate every entry with the origin
    Refresh,
    /// Unconditionally re-fetch
    Reload,
}

impl CachePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePolicy::CacheOnly => "cacheonly",
            CachePolicy::Cache => "cache",
            CachePolicy::Verify => "verify",
            CachePolicy::Refresh => "refresh",
            CachePolicy::Reload => "reload",
        }
    }

    /// `Cache-Control` request directive for this policy, if any
    pub fn request_directive(&self) -> Option<&'static str> {
        match self {
            CachePolicy::CacheOnly => Some("only-if-cached"),
            CachePolicy::Cache => Some("max-stale"),
            CachePolicy::Verify => None,
            CachePolicy::Refresh => Some("max-age=0"),
            CachePolicy::Reload => Some("no-cache"),
        }
    }

    /// Whether every non-preloaded entry must be re-fetched once per session
    pub fn forces_reload(&self) -> bool {
        matches!(self, CachePolicy::Refresh | CachePolicy::Reload)
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePolicy {
    type Err = ParseCachePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cacheonly" | "cache-only" => Ok(CachePolicy::CacheOnly),
            "cache" => Ok(CachePolicy::Cache),
            "verify" => Ok(CachePolicy::Verify),
            "refresh" => Ok(CachePolicy::Refresh),
            "reload" => Ok(CachePolicy::Reload),
            _ => Err(ParseCachePolicyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy() {
        assert_eq!("verify".parse::<CachePolicy>().unwrap(), CachePolicy::Verify);
        assert_eq!("Reload".parse::<CachePolicy>().unwrap(), CachePolicy::Reload);
        assert_eq!("cache-only".parse::<CachePolicy>().unwrap(), CachePolicy::CacheOnly);
        assert!("sometimes".parse::<CachePolicy>().is_err());
    }

    #[test]
    fn test_forces_reload() {
        assert!(CachePolicy::Reload.forces_reload());
        assert!(CachePolicy::Refresh.forces_reload());
        assert!(!CachePolicy::Verify.forces_reload());
        assert!(!CachePolicy::Cache.forces_reload());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&CachePolicy::Refresh).unwrap();
        assert_eq!(json, "\"refresh\"");
        let parsed: CachePolicy = serde_json::from_str("\"verify\"").unwrap();
        assert_eq!(parsed, CachePolicy::Verify);
    }
}
