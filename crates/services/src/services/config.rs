use std::{str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Runtime settings of the conversion service, read from the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Overpass API interpreter endpoint
    pub overpass_url: String,
    /// Server-side timeout sent with every Overpass query
    pub overpass_query_timeout_secs: u64,
    /// Upper bound for any single collaborator call
    pub adapter_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub cache_sweep_interval_secs: u64,
    /// Largest accepted upload body
    pub max_upload_bytes: usize,
    /// Search depth of the route deriver, in edges
    pub route_max_edges: usize,
    pub default_author: String,
    pub default_organisation: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            overpass_query_timeout_secs: 25,
            adapter_timeout_secs: 60,
            cache_ttl_secs: 3600,
            cache_max_entries: 64,
            cache_sweep_interval_secs: 60,
            max_upload_bytes: 32 * 1024 * 1024,
            route_max_edges: 32,
            default_author: String::new(),
            default_organisation: String::new(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

impl ConversionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            overpass_url: env_or("OVERPASS_URL", defaults.overpass_url),
            overpass_query_timeout_secs: env_or(
                "OVERPASS_QUERY_TIMEOUT_SECS",
                defaults.overpass_query_timeout_secs,
            ),
            adapter_timeout_secs: env_or("ADAPTER_TIMEOUT_SECS", defaults.adapter_timeout_secs),
            cache_ttl_secs: env_or("TOPOLOGY_CACHE_TTL_SECS", defaults.cache_ttl_secs),
            cache_max_entries: env_or("TOPOLOGY_CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            cache_sweep_interval_secs: env_or(
                "TOPOLOGY_CACHE_SWEEP_SECS",
                defaults.cache_sweep_interval_secs,
            ),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            route_max_edges: env_or("ROUTE_MAX_EDGES", defaults.route_max_edges),
            default_author: env_or("EXPORT_AUTHOR", defaults.default_author),
            default_organisation: env_or("EXPORT_ORGANISATION", defaults.default_organisation),
        }
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::default();
        assert_eq!(config.overpass_url, DEFAULT_OVERPASS_URL);
        assert_eq!(config.adapter_timeout(), Duration::from_secs(60));
        assert_eq!(config.cache_max_entries, 64);
        assert_eq!(config.max_upload_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        // unique key so parallel tests do not interfere
        let key = "CONVERSION_CONFIG_TEST_GARBAGE";
        unsafe { std::env::set_var(key, "not-a-number") };
        assert_eq!(env_or(key, 7u64), 7);
        unsafe { std::env::set_var(key, " 12 ") };
        assert_eq!(env_or(key, 7u64), 12);
        unsafe { std::env::remove_var(key) };
    }
}
