//! Ambient engine settings — distinct from the business `Configuration`
//! (rules/enrichments/datasets, see `config` module). Grounded on the
//! lineage's `src-tauri/src/config.rs`: load an optional TOML file, then
//! apply environment-variable overrides on top.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheScopeSettings {
    pub ttl_seconds: u64,
    pub max_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    pub dataset: CacheScopeSettings,
    pub lookup_result: CacheScopeSettings,
    pub expression: CacheScopeSettings,
    pub service_registry: CacheScopeSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            dataset: CacheScopeSettings { ttl_seconds: 2 * 3600, max_size: 1_000 },
            lookup_result: CacheScopeSettings { ttl_seconds: 5 * 60, max_size: 10_000 },
            expression: CacheScopeSettings { ttl_seconds: 24 * 3600, max_size: 1_000 },
            service_registry: CacheScopeSettings { ttl_seconds: 24 * 3600, max_size: 500 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApexSettings {
    pub cache: CacheSettings,
    /// Bounded worker pool size for parallel rule-group execution (§4.5).
    pub max_rule_workers: usize,
    pub debug_mode: bool,
}

impl Default for ApexSettings {
    fn default() -> Self {
        ApexSettings {
            cache: CacheSettings::default(),
            max_rule_workers: 8,
            debug_mode: false,
        }
    }
}

impl ApexSettings {
    /// Loads `apex.toml` from the current directory if present, then
    /// applies environment overrides. Works with zero configuration —
    /// `ApexSettings::default()` reproduces the cache defaults exactly.
    pub fn load() -> Self {
        let mut settings = Self::load_from_file().unwrap_or_else(|reason| {
            tracing::debug!(%reason, "apex.toml not found or unreadable, using defaults");
            ApexSettings::default()
        });
        settings.apply_env_overrides();
        settings
    }

    fn load_from_file() -> Result<Self, String> {
        let path = Path::new("apex.toml");
        if !path.exists() {
            return Err("apex.toml not found".to_string());
        }
        let content = fs::read_to_string(path).map_err(|e| format!("failed to read apex.toml: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse apex.toml: {e}"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("APEX_CACHE_DATASET_TTL_SECS") {
            if let Ok(secs) = v.parse() {
                self.cache.dataset.ttl_seconds = secs;
            }
        }
        if let Ok(v) = env::var("APEX_CACHE_LOOKUP_RESULT_TTL_SECS") {
            if let Ok(secs) = v.parse() {
                self.cache.lookup_result.ttl_seconds = secs;
            }
        }
        if let Ok(v) = env::var("APEX_CACHE_EXPRESSION_TTL_SECS") {
            if let Ok(secs) = v.parse() {
                self.cache.expression.ttl_seconds = secs;
            }
        }
        if let Ok(v) = env::var("APEX_CACHE_SERVICE_REGISTRY_TTL_SECS") {
            if let Ok(secs) = v.parse() {
                self.cache.service_registry.ttl_seconds = secs;
            }
        }
        if let Ok(v) = env::var("APEX_MAX_RULE_WORKERS") {
            if let Ok(workers) = v.parse() {
                self.max_rule_workers = workers;
            }
        }
        if let Ok(v) = env::var("APEX_DEBUG") {
            self.debug_mode = v.to_lowercase() == "true" || v == "1";
        }
    }
}
