//! The unified cache (spec §4.6): four named scopes, each with its own TTL
//! and max size, plus a process-wide singleton handle that tests can reset
//! (spec §4.6 "Singleton access", §9 "Global mutable state").

pub mod lru;

pub use lru::{CacheStatistics, ScopedCache};

use crate::expr::Expression;
use crate::lookup::LookupService;
use crate::settings::ApexSettings;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Dataset,
    LookupResult,
    Expression,
    ServiceRegistry,
}

/// Four independently-scoped caches (spec §4.6 table), each holding the
/// concrete value type its scope deals in — `DatasetLookupService`
/// instances, raw lookup rows, compiled expression trees, and registered
/// named services.
pub struct CacheManager {
    dataset: ScopedCache<Arc<dyn LookupService>>,
    lookup_result: ScopedCache<Value>,
    expression: ScopedCache<Arc<Expression>>,
    service_registry: ScopedCache<Arc<dyn LookupService>>,
}

impl CacheManager {
    pub fn new(settings: &ApexSettings) -> Self {
        CacheManager {
            dataset: ScopedCache::new(
                settings.cache.dataset.max_size,
                Duration::from_secs(settings.cache.dataset.ttl_seconds),
            ),
            lookup_result: ScopedCache::new(
                settings.cache.lookup_result.max_size,
                Duration::from_secs(settings.cache.lookup_result.ttl_seconds),
            ),
            expression: ScopedCache::new(
                settings.cache.expression.max_size,
                Duration::from_secs(settings.cache.expression.ttl_seconds),
            ),
            service_registry: ScopedCache::new(
                settings.cache.service_registry.max_size,
                Duration::from_secs(settings.cache.service_registry.ttl_seconds),
            ),
        }
    }

    /// Lazily-initialized process-wide handle (spec §4.6 "Singleton access").
    pub fn global() -> Arc<CacheManager> {
        global_slot()
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Replaces the singleton with a fresh instance so tests are isolated
    /// from one another (spec §9 "Global mutable state").
    pub fn reset_for_tests() {
        let mut guard = global_slot().write().unwrap_or_else(|p| p.into_inner());
        *guard = Arc::new(CacheManager::new(&ApexSettings::default()));
    }

    pub fn dataset_get(&self, key: &str) -> Option<Arc<dyn LookupService>> {
        self.dataset.get(key)
    }

    pub fn dataset_put(&self, key: impl Into<String>, value: Arc<dyn LookupService>, ttl: Option<Duration>) {
        self.dataset.put(key, value, ttl);
    }

    pub fn lookup_result_get(&self, key: &str) -> Option<Value> {
        self.lookup_result.get(key)
    }

    pub fn lookup_result_put(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        self.lookup_result.put(key, value, ttl);
    }

    pub fn expression_get(&self, key: &str) -> Option<Arc<Expression>> {
        self.expression.get(key)
    }

    pub fn expression_put(&self, key: impl Into<String>, value: Arc<Expression>, ttl: Option<Duration>) {
        self.expression.put(key, value, ttl);
    }

    pub fn service_registry_get(&self, key: &str) -> Option<Arc<dyn LookupService>> {
        self.service_registry.get(key)
    }

    pub fn service_registry_put(&self, key: impl Into<String>, value: Arc<dyn LookupService>, ttl: Option<Duration>) {
        self.service_registry.put(key, value, ttl);
    }

    pub fn statistics(&self, scope: CacheScope) -> CacheStatistics {
        match scope {
            CacheScope::Dataset => self.dataset.statistics(),
            CacheScope::LookupResult => self.lookup_result.statistics(),
            CacheScope::Expression => self.expression.statistics(),
            CacheScope::ServiceRegistry => self.service_registry.statistics(),
        }
    }

    /// `getAllStatistics()` (spec §4.6).
    pub fn all_statistics(&self) -> HashMap<CacheScope, CacheStatistics> {
        let mut stats = HashMap::with_capacity(4);
        stats.insert(CacheScope::Dataset, self.dataset.statistics());
        stats.insert(CacheScope::LookupResult, self.lookup_result.statistics());
        stats.insert(CacheScope::Expression, self.expression.statistics());
        stats.insert(CacheScope::ServiceRegistry, self.service_registry.statistics());
        stats
    }

    pub fn size(&self, scope: CacheScope) -> usize {
        match scope {
            CacheScope::Dataset => self.dataset.size(),
            CacheScope::LookupResult => self.lookup_result.size(),
            CacheScope::Expression => self.expression.size(),
            CacheScope::ServiceRegistry => self.service_registry.size(),
        }
    }

    pub fn clear(&self, scope: CacheScope) {
        match scope {
            CacheScope::Dataset => self.dataset.clear(),
            CacheScope::LookupResult => self.lookup_result.clear(),
            CacheScope::Expression => self.expression.clear(),
            CacheScope::ServiceRegistry => self.service_registry.clear(),
        }
    }

    /// `clearAll()` — does not reset statistics (spec §4.6 invariant).
    pub fn clear_all(&self) {
        self.dataset.clear();
        self.lookup_result.clear();
        self.expression.clear();
        self.service_registry.clear();
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        CacheManager::new(&ApexSettings::default())
    }
}

fn global_slot() -> &'static RwLock<Arc<CacheManager>> {
    static GLOBAL: OnceLock<RwLock<Arc<CacheManager>>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(Arc::new(CacheManager::default())))
}
