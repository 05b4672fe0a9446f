//! Unified cache coverage at the public-API level (spec §4.6, §8 seed test
//! 2 "Dataset dedup").

use apex_core::cache::{CacheManager, CacheScope};
use apex_core::config::LookupDataset;
use apex_core::lookup::resolve_dataset_service;
use apex_core::settings::ApexSettings;
use apex_core::value::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn currency_rows() -> Vec<HashMap<String, serde_json::Value>> {
    let mut usd = HashMap::new();
    usd.insert("code".to_string(), serde_json::json!("USD"));
    usd.insert("name".to_string(), serde_json::json!("US Dollar"));
    let mut eur = HashMap::new();
    eur.insert("code".to_string(), serde_json::json!("EUR"));
    eur.insert("name".to_string(), serde_json::json!("Euro"));
    vec![usd, eur]
}

#[test]
fn dataset_cache_deduplicates_identical_descriptors_across_the_cache_lifetime() {
    let cache = Arc::new(CacheManager::new(&ApexSettings::default()));
    let dataset_a = LookupDataset::Inline { data: currency_rows(), key_field: "code".to_string() };
    let dataset_b = LookupDataset::Inline { data: currency_rows(), key_field: "code".to_string() };

    let service_a = resolve_dataset_service(&dataset_a, &cache).unwrap();
    let service_b = resolve_dataset_service(&dataset_b, &cache).unwrap();

    assert!(Arc::ptr_eq(&service_a, &service_b));
    assert_eq!(cache.size(CacheScope::Dataset), 1);

    let stats = cache.statistics(CacheScope::Dataset);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn get_after_ttl_elapses_returns_absence_not_the_stale_value() {
    let cache = CacheManager::default();
    cache.lookup_result_put("svc:USD", Value::String("cached".to_string()), Some(Duration::from_millis(1)));
    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(cache.lookup_result_get("svc:USD"), None);
}

#[test]
fn lru_scope_evicts_oldest_entry_on_overflow() {
    let settings = ApexSettings {
        cache: apex_core::settings::CacheSettings {
            lookup_result: apex_core::settings::CacheScopeSettings { ttl_seconds: 300, max_size: 2 },
            ..ApexSettings::default().cache
        },
        ..ApexSettings::default()
    };
    let cache = CacheManager::new(&settings);
    cache.lookup_result_put("a", Value::Integer(1), None);
    cache.lookup_result_put("b", Value::Integer(2), None);
    cache.lookup_result_put("c", Value::Integer(3), None);

    assert_eq!(cache.lookup_result_get("a"), None);
    assert!(cache.lookup_result_get("c").is_some());
    assert_eq!(cache.statistics(CacheScope::LookupResult).evictions, 1);
}

#[test]
fn all_statistics_covers_every_scope_independently() {
    let cache = CacheManager::default();
    cache.lookup_result_put("k", Value::Integer(1), None);
    let _ = cache.lookup_result_get("k");
    let _ = cache.dataset_get("missing");

    let all = cache.all_statistics();
    assert_eq!(all.get(&CacheScope::LookupResult).unwrap().hits, 1);
    assert_eq!(all.get(&CacheScope::Dataset).unwrap().misses, 1);
    assert_eq!(all.get(&CacheScope::Expression).unwrap().hits, 0);
}

#[test]
fn clear_all_empties_every_scope_but_statistics_survive() {
    let cache = CacheManager::default();
    cache.lookup_result_put("k", Value::Integer(1), None);
    let _ = cache.lookup_result_get("k");
    cache.clear_all();

    assert_eq!(cache.size(CacheScope::LookupResult), 0);
    assert_eq!(cache.statistics(CacheScope::LookupResult).hits, 1);
}
