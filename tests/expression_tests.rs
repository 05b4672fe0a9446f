//! End-to-end expression-engine coverage (spec §4.1, §8 seed test 6):
//! exercised through the public `apex_core::expr` surface rather than the
//! crate-internal unit tests already covering individual operators.

use apex_core::cache::{CacheManager, CacheScope};
use apex_core::expr::{compile, evaluate, EvaluationContext, EvaluationStage};
use apex_core::settings::ApexSettings;
use apex_core::value::{Record, Value};

#[test]
fn expression_cache_hits_on_repeated_compilation() {
    let cache = CacheManager::new(&ApexSettings::default());
    for _ in 0..100 {
        compile("#amount * 2", &cache).unwrap();
    }
    let stats = cache.statistics(CacheScope::Expression);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 99);
}

#[test]
fn safe_navigation_chain_tolerates_missing_nested_records() {
    let cache = CacheManager::new(&ApexSettings::default());
    let record = Record::new();
    let expr = compile("customer?.address?.city", &cache).unwrap();
    let ctx = EvaluationContext::new(&record, EvaluationStage::Enrichment);
    assert_eq!(evaluate(&expr, &ctx).unwrap(), Value::Null);
}

#[test]
fn ternary_over_list_and_string_methods_composes() {
    let cache = CacheManager::new(&ApexSettings::default());
    let mut record = Record::new();
    record.insert("tags".to_string(), Value::List(vec![Value::String("vip".to_string())]));
    let expr = compile("tags.contains('vip') ? 'VIP'.toLowerCase() : 'standard'", &cache).unwrap();
    let ctx = EvaluationContext::new(&record, EvaluationStage::Enrichment);
    assert_eq!(evaluate(&expr, &ctx).unwrap(), Value::String("vip".to_string()));
}

#[test]
fn parse_error_is_distinct_from_evaluation_error() {
    let cache = CacheManager::new(&ApexSettings::default());
    let err = compile("1 +", &cache).unwrap_err();
    assert!(matches!(err, apex_core::ApexError::Parse { .. }));

    let record = Record::new();
    let expr = compile("1 / 0", &cache).unwrap();
    let ctx = EvaluationContext::new(&record, EvaluationStage::Enrichment);
    let err = evaluate(&expr, &ctx).unwrap_err();
    assert!(matches!(err, apex_core::ApexError::Evaluation { .. }));
}

#[test]
fn repeated_evaluation_of_same_expression_and_context_is_deterministic() {
    let cache = CacheManager::new(&ApexSettings::default());
    let mut record = Record::new();
    record.insert("price".to_string(), Value::Float(19.99));
    record.insert("qty".to_string(), Value::Integer(3));
    let expr = compile("price * qty", &cache).unwrap();
    let ctx = EvaluationContext::new(&record, EvaluationStage::Enrichment);

    let first = evaluate(&expr, &ctx).unwrap();
    for _ in 0..10 {
        assert_eq!(evaluate(&expr, &ctx).unwrap(), first);
    }
}
