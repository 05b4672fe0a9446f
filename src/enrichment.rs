//! The enrichment pipeline (spec §4.4): priority-ordered dispatch of
//! lookup, calculation, field, and conditional-mapping enrichments, with
//! a rule pre-pass (§4.4 "Pre-pass") so enrichment conditions and
//! conditional-mapping rules can read prior rule outcomes via
//! `#ruleResults`/`#ruleGroupResults`.

use crate::cache::CacheManager;
use crate::config::{
    CalculationEnrichmentConfig, ConditionGroup, Configuration, Enrichment, EnrichmentConfig,
    FieldEnrichmentConfig, GroupOperator, LookupEnrichmentConfig, MappingRule, MappingRuleType,
    Severity, ConditionalMappingEnrichmentConfig,
};
use crate::error::{ApexError, ApexResult};
use crate::expr::{evaluate, EvaluationContext, EvaluationStage};
use crate::lookup::{apply_field_mappings, resolve_lookup_service, ServiceRegistry};
use crate::value::{Record, Value};
use std::collections::HashMap;
use std::time::Duration;

/// What the pipeline accumulates across every dispatched enrichment (spec
/// §4.4 "Failure aggregation").
pub struct EnrichmentOutcome {
    pub failure_messages: Vec<String>,
    pub severity: Severity,
}

#[derive(Default)]
struct StepOutcome {
    messages: Vec<String>,
    required_failures: Vec<String>,
}

/// Runs every enabled enrichment against `record` in priority order,
/// mutating it in place. Never aborts on a single enrichment's failure —
/// the orchestrator decides what a failure means for overall `success`
/// (spec §7 "never abort, always continue and return an aggregate").
pub fn run_pipeline(
    config: &Configuration,
    record: &mut Record,
    cache: &CacheManager,
    registry: &ServiceRegistry,
    max_rule_workers: usize,
) -> EnrichmentOutcome {
    let vars = rule_prepass_variables(config, record, cache, max_rule_workers);

    let mut failure_messages = Vec::new();
    let mut required_failure_seen = false;
    let mut max_processed_severity = Severity::Info;
    let mut any_processed = false;

    for enrichment in config.enrichments_by_priority() {
        let gate = match is_enabled(enrichment, record, &vars, cache) {
            Ok(gate) => gate,
            Err(err) => {
                tracing::warn!(enrichment = %enrichment.id, %err, "enrichment gating condition failed, skipping");
                failure_messages.push(format!(
                    "enrichment '{}' condition evaluation failed: {err}",
                    enrichment.id
                ));
                continue;
            }
        };
        if !gate {
            continue;
        }

        any_processed = true;
        max_processed_severity = max_processed_severity.max(enrichment.severity);

        tracing::debug!(enrichment = %enrichment.id, kind = ?enrichment.enrichment_type, "dispatching enrichment");

        let outcome = match enrichment.config() {
            Ok(cfg) => dispatch(enrichment, &cfg, record, cache, registry, &vars),
            Err(reason) => Err(ApexError::configuration(reason)),
        };

        match outcome {
            Ok(step) => {
                if !step.required_failures.is_empty() {
                    required_failure_seen = true;
                    for field in &step.required_failures {
                        let message = ApexError::RequiredFieldFailure {
                            enrichment_id: enrichment.id.clone(),
                            field: field.clone(),
                        }
                        .to_string();
                        tracing::warn!(enrichment = %enrichment.id, field, "required field failed");
                        failure_messages.push(message);
                    }
                }
                failure_messages.extend(step.messages);
            }
            Err(err) => {
                tracing::warn!(enrichment = %enrichment.id, %err, "enrichment failed");
                failure_messages.push(format!("enrichment '{}' failed: {err}", enrichment.id));
            }
        }
    }

    let severity = if required_failure_seen {
        Severity::Error
    } else if any_processed {
        max_processed_severity
    } else {
        Severity::Info
    };

    EnrichmentOutcome { failure_messages, severity }
}

/// Evaluates every rule and rule-group read-only against `record` (no
/// mutation) and exposes the outcomes as `#ruleResults` /
/// `#ruleGroupResults` variables (spec §4.4 "Pre-pass"). Returns an empty
/// map when the configuration has no rules/groups at all, so conditional
/// expressions that reference these variables simply read them as absent
/// (spec §8 "are *not* bound if no rules were pre-evaluated").
fn rule_prepass_variables(
    config: &Configuration,
    record: &Record,
    cache: &CacheManager,
    max_rule_workers: usize,
) -> HashMap<String, Value> {
    let mut vars = HashMap::new();
    if config.rules.is_empty() && config.rule_groups.is_empty() {
        return vars;
    }

    if !config.rules.is_empty() {
        let mut rule_results = Record::with_capacity(config.rules.len());
        for rule in &config.rules {
            let result = crate::rules::evaluate_rule(rule, record, cache);
            rule_results.insert(rule.id.clone(), Value::Boolean(result.triggered));
        }
        vars.insert("ruleResults".to_string(), Value::Record(rule_results));
    }

    if !config.rule_groups.is_empty() {
        let mut group_results = Record::with_capacity(config.rule_groups.len());
        for group in &config.rule_groups {
            let evaluation = crate::rules::evaluate_rule_group(group, config, record, cache, max_rule_workers);
            let mut group_record = Record::with_capacity(evaluation.individual_results.len() + 1);
            group_record.insert("passed".to_string(), Value::Boolean(evaluation.group_result));
            for result in &evaluation.individual_results {
                if let Some(rule) = config.rule_by_id(&result.id) {
                    group_record.insert(rule.name.clone(), Value::Boolean(result.triggered));
                }
            }
            group_results.insert(group.id.clone(), Value::Record(group_record));
        }
        vars.insert("ruleGroupResults".to_string(), Value::Record(group_results));
    }

    vars
}

/// Gating per spec §4.4 "Per-enrichment gating": enabled, target-type
/// match, and condition, in that order (later checks short-circuit on an
/// earlier `false`).
fn is_enabled(
    enrichment: &Enrichment,
    record: &Record,
    vars: &HashMap<String, Value>,
    cache: &CacheManager,
) -> ApexResult<bool> {
    if !enrichment.enabled {
        return Ok(false);
    }

    if let Some(target_type) = &enrichment.target_type {
        match record_type_name(record) {
            Some(actual) if target_type_matches(target_type, actual) => {}
            _ => return Ok(false),
        }
    }

    if let Some(condition) = &enrichment.condition {
        let expr = crate::expr::compile(condition, cache)?;
        let ctx = EvaluationContext::with_variables(record, vars.clone(), EvaluationStage::Enrichment);
        return Ok(evaluate(&expr, &ctx)?.truthy());
    }

    Ok(true)
}

/// The record's type name for `targetType` gating is not otherwise
/// modeled (records carry no reflective type metadata, §9 Open
/// Questions) — by convention a `recordType` or `type` field on the
/// record supplies it, matching how the lineage's own records flag their
/// kind. Absent either field, `targetType`-scoped enrichments don't fire.
fn record_type_name(record: &Record) -> Option<&str> {
    record
        .get("recordType")
        .or_else(|| record.get("type"))
        .and_then(Value::as_str)
}

/// Flexible target-type matching (§4.4): exact match covers both the
/// short-name and fully-qualified-name cases since this implementation
/// has no package-qualified type names; substring match in either
/// direction also covers the documented `Trade ↔ *Trade*` alias.
fn target_type_matches(target_type: &str, actual: &str) -> bool {
    target_type == actual || actual.contains(target_type) || target_type.contains(actual)
}

fn dispatch(
    enrichment: &Enrichment,
    cfg: &EnrichmentConfig,
    record: &mut Record,
    cache: &CacheManager,
    registry: &ServiceRegistry,
    vars: &HashMap<String, Value>,
) -> ApexResult<StepOutcome> {
    match cfg {
        EnrichmentConfig::Lookup(lookup_cfg) => process_lookup(lookup_cfg, record, cache, registry, vars),
        EnrichmentConfig::Calculation(calc_cfg) => process_calculation(calc_cfg, record, cache, vars),
        EnrichmentConfig::Field(field_cfg) => process_field(field_cfg, record, cache, vars),
        EnrichmentConfig::ConditionalMapping(cm_cfg) => {
            process_conditional_mapping(enrichment, cm_cfg, record, cache, vars)
        }
    }
}

/// Lookup-enrichment dispatch (spec §4.3). A null key skips the fetch
/// entirely; running field mappings against `Value::Null` reproduces the
/// §8 boundary behavior exactly ("record returned unchanged except
/// default-value mappings") since `apply_field_mappings` treats a null
/// source the same as the failed-lookup scalar sentinel: no extraction is
/// attempted and no required-field failure is raised, only defaults apply.
fn process_lookup(
    cfg: &LookupEnrichmentConfig,
    record: &mut Record,
    cache: &CacheManager,
    registry: &ServiceRegistry,
    vars: &HashMap<String, Value>,
) -> ApexResult<StepOutcome> {
    let key_expr = crate::expr::compile(&cfg.lookup_key, cache)?;
    let ctx = EvaluationContext::with_variables(record, vars.clone(), EvaluationStage::Enrichment);
    let key = evaluate(&key_expr, &ctx)?;

    if key.is_null() {
        let required_failures = apply_field_mappings(&Value::Null, &cfg.field_mappings, record, cache)?;
        return Ok(StepOutcome { messages: vec![], required_failures });
    }

    let service = resolve_lookup_service(cfg.lookup_service.as_deref(), cfg.lookup_dataset.as_ref(), registry, cache)?;
    let cache_key = format!("{}:{key}", service.name());

    let result_value = if cfg.cache_enabled {
        if let Some(cached) = cache.lookup_result_get(&cache_key) {
            cached
        } else {
            let fetched = service.transform(&key).unwrap_or(Value::Null);
            cache.lookup_result_put(cache_key, fetched.clone(), Some(Duration::from_secs(cfg.cache_ttl_seconds)));
            fetched
        }
    } else {
        service.transform(&key).unwrap_or(Value::Null)
    };

    let required_failures = apply_field_mappings(&result_value, &cfg.field_mappings, record, cache)?;
    Ok(StepOutcome { messages: vec![], required_failures })
}

/// Calculation-enrichment dispatch (§4.4): a recoverable failure falls
/// back to `defaultValue`; an unrecoverable one propagates as the
/// enrichment's own failure.
fn process_calculation(
    cfg: &CalculationEnrichmentConfig,
    record: &mut Record,
    cache: &CacheManager,
    vars: &HashMap<String, Value>,
) -> ApexResult<StepOutcome> {
    let attempt = crate::expr::compile(&cfg.expression, cache).and_then(|expr| {
        let ctx = EvaluationContext::with_variables(record, vars.clone(), EvaluationStage::Enrichment);
        evaluate(&expr, &ctx)
    });

    match attempt {
        Ok(value) => {
            record.insert(cfg.result_field.clone(), value);
            Ok(StepOutcome::default())
        }
        Err(err) => match &cfg.default_value {
            Some(default) => {
                record.insert(cfg.result_field.clone(), Value::from(default.clone()));
                Ok(StepOutcome::default())
            }
            None => Err(err),
        },
    }
}

/// Field-enrichment dispatch (§4.4): every matching conditional-mapping
/// group applies (not just the first), then the top-level field mappings
/// apply with the record as both source and target. A snapshot of the
/// record is taken immediately before each mapping set runs, so later
/// sets see earlier sets' writes (spec §5 "enrichments may read each
/// other's writes" applied at the mapping-set granularity here).
fn process_field(
    cfg: &FieldEnrichmentConfig,
    record: &mut Record,
    cache: &CacheManager,
    vars: &HashMap<String, Value>,
) -> ApexResult<StepOutcome> {
    let mut required_failures = Vec::new();

    for conditional in &cfg.conditional_mappings {
        if evaluate_condition_group(&conditional.condition_group, record, vars, cache)? {
            let source = Value::Record(record.clone());
            required_failures.extend(apply_field_mappings(&source, &conditional.field_mappings, record, cache)?);
        }
    }

    let source = Value::Record(record.clone());
    required_failures.extend(apply_field_mappings(&source, &cfg.field_mappings, record, cache)?);

    Ok(StepOutcome { messages: vec![], required_failures })
}

/// Conditional-mapping-enrichment dispatch (§4.4): mapping rules run in
/// priority order; `stopOnFirstMatch` (default true) governs whether more
/// than one rule may write `targetField`.
fn process_conditional_mapping(
    enrichment: &Enrichment,
    cfg: &ConditionalMappingEnrichmentConfig,
    record: &mut Record,
    cache: &CacheManager,
    vars: &HashMap<String, Value>,
) -> ApexResult<StepOutcome> {
    let mut rules: Vec<&MappingRule> = cfg.mapping_rules.iter().collect();
    rules.sort_by_key(|r| r.priority);

    for rule in rules {
        if evaluate_condition_group(&rule.conditions, record, vars, cache)? {
            let value = compute_mapping_rule_value(rule, record, cache, vars);
            if !value.is_null() {
                record.insert(cfg.target_field.clone(), value);
            }
            if cfg.execution_settings.log_matched_rule {
                tracing::debug!(
                    enrichment = %enrichment.id,
                    target_field = %cfg.target_field,
                    "conditional mapping rule matched"
                );
            }
            if cfg.execution_settings.stop_on_first_match {
                break;
            }
        }
    }

    Ok(StepOutcome::default())
}

/// A mapping rule's value (§4.4 "Mapping rule value computation"). The
/// spec's `direct` fallback ("evaluate #sourceField") is read here as a
/// root-object property access on `sourceField` — consistent with every
/// other enrichment surface (lookup key, conditions) reading the record
/// as the evaluation root rather than the `#var` scope, which carries no
/// natural binding for an arbitrary field name (§9 Open Questions).
fn compute_mapping_rule_value(
    rule: &MappingRule,
    record: &Record,
    cache: &CacheManager,
    vars: &HashMap<String, Value>,
) -> Value {
    let attempt: ApexResult<Value> = match rule.rule_type {
        Some(MappingRuleType::Lookup) => match &rule.transformation {
            Some(transformation) => eval_in_record(transformation, record, cache, vars),
            None => Ok(Value::Null),
        },
        _ => match &rule.transformation {
            Some(transformation) => eval_in_record(transformation, record, cache, vars),
            None => match &rule.source_field {
                Some(field) => Ok(record.get(field).cloned().unwrap_or(Value::Null)),
                None => Ok(Value::Null),
            },
        },
    };

    match attempt {
        Ok(value) => value,
        Err(_) => rule.fallback_value.clone().map(Value::from).unwrap_or(Value::Null),
    }
}

fn eval_in_record(
    source: &str,
    record: &Record,
    cache: &CacheManager,
    vars: &HashMap<String, Value>,
) -> ApexResult<Value> {
    let expr = crate::expr::compile(source, cache)?;
    let ctx = EvaluationContext::with_variables(record, vars.clone(), EvaluationStage::Enrichment);
    evaluate(&expr, &ctx)
}

/// Condition-group evaluation (§4.4 "Condition group"): short-circuits by
/// operator; an evaluation error on a sub-condition counts as `false`
/// under AND (forcing the group false) and as a skipped disjunct under
/// OR. An empty group is vacuously true.
fn evaluate_condition_group(
    group: &ConditionGroup,
    record: &Record,
    vars: &HashMap<String, Value>,
    cache: &CacheManager,
) -> ApexResult<bool> {
    if group.rules.is_empty() {
        return Ok(true);
    }
    let operator = group.operator.unwrap_or(GroupOperator::And);
    match operator {
        GroupOperator::And => {
            for rule in &group.rules {
                match eval_in_record(&rule.condition, record, cache, vars) {
                    Ok(value) if value.truthy() => continue,
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        GroupOperator::Or => {
            for rule in &group.rules {
                if let Ok(value) = eval_in_record(&rule.condition, record, cache, vars) {
                    if value.truthy() {
                        return Ok(true);
                    }
                }
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::config::{
        ConditionRule, EnrichmentType, ExecutionSettings, FieldMapping, LookupDataset,
    };
    use crate::settings::ApexSettings;
    use std::collections::HashMap as StdHashMap;

    fn make_enrichment(id: &str, enrichment_type: EnrichmentType, priority: i32) -> Enrichment {
        Enrichment {
            id: id.to_string(),
            enrichment_type,
            enabled: true,
            target_type: None,
            condition: None,
            priority,
            severity: Severity::Info,
            lookup_key: None,
            lookup_service: None,
            lookup_dataset: None,
            field_mappings: vec![],
            cache_enabled: false,
            cache_ttl_seconds: 300,
            expression: None,
            result_field: None,
            default_value: None,
            conditional_mappings: vec![],
            target_field: None,
            mapping_rules: vec![],
            execution_settings: ExecutionSettings::default(),
        }
    }

    fn currency_dataset() -> LookupDataset {
        let mut usd = StdHashMap::new();
        usd.insert("code".to_string(), serde_json::json!("USD"));
        usd.insert("name".to_string(), serde_json::json!("US Dollar"));
        usd.insert("symbol".to_string(), serde_json::json!("$"));
        let mut eur = StdHashMap::new();
        eur.insert("code".to_string(), serde_json::json!("EUR"));
        eur.insert("name".to_string(), serde_json::json!("Euro"));
        eur.insert("symbol".to_string(), serde_json::json!("€"));
        LookupDataset::Inline { data: vec![usd, eur], key_field: "code".to_string() }
    }

    #[test]
    fn currency_lookup_enrichment_populates_mapped_fields() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut enrichment = make_enrichment("currency-lookup", EnrichmentType::LookupEnrichment, 100);
        enrichment.lookup_key = Some("currency".to_string());
        enrichment.lookup_dataset = Some(currency_dataset());
        enrichment.field_mappings = vec![
            FieldMapping {
                source_field: "code".to_string(),
                target_field: "currencyCode".to_string(),
                transformation: None,
                default_value: None,
                required: false,
            },
            FieldMapping {
                source_field: "name".to_string(),
                target_field: "currencyName".to_string(),
                transformation: None,
                default_value: None,
                required: false,
            },
            FieldMapping {
                source_field: "symbol".to_string(),
                target_field: "currencySymbol".to_string(),
                transformation: None,
                default_value: None,
                required: false,
            },
        ];

        let mut config = Configuration::default();
        config.enrichments = vec![enrichment];

        let mut record = Record::new();
        record.insert("currency".to_string(), Value::String("USD".to_string()));

        let outcome = run_pipeline(&config, &mut record, &cache, &registry, 4);

        assert!(outcome.failure_messages.is_empty());
        assert_eq!(record.get("currencyCode"), Some(&Value::String("USD".to_string())));
        assert_eq!(record.get("currencyName"), Some(&Value::String("US Dollar".to_string())));
        assert_eq!(record.get("currencySymbol"), Some(&Value::String("$".to_string())));
    }

    #[test]
    fn required_field_failure_is_surfaced_with_enrichment_name() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut enrichment = make_enrichment("risk-lookup", EnrichmentType::LookupEnrichment, 100);
        enrichment.lookup_key = Some("code".to_string());
        enrichment.lookup_dataset = Some(currency_dataset());
        enrichment.field_mappings = vec![FieldMapping {
            source_field: "riskScore".to_string(),
            target_field: "riskScore".to_string(),
            transformation: None,
            default_value: None,
            required: true,
        }];

        let mut config = Configuration::default();
        config.enrichments = vec![enrichment];

        let mut record = Record::new();
        record.insert("code".to_string(), Value::String("USD".to_string()));

        let outcome = run_pipeline(&config, &mut record, &cache, &registry, 4);

        assert_eq!(outcome.severity, Severity::Error);
        assert!(outcome.failure_messages.iter().any(|m| m.contains("risk-lookup") && m.contains("riskScore")));
        assert!(!record.contains_key("riskScore"));
    }

    #[test]
    fn null_lookup_key_with_a_required_mapping_does_not_fail_the_pipeline() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut enrichment = make_enrichment("risk-lookup", EnrichmentType::LookupEnrichment, 100);
        enrichment.lookup_key = Some("code".to_string());
        enrichment.lookup_dataset = Some(currency_dataset());
        enrichment.field_mappings = vec![FieldMapping {
            source_field: "riskScore".to_string(),
            target_field: "riskScore".to_string(),
            transformation: None,
            default_value: None,
            required: true,
        }];

        let mut config = Configuration::default();
        config.enrichments = vec![enrichment];

        // `code` is absent, so the lookup key expression evaluates to null.
        let mut record = Record::new();
        let outcome = run_pipeline(&config, &mut record, &cache, &registry, 4);

        assert!(outcome.failure_messages.is_empty());
        assert_eq!(outcome.severity, Severity::Info);
        assert!(!record.contains_key("riskScore"));
    }

    #[test]
    fn enrichments_dispatch_in_priority_order() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut first = make_enrichment("set-base", EnrichmentType::CalculationEnrichment, 10);
        first.expression = Some("10".to_string());
        first.result_field = Some("base".to_string());

        let mut second = make_enrichment("double-base", EnrichmentType::CalculationEnrichment, 20);
        second.expression = Some("base * 2".to_string());
        second.result_field = Some("doubled".to_string());

        let mut config = Configuration::default();
        config.enrichments = vec![second, first];

        let mut record = Record::new();
        let outcome = run_pipeline(&config, &mut record, &cache, &registry, 4);

        assert!(outcome.failure_messages.is_empty());
        assert_eq!(record.get("doubled"), Some(&Value::Integer(20)));
    }

    #[test]
    fn calculation_failure_without_default_is_reported() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut enrichment = make_enrichment("div", EnrichmentType::CalculationEnrichment, 100);
        enrichment.expression = Some("1 / 0".to_string());
        enrichment.result_field = Some("x".to_string());

        let mut config = Configuration::default();
        config.enrichments = vec![enrichment];

        let mut record = Record::new();
        let outcome = run_pipeline(&config, &mut record, &cache, &registry, 4);
        assert!(!outcome.failure_messages.is_empty());
        assert!(!record.contains_key("x"));
    }

    #[test]
    fn calculation_failure_with_default_recovers() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut enrichment = make_enrichment("div", EnrichmentType::CalculationEnrichment, 100);
        enrichment.expression = Some("1 / 0".to_string());
        enrichment.result_field = Some("x".to_string());
        enrichment.default_value = Some(serde_json::json!(0));

        let mut config = Configuration::default();
        config.enrichments = vec![enrichment];

        let mut record = Record::new();
        let outcome = run_pipeline(&config, &mut record, &cache, &registry, 4);
        assert!(outcome.failure_messages.is_empty());
        assert_eq!(record.get("x"), Some(&Value::Integer(0)));
    }

    #[test]
    fn disabled_enrichment_is_skipped() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut enrichment = make_enrichment("skip-me", EnrichmentType::CalculationEnrichment, 100);
        enrichment.enabled = false;
        enrichment.expression = Some("1".to_string());
        enrichment.result_field = Some("x".to_string());

        let mut config = Configuration::default();
        config.enrichments = vec![enrichment];

        let mut record = Record::new();
        let outcome = run_pipeline(&config, &mut record, &cache, &registry, 4);
        assert!(outcome.failure_messages.is_empty());
        assert!(!record.contains_key("x"));
    }

    #[test]
    fn condition_gates_dispatch() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut enrichment = make_enrichment("conditional", EnrichmentType::CalculationEnrichment, 100);
        enrichment.condition = Some("amount > 100".to_string());
        enrichment.expression = Some("1".to_string());
        enrichment.result_field = Some("flag".to_string());

        let mut config = Configuration::default();
        config.enrichments = vec![enrichment];

        let mut record = Record::new();
        record.insert("amount".to_string(), Value::Integer(5));
        let outcome = run_pipeline(&config, &mut record, &cache, &registry, 4);
        assert!(outcome.failure_messages.is_empty());
        assert!(!record.contains_key("flag"));
    }

    #[test]
    fn conditional_mapping_stops_on_first_match_by_default() {
        let cache = CacheManager::new(&ApexSettings::default());
        let registry = ServiceRegistry::new(std::sync::Arc::new(CacheManager::new(&ApexSettings::default())));

        let mut enrichment = make_enrichment("tier", EnrichmentType::ConditionalMappingEnrichment, 100);
        enrichment.target_field = Some("tier".to_string());
        enrichment.mapping_rules = vec![
            MappingRule {
                priority: 10,
                rule_type: Some(MappingRuleType::Direct),
                conditions: ConditionGroup {
                    operator: None,
                    rules: vec![ConditionRule { condition: "amount > 1000".to_string() }],
                },
                transformation: Some("'gold'".to_string()),
                source_field: None,
                fallback_value: None,
            },
            MappingRule {
                priority: 20,
                rule_type: Some(MappingRuleType::Direct),
                conditions: ConditionGroup { operator: None, rules: vec![] },
                transformation: Some("'standard'".to_string()),
                source_field: None,
                fallback_value: None,
            },
        ];

        let mut config = Configuration::default();
        config.enrichments = vec![enrichment];

        let mut record = Record::new();
        record.insert("amount".to_string(), Value::Integer(2000));
        run_pipeline(&config, &mut record, &cache, &registry, 4);
        assert_eq!(record.get("tier"), Some(&Value::String("gold".to_string())));
    }

    #[test]
    fn rule_prepass_variables_absent_when_no_rules_configured() {
        let cache = CacheManager::new(&ApexSettings::default());
        let config = Configuration::default();
        let record = Record::new();
        let vars = rule_prepass_variables(&config, &record, &cache, 4);
        assert!(vars.is_empty());
    }
}
