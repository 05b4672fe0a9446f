//! The rule and rule-group evaluator (spec §4.5): single-rule boolean
//! coercion, first-match rule-list semantics, sequential short-circuit and
//! bounded-parallel rule-group execution, and severity aggregation.

use crate::cache::CacheManager;
use crate::config::{Configuration, GroupOperator, Rule, RuleGroup, Severity};
use crate::expr::{evaluate, EvaluationContext, EvaluationStage};
use crate::metrics::MetricsRegistry;
use crate::result::{FailureDiagnostics, ResultType, RuleGroupEvaluationResult, RuleResult};
use crate::value::{Record, Value};
use chrono::Utc;
use rayon::prelude::*;
use std::time::Instant;

/// Rule-condition boolean coercion (§4.5): distinct from the general
/// [`Value::truthy`] — a non-null, non-boolean result here means "matched",
/// not a type-specific truthiness test.
fn coerce_rule_boolean(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Boolean(b) => *b,
        _ => true,
    }
}

/// Compiles and evaluates `rule.condition` against `record`, coercing to a
/// triggered/not-triggered outcome. Never propagates an error: a failing
/// condition produces an `ERROR`-typed `RuleResult` instead.
pub fn evaluate_rule(rule: &Rule, record: &Record, cache: &CacheManager) -> RuleResult {
    let outcome = crate::expr::compile(&rule.condition, cache)
        .and_then(|expr| evaluate(&expr, &EvaluationContext::new(record, EvaluationStage::Rule)));

    match outcome {
        Ok(value) => {
            let triggered = coerce_rule_boolean(&value);
            RuleResult {
                id: rule.id.clone(),
                rule_matched_name: triggered.then(|| rule.name.clone()),
                message: if triggered { rule.message.clone() } else { "no rule matched".to_string() },
                severity: rule.severity,
                triggered,
                result_type: if triggered { ResultType::Match } else { ResultType::NoMatch },
                timestamp: Utc::now(),
                performance_metrics: None,
                failure_diagnostics: FailureDiagnostics::default(),
                enriched_data: record.clone(),
                failure_messages: Vec::new(),
                success: true,
            }
        }
        Err(e) => RuleResult {
            id: rule.id.clone(),
            rule_matched_name: None,
            message: format!("rule '{}' evaluation failed: {e}", rule.id),
            severity: rule.severity,
            triggered: false,
            result_type: ResultType::Error,
            timestamp: Utc::now(),
            performance_metrics: None,
            failure_diagnostics: FailureDiagnostics {
                last_failed_group_name: None,
                last_failed_group_message: Some(e.to_string()),
                highest_failed_severity: Some(rule.severity),
            },
            enriched_data: record.clone(),
            failure_messages: vec![e.to_string()],
            success: false,
        },
    }
}

/// First-match over `rules` in ascending priority (§4.5 "Rule list
/// evaluation"). A rule-evaluation error does not abort the list (§7); if
/// no later rule matches, the most recent error is what the list surfaces.
fn rule_list_core<'a>(rules: impl Iterator<Item = &'a Rule>, record: &Record, cache: &CacheManager) -> RuleResult {
    let mut sorted: Vec<&Rule> = rules.collect();
    sorted.sort_by_key(|r| r.priority);
    let mut last_error = None;
    for rule in sorted {
        let result = evaluate_rule(rule, record, cache);
        if result.triggered {
            return result;
        }
        if result.result_type == ResultType::Error {
            last_error = Some(result);
        }
    }
    last_error.unwrap_or_else(|| RuleResult::no_match(record.clone()))
}

pub fn evaluate_rule_list(rules: &[Rule], record: &Record, cache: &CacheManager) -> RuleResult {
    if rules.is_empty() {
        return RuleResult::no_rules(record.clone());
    }
    rule_list_core(rules.iter(), record, cache)
}

/// Evaluates a rule and records its timing/outcome in `metrics` (spec §6
/// "Observability outputs"), attaching the rule's running `PerformanceMetrics`
/// snapshot onto the result it returns.
fn evaluate_rule_instrumented(rule: &Rule, record: &Record, cache: &CacheManager, metrics: &MetricsRegistry) -> RuleResult {
    let started = Instant::now();
    let mut result = evaluate_rule(rule, record, cache);
    let elapsed = started.elapsed();
    let complexity = crate::expr::compile(&rule.condition, cache).map(|e| e.node_count() as u64).unwrap_or(0);
    metrics.record(&rule.id, elapsed, result.result_type != ResultType::Error, 0, complexity);
    result.performance_metrics = metrics.get(&rule.id);
    result
}

/// Same first-match semantics as [`evaluate_rule_list`], with per-rule
/// metrics recorded as each candidate is tried.
pub fn evaluate_rule_list_with_metrics(
    rules: &[Rule],
    record: &Record,
    cache: &CacheManager,
    metrics: &MetricsRegistry,
) -> RuleResult {
    if rules.is_empty() {
        return RuleResult::no_rules(record.clone());
    }
    let mut sorted: Vec<&Rule> = rules.iter().collect();
    sorted.sort_by_key(|r| r.priority);
    let mut last_error = None;
    for rule in sorted {
        let result = evaluate_rule_instrumented(rule, record, cache, metrics);
        if result.triggered {
            return result;
        }
        if result.result_type == ResultType::Error {
            last_error = Some(result);
        }
    }
    last_error.unwrap_or_else(|| RuleResult::no_match(record.clone()))
}

fn resolve_and_evaluate(rule_id: &str, config: &Configuration, record: &Record, cache: &CacheManager) -> RuleResult {
    match config.rule_by_id(rule_id) {
        Some(rule) => evaluate_rule(rule, record, cache),
        None => RuleResult {
            id: rule_id.to_string(),
            rule_matched_name: None,
            message: format!("rule group member '{rule_id}' is not defined in this configuration"),
            severity: Severity::Error,
            triggered: false,
            result_type: ResultType::Error,
            timestamp: Utc::now(),
            performance_metrics: None,
            failure_diagnostics: FailureDiagnostics {
                last_failed_group_name: None,
                last_failed_group_message: Some(format!("undefined rule '{rule_id}'")),
                highest_failed_severity: Some(Severity::Error),
            },
            enriched_data: record.clone(),
            failure_messages: vec![format!("undefined rule '{rule_id}'")],
            success: false,
        },
    }
}

fn evaluate_group_sequential(
    ordered_ids: &[&str],
    config: &Configuration,
    record: &Record,
    cache: &CacheManager,
    operator: GroupOperator,
    short_circuit: bool,
) -> Vec<RuleResult> {
    let mut results = Vec::with_capacity(ordered_ids.len());
    for id in ordered_ids {
        let result = resolve_and_evaluate(id, config, record, cache);
        let stop = short_circuit
            && match operator {
                GroupOperator::And => !result.triggered,
                GroupOperator::Or => result.triggered,
            };
        results.push(result);
        if stop {
            break;
        }
    }
    results
}

/// Dispatches each member rule to a bounded worker pool (§4.5 "Parallel").
/// Short-circuiting is disabled — every rule runs and appears in the
/// result, regardless of outcome. The pool is scoped to this call and torn
/// down on return, on every exit path including a build failure.
fn evaluate_group_parallel(
    ordered_ids: &[&str],
    config: &Configuration,
    record: &Record,
    cache: &CacheManager,
    max_workers: usize,
) -> Vec<RuleResult> {
    let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    let workers = ordered_ids.len().min(available).min(max_workers.max(1));

    let eval_all = || -> Vec<RuleResult> {
        ordered_ids.par_iter().map(|id| resolve_and_evaluate(id, config, record, cache)).collect()
    };

    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(eval_all),
        Err(_) => ordered_ids.iter().map(|id| resolve_and_evaluate(id, config, record, cache)).collect(),
    }
}

/// Per-group severity aggregation (§4.5 "Severity aggregation").
pub fn aggregate_severity(operator: GroupOperator, results: &[RuleResult]) -> Severity {
    if results.is_empty() {
        return Severity::Info;
    }
    match operator {
        GroupOperator::And => {
            let failed: Vec<Severity> = results.iter().filter(|r| !r.triggered).map(|r| r.severity).collect();
            if failed.is_empty() {
                results.iter().map(|r| r.severity).max().unwrap_or(Severity::Info)
            } else {
                failed.into_iter().max().unwrap_or(Severity::Info)
            }
        }
        GroupOperator::Or => results
            .iter()
            .find(|r| r.triggered)
            .map(|r| r.severity)
            .unwrap_or_else(|| results.iter().map(|r| r.severity).max().unwrap_or(Severity::Info)),
    }
}

/// Evaluates one rule-group (§4.5 "Rule group evaluation"). Parallel
/// execution is used only when `parallelExecution` is set and the group
/// has more than one member — a single-rule or sequential group gets the
/// cheaper sequential path and its short-circuit semantics.
pub fn evaluate_rule_group(
    group: &RuleGroup,
    config: &Configuration,
    record: &Record,
    cache: &CacheManager,
    max_workers: usize,
) -> RuleGroupEvaluationResult {
    let started_at = Utc::now();
    let ordered_ids = group.ordered_rule_ids();

    let individual_results = if group.parallel_execution && ordered_ids.len() > 1 {
        evaluate_group_parallel(&ordered_ids, config, record, cache, max_workers)
    } else {
        let short_circuit = group.stop_on_first_failure && !group.debug_mode;
        evaluate_group_sequential(&ordered_ids, config, record, cache, group.operator, short_circuit)
    };

    let passed = individual_results.iter().filter(|r| r.triggered).count();
    let failed = individual_results.len() - passed;
    let group_result = if individual_results.is_empty() {
        false
    } else {
        match group.operator {
            GroupOperator::And => failed == 0,
            GroupOperator::Or => passed > 0,
        }
    };
    let aggregated_severity = aggregate_severity(group.operator, &individual_results);
    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    RuleGroupEvaluationResult {
        group_id: group.id.clone(),
        group_name: group.name.clone(),
        operator: group.operator,
        group_result,
        individual_results,
        aggregated_severity,
        started_at,
        duration_ms,
        total_evaluated: passed + failed,
        passed,
        failed,
    }
}

/// Wraps a matched group's evaluation into the `RuleResult` shape the
/// orchestrator deals in uniformly with single-rule matches.
fn group_match_result(group: &RuleGroup, evaluation: &RuleGroupEvaluationResult, record: &Record) -> RuleResult {
    RuleResult {
        id: group.id.clone(),
        rule_matched_name: Some(group.name.clone()),
        message: format!("rule group '{}' matched", group.name),
        severity: evaluation.aggregated_severity,
        triggered: true,
        result_type: ResultType::Match,
        timestamp: Utc::now(),
        performance_metrics: None,
        failure_diagnostics: FailureDiagnostics::default(),
        enriched_data: record.clone(),
        failure_messages: Vec::new(),
        success: true,
    }
}

/// Tracks the worst-severity failed group seen so far, for the
/// failure-diagnostics a final NO_MATCH carries (§4.5 "Rule-group result
/// for first-match failure tracking").
#[derive(Default)]
struct FailureTracker {
    diagnostics: FailureDiagnostics,
}

impl FailureTracker {
    fn observe(&mut self, group: &RuleGroup, evaluation: &RuleGroupEvaluationResult) {
        let is_worse = match self.diagnostics.highest_failed_severity {
            None => true,
            Some(current) => evaluation.aggregated_severity > current,
        };
        if is_worse {
            self.diagnostics = FailureDiagnostics {
                last_failed_group_name: Some(group.name.clone()),
                last_failed_group_message: Some(format!("rule group '{}' did not match", group.name)),
                highest_failed_severity: Some(evaluation.aggregated_severity),
            };
        }
    }
}

fn group_list_core<'a>(
    groups: impl Iterator<Item = &'a RuleGroup>,
    config: &Configuration,
    record: &Record,
    cache: &CacheManager,
    max_workers: usize,
) -> RuleResult {
    let mut sorted: Vec<&RuleGroup> = groups.collect();
    sorted.sort_by_key(|g| g.priority);
    let mut tracker = FailureTracker::default();
    for group in sorted {
        let evaluation = evaluate_rule_group(group, config, record, cache, max_workers);
        if evaluation.group_result {
            return group_match_result(group, &evaluation, record);
        }
        tracker.observe(group, &evaluation);
    }
    let mut result = RuleResult::no_match(record.clone());
    result.failure_diagnostics = tracker.diagnostics;
    result
}

pub fn evaluate_rule_group_list(
    groups: &[RuleGroup],
    config: &Configuration,
    record: &Record,
    cache: &CacheManager,
    max_workers: usize,
) -> RuleResult {
    if groups.is_empty() {
        return RuleResult::no_rules(record.clone());
    }
    group_list_core(groups.iter(), config, record, cache, max_workers)
}

/// An element of a heterogeneous rule/rule-group list (§4.5 "Mixed list
/// evaluation").
pub enum RuleOrGroup<'a> {
    Rule(&'a Rule),
    Group(&'a RuleGroup),
}

impl RuleOrGroup<'_> {
    fn priority(&self) -> i32 {
        match self {
            RuleOrGroup::Rule(r) => r.priority,
            RuleOrGroup::Group(g) => g.priority,
        }
    }
}

/// Delegates to the homogeneous evaluators when the list is all-rules or
/// all-groups; otherwise applies the same first-match policy manually over
/// the mixed, priority-ordered sequence.
pub fn evaluate_mixed_list(
    items: &[RuleOrGroup],
    config: &Configuration,
    record: &Record,
    cache: &CacheManager,
    max_workers: usize,
) -> RuleResult {
    if items.is_empty() {
        return RuleResult::no_rules(record.clone());
    }
    if items.iter().all(|i| matches!(i, RuleOrGroup::Rule(_))) {
        let rules = items.iter().filter_map(|i| match i {
            RuleOrGroup::Rule(r) => Some(*r),
            RuleOrGroup::Group(_) => None,
        });
        return rule_list_core(rules, record, cache);
    }
    if items.iter().all(|i| matches!(i, RuleOrGroup::Group(_))) {
        let groups = items.iter().filter_map(|i| match i {
            RuleOrGroup::Group(g) => Some(*g),
            RuleOrGroup::Rule(_) => None,
        });
        return group_list_core(groups, config, record, cache, max_workers);
    }

    let mut sorted: Vec<&RuleOrGroup> = items.iter().collect();
    sorted.sort_by_key(|i| i.priority());
    let mut tracker = FailureTracker::default();
    for item in sorted {
        match item {
            RuleOrGroup::Rule(rule) => {
                let result = evaluate_rule(rule, record, cache);
                if result.triggered {
                    return result;
                }
            }
            RuleOrGroup::Group(group) => {
                let evaluation = evaluate_rule_group(group, config, record, cache, max_workers);
                if evaluation.group_result {
                    return group_match_result(group, &evaluation, record);
                }
                tracker.observe(group, &evaluation);
            }
        }
    }
    let mut result = RuleResult::no_match(record.clone());
    result.failure_diagnostics = tracker.diagnostics;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleGroupMember;
    use crate::settings::ApexSettings;

    fn rule(id: &str, condition: &str, severity: Severity, priority: i32) -> Rule {
        Rule {
            id: id.to_string(),
            name: format!("{id}-name"),
            condition: condition.to_string(),
            message: format!("{id} triggered"),
            severity,
            priority,
            categories: vec![],
            metadata: None,
        }
    }

    fn record_with_amount(amount: i64) -> Record {
        let mut record = Record::new();
        record.insert("amount".to_string(), Value::Integer(amount));
        record
    }

    #[test]
    fn rule_list_returns_first_match_by_priority() {
        let cache = CacheManager::new(&ApexSettings::default());
        let rules = vec![rule("r2", "true", Severity::Info, 50), rule("r1", "true", Severity::Info, 10)];
        let result = evaluate_rule_list(&rules, &record_with_amount(1), &cache);
        assert_eq!(result.id, "r1");
        assert!(result.triggered);
    }

    #[test]
    fn empty_rule_list_is_no_rules() {
        let cache = CacheManager::new(&ApexSettings::default());
        let result = evaluate_rule_list(&[], &Record::new(), &cache);
        assert_eq!(result.result_type, ResultType::NoRules);
    }

    #[test]
    fn and_group_short_circuits_on_first_failure() {
        let cache = CacheManager::new(&ApexSettings::default());
        let mut config = Configuration::default();
        config.rules = vec![
            rule("r1", "amount > 0", Severity::Error, 100),
            rule("r2", "1 / 0 > 0", Severity::Error, 100),
        ];
        let group = RuleGroup {
            id: "g1".into(),
            name: "Group".into(),
            priority: 100,
            operator: GroupOperator::And,
            rule_ids: vec![
                RuleGroupMember { sequence: 1, rule_id: "r1".into() },
                RuleGroupMember { sequence: 2, rule_id: "r2".into() },
            ],
            stop_on_first_failure: true,
            parallel_execution: false,
            debug_mode: false,
        };
        let evaluation = evaluate_rule_group(&group, &config, &record_with_amount(-5), &cache, 4);
        assert!(!evaluation.group_result);
        assert_eq!(evaluation.individual_results.len(), 1);
        assert_eq!(evaluation.individual_results[0].id, "r1");
    }

    #[test]
    fn or_group_severity_is_first_triggered_rules_severity() {
        let cache = CacheManager::new(&ApexSettings::default());
        let mut config = Configuration::default();
        config.rules = vec![
            rule("r1", "false", Severity::Info, 100),
            rule("r2", "true", Severity::Warning, 100),
            rule("r3", "true", Severity::Error, 100),
        ];
        let group = RuleGroup {
            id: "g1".into(),
            name: "Group".into(),
            priority: 100,
            operator: GroupOperator::Or,
            rule_ids: vec![
                RuleGroupMember { sequence: 1, rule_id: "r1".into() },
                RuleGroupMember { sequence: 2, rule_id: "r2".into() },
                RuleGroupMember { sequence: 3, rule_id: "r3".into() },
            ],
            stop_on_first_failure: false,
            parallel_execution: false,
            debug_mode: false,
        };
        let evaluation = evaluate_rule_group(&group, &config, &record_with_amount(1), &cache, 4);
        assert!(evaluation.group_result);
        assert_eq!(evaluation.aggregated_severity, Severity::Warning);
    }

    #[test]
    fn parallel_group_evaluates_every_rule_regardless_of_outcome() {
        let cache = CacheManager::new(&ApexSettings::default());
        let mut config = Configuration::default();
        config.rules = vec![
            rule("r1", "amount > 0", Severity::Error, 100),
            rule("r2", "amount > 100", Severity::Error, 100),
            rule("r3", "amount > 0", Severity::Error, 100),
        ];
        let group = RuleGroup {
            id: "g1".into(),
            name: "Group".into(),
            priority: 100,
            operator: GroupOperator::And,
            rule_ids: vec![
                RuleGroupMember { sequence: 1, rule_id: "r1".into() },
                RuleGroupMember { sequence: 2, rule_id: "r2".into() },
                RuleGroupMember { sequence: 3, rule_id: "r3".into() },
            ],
            stop_on_first_failure: true,
            parallel_execution: true,
            debug_mode: false,
        };
        let evaluation = evaluate_rule_group(&group, &config, &record_with_amount(1), &cache, 4);
        assert_eq!(evaluation.individual_results.len(), 3);
        assert!(!evaluation.group_result);
    }

    #[test]
    fn empty_rule_group_returns_false() {
        let cache = CacheManager::new(&ApexSettings::default());
        let config = Configuration::default();
        let group = RuleGroup {
            id: "g1".into(),
            name: "Empty".into(),
            priority: 100,
            operator: GroupOperator::And,
            rule_ids: vec![],
            stop_on_first_failure: false,
            parallel_execution: false,
            debug_mode: false,
        };
        let evaluation = evaluate_rule_group(&group, &config, &Record::new(), &cache, 4);
        assert!(!evaluation.group_result);
    }

    #[test]
    fn instrumented_rule_list_records_metrics_for_the_matched_rule() {
        let cache = CacheManager::new(&ApexSettings::default());
        let metrics = MetricsRegistry::new();
        let rules = vec![rule("r1", "true", Severity::Info, 10)];
        let result = evaluate_rule_list_with_metrics(&rules, &record_with_amount(1), &cache, &metrics);
        assert!(result.triggered);
        assert!(result.performance_metrics.is_some());
        assert_eq!(metrics.get("r1").unwrap().evaluation_count, 1);
    }

    #[test]
    fn rule_group_list_returns_no_match_with_diagnostics_when_none_pass() {
        let cache = CacheManager::new(&ApexSettings::default());
        let mut config = Configuration::default();
        config.rules = vec![rule("r1", "false", Severity::Warning, 100)];
        let group = RuleGroup {
            id: "g1".into(),
            name: "FailingGroup".into(),
            priority: 100,
            operator: GroupOperator::And,
            rule_ids: vec![RuleGroupMember { sequence: 1, rule_id: "r1".into() }],
            stop_on_first_failure: false,
            parallel_execution: false,
            debug_mode: false,
        };
        let result = evaluate_rule_group_list(&[group], &config, &Record::new(), &cache, 4);
        assert_eq!(result.result_type, ResultType::NoMatch);
        assert_eq!(result.failure_diagnostics.last_failed_group_name, Some("FailingGroup".to_string()));
    }
}
