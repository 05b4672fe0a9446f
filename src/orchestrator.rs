//! The orchestrator (spec §4.7): `Evaluator`, the crate's public entry
//! point. Owns the process-wide cache, the service registry embedders
//! register external `LookupService`s against, and a metrics registry, and
//! composes the enrichment pipeline with rule/rule-group evaluation into one
//! consolidated `RuleResult` per `evaluate()` call.

use crate::cache::CacheManager;
use crate::config::Configuration;
use crate::enrichment;
use crate::lookup::{LookupService, ServiceRegistry};
use crate::metrics::MetricsRegistry;
use crate::result::{ResultType, RuleResult};
use crate::rules;
use crate::settings::ApexSettings;
use crate::value::Record;
use chrono::Utc;
use std::sync::Arc;

/// The APEX entry point. Cheap to clone-by-reference — the cache, registry
/// and metrics are all `Arc`/interior-mutable, so a single `Evaluator` is
/// meant to be built once and shared across every `evaluate()` call.
pub struct Evaluator {
    settings: ApexSettings,
    cache: Arc<CacheManager>,
    registry: Arc<ServiceRegistry>,
    metrics: MetricsRegistry,
}

impl Evaluator {
    /// Builds an `Evaluator` against the process-wide cache singleton
    /// (spec §4.6 "Singleton access") with default ambient settings.
    pub fn new() -> Self {
        Self::with_settings(ApexSettings::default())
    }

    /// Builds an `Evaluator` with its own private cache sized per
    /// `settings`, instead of the shared process-wide singleton. Use this
    /// when an embedder needs isolated cache/TTL behavior (e.g. tests
    /// running concurrently with different settings).
    pub fn with_settings(settings: ApexSettings) -> Self {
        let cache = Arc::new(CacheManager::new(&settings));
        let registry = Arc::new(ServiceRegistry::new(cache.clone()));
        Evaluator { settings, cache, registry, metrics: MetricsRegistry::new() }
    }

    /// Registers an external `LookupService` (spec §1: database/REST
    /// transports are out of scope for this core — embedders supply them
    /// this way and reference them by name via `lookupService`).
    pub fn register_service(&self, service: Arc<dyn LookupService>) {
        self.registry.register(service);
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Runs one evaluation (spec §4.7): enrich, then evaluate rules, then
    /// rule-groups, consolidating every step's failures into one
    /// `RuleResult`. `config`/`input` are taken by reference rather than
    /// `Option` — Rust's type system already rules out the "null config or
    /// input" case the spec calls a failure result (§9 Open Questions).
    pub fn evaluate(&self, config: &Configuration, input: &Record) -> RuleResult {
        let span = tracing::info_span!("evaluator.evaluate", rules = config.rules.len(), enrichments = config.enrichments.len());
        let _enter = span.enter();

        let mut record = input.clone();
        let mut failure_messages = Vec::new();

        tracing::debug!("running enrichment pipeline");
        let enrichment_outcome =
            enrichment::run_pipeline(config, &mut record, &self.cache, &self.registry, self.settings.max_rule_workers);
        failure_messages.extend(enrichment_outcome.failure_messages);

        tracing::debug!("evaluating rule list");
        let rule_list_result = rules::evaluate_rule_list_with_metrics(&config.rules, &record, &self.cache, &self.metrics);
        if rule_list_result.result_type == ResultType::Error {
            failure_messages.push(format!("rule evaluation failed: {}", rule_list_result.message));
        }

        tracing::debug!("evaluating rule groups");
        let rule_group_result = rules::evaluate_rule_group_list(
            &config.rule_groups,
            config,
            &record,
            &self.cache,
            self.settings.max_rule_workers,
        );
        if rule_group_result.result_type == ResultType::Error {
            failure_messages.push(format!("rule-group evaluation failed: {}", rule_group_result.message));
        }

        let primary = select_primary(config, &rule_list_result, &rule_group_result);
        let success = failure_messages.is_empty();

        RuleResult {
            id: primary.id.clone(),
            rule_matched_name: primary.rule_matched_name.clone(),
            message: primary.message.clone(),
            severity: primary.severity.max(enrichment_outcome.severity),
            triggered: primary.triggered,
            result_type: primary.result_type,
            timestamp: Utc::now(),
            performance_metrics: primary.performance_metrics.clone(),
            failure_diagnostics: primary.failure_diagnostics.clone(),
            enriched_data: record,
            failure_messages,
            success,
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}

/// Picks which of the independent rule-list / rule-group-list evaluations
/// (spec §4.7 steps 4–5) represents the consolidated result: a triggered
/// rule-group wins outright; otherwise a configured rule list takes
/// precedence (even on NO_MATCH) since rule-groups are the coarser unit
/// layered on top of rules; with neither configured, NO_RULES from either
/// side is equivalent (§9 Open Questions — not specified explicitly by the
/// source system).
fn select_primary<'a>(config: &Configuration, rule_list: &'a RuleResult, rule_group: &'a RuleResult) -> &'a RuleResult {
    let has_rules = !config.rules.is_empty();
    let has_groups = !config.rule_groups.is_empty();
    if has_groups && rule_group.triggered {
        rule_group
    } else if has_rules {
        rule_list
    } else if has_groups {
        rule_group
    } else {
        rule_list
    }
}
