//! `RuleResult` and `RuleGroupEvaluationResult` (spec §3): the consolidated
//! outcome type the orchestrator, the rule evaluator, and the rule-group
//! evaluator all produce. One type serves both a single rule's outcome and
//! the aggregate outcome the orchestrator hands back to the caller.

use crate::config::{GroupOperator, Severity};
use crate::metrics::PerformanceMetrics;
use crate::value::Record;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Match,
    NoMatch,
    NoRules,
    Error,
}

/// Non-null only when `!triggered` (spec §3 invariant).
#[derive(Debug, Clone, Default)]
pub struct FailureDiagnostics {
    pub last_failed_group_name: Option<String>,
    pub last_failed_group_message: Option<String>,
    pub highest_failed_severity: Option<Severity>,
}

#[derive(Debug, Clone)]
pub struct RuleResult {
    pub id: String,
    /// Non-null iff `triggered` (spec §3 invariant).
    pub rule_matched_name: Option<String>,
    pub message: String,
    pub severity: Severity,
    pub triggered: bool,
    pub result_type: ResultType,
    pub timestamp: DateTime<Utc>,
    pub performance_metrics: Option<PerformanceMetrics>,
    pub failure_diagnostics: FailureDiagnostics,
    pub enriched_data: Record,
    pub failure_messages: Vec<String>,
    pub success: bool,
}

impl RuleResult {
    pub fn no_rules(enriched_data: Record) -> Self {
        RuleResult {
            id: String::new(),
            rule_matched_name: None,
            message: "no rules configured".to_string(),
            severity: Severity::Info,
            triggered: false,
            result_type: ResultType::NoRules,
            timestamp: Utc::now(),
            performance_metrics: None,
            failure_diagnostics: FailureDiagnostics::default(),
            enriched_data,
            failure_messages: Vec::new(),
            success: true,
        }
    }

    pub fn no_match(enriched_data: Record) -> Self {
        RuleResult {
            id: String::new(),
            rule_matched_name: None,
            message: "no rule matched".to_string(),
            severity: Severity::Info,
            triggered: false,
            result_type: ResultType::NoMatch,
            timestamp: Utc::now(),
            performance_metrics: None,
            failure_diagnostics: FailureDiagnostics::default(),
            enriched_data,
            failure_messages: Vec::new(),
            success: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleGroupEvaluationResult {
    pub group_id: String,
    pub group_name: String,
    pub operator: GroupOperator,
    pub group_result: bool,
    pub individual_results: Vec<RuleResult>,
    pub aggregated_severity: Severity,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub total_evaluated: usize,
    pub passed: usize,
    pub failed: usize,
}
