//! The parsed configuration aggregate (spec §3): rules, rule-groups,
//! enrichments, and data-source descriptors. This is the business
//! `Configuration`, distinct from the ambient `ApexSettings` in
//! [`crate::settings`].
//!
//! YAML syntax parsing itself is out of scope (§1) — the caller hands us
//! any `serde::Deserialize` source (typically a `serde_yaml::Value`) and
//! we deserialize straight into these types. Every field with a
//! kebab-case YAML spelling carries a `serde(alias = "...")` so kebab-case
//! and lowerCamelCase configs both ingest (§6).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `{ INFO, WARNING, ERROR }`, ordered so `max()` picks the most severe
/// (spec §4.4 "ordering ERROR > WARNING > INFO").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

fn default_priority() -> i32 {
    100
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RuleMetadata {
    #[serde(default, alias = "created-date")]
    pub created_date: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "business-owner")]
    pub business_owner: Option<String>,
}

/// A named Boolean expression with severity, message, and priority (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub condition: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub metadata: Option<RuleMetadata>,
}

impl Rule {
    /// Invariants from §3: `id`, `condition`, `message` non-empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("rule id must not be empty".to_string());
        }
        if self.condition.trim().is_empty() {
            return Err(format!("rule '{}' has an empty condition", self.id));
        }
        if self.message.trim().is_empty() {
            return Err(format!("rule '{}' has an empty message", self.id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupOperator {
    And,
    Or,
}

/// An ordered set of rules combined by AND/OR (§3). `sequence` values must
/// be unique within the group; iteration order is by ascending sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    pub operator: GroupOperator,
    /// `sequence -> ruleId`, kept as pairs rather than a map so insertion
    /// order from YAML is preserved for diagnostics even though ordering
    /// is ultimately driven by the numeric sequence key.
    #[serde(alias = "rule-ids", default)]
    pub rule_ids: Vec<RuleGroupMember>,
    #[serde(default, alias = "stop-on-first-failure")]
    pub stop_on_first_failure: bool,
    #[serde(default, alias = "parallel-execution")]
    pub parallel_execution: bool,
    #[serde(default, alias = "debug-mode")]
    pub debug_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleGroupMember {
    pub sequence: i32,
    #[serde(alias = "rule-id")]
    pub rule_id: String,
}

impl RuleGroup {
    /// Members in ascending sequence order (§3 invariant).
    pub fn ordered_rule_ids(&self) -> Vec<&str> {
        let mut members: Vec<&RuleGroupMember> = self.rule_ids.iter().collect();
        members.sort_by_key(|m| m.sequence);
        members.iter().map(|m| m.rule_id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnrichmentType {
    LookupEnrichment,
    CalculationEnrichment,
    FieldEnrichment,
    ConditionalMappingEnrichment,
}

/// `{ sourceField, targetField, transformation?, defaultValue?, required }` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    #[serde(alias = "source-field")]
    pub source_field: String,
    #[serde(alias = "target-field")]
    pub target_field: String,
    #[serde(default)]
    pub transformation: Option<String>,
    #[serde(default, alias = "default-value")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
}

/// `{ operator: AND|OR, rules: [{condition}, ...] }` (§4.4 "Condition group").
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConditionGroup {
    #[serde(default)]
    pub operator: Option<GroupOperator>,
    #[serde(default)]
    pub rules: Vec<ConditionRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRule {
    pub condition: String,
}

/// A `field-enrichment`'s conditional-mappings entry: a condition group
/// plus the field mappings that apply when it passes. *All* matching
/// groups apply, not just the first (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalMapping {
    #[serde(default, alias = "condition-group")]
    pub condition_group: ConditionGroup,
    #[serde(default, alias = "field-mappings")]
    pub field_mappings: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingRuleType {
    Direct,
    Lookup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRule {
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, rename = "type")]
    pub rule_type: Option<MappingRuleType>,
    #[serde(default)]
    pub conditions: ConditionGroup,
    #[serde(default)]
    pub transformation: Option<String>,
    #[serde(alias = "source-field", default)]
    pub source_field: Option<String>,
    #[serde(alias = "fallback-value", default)]
    pub fallback_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSettings {
    #[serde(default = "default_true", alias = "stop-on-first-match")]
    pub stop_on_first_match: bool,
    #[serde(default, alias = "log-matched-rule")]
    pub log_matched_rule: bool,
}

impl Default for ConditionalMappingEnrichmentConfig {
    fn default() -> Self {
        ConditionalMappingEnrichmentConfig {
            target_field: String::new(),
            mapping_rules: Vec::new(),
            execution_settings: ExecutionSettings { stop_on_first_match: true, log_matched_rule: false },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupEnrichmentConfig {
    #[serde(alias = "lookup-key")]
    pub lookup_key: String,
    #[serde(default, alias = "lookup-service")]
    pub lookup_service: Option<String>,
    #[serde(default, alias = "lookup-dataset")]
    pub lookup_dataset: Option<LookupDataset>,
    #[serde(default, alias = "field-mappings")]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default, alias = "cache-enabled")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl", alias = "cache-ttl-seconds")]
    pub cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationEnrichmentConfig {
    pub expression: String,
    #[serde(alias = "result-field")]
    pub result_field: String,
    #[serde(default, alias = "default-value")]
    pub default_value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FieldEnrichmentConfig {
    #[serde(default, alias = "field-mappings")]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default, alias = "conditional-mappings")]
    pub conditional_mappings: Vec<ConditionalMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalMappingEnrichmentConfig {
    #[serde(alias = "target-field")]
    pub target_field: String,
    #[serde(default, alias = "mapping-rules")]
    pub mapping_rules: Vec<MappingRule>,
    #[serde(default, alias = "execution-settings")]
    pub execution_settings: ExecutionSettings,
}

/// The type-specific sub-configuration a dispatcher matches on (§3).
///
/// Not derived directly from YAML: `Enrichment` deserializes every
/// type-specific field as optional (`#[serde(flatten)]` over a raw struct
/// would make an untagged enum guess at the variant structurally, which is
/// ambiguous here since `field-enrichment` has no required fields of its
/// own). Dispatch instead reads the explicit `type` discriminator and
/// `Enrichment::config()` assembles the matching variant, erroring with
/// `ConfigurationError` if a required sub-field for that type is absent.
#[derive(Debug, Clone)]
pub enum EnrichmentConfig {
    Lookup(LookupEnrichmentConfig),
    Calculation(CalculationEnrichmentConfig),
    Field(FieldEnrichmentConfig),
    ConditionalMapping(ConditionalMappingEnrichmentConfig),
}

/// A declarative transformation step that adds or derives fields (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub id: String,
    #[serde(rename = "type")]
    pub enrichment_type: EnrichmentType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, alias = "target-type")]
    pub target_type: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub severity: Severity,

    #[serde(default, alias = "lookup-key")]
    pub lookup_key: Option<String>,
    #[serde(default, alias = "lookup-service")]
    pub lookup_service: Option<String>,
    #[serde(default, alias = "lookup-dataset")]
    pub lookup_dataset: Option<LookupDataset>,
    #[serde(default, alias = "field-mappings")]
    pub field_mappings: Vec<FieldMapping>,
    #[serde(default, alias = "cache-enabled")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl", alias = "cache-ttl-seconds")]
    pub cache_ttl_seconds: u64,

    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default, alias = "result-field")]
    pub result_field: Option<String>,
    #[serde(default, alias = "default-value")]
    pub default_value: Option<serde_json::Value>,

    #[serde(default, alias = "conditional-mappings")]
    pub conditional_mappings: Vec<ConditionalMapping>,

    #[serde(default, alias = "target-field")]
    pub target_field: Option<String>,
    #[serde(default, alias = "mapping-rules")]
    pub mapping_rules: Vec<MappingRule>,
    #[serde(default, alias = "execution-settings")]
    pub execution_settings: ExecutionSettings,
}

impl Enrichment {
    /// Assembles the type-specific view per §3, failing with a
    /// `ConfigurationError`-shaped message if a field the dispatched type
    /// requires is missing.
    pub fn config(&self) -> Result<EnrichmentConfig, String> {
        match self.enrichment_type {
            EnrichmentType::LookupEnrichment => {
                let lookup_key = self
                    .lookup_key
                    .clone()
                    .ok_or_else(|| format!("lookup-enrichment '{}' is missing lookupKey", self.id))?;
                Ok(EnrichmentConfig::Lookup(LookupEnrichmentConfig {
                    lookup_key,
                    lookup_service: self.lookup_service.clone(),
                    lookup_dataset: self.lookup_dataset.clone(),
                    field_mappings: self.field_mappings.clone(),
                    cache_enabled: self.cache_enabled,
                    cache_ttl_seconds: self.cache_ttl_seconds,
                }))
            }
            EnrichmentType::CalculationEnrichment => {
                let expression = self
                    .expression
                    .clone()
                    .ok_or_else(|| format!("calculation-enrichment '{}' is missing expression", self.id))?;
                let result_field = self
                    .result_field
                    .clone()
                    .ok_or_else(|| format!("calculation-enrichment '{}' is missing resultField", self.id))?;
                Ok(EnrichmentConfig::Calculation(CalculationEnrichmentConfig {
                    expression,
                    result_field,
                    default_value: self.default_value.clone(),
                }))
            }
            EnrichmentType::FieldEnrichment => Ok(EnrichmentConfig::Field(FieldEnrichmentConfig {
                field_mappings: self.field_mappings.clone(),
                conditional_mappings: self.conditional_mappings.clone(),
            })),
            EnrichmentType::ConditionalMappingEnrichment => {
                let target_field = self
                    .target_field
                    .clone()
                    .ok_or_else(|| format!("conditional-mapping-enrichment '{}' is missing targetField", self.id))?;
                Ok(EnrichmentConfig::ConditionalMapping(ConditionalMappingEnrichmentConfig {
                    target_field,
                    mapping_rules: self.mapping_rules.clone(),
                    execution_settings: self.execution_settings.clone(),
                }))
            }
        }
    }
}

/// A dataset descriptor; exactly one variant is populated (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LookupDataset {
    Inline {
        data: Vec<HashMap<String, serde_json::Value>>,
        #[serde(alias = "key-field")]
        key_field: String,
    },
    File {
        #[serde(alias = "file-path")]
        file_path: String,
        #[serde(alias = "key-field")]
        key_field: String,
        #[serde(default)]
        format: FileDatasetFormat,
    },
    Database {
        #[serde(default, alias = "connection-name")]
        connection_name: Option<String>,
        #[serde(default, alias = "data-source-ref")]
        data_source_ref: Option<String>,
        #[serde(default)]
        query: Option<String>,
        #[serde(default, alias = "query-ref")]
        query_ref: Option<String>,
        #[serde(default)]
        parameters: Vec<String>,
        #[serde(alias = "key-field")]
        key_field: String,
    },
    #[serde(rename = "rest-api")]
    RestApi {
        #[serde(default, alias = "connection-name")]
        connection_name: Option<String>,
        #[serde(default, alias = "data-source-ref")]
        data_source_ref: Option<String>,
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default, alias = "operation-ref")]
        operation_ref: Option<String>,
        #[serde(alias = "key-field")]
        key_field: String,
    },
}

impl LookupDataset {
    pub fn key_field(&self) -> &str {
        match self {
            LookupDataset::Inline { key_field, .. }
            | LookupDataset::File { key_field, .. }
            | LookupDataset::Database { key_field, .. }
            | LookupDataset::RestApi { key_field, .. } => key_field,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileDatasetFormat {
    #[default]
    Csv,
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(flatten)]
    pub properties: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// The immutable aggregate parsed from YAML (§3): rules, rule-groups,
/// enrichments, and data-sources referenced by name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub metadata: ConfigMetadata,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default, alias = "rule-groups")]
    pub rule_groups: Vec<RuleGroup>,
    #[serde(default)]
    pub enrichments: Vec<Enrichment>,
    #[serde(default, alias = "data-sources")]
    pub data_sources: Vec<DataSource>,
}

impl Configuration {
    pub fn data_source(&self, name: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|ds| ds.name == name)
    }

    /// Enrichments in priority order, ties resolved in encountered order
    /// (stable sort, §4.4 "Ordering").
    pub fn enrichments_by_priority(&self) -> Vec<&Enrichment> {
        let mut sorted: Vec<&Enrichment> = self.enrichments.iter().collect();
        sorted.sort_by_key(|e| e.priority);
        sorted
    }

    pub fn rule_by_id(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }
}
