//! The lookup layer (spec §4.3): resolves a lookup configuration to a
//! (possibly cached) lookup service, extracts a key, fetches a result, and
//! applies field mappings.

pub mod signature;

pub use signature::DatasetSignature;

use crate::cache::CacheManager;
use crate::config::{FieldMapping, FileDatasetFormat, LookupDataset};
use crate::error::{ApexError, ApexResult};
use crate::expr::context::EvaluationContext;
use crate::expr::{context::EvaluationStage, eval::evaluate};
use crate::value::{Record, Value};
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

/// `{ name, transform(key), getAllRecords() }` (spec §6 "Lookup service
/// contract"). External lookups return `None` on miss, same as an absent
/// dataset row.
pub trait LookupService: Send + Sync {
    fn name(&self) -> &str;
    fn transform(&self, key: &Value) -> Option<Value>;
    fn get_all_records(&self) -> Option<Vec<Record>> {
        None
    }
}

/// A lookup service backed by an in-memory index over a list of records,
/// built once at construction (spec §6: "a dataset-backed service is
/// constructed by indexing a list-of-records by its key field; duplicates
/// are resolved by last-write-wins in encountered order").
pub struct DatasetLookupService {
    name: String,
    index: HashMap<String, Record>,
}

impl DatasetLookupService {
    pub fn from_rows(name: impl Into<String>, key_field: &str, rows: Vec<Record>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for row in rows {
            if let Some(key) = row.get(key_field) {
                index.insert(key.to_string(), row);
            }
        }
        DatasetLookupService { name: name.into(), index }
    }
}

impl LookupService for DatasetLookupService {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, key: &Value) -> Option<Value> {
        self.index.get(&key.to_string()).cloned().map(Value::Record)
    }

    fn get_all_records(&self) -> Option<Vec<Record>> {
        Some(self.index.values().cloned().collect())
    }
}

/// A named `Arc<dyn LookupService>` directory (spec §4.2/§4.3 "service
/// registry"), itself backed by the cache's `service-registry` scope so
/// registered services share the unified cache's TTL/LRU/statistics
/// machinery rather than living in a second, parallel map.
pub struct ServiceRegistry {
    cache: Arc<CacheManager>,
}

impl ServiceRegistry {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        ServiceRegistry { cache }
    }

    pub fn register(&self, service: Arc<dyn LookupService>) {
        self.cache.service_registry_put(service.name().to_string(), service, None);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LookupService>> {
        self.cache.service_registry_get(name)
    }
}

/// Loads the rows for a dataset descriptor (spec §4.3 "construct a new one
/// by loading the dataset"). `database`/`rest-api` datasets have no
/// bundled transport (spec §1 scopes those out) — embedders register a
/// named `LookupService` instead and reference it via `lookupService`.
pub fn load_dataset_rows(dataset: &LookupDataset) -> ApexResult<Vec<Record>> {
    match dataset {
        LookupDataset::Inline { data, .. } => Ok(data.iter().map(|row| {
            let mut record = Record::with_capacity(row.len());
            for (k, v) in row {
                record.insert(k.clone(), Value::from(v));
            }
            record
        }).collect()),
        LookupDataset::File { file_path, format, .. } => load_file_dataset(file_path, *format),
        LookupDataset::Database { .. } => Err(ApexError::configuration(
            "database datasets require an external transport not provided by this core; register a LookupService and use lookupService instead",
        )),
        LookupDataset::RestApi { .. } => Err(ApexError::configuration(
            "rest-api datasets require an external transport not provided by this core; register a LookupService and use lookupService instead",
        )),
    }
}

fn load_file_dataset(path: &str, format: FileDatasetFormat) -> ApexResult<Vec<Record>> {
    match format {
        FileDatasetFormat::Csv => load_csv(path),
        FileDatasetFormat::Jsonl => load_jsonl(path),
    }
}

fn load_csv(path: &str) -> ApexResult<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| ApexError::configuration(format!("failed to open dataset file '{path}': {e}")))?;
    let headers = reader
        .headers()
        .map_err(|e| ApexError::configuration(format!("failed to read headers of '{path}': {e}")))?
        .clone();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ApexError::configuration(format!("failed to read row of '{path}': {e}")))?;
        let mut row = Record::with_capacity(headers.len());
        for (header, value) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), infer_scalar(value));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn load_jsonl(path: &str) -> ApexResult<Vec<Record>> {
    let content = fs::read_to_string(path)
        .map_err(|e| ApexError::configuration(format!("failed to open dataset file '{path}': {e}")))?;
    let mut rows = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let json: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| ApexError::configuration(format!("failed to parse '{path}' line {}: {e}", lineno + 1)))?;
        match Value::from(json) {
            Value::Record(record) => rows.push(record),
            other => {
                return Err(ApexError::configuration(format!(
                    "'{path}' line {} is not a JSON object (got {})",
                    lineno + 1,
                    other.type_name()
                )))
            }
        }
    }
    Ok(rows)
}

/// CSV cells have no type tag; promote the obvious cases and leave the
/// rest as strings.
fn infer_scalar(cell: &str) -> Value {
    if let Ok(i) = cell.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = cell.parse::<f64>() {
        Value::Float(f)
    } else if cell.eq_ignore_ascii_case("true") {
        Value::Boolean(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Value::Boolean(false)
    } else {
        Value::String(cell.to_string())
    }
}

/// Resolves a lookup enrichment's service per the §4.3 resolution order:
/// a named registered service first, otherwise the dataset, deduplicated
/// by `DatasetSignature` through the cache's `dataset` scope.
pub fn resolve_lookup_service(
    lookup_service: Option<&str>,
    lookup_dataset: Option<&LookupDataset>,
    registry: &ServiceRegistry,
    cache: &CacheManager,
) -> ApexResult<Arc<dyn LookupService>> {
    if let Some(name) = lookup_service {
        return registry
            .get(name)
            .ok_or_else(|| ApexError::configuration(format!("lookup service '{name}' is not registered")));
    }
    if let Some(dataset) = lookup_dataset {
        return resolve_dataset_service(dataset, cache);
    }
    Err(ApexError::configuration(
        "lookup enrichment declares neither lookupService nor lookupDataset",
    ))
}

/// Dataset-cache check-then-construct. Two identical dataset descriptors
/// produce equal signatures and therefore the same cache key, so only one
/// `DatasetLookupService` is built across the cache's lifetime (spec §8
/// "Dataset deduplication"). Racing first calls may each construct one and
/// the later `put` wins — the spec notes this is the caller's
/// responsibility to avoid via an atomic compute-if-absent if needed.
pub fn resolve_dataset_service(dataset: &LookupDataset, cache: &CacheManager) -> ApexResult<Arc<dyn LookupService>> {
    let signature = DatasetSignature::from_dataset(dataset);
    let cache_key = signature.cache_key();
    if let Some(service) = cache.dataset_get(&cache_key) {
        return Ok(service);
    }
    let rows = load_dataset_rows(dataset)?;
    let service: Arc<dyn LookupService> = Arc::new(DatasetLookupService::from_rows(cache_key.clone(), dataset.key_field(), rows));
    cache.dataset_put(cache_key, service.clone(), None);
    Ok(service)
}

/// Applies field mappings (spec §4.3 "Field mapping semantics"). Returns
/// the target field names of any `required` mapping that failed — the
/// enrichment is reported as failed for each, but the remaining mappings
/// still run.
pub fn apply_field_mappings(
    source: &Value,
    mappings: &[FieldMapping],
    target: &mut Record,
    cache: &CacheManager,
) -> ApexResult<Vec<String>> {
    let mut required_failures = Vec::new();

    for mapping in mappings {
        // A simple scalar (failed-external-lookup sentinel) or an outright
        // null source (e.g. a null lookup key, spec §8 boundary behavior)
        // never attempts source-field extraction and never manufactures a
        // required-field failure — only default-valued mappings apply
        // (spec §4.3 rule 1: "do not attempt to extract source fields").
        if source.is_simple_scalar() || source.is_null() {
            if let Some(default) = &mapping.default_value {
                target.insert(mapping.target_field.clone(), Value::from(default.clone()));
            }
            continue;
        }

        let mut value = source
            .as_record()
            .and_then(|r| r.get(&mapping.source_field).cloned())
            .unwrap_or(Value::Null);

        if value.is_null() {
            if mapping.required {
                required_failures.push(mapping.target_field.clone());
                continue;
            }
            if let Some(default) = &mapping.default_value {
                value = Value::from(default.clone());
            }
        }

        if let Some(transformation) = &mapping.transformation {
            let expr = crate::expr::compile(transformation, cache)?;
            let mut vars = HashMap::new();
            vars.insert("value".to_string(), value.clone());
            let ctx = EvaluationContext::with_variables(&*target, vars, EvaluationStage::Enrichment);
            value = evaluate(&expr, &ctx)?;
        }

        if !value.is_null() {
            target.insert(mapping.target_field.clone(), value);
        }
    }

    Ok(required_failures)
}
