//! Content-addressed dataset fingerprinting (spec §4.3 "DatasetSignature
//! construction", §3 `DatasetSignature`). Signature equality is the cache
//! key the dataset scope dedups on (§8 "Dataset deduplication").

use crate::config::LookupDataset;
use md5::{Digest, Md5};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetSignature {
    pub dataset_type: String,
    pub content_hash: String,
    pub key_field: String,
}

impl DatasetSignature {
    pub fn from_dataset(dataset: &LookupDataset) -> Self {
        match dataset {
            LookupDataset::Inline { data, key_field } => DatasetSignature {
                dataset_type: "inline".to_string(),
                content_hash: hash8(&canonical_inline_string(data)),
                key_field: key_field.clone(),
            },
            LookupDataset::File { file_path, key_field, .. } => DatasetSignature {
                dataset_type: "file".to_string(),
                content_hash: normalize_path(file_path),
                key_field: key_field.clone(),
            },
            LookupDataset::Database {
                connection_name,
                data_source_ref,
                query,
                query_ref,
                parameters,
                key_field,
            } => {
                let source = format!(
                    "conn:{};ds:{};q:{};qref:{};params:{}",
                    connection_name.as_deref().unwrap_or(""),
                    data_source_ref.as_deref().unwrap_or(""),
                    query.as_deref().unwrap_or(""),
                    query_ref.as_deref().unwrap_or(""),
                    parameters.join(","),
                );
                DatasetSignature {
                    dataset_type: "database".to_string(),
                    content_hash: hash8(&source),
                    key_field: key_field.clone(),
                }
            }
            LookupDataset::RestApi {
                connection_name,
                data_source_ref,
                endpoint,
                operation_ref,
                key_field,
            } => {
                let source = format!(
                    "conn:{};ds:{};ep:{};op:{}",
                    connection_name.as_deref().unwrap_or(""),
                    data_source_ref.as_deref().unwrap_or(""),
                    endpoint.as_deref().unwrap_or(""),
                    operation_ref.as_deref().unwrap_or(""),
                );
                DatasetSignature {
                    dataset_type: "rest-api".to_string(),
                    content_hash: hash8(&source),
                    key_field: key_field.clone(),
                }
            }
        }
    }

    /// The cache key this signature maps to in the `dataset` scope.
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.dataset_type, self.content_hash, self.key_field)
    }
}

fn hash8(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

/// Forward-slashed, space-underscored normalized path (§4.3: accepts the
/// assumption that identical paths yield identical content within a run).
fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").replace(' ', "_")
}

/// Canonical string form of the inline data list, stable across key
/// insertion order (serde_json's map preserves field order from the
/// source, but we additionally sort keys here so byte-identical *content*
/// in a different field order still dedups — consistent with records
/// being insertion-order-independent per §3).
fn canonical_inline_string(data: &[std::collections::HashMap<String, serde_json::Value>]) -> String {
    let canonical: Vec<serde_json::Value> = data
        .iter()
        .map(|row| {
            let mut keys: Vec<&String> = row.keys().collect();
            keys.sort();
            let mut map = serde_json::Map::new();
            for k in keys {
                map.insert(k.clone(), row[k].clone());
            }
            serde_json::Value::Object(map)
        })
        .collect();
    serde_json::to_string(&canonical).unwrap_or_default()
}
