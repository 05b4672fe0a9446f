//! Full `Evaluator::evaluate()` coverage (spec §4.7, §8 seed test 1), driven
//! from a YAML configuration the way an embedder actually supplies one.

use apex_core::config::Configuration;
use apex_core::lookup::{LookupService, ServiceRegistry};
use apex_core::result::ResultType;
use apex_core::settings::ApexSettings;
use apex_core::value::{Record, Value};
use apex_core::Evaluator;
use std::sync::Arc;

const CURRENCY_CONFIG_YAML: &str = r#"
metadata:
  name: currency-enrichment
rules:
  - id: large-trade
    name: Large trade
    condition: "amount > 1000000"
    message: "trade amount exceeds threshold"
    severity: WARNING
    priority: 10
enrichments:
  - id: currency-lookup
    type: lookup-enrichment
    priority: 10
    lookup-key: "currency"
    lookup-dataset:
      type: inline
      key-field: code
      data:
        - code: USD
          name: US Dollar
          symbol: "$"
        - code: EUR
          name: Euro
          symbol: "€"
    field-mappings:
      - source-field: name
        target-field: currencyName
        required: false
      - source-field: symbol
        target-field: currencySymbol
        required: false
"#;

#[test]
fn currency_lookup_enrichment_and_rule_evaluation_compose_end_to_end() {
    let config: Configuration = serde_yaml::from_str(CURRENCY_CONFIG_YAML).unwrap();
    let evaluator = Evaluator::with_settings(ApexSettings::default());

    let mut input = Record::new();
    input.insert("currency".to_string(), Value::String("EUR".to_string()));
    input.insert("amount".to_string(), Value::Integer(2_000_000));

    let result = evaluator.evaluate(&config, &input);

    assert!(result.success);
    assert_eq!(result.enriched_data.get("currencyName"), Some(&Value::String("Euro".to_string())));
    assert_eq!(result.enriched_data.get("currencySymbol"), Some(&Value::String("€".to_string())));
    assert!(result.triggered);
    assert_eq!(result.id, "large-trade");
    assert_eq!(result.severity, apex_core::config::Severity::Warning);
}

#[test]
fn unknown_currency_skips_mappings_but_does_not_fail_the_evaluation() {
    let config: Configuration = serde_yaml::from_str(CURRENCY_CONFIG_YAML).unwrap();
    let evaluator = Evaluator::with_settings(ApexSettings::default());

    let mut input = Record::new();
    input.insert("currency".to_string(), Value::String("GBP".to_string()));
    input.insert("amount".to_string(), Value::Integer(1));

    let result = evaluator.evaluate(&config, &input);
    assert!(result.success);
    assert!(!result.enriched_data.contains_key("currencyName"));
    assert_eq!(result.result_type, ResultType::NoMatch);
}

struct StaticRateService {
    rate: f64,
}

impl LookupService for StaticRateService {
    fn name(&self) -> &str {
        "fx-rates"
    }

    fn transform(&self, key: &Value) -> Option<Value> {
        if key.is_null() {
            None
        } else {
            Some(Value::Float(self.rate))
        }
    }
}

#[test]
fn a_registered_lookup_service_is_reachable_by_name_from_a_lookup_enrichment() {
    let yaml = r#"
enrichments:
  - id: fx-rate
    type: lookup-enrichment
    priority: 10
    lookup-key: "currency"
    lookup-service: fx-rates
    field-mappings: []
"#;
    let config: Configuration = serde_yaml::from_str(yaml).unwrap();
    let evaluator = Evaluator::with_settings(ApexSettings::default());
    evaluator.register_service(Arc::new(StaticRateService { rate: 1.08 }));

    let mut input = Record::new();
    input.insert("currency".to_string(), Value::String("EUR".to_string()));

    let result = evaluator.evaluate(&config, &input);
    assert!(result.success);
}

#[test]
fn an_undefined_lookup_service_reference_is_reported_as_a_configuration_failure() {
    let yaml = r#"
enrichments:
  - id: fx-rate
    type: lookup-enrichment
    priority: 10
    lookup-key: "currency"
    lookup-service: not-registered
    field-mappings: []
"#;
    let config: Configuration = serde_yaml::from_str(yaml).unwrap();
    let evaluator = Evaluator::with_settings(ApexSettings::default());

    let mut input = Record::new();
    input.insert("currency".to_string(), Value::String("EUR".to_string()));

    let result = evaluator.evaluate(&config, &input);
    assert!(!result.success);
    assert!(result.failure_messages.iter().any(|m| m.contains("not-registered")));
}

#[test]
fn metrics_registry_is_populated_after_evaluating_a_rule_list() {
    let config: Configuration = serde_yaml::from_str(CURRENCY_CONFIG_YAML).unwrap();
    let evaluator = Evaluator::with_settings(ApexSettings::default());

    let mut input = Record::new();
    input.insert("currency".to_string(), Value::String("USD".to_string()));
    input.insert("amount".to_string(), Value::Integer(1));

    evaluator.evaluate(&config, &input);
    assert!(evaluator.metrics().get("large-trade").is_some());
}
