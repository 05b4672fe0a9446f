//! Evaluation context (spec §4.2): the root object, the `#var` scope, and
//! the ambient references (service registry, rule-result variables,
//! evaluation stage) that enrichment conditions and transformations read.

use crate::value::{Record, Value};
use std::cell::RefCell;
use std::collections::HashMap;

/// The stage marker surfaced for diagnostics (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationStage {
    RulePrePass,
    Enrichment,
    Rule,
    RuleGroup,
}

/// A context carries a root object, a variable scope, and ambient
/// references. Contexts are built per evaluation and never shared across
/// concurrent evaluations (§4.2, §5) — the variable scope uses `RefCell`
/// only so that the `setVariable` transformation escape hatch (§4.1) can
/// mutate it through a shared reference, not for any concurrency reason.
pub struct EvaluationContext<'a> {
    pub root: &'a Record,
    variables: RefCell<HashMap<String, Value>>,
    pub stage: EvaluationStage,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(root: &'a Record, stage: EvaluationStage) -> Self {
        Self {
            root,
            variables: RefCell::new(HashMap::new()),
            stage,
        }
    }

    pub fn with_variables(root: &'a Record, variables: HashMap<String, Value>, stage: EvaluationStage) -> Self {
        Self {
            root,
            variables: RefCell::new(variables),
            stage,
        }
    }

    /// `#var` lookup. Variables shadow root-object properties of the same
    /// name by design (spec §9 Open Questions: "this specification adopts
    /// that policy explicitly").
    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.variables.borrow().get(name).cloned()
    }

    pub fn set_variable(&self, name: &str, value: Value) {
        self.variables.borrow_mut().insert(name.to_string(), value);
    }

    pub fn variables_snapshot(&self) -> HashMap<String, Value> {
        self.variables.borrow().clone()
    }

    /// A bare identifier reads a property off the root object; missing
    /// keys read as `null`, never as an error (spec §4.1 "Property accessor
    /// for mappings").
    pub fn root_property(&self, name: &str) -> Value {
        self.root.get(name).cloned().unwrap_or(Value::Null)
    }
}
