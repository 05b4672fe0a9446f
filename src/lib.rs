//! APEX: a declarative, YAML-driven engine for evaluating business rules
//! and enriching records against reference data (spec §1).
//!
//! The orchestrator, [`Evaluator`], is the crate's entry point — build one,
//! register any external lookup services, then call [`Evaluator::evaluate`]
//! with a parsed [`config::Configuration`] and an input [`value::Record`].
//! Every sub-module is public so embedders can use the expression engine or
//! the unified cache standalone.

pub mod cache;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod expr;
pub mod lookup;
pub mod metrics;
pub mod orchestrator;
pub mod result;
pub mod rules;
pub mod settings;
pub mod value;

pub use config::Configuration;
pub use error::{ApexError, ApexResult};
pub use orchestrator::Evaluator;
pub use result::{RuleGroupEvaluationResult, RuleResult};
pub use value::{Record, Value};
