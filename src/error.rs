//! Error taxonomy for the evaluation core (spec §7).
//!
//! `ParseError` is fatal to whoever asked for the expression; `EvaluationError`
//! is fatal only to the expression being evaluated, and the enclosing step
//! (lookup key, condition, calculation...) decides whether to propagate or
//! swallow it. The rest are step- or rule-scoped outcomes rather than
//! exceptions that cross the orchestrator boundary — see §4.7/§7.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApexError {
    #[error("failed to parse expression '{source_text}': {reason}")]
    Parse { source_text: String, reason: String },

    #[error("evaluation of '{expression}' failed: {reason}")]
    Evaluation { expression: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("required field '{field}' failed for enrichment '{enrichment_id}'")]
    RequiredFieldFailure {
        enrichment_id: String,
        field: String,
    },

    #[error("rule '{rule_id}' evaluation failed: {reason}")]
    RuleEvaluation { rule_id: String, reason: String },

    #[error("transport error resolving '{service}': {reason}")]
    Transport { service: String, reason: String },
}

impl ApexError {
    pub fn parse(source_text: impl Into<String>, reason: impl Into<String>) -> Self {
        ApexError::Parse {
            source_text: source_text.into(),
            reason: reason.into(),
        }
    }

    pub fn evaluation(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        ApexError::Evaluation {
            expression: expression.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        ApexError::Configuration(reason.into())
    }
}

pub type ApexResult<T> = Result<T, ApexError>;
