//! The expression engine (spec §4.1): parser, AST, evaluation context, and
//! evaluator for the small embedded expression language enrichment
//! conditions, lookup keys, calculations, and rule conditions all share.

pub mod ast;
pub mod context;
pub mod eval;
pub mod parser;

pub use ast::Expression;
pub use context::{EvaluationContext, EvaluationStage};
pub use eval::evaluate;
pub use parser::parse_complete;

use crate::cache::CacheManager;
use crate::error::{ApexError, ApexResult};
use std::sync::Arc;

/// Get-or-parse against the expression cache scope (spec §4.6 "expression"
/// scope). Two equal source strings always yield the same cached `Arc`, so
/// compiling the same condition/transformation repeatedly across records
/// only pays the parse cost once.
pub fn compile(source: &str, cache: &CacheManager) -> ApexResult<Arc<Expression>> {
    if let Some(cached) = cache.expression_get(source) {
        return Ok(cached);
    }
    let expr = Arc::new(parse_complete(source).map_err(|reason| ApexError::parse(source, reason))?);
    cache.expression_put(source.to_string(), expr.clone(), None);
    Ok(expr)
}
