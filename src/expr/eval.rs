//! Evaluates a parsed `Expression` against an `EvaluationContext` (spec
//! §4.1). Adapted from the lineage's `evaluator.rs`: the same
//! match-on-the-AST shape and arithmetic helper functions, generalized to
//! the property/index/method-call/safe-navigation surface the spec
//! actually needs, and corrected per §9's numeric-promotion rule (integer
//! division stays integer; only a float operand promotes the result).

use super::ast::{BinaryOperator, Expression, UnaryOperator};
use super::context::EvaluationContext;
use crate::error::{ApexError, ApexResult};
use crate::value::Value;

/// Evaluates `expr` against `ctx`, returning `EvaluationError` for any
/// runtime failure (null dereference, type mismatch, divide-by-zero,
/// unknown method, sandbox violation).
pub fn evaluate(expr: &Expression, ctx: &EvaluationContext) -> ApexResult<Value> {
    match expr {
        Expression::Literal(v) => Ok(v.clone()),

        Expression::Variable(name) => Ok(ctx.get_variable(name).unwrap_or(Value::Null)),

        Expression::Identifier(name) => Ok(ctx.root_property(name)),

        Expression::Property { target, name, safe } => {
            let target_val = evaluate(target, ctx)?;
            read_property(&target_val, name, *safe, expr)
        }

        Expression::Index { target, index } => {
            let target_val = evaluate(target, ctx)?;
            let index_val = evaluate(index, ctx)?;
            read_index(&target_val, &index_val, expr)
        }

        Expression::MethodCall { target, method, args, safe } => {
            let target_val = evaluate(target, ctx)?;
            if target_val.is_null() {
                if *safe {
                    return Ok(Value::Null);
                }
                return Err(ApexError::evaluation(describe(expr), "null dereference"));
            }
            let arg_vals = args
                .iter()
                .map(|a| evaluate(a, ctx))
                .collect::<ApexResult<Vec<_>>>()?;
            call_method(&target_val, method, &arg_vals)
                .map_err(|reason| ApexError::evaluation(describe(expr), reason))
        }

        Expression::StaticCall { type_path, method, args } => {
            let arg_vals = args
                .iter()
                .map(|a| evaluate(a, ctx))
                .collect::<ApexResult<Vec<_>>>()?;
            call_static(type_path, method, &arg_vals)
                .map_err(|reason| ApexError::evaluation(describe(expr), reason))
        }

        Expression::GlobalCall { name, args } => {
            if name == "setVariable" {
                if args.len() != 2 {
                    return Err(ApexError::evaluation(
                        describe(expr),
                        "setVariable requires exactly 2 arguments",
                    ));
                }
                let key = evaluate(&args[0], ctx)?;
                let value = evaluate(&args[1], ctx)?;
                let key = key
                    .as_str()
                    .ok_or_else(|| ApexError::evaluation(describe(expr), "setVariable name must be a string"))?
                    .to_string();
                ctx.set_variable(&key, value.clone());
                Ok(value)
            } else {
                Err(ApexError::evaluation(
                    describe(expr),
                    format!("'{name}' is not an allowed call — sandbox boundary"),
                ))
            }
        }

        Expression::UnaryOp { op, operand } => {
            let v = evaluate(operand, ctx)?;
            evaluate_unary(*op, &v).map_err(|reason| ApexError::evaluation(describe(expr), reason))
        }

        Expression::BinaryOp { op, left, right } => evaluate_binary(*op, left, right, ctx, expr),

        Expression::Conditional { condition, then_expr, else_expr } => {
            let cond_val = evaluate(condition, ctx)?;
            if cond_val.truthy() {
                evaluate(then_expr, ctx)
            } else {
                evaluate(else_expr, ctx)
            }
        }
    }
}

fn read_property(target: &Value, name: &str, safe: bool, expr: &Expression) -> ApexResult<Value> {
    match target {
        Value::Null => {
            if safe {
                Ok(Value::Null)
            } else {
                Err(ApexError::evaluation(describe(expr), format!("null dereference reading '{name}'")))
            }
        }
        Value::Record(record) => Ok(record.get(name).cloned().unwrap_or(Value::Null)),
        _ => Err(ApexError::evaluation(
            describe(expr),
            format!("cannot read property '{name}' of a {}", target.type_name()),
        )),
    }
}

fn read_index(target: &Value, index: &Value, expr: &Expression) -> ApexResult<Value> {
    match target {
        Value::Null => Err(ApexError::evaluation(describe(expr), "null dereference during indexing")),
        Value::List(items) => match index {
            Value::Integer(i) => {
                let idx = usize::try_from(*i).map_err(|_| {
                    ApexError::evaluation(describe(expr), format!("negative list index {i}"))
                })?;
                Ok(items.get(idx).cloned().unwrap_or(Value::Null))
            }
            _ => Err(ApexError::evaluation(describe(expr), "list index must be an integer")),
        },
        Value::Record(record) => {
            let key = value_to_string(index);
            Ok(record.get(&key).cloned().unwrap_or(Value::Null))
        }
        _ => Err(ApexError::evaluation(
            describe(expr),
            format!("cannot index a {}", target.type_name()),
        )),
    }
}

fn evaluate_binary(
    op: BinaryOperator,
    left: &Expression,
    right: &Expression,
    ctx: &EvaluationContext,
    expr: &Expression,
) -> ApexResult<Value> {
    // && and || short-circuit the unevaluated operand.
    if op == BinaryOperator::And {
        let l = evaluate(left, ctx)?;
        if !l.truthy() {
            return Ok(Value::Boolean(false));
        }
        let r = evaluate(right, ctx)?;
        return Ok(Value::Boolean(r.truthy()));
    }
    if op == BinaryOperator::Or {
        let l = evaluate(left, ctx)?;
        if l.truthy() {
            return Ok(Value::Boolean(true));
        }
        let r = evaluate(right, ctx)?;
        return Ok(Value::Boolean(r.truthy()));
    }

    let l = evaluate(left, ctx)?;
    let r = evaluate(right, ctx)?;
    apply_binary(op, &l, &r).map_err(|reason| ApexError::evaluation(describe(expr), reason))
}

fn apply_binary(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, String> {
    use BinaryOperator::*;
    match op {
        Add => add(left, right),
        Subtract => numeric_op(left, right, "subtract", |a, b| a - b, |a, b| a - b),
        Multiply => numeric_op(left, right, "multiply", |a, b| a * b, |a, b| a * b),
        Divide => divide(left, right),
        LessThan => Ok(Value::Boolean(compare(left, right)?.is_lt())),
        LessThanOrEqual => Ok(Value::Boolean(compare(left, right)?.is_le())),
        GreaterThan => Ok(Value::Boolean(compare(left, right)?.is_gt())),
        GreaterThanOrEqual => Ok(Value::Boolean(compare(left, right)?.is_ge())),
        Equals => Ok(Value::Boolean(values_equal(left, right))),
        NotEquals => Ok(Value::Boolean(!values_equal(left, right))),
        And | Or => unreachable!("short-circuited above"),
    }
}

/// `+` is overloaded: numeric addition with float promotion, or string
/// concatenation the moment either side is a string (spec §4.1).
fn add(left: &Value, right: &Value) -> Result<Value, String> {
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", value_to_string(left), value_to_string(right))))
        }
        _ => numeric_op(left, right, "add", |a, b| a + b, |a, b| a + b),
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    verb: &str,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, String> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Ok(Value::Integer(int_op(*l, *r))),
        (Value::Float(l), Value::Float(r)) => Ok(Value::Float(float_op(*l, *r))),
        (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(float_op(*l as f64, *r))),
        (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(float_op(*l, *r as f64))),
        _ => Err(format!("cannot {verb} {} and {}", left.type_name(), right.type_name())),
    }
}

/// Integer division stays integer (truncating); a float operand promotes
/// the result to float. This follows §9's explicit promotion rule rather
/// than always widening to float.
fn divide(left: &Value, right: &Value) -> Result<Value, String> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => {
            if *r == 0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Integer(l / r))
        }
        (Value::Float(l), Value::Float(r)) => Ok(Value::Float(l / r)),
        (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(*l as f64 / r)),
        (Value::Float(l), Value::Integer(r)) => {
            if *r == 0 {
                return Err("division by zero".to_string());
            }
            Ok(Value::Float(l / *r as f64))
        }
        _ => Err(format!("cannot divide {} and {}", left.type_name(), right.type_name())),
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, String> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Ok(l.cmp(r)),
        (Value::Float(l), Value::Float(r)) => {
            l.partial_cmp(r).ok_or_else(|| "NaN is not orderable".to_string())
        }
        (Value::Integer(l), Value::Float(r)) => (*l as f64)
            .partial_cmp(r)
            .ok_or_else(|| "NaN is not orderable".to_string()),
        (Value::Float(l), Value::Integer(r)) => l
            .partial_cmp(&(*r as f64))
            .ok_or_else(|| "NaN is not orderable".to_string()),
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        (Value::Instant(l), Value::Instant(r)) => Ok(l.cmp(r)),
        _ => Err(format!("cannot compare {} and {}", left.type_name(), right.type_name())),
    }
}

/// `==` on two nulls is `true`; null compared to anything else is `false`
/// (spec §4.1).
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Integer(l), Value::Integer(r)) => l == r,
        (Value::Float(l), Value::Float(r)) => (l - r).abs() < f64::EPSILON,
        (Value::Integer(l), Value::Float(r)) => (*l as f64 - r).abs() < f64::EPSILON,
        (Value::Float(l), Value::Integer(r)) => (l - *r as f64).abs() < f64::EPSILON,
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::List(l), Value::List(r)) => l == r,
        (Value::Instant(l), Value::Instant(r)) => l == r,
        (Value::Record(l), Value::Record(r)) => l == r,
        _ => false,
    }
}

fn evaluate_unary(op: UnaryOperator, operand: &Value) -> Result<Value, String> {
    match op {
        UnaryOperator::Not => Ok(Value::Boolean(!operand.truthy())),
        UnaryOperator::Minus => match operand {
            Value::Integer(i) => Ok(Value::Integer(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            _ => Err(format!("cannot negate a {}", operand.type_name())),
        },
    }
}

pub(crate) fn value_to_string(value: &Value) -> String {
    value.to_string()
}

/// Method dispatch table keyed on `(value kind, method name)` (spec §4.1:
/// "a capability table on value kinds").
fn call_method(target: &Value, method: &str, args: &[Value]) -> Result<Value, String> {
    match target {
        Value::String(s) => call_string_method(s, method, args),
        Value::List(items) => call_list_method(items, method, args),
        Value::Record(record) => call_record_method(record, method, args),
        Value::Integer(_) | Value::Float(_) => call_numeric_method(target, method, args),
        _ => Err(format!("no methods defined on {}", target.type_name())),
    }
}

fn call_string_method(s: &str, method: &str, args: &[Value]) -> Result<Value, String> {
    match method {
        "toUpperCase" => Ok(Value::String(s.to_uppercase())),
        "toLowerCase" => Ok(Value::String(s.to_lowercase())),
        "trim" => Ok(Value::String(s.trim().to_string())),
        "length" => Ok(Value::Integer(s.chars().count() as i64)),
        "isEmpty" => Ok(Value::Boolean(s.is_empty())),
        "substring" => {
            let start = arg_usize(args, 0, "substring")?;
            let chars: Vec<char> = s.chars().collect();
            let end = match args.get(1) {
                Some(Value::Integer(i)) => (*i as usize).min(chars.len()),
                Some(_) => return Err("substring end must be an integer".to_string()),
                None => chars.len(),
            };
            if start > end || start > chars.len() {
                return Err("substring index out of bounds".to_string());
            }
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        "contains" => Ok(Value::Boolean(s.contains(&arg_string(args, 0, "contains")?))),
        "startsWith" => Ok(Value::Boolean(s.starts_with(&arg_string(args, 0, "startsWith")?))),
        "endsWith" => Ok(Value::Boolean(s.ends_with(&arg_string(args, 0, "endsWith")?))),
        "indexOf" => {
            let needle = arg_string(args, 0, "indexOf")?;
            Ok(Value::Integer(
                s.find(&needle).map(|b| s[..b].chars().count() as i64).unwrap_or(-1),
            ))
        }
        "matches" => {
            let pattern = arg_string(args, 0, "matches")?;
            let re = regex::Regex::new(&pattern).map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
            Ok(Value::Boolean(re.is_match(s)))
        }
        _ => Err(format!("unknown method 'String.{method}'")),
    }
}

fn call_list_method(items: &[Value], method: &str, args: &[Value]) -> Result<Value, String> {
    match method {
        "size" => Ok(Value::Integer(items.len() as i64)),
        "isEmpty" => Ok(Value::Boolean(items.is_empty())),
        "first" => Ok(items.first().cloned().unwrap_or(Value::Null)),
        "last" => Ok(items.last().cloned().unwrap_or(Value::Null)),
        "get" => {
            let idx = arg_usize(args, 0, "get")?;
            Ok(items.get(idx).cloned().unwrap_or(Value::Null))
        }
        "contains" => {
            let needle = args.first().ok_or("contains requires 1 argument")?;
            Ok(Value::Boolean(items.iter().any(|v| values_equal(v, needle))))
        }
        _ => Err(format!("unknown method 'List.{method}'")),
    }
}

fn call_record_method(record: &crate::value::Record, method: &str, args: &[Value]) -> Result<Value, String> {
    match method {
        "size" => Ok(Value::Integer(record.len() as i64)),
        "isEmpty" => Ok(Value::Boolean(record.is_empty())),
        "containsKey" => {
            let key = arg_string(args, 0, "containsKey")?;
            Ok(Value::Boolean(record.contains_key(&key)))
        }
        _ => Err(format!("unknown method 'Record.{method}'")),
    }
}

fn call_numeric_method(target: &Value, method: &str, _args: &[Value]) -> Result<Value, String> {
    match (target, method) {
        (Value::Integer(i), "abs") => Ok(Value::Integer(i.abs())),
        (Value::Float(f), "abs") => Ok(Value::Float(f.abs())),
        (Value::Float(f), "round") => Ok(Value::Integer(f.round() as i64)),
        (Value::Float(f), "floor") => Ok(Value::Integer(f.floor() as i64)),
        (Value::Float(f), "ceil") => Ok(Value::Integer(f.ceil() as i64)),
        _ => Err(format!("unknown method '{}.{method}'", target.type_name())),
    }
}

fn arg_string(args: &[Value], idx: usize, method: &str) -> Result<String, String> {
    args.get(idx)
        .map(value_to_string)
        .ok_or_else(|| format!("{method} requires an argument at position {idx}"))
}

fn arg_usize(args: &[Value], idx: usize, method: &str) -> Result<usize, String> {
    match args.get(idx) {
        Some(Value::Integer(i)) if *i >= 0 => Ok(*i as usize),
        Some(Value::Integer(_)) => Err(format!("{method} index must not be negative")),
        _ => Err(format!("{method} requires an integer argument at position {idx}")),
    }
}

/// The sandbox allow-list for `T(Type).method(args)` (spec §4.1: "a hard
/// sandboxing boundary").
fn call_static(type_path: &str, method: &str, args: &[Value]) -> Result<Value, String> {
    match (type_path, method) {
        ("String", "valueOf") => {
            let v = args.first().ok_or("String.valueOf requires 1 argument")?;
            Ok(Value::String(value_to_string(v)))
        }
        ("Integer", "valueOf") => {
            let v = args.first().ok_or("Integer.valueOf requires 1 argument")?;
            match v {
                Value::Integer(i) => Ok(Value::Integer(*i)),
                Value::Float(f) => Ok(Value::Integer(*f as i64)),
                Value::String(s) => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| format!("cannot parse '{s}' as Integer")),
                _ => Err(format!("cannot convert {} to Integer", v.type_name())),
            }
        }
        ("Double", "valueOf") => {
            let v = args.first().ok_or("Double.valueOf requires 1 argument")?;
            match v {
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Integer(i) => Ok(Value::Float(*i as f64)),
                Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| format!("cannot parse '{s}' as Double")),
                _ => Err(format!("cannot convert {} to Double", v.type_name())),
            }
        }
        ("Boolean", "valueOf") => {
            let v = args.first().ok_or("Boolean.valueOf requires 1 argument")?;
            Ok(Value::Boolean(v.truthy()))
        }
        _ => Err(format!("'T({type_path}).{method}' is not on the static-call allow-list")),
    }
}

/// A best-effort rendering of an expression for error messages — the
/// "offending sub-expression" the spec's `EvaluationError` must carry.
pub fn describe(expr: &Expression) -> String {
    match expr {
        Expression::Literal(v) => v.to_string(),
        Expression::Variable(name) => format!("#{name}"),
        Expression::Identifier(name) => name.clone(),
        Expression::Property { target, name, safe } => {
            format!("{}{}{name}", describe(target), if *safe { "?." } else { "." })
        }
        Expression::Index { target, index } => format!("{}[{}]", describe(target), describe(index)),
        Expression::MethodCall { target, method, args, safe } => format!(
            "{}{}{method}({})",
            describe(target),
            if *safe { "?." } else { "." },
            args.iter().map(describe).collect::<Vec<_>>().join(", ")
        ),
        Expression::StaticCall { type_path, method, args } => format!(
            "T({type_path}).{method}({})",
            args.iter().map(describe).collect::<Vec<_>>().join(", ")
        ),
        Expression::GlobalCall { name, args } => {
            format!("{name}({})", args.iter().map(describe).collect::<Vec<_>>().join(", "))
        }
        Expression::UnaryOp { operand, .. } => format!("!{}", describe(operand)),
        Expression::BinaryOp { op, left, right } => {
            format!("{} {} {}", describe(left), binary_op_symbol(*op), describe(right))
        }
        Expression::Conditional { condition, .. } => describe(condition),
    }
}

fn binary_op_symbol(op: BinaryOperator) -> &'static str {
    use BinaryOperator::*;
    match op {
        Add => "+",
        Subtract => "-",
        Multiply => "*",
        Divide => "/",
        LessThan => "<",
        LessThanOrEqual => "<=",
        GreaterThan => ">",
        GreaterThanOrEqual => ">=",
        Equals => "==",
        NotEquals => "!=",
        And => "&&",
        Or => "||",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::context::EvaluationStage;
    use crate::expr::parser::parse_complete;
    use crate::value::Record;

    fn eval_str(source: &str, root: &Record) -> ApexResult<Value> {
        let expr = parse_complete(source).expect("parses");
        let ctx = EvaluationContext::new(root, EvaluationStage::Rule);
        evaluate(&expr, &ctx)
    }

    #[test]
    fn property_chain_reads_nested_record() {
        let mut address = Record::new();
        address.insert("city".to_string(), Value::String("Lagos".to_string()));
        let mut root = Record::new();
        root.insert("address".to_string(), Value::Record(address));

        let result = eval_str("address.city", &root).unwrap();
        assert_eq!(result, Value::String("Lagos".to_string()));
    }

    #[test]
    fn null_dereference_without_safe_nav_errors() {
        let mut root = Record::new();
        root.insert("address".to_string(), Value::Null);
        let err = eval_str("address.city", &root).unwrap_err();
        assert!(matches!(err, ApexError::Evaluation { .. }));
    }

    #[test]
    fn safe_navigation_yields_null() {
        let mut root = Record::new();
        root.insert("address".to_string(), Value::Null);
        let result = eval_str("address?.city", &root).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn missing_key_reads_as_null_not_error() {
        let root = Record::new();
        let result = eval_str("nickname", &root).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn integer_division_stays_integer() {
        let root = Record::new();
        assert_eq!(eval_str("7 / 2", &root).unwrap(), Value::Integer(3));
        assert_eq!(eval_str("7.0 / 2", &root).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn division_by_zero_is_an_evaluation_error() {
        let root = Record::new();
        assert!(eval_str("1 / 0", &root).is_err());
    }

    #[test]
    fn null_equality_is_true_only_for_both_null() {
        let root = Record::new();
        assert_eq!(eval_str("null == null", &root).unwrap(), Value::Boolean(true));
        assert_eq!(eval_str("null == 1", &root).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn ternary_short_circuits_unused_branch() {
        let mut root = Record::new();
        root.insert("age".to_string(), Value::Integer(20));
        let result = eval_str("age >= 18 ? 'adult' : (1 / 0)", &root).unwrap();
        assert_eq!(result, Value::String("adult".to_string()));
    }

    #[test]
    fn string_concatenation_via_plus() {
        let root = Record::new();
        let result = eval_str("'hello ' + 'world'", &root).unwrap();
        assert_eq!(result, Value::String("hello world".to_string()));
    }

    #[test]
    fn method_call_dispatch() {
        let root = Record::new();
        assert_eq!(eval_str("'hello'.toUpperCase()", &root).unwrap(), Value::String("HELLO".to_string()));
        assert_eq!(eval_str("'  hi  '.trim()", &root).unwrap(), Value::String("hi".to_string()));
    }

    #[test]
    fn unknown_method_is_an_error() {
        let root = Record::new();
        assert!(eval_str("'hello'.bogus()", &root).is_err());
    }

    #[test]
    fn static_call_allow_list() {
        let root = Record::new();
        assert_eq!(eval_str("T(String).valueOf(42)", &root).unwrap(), Value::String("42".to_string()));
        assert!(eval_str("T(System).exit(0)", &root).is_err());
    }

    #[test]
    fn variable_shadows_root_property() {
        let mut root = Record::new();
        root.insert("x".to_string(), Value::Integer(1));
        let expr = parse_complete("#x").unwrap();
        let mut vars = std::collections::HashMap::new();
        vars.insert("x".to_string(), Value::Integer(99));
        let ctx = EvaluationContext::with_variables(&root, vars, EvaluationStage::Rule);
        assert_eq!(evaluate(&expr, &ctx).unwrap(), Value::Integer(99));
    }

    #[test]
    fn set_variable_mutates_context() {
        let root = Record::new();
        let expr = parse_complete("setVariable('total', 1 + 2)").unwrap();
        let ctx = EvaluationContext::new(&root, EvaluationStage::Enrichment);
        let result = evaluate(&expr, &ctx).unwrap();
        assert_eq!(result, Value::Integer(3));
        assert_eq!(ctx.get_variable("total"), Some(Value::Integer(3)));
    }

    #[test]
    fn determinism_same_expression_same_context_same_result() {
        let mut root = Record::new();
        root.insert("amount".to_string(), Value::Float(10.5));
        let expr = parse_complete("amount * 2").unwrap();
        let ctx = EvaluationContext::new(&root, EvaluationStage::Rule);
        let first = evaluate(&expr, &ctx).unwrap();
        let second = evaluate(&expr, &ctx).unwrap();
        assert_eq!(first, second);
    }
}
