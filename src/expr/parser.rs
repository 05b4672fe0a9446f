//! A small recursive-descent expression parser (spec §4.1, §9), built with
//! `nom` in the same combinator style as the lineage's `parser.rs`: a `ws`
//! wrapper, `alt`/`tuple`/`many0`-with-fold for left-associative binary
//! levels, and dedicated primary parsers per literal kind. The grammar is
//! narrower than the lineage's (no bespoke workflow verbs) but adds the
//! postfix chain — property access, safe navigation, indexing, method
//! calls — the embedded language actually needs.

use super::ast::{BinaryOperator, Expression, UnaryOperator};
use crate::value::Value;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{eof, map, map_res, not, opt, recognize, value},
    error::Error as NomError,
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Err as NomErr, IResult,
};

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Identifier with no dots — property/method/variable names.
fn parse_ident_raw(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        String::from,
    )(input)
}

/// A dotted path, e.g. `java.lang.String` — only used inside `T(...)`.
fn parse_dotted_path(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_"), tag(".")))),
        )),
        String::from,
    )(input)
}

fn parse_number(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, opt(pair(char('.'), digit1))))),
        |s: &str| -> Result<Value, std::num::ParseFloatError> {
            if s.contains('.') {
                s.parse::<f64>().map(Value::Float)
            } else {
                match s.parse::<i64>() {
                    Ok(i) => Ok(Value::Integer(i)),
                    Err(_) => s.parse::<f64>().map(Value::Float),
                }
            }
        },
    )(input)
}

/// Single-quoted string literals only (spec §4.1).
fn parse_string_literal(input: &str) -> IResult<&str, Value> {
    map(
        delimited(
            char('\''),
            many0(alt((
                map(tag("\\'"), |_| '\''),
                map(tag("\\\\"), |_| '\\'),
                map(tag("\\n"), |_| '\n'),
                map(none_of("'\\"), |c| c),
            ))),
            char('\''),
        ),
        |chars: Vec<char>| Value::String(chars.into_iter().collect()),
    )(input)
}

/// Keywords (`true`/`false`/`null`) must not be prefixes of a longer
/// identifier — `nullable`, `trueCount`, `falseAlarm` are property names,
/// not `null`/`true`/`false` followed by garbage. Require the next
/// character (if any) to not continue an identifier.
fn keyword_boundary(input: &str) -> IResult<&str, ()> {
    not(alt((alphanumeric1, tag("_"))))(input)
}

fn parse_bool(input: &str) -> IResult<&str, Value> {
    alt((
        value(Value::Boolean(true), terminated(tag("true"), keyword_boundary)),
        value(Value::Boolean(false), terminated(tag("false"), keyword_boundary)),
    ))(input)
}

fn parse_null(input: &str) -> IResult<&str, Value> {
    value(Value::Null, terminated(tag("null"), keyword_boundary))(input)
}

fn parse_variable(input: &str) -> IResult<&str, Expression> {
    map(preceded(char('#'), parse_ident_raw), Expression::Variable)(input)
}

fn parse_args(input: &str) -> IResult<&str, Vec<Expression>> {
    delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), parse_expression),
        ws(char(')')),
    )(input)
}

/// `T(Type.Path).method(args)` — the hard sandboxing boundary (§4.1); the
/// allow-list itself is enforced at evaluation time, not here.
fn parse_static_call(input: &str) -> IResult<&str, Expression> {
    map(
        tuple((
            tag("T"),
            ws(char('(')),
            parse_dotted_path,
            ws(char(')')),
            ws(char('.')),
            parse_ident_raw,
            parse_args,
        )),
        |(_, _, type_path, _, _, method, args)| Expression::StaticCall {
            type_path,
            method,
            args,
        },
    )(input)
}

fn parse_primary(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        parse_static_call,
        map(parse_number, Expression::Literal),
        map(parse_string_literal, Expression::Literal),
        map(parse_bool, Expression::Literal),
        map(parse_null, Expression::Literal),
        parse_variable,
        delimited(ws(char('(')), parse_expression, ws(char(')'))),
        map(pair(parse_ident_raw, parse_args), |(name, args)| Expression::GlobalCall { name, args }),
        map(parse_ident_raw, Expression::Identifier),
    )))(input)
}

enum Suffix {
    Property { name: String, safe: bool },
    Method { name: String, args: Vec<Expression>, safe: bool },
    Index(Expression),
}

fn parse_suffix(input: &str) -> IResult<&str, Suffix> {
    alt((
        map(
            preceded(tag("?."), pair(parse_ident_raw, opt(parse_args))),
            |(name, args)| match args {
                Some(args) => Suffix::Method { name, args, safe: true },
                None => Suffix::Property { name, safe: true },
            },
        ),
        map(
            preceded(char('.'), pair(parse_ident_raw, opt(parse_args))),
            |(name, args)| match args {
                Some(args) => Suffix::Method { name, args, safe: false },
                None => Suffix::Property { name, safe: false },
            },
        ),
        map(
            delimited(ws(char('[')), parse_expression, ws(char(']'))),
            Suffix::Index,
        ),
    ))(input)
}

fn apply_suffix(base: Expression, suffix: Suffix) -> Expression {
    match suffix {
        Suffix::Property { name, safe } => Expression::Property {
            target: Box::new(base),
            name,
            safe,
        },
        Suffix::Method { name, args, safe } => Expression::MethodCall {
            target: Box::new(base),
            method: name,
            args,
            safe,
        },
        Suffix::Index(index) => Expression::Index {
            target: Box::new(base),
            index: Box::new(index),
        },
    }
}

fn parse_postfix(input: &str) -> IResult<&str, Expression> {
    let (input, base) = parse_primary(input)?;
    let (input, suffixes) = many0(parse_suffix)(input)?;
    Ok((input, suffixes.into_iter().fold(base, apply_suffix)))
}

fn parse_unary(input: &str) -> IResult<&str, Expression> {
    alt((
        map(preceded(ws(char('!')), parse_unary), |operand| Expression::UnaryOp {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        }),
        map(preceded(ws(char('-')), parse_unary), |operand| Expression::UnaryOp {
            op: UnaryOperator::Minus,
            operand: Box::new(operand),
        }),
        parse_postfix,
    ))(input)
}

fn fold_binary<'a>(
    input: &'a str,
    mut next: impl FnMut(&'a str) -> IResult<&'a str, Expression>,
    ops: &[(&'static str, BinaryOperator)],
) -> IResult<&'a str, Expression> {
    let (mut input, mut left) = next(input)?;
    loop {
        let mut matched = None;
        for (tok, op) in ops {
            if let Ok((rest, _)) = ws::<_, &str>(tag(*tok))(input) {
                matched = Some((rest, *op));
                break;
            }
        }
        match matched {
            Some((rest, op)) => {
                let (rest, right) = next(rest)?;
                left = Expression::BinaryOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
                input = rest;
            }
            None => break,
        }
    }
    Ok((input, left))
}

fn parse_multiplicative(input: &str) -> IResult<&str, Expression> {
    fold_binary(
        input,
        parse_unary,
        &[("*", BinaryOperator::Multiply), ("/", BinaryOperator::Divide)],
    )
}

fn parse_additive(input: &str) -> IResult<&str, Expression> {
    fold_binary(
        input,
        parse_multiplicative,
        &[("+", BinaryOperator::Add), ("-", BinaryOperator::Subtract)],
    )
}

fn parse_relational(input: &str) -> IResult<&str, Expression> {
    fold_binary(
        input,
        parse_additive,
        &[
            ("<=", BinaryOperator::LessThanOrEqual),
            (">=", BinaryOperator::GreaterThanOrEqual),
            ("<", BinaryOperator::LessThan),
            (">", BinaryOperator::GreaterThan),
        ],
    )
}

fn parse_equality(input: &str) -> IResult<&str, Expression> {
    fold_binary(
        input,
        parse_relational,
        &[("==", BinaryOperator::Equals), ("!=", BinaryOperator::NotEquals)],
    )
}

fn parse_logical_and(input: &str) -> IResult<&str, Expression> {
    fold_binary(input, parse_equality, &[("&&", BinaryOperator::And)])
}

fn parse_logical_or(input: &str) -> IResult<&str, Expression> {
    fold_binary(input, parse_logical_and, &[("||", BinaryOperator::Or)])
}

fn parse_conditional(input: &str) -> IResult<&str, Expression> {
    let (input, cond) = parse_logical_or(input)?;
    match ws::<_, &str>(char('?'))(input) {
        Ok((input, _)) => {
            let (input, then_expr) = parse_expression(input)?;
            let (input, _) = ws(char(':'))(input)?;
            let (input, else_expr) = parse_expression(input)?;
            Ok((
                input,
                Expression::Conditional {
                    condition: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
            ))
        }
        Err(_) => Ok((input, cond)),
    }
}

pub fn parse_expression(input: &str) -> IResult<&str, Expression> {
    parse_conditional(input)
}

/// Parses a complete expression, requiring the whole input to be consumed.
pub fn parse_complete(input: &str) -> Result<Expression, String> {
    let (rest, expr) = parse_expression(input).map_err(|e| e.to_string())?;
    let (rest, _) = multispace0::<_, NomError<&str>>(rest).map_err(|e: NomErr<_>| e.to_string())?;
    eof::<_, NomError<&str>>(rest)
        .map_err(|_: NomErr<_>| format!("unexpected trailing input: '{rest}'"))?;
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals() {
        assert!(parse_complete("42").is_ok());
        assert!(parse_complete("3.14").is_ok());
        assert!(parse_complete("'hello'").is_ok());
        assert!(parse_complete("true").is_ok());
        assert!(parse_complete("null").is_ok());
    }

    #[test]
    fn keyword_prefixed_identifiers_parse_as_identifiers_not_literals() {
        assert_eq!(parse_complete("nullable").unwrap(), Expression::Identifier("nullable".to_string()));
        assert_eq!(parse_complete("trueCount").unwrap(), Expression::Identifier("trueCount".to_string()));
        assert_eq!(parse_complete("falseAlarm").unwrap(), Expression::Identifier("falseAlarm".to_string()));
        assert_eq!(parse_complete("null_checked").unwrap(), Expression::Identifier("null_checked".to_string()));
        let expr = parse_complete("nullable == false").unwrap();
        assert!(matches!(expr, Expression::BinaryOp { op: BinaryOperator::Equals, .. }));
    }

    #[test]
    fn parses_variable_and_property_chain() {
        let expr = parse_complete("#customer.address.city").unwrap();
        match expr {
            Expression::Property { name, safe, .. } => {
                assert_eq!(name, "city");
                assert!(!safe);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_safe_navigation() {
        let expr = parse_complete("a?.b").unwrap();
        match expr {
            Expression::Property { safe, .. } => assert!(safe),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_index_and_method_call() {
        assert!(parse_complete("a['name']").is_ok());
        assert!(parse_complete("a.b.toUpperCase()").is_ok());
        assert!(parse_complete("s.substring(0, 3)").is_ok());
    }

    #[test]
    fn parses_ternary() {
        let expr = parse_complete("#age >= 18 ? 'adult' : 'minor'").unwrap();
        assert!(matches!(expr, Expression::Conditional { .. }));
    }

    #[test]
    fn parses_static_call() {
        let expr = parse_complete("T(String).valueOf(#amount)").unwrap();
        match expr {
            Expression::StaticCall { type_path, method, .. } => {
                assert_eq!(type_path, "String");
                assert_eq!(method, "valueOf");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn operator_precedence_matches_arithmetic() {
        let expr = parse_complete("1 + 2 * 3").unwrap();
        match expr {
            Expression::BinaryOp { op: BinaryOperator::Add, right, .. } => {
                assert!(matches!(*right, Expression::BinaryOp { op: BinaryOperator::Multiply, .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_expressions() {
        assert!(parse_complete("").is_err());
        assert!(parse_complete("1 +").is_err());
        assert!(parse_complete("(((").is_err());
        assert!(parse_complete("'unclosed").is_err());
    }
}
