//! Evaluates a parsed condition `Expr` against a bound parameter context.

use std::collections::HashMap;

use super::parser::Expr;
use super::value::Value;
use super::ConditionError;

pub fn eval(expr: &Expr, bindings: &HashMap<String, Value>) -> Result<Value, ConditionError> {
    match expr {
        Expr::BoolLit(b) => Ok(Value::Bool(*b)),
        Expr::IntLit(n) => Ok(Value::Int(*n)),
        Expr::DoubleLit(d) => Ok(Value::Double(*d)),
        Expr::StrLit(s) => Ok(Value::String(s.clone())),
        Expr::ListLit(items) => {
            let values = items
                .iter()
                .map(|item| eval(item, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(values))
        }
        Expr::Ident(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| ConditionError::UndefinedIdentifier(name.clone())),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, bindings)?.as_bool()?)),
        Expr::And(lhs, rhs) => {
            // Short-circuit: standard boolean semantics, and conditions
            // have no side effects beyond identifier lookups.
            if !eval(lhs, bindings)?.as_bool()? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, bindings)?.as_bool()?))
        }
        Expr::Or(lhs, rhs) => {
            if eval(lhs, bindings)?.as_bool()? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, bindings)?.as_bool()?))
        }
        Expr::Eq(lhs, rhs) => Ok(Value::Bool(eval(lhs, bindings)? == eval(rhs, bindings)?)),
        Expr::NotEq(lhs, rhs) => Ok(Value::Bool(eval(lhs, bindings)? != eval(rhs, bindings)?)),
        Expr::Lt(lhs, rhs) => compare(lhs, rhs, bindings, |o| o.is_lt()),
        Expr::Le(lhs, rhs) => compare(lhs, rhs, bindings, |o| o.is_le()),
        Expr::Gt(lhs, rhs) => compare(lhs, rhs, bindings, |o| o.is_gt()),
        Expr::Ge(lhs, rhs) => compare(lhs, rhs, bindings, |o| o.is_ge()),
        Expr::In(lhs, rhs) => {
            let needle = eval(lhs, bindings)?;
            let haystack = eval(rhs, bindings)?;
            match haystack {
                Value::List(items) => Ok(Value::Bool(items.contains(&needle))),
                other => Err(ConditionError::UnsupportedOperator {
                    op: "in",
                    left: needle.type_name(),
                    right: other.type_name(),
                }),
            }
        }
        Expr::Add(lhs, rhs) => {
            let a = eval(lhs, bindings)?;
            let b = eval(rhs, bindings)?;
            match (a, b) {
                (Value::Timestamp(t), Value::Duration(d)) => Ok(Value::Timestamp(t + d)),
                (Value::Duration(d), Value::Timestamp(t)) => Ok(Value::Timestamp(t + d)),
                (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
                (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
                (a, b) => Err(ConditionError::UnsupportedOperator {
                    op: "+",
                    left: a.type_name(),
                    right: b.type_name(),
                }),
            }
        }
    }
}

fn compare(
    lhs: &Expr,
    rhs: &Expr,
    bindings: &HashMap<String, Value>,
    matches: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, ConditionError> {
    let a = eval(lhs, bindings)?;
    let b = eval(rhs, bindings)?;
    Ok(Value::Bool(matches(a.partial_cmp_checked(&b)?)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::parser::parse;
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn list_membership_true() {
        let expr = parse("subresource in subresources").unwrap();
        let b = bindings(&[
            ("subresource", Value::String("dashboard".into())),
            (
                "subresources",
                Value::List(vec![
                    Value::String("dashboard".into()),
                    Value::String("library-panel".into()),
                ]),
            ),
        ]);
        assert_eq!(eval(&expr, &b).unwrap(), Value::Bool(true));
    }

    #[test]
    fn list_membership_false() {
        let expr = parse("subresource in subresources").unwrap();
        let b = bindings(&[
            ("subresource", Value::String("alert-rule".into())),
            (
                "subresources",
                Value::List(vec![Value::String("dashboard".into())]),
            ),
        ]);
        assert_eq!(eval(&expr, &b).unwrap(), Value::Bool(false));
    }

    #[test]
    fn undefined_identifier_is_an_error() {
        let expr = parse("missing == true").unwrap();
        assert!(eval(&expr, &HashMap::new()).is_err());
    }

    #[test]
    fn numeric_ordering() {
        let expr = parse("age >= 18").unwrap();
        let b = bindings(&[("age", Value::Int(21))]);
        assert_eq!(eval(&expr, &b).unwrap(), Value::Bool(true));
    }
}
