//! Condition evaluator: a small typed expression language sandboxed
//! over a bound parameter context, used to gate conditional tuples.

mod eval;
mod parser;
pub mod value;

use std::collections::HashMap;

use thiserror::Error;

use crate::schema::ConditionDefinition;
pub use value::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConditionError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("undefined identifier '{0}'")]
    UndefinedIdentifier(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unsupported operator '{op}' for {left} and {right}")]
    UnsupportedOperator {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

/// Evaluates `def.expression` against `context`, coercing each declared
/// parameter from the raw JSON context value per `def.parameters` before
/// binding it. Returns a plain `bool`; any error is the caller's
/// to interpret, folded into "tuple does not grant" by the check evaluator.
pub fn evaluate(
    def: &ConditionDefinition,
    context: &HashMap<String, serde_json::Value>,
) -> Result<bool, ConditionError> {
    let expr = parser::parse(&def.expression)?;

    let mut bindings = HashMap::with_capacity(def.parameters.len());
    for (name, param_type) in &def.parameters {
        let Some(raw) = context.get(name) else {
            // Parameters absent from the context are simply unbound;
            // referencing them in the expression is an undefined-identifier
            // error at evaluation time, not a binding-time error, so that
            // expressions which don't reference every declared parameter
            // still evaluate.
            continue;
        };
        bindings.insert(name.clone(), Value::coerce(raw, *param_type)?);
    }

    eval::eval(&expr, &bindings)?.as_bool()
}
