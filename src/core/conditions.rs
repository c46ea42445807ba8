//! SG-004: Condition algebra over sentinel parameters.
//!
//! Everything here is pure: expressions are only registered when handed to
//! `TemplateBuilder::define_condition`.

use super::error::TemplateError;
use super::types::{BoolExpr, ConditionRef, ParamRef};
use std::fmt;

/// Maximum operands the engine accepts in a single `Fn::Or` / `Fn::And`.
pub const MAX_OPERANDS: usize = 10;

/// Reserved parameter values with out-of-band meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Optional input left empty
    Unset,
    /// Create the resource instead of reusing one
    Create,
    /// Use the generated default
    Default,
    /// Mandatory only on the create branch
    RequiredIfCreate,
}

impl Sentinel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "-NONE-",
            Self::Create => "-CREATE-",
            Self::Default => "-DEFAULT-",
            Self::RequiredIfCreate => "-REQUIRED-IF-CREATE-",
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Fn::Equals [Ref param, literal]`
pub fn equals(param: &ParamRef, literal: &str) -> BoolExpr {
    BoolExpr::Equals {
        param: param.name().to_string(),
        literal: literal.to_string(),
    }
}

pub fn equals_sentinel(param: &ParamRef, sentinel: Sentinel) -> BoolExpr {
    equals(param, sentinel.as_str())
}

/// True when the caller supplied a real value instead of the sentinel.
pub fn is_supplied(param: &ParamRef, sentinel: Sentinel) -> BoolExpr {
    negate(equals_sentinel(param, sentinel))
}

pub fn not_equal(param: &ParamRef, literal: &str) -> BoolExpr {
    negate(equals(param, literal))
}

pub fn negate(expr: BoolExpr) -> BoolExpr {
    BoolExpr::Not(Box::new(expr))
}

/// Reference a named condition from inside another expression.
pub fn holds(condition: &ConditionRef) -> BoolExpr {
    BoolExpr::Condition(condition.name().to_string())
}

/// Disjunction. One operand is returned as-is; more than ten nest.
pub fn any_of(operands: Vec<BoolExpr>) -> Result<BoolExpr, TemplateError> {
    group("Fn::Or", operands, BoolExpr::Or)
}

/// Conjunction. One operand is returned as-is; more than ten nest.
pub fn all_of(operands: Vec<BoolExpr>) -> Result<BoolExpr, TemplateError> {
    group("Fn::And", operands, BoolExpr::And)
}

fn group(
    op: &str,
    mut operands: Vec<BoolExpr>,
    make: fn(Vec<BoolExpr>) -> BoolExpr,
) -> Result<BoolExpr, TemplateError> {
    if operands.is_empty() {
        return Err(TemplateError::InvalidExpression {
            site: op.to_string(),
            detail: "needs at least one operand".to_string(),
        });
    }

    // Fold into chunks of at most MAX_OPERANDS until one level fits.
    while operands.len() > MAX_OPERANDS {
        let mut folded = Vec::with_capacity(operands.len().div_ceil(MAX_OPERANDS));
        let mut rest = operands.into_iter().peekable();
        while rest.peek().is_some() {
            let mut chunk: Vec<BoolExpr> = rest.by_ref().take(MAX_OPERANDS).collect();
            if chunk.len() == 1 {
                folded.append(&mut chunk);
            } else {
                folded.push(make(chunk));
            }
        }
        operands = folded;
    }

    if operands.len() == 1 {
        if let Some(only) = operands.pop() {
            return Ok(only);
        }
    }
    Ok(make(operands))
}
