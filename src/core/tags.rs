//! SG-006: Fixed-budget optional tag list.
//!
//! The engine has no loops, so a variable-length list is expressed as a
//! fixed number of slots, each dropped with `AWS::NoValue` when unset.

use super::builder::TemplateBuilder;
use super::conditions::{self, Sentinel};
use super::error::TemplateError;
use super::types::{Parameter, Value};

/// Number of tag slots the stacks declare.
pub const TAG_BUDGET: usize = 10;

pub fn name_param(slot: usize) -> String {
    format!("Tag{}Name", slot)
}

pub fn value_param(slot: usize) -> String {
    format!("Tag{}Value", slot)
}

pub fn slot_condition(slot: usize) -> String {
    format!("HasTag{}", slot)
}

pub const ANY_TAG_CONDITION: &str = "HasTags";

/// Declare `budget` tag slots and return the list value to attach as a
/// resource's `Tags` property. Slot `k` renders only when both
/// `Tag{k}Name` and `Tag{k}Value` are set; the whole list is dropped when
/// no slot is.
pub fn build_tag_list(builder: &mut TemplateBuilder, budget: usize) -> Result<Value, TemplateError> {
    if budget == 0 {
        return Err(TemplateError::InvalidTagBudget(budget));
    }

    let mut slots = Vec::with_capacity(budget);
    let mut entries = Vec::with_capacity(budget);
    for k in 1..=budget {
        let name = builder.add_parameter(
            Parameter::string(&name_param(k)).default(Sentinel::Unset),
        )?;
        let value = builder.add_parameter(
            Parameter::string(&value_param(k)).default(Sentinel::Unset),
        )?;

        let has_tag = builder.define_condition(
            &slot_condition(k),
            conditions::negate(conditions::any_of(vec![
                conditions::equals_sentinel(&name, Sentinel::Unset),
                conditions::equals_sentinel(&value, Sentinel::Unset),
            ])?),
        )?;

        entries.push(Value::optional(
            &has_tag,
            Value::object([("Key", name.value()), ("Value", value.value())]),
        ));
        slots.push(conditions::holds(&has_tag));
    }

    let any = builder.define_condition(ANY_TAG_CONDITION, conditions::any_of(slots)?)?;
    tracing::debug!(budget, "tag list declared");
    Ok(Value::optional(&any, Value::List(entries)))
}
