//! SG-010: Deploy-time evaluation preview.
//!
//! Generation never evaluates conditions; the engine does. This module
//! mimics that step for a concrete parameter set so tests and `plan` can
//! see which resources exist and what each value becomes.

use super::error::{RefKind, Site, TemplateError};
use super::resolver;
use super::types::{BoolExpr, ParamType, Parameter, Pseudo, SubPart, Template, Value};
use indexmap::IndexMap;
use serde_json::Value as Json;

/// Parameter values supplied by the caller, by parameter name.
pub type Overrides = IndexMap<String, String>;

/// Whether a resource would exist, and why not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub logical_id: String,
    pub kind: String,
    /// The gating condition, if any
    pub condition: Option<String>,
    pub created: bool,
}

/// Conditions and resource decisions for one parameter set.
#[derive(Debug, Clone)]
pub struct Evaluation<'a> {
    template: &'a Template,
    parameters: IndexMap<String, Option<String>>,
    pub conditions: IndexMap<String, bool>,
    /// Every resource, in dependency order
    pub decisions: Vec<Decision>,
}

/// Bind parameters, evaluate every condition and decide every resource.
pub fn evaluate<'a>(template: &'a Template, overrides: &Overrides) -> Result<Evaluation<'a>, TemplateError> {
    for name in overrides.keys() {
        if !template.parameters.contains_key(name) {
            return Err(TemplateError::UnknownOverride(name.clone()));
        }
    }

    let mut parameters = IndexMap::new();
    for (name, param) in &template.parameters {
        let value = overrides.get(name).cloned().or_else(|| param.default.clone());
        if let Some(v) = &value {
            check_allowed(name, v, param)?;
        }
        parameters.insert(name.clone(), value);
    }

    let mut eval = Evaluation {
        template,
        parameters,
        conditions: IndexMap::new(),
        decisions: Vec::new(),
    };

    for (name, expr) in &template.conditions {
        let holds = eval.eval_bool(expr, name)?;
        tracing::debug!(condition = %name, holds, "evaluated condition");
        eval.conditions.insert(name.clone(), holds);
    }

    for id in resolver::build_order(template)? {
        let Some(resource) = template.resources.get(&id) else {
            continue;
        };
        let created = match &resource.condition {
            Some(cond) => eval.condition(cond, &Site::Resource(id.clone()))?,
            None => true,
        };
        eval.decisions.push(Decision {
            logical_id: id,
            kind: resource.kind.to_string(),
            condition: resource.condition.clone(),
            created,
        });
    }

    Ok(eval)
}

fn check_allowed(name: &str, value: &str, param: &Parameter) -> Result<(), TemplateError> {
    let disallowed = || TemplateError::DisallowedValue {
        param: name.to_string(),
        value: value.to_string(),
    };
    if !param.allowed_values.is_empty() && !param.allowed_values.iter().any(|a| a == value) {
        return Err(disallowed());
    }
    if param.param_type == ParamType::Number {
        let n: i64 = value.trim().parse().map_err(|_| disallowed())?;
        if param.min_value.is_some_and(|min| n < min) || param.max_value.is_some_and(|max| n > max) {
            return Err(disallowed());
        }
    }
    Ok(())
}

impl<'a> Evaluation<'a> {
    pub fn is_created(&self, logical_id: &str) -> bool {
        self.decisions
            .iter()
            .any(|d| d.logical_id == logical_id && d.created)
    }

    pub fn created(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| d.created)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(|d| !d.created)
    }

    /// A resource property as the engine would see it. `None` when the
    /// resource is skipped or the property resolves to `AWS::NoValue`.
    pub fn resource_property(&self, logical_id: &str, property: &str) -> Result<Option<Json>, TemplateError> {
        let Some(resource) = self.template.resources.get(logical_id) else {
            return Err(TemplateError::DanglingReference(logical_id.to_string()));
        };
        if !self.is_created(logical_id) {
            return Ok(None);
        }
        match resource.properties.get(property) {
            Some(value) => self.resolve(value),
            None => Ok(None),
        }
    }

    /// An output's value, or `None` when its condition is false.
    pub fn output(&self, name: &str) -> Result<Option<Json>, TemplateError> {
        let Some(output) = self.template.outputs.get(name) else {
            return Ok(None);
        };
        if let Some(cond) = &output.condition {
            if !self.condition(cond, &Site::Output(name.to_string()))? {
                return Ok(None);
            }
        }
        self.resolve(&output.value)
    }

    /// Resolve a value. Resource identifiers and pseudo parameters become
    /// `<LogicalId>`, `<LogicalId.Attribute>` and `<AWS::Region>`
    /// placeholders. Reading a resource that is not created is an error.
    pub fn resolve(&self, value: &Value) -> Result<Option<Json>, TemplateError> {
        let out = match value {
            Value::String(s) => Json::String(s.clone()),
            Value::Number(n) => Json::from(*n),
            Value::Bool(b) => Json::Bool(*b),
            Value::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(v) = self.resolve(item)? {
                        out.push(v);
                    }
                }
                Json::Array(out)
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    if let Some(v) = self.resolve(v)? {
                        out.insert(k.clone(), v);
                    }
                }
                Json::Object(out)
            }
            Value::Param(name) => Json::String(self.param(name)?.to_string()),
            Value::Ref(id) => Json::String(self.resource_token(id, None)?),
            Value::GetAtt {
                resource,
                attribute,
            } => Json::String(self.resource_token(resource, Some(attribute))?),
            Value::Pseudo(p) => Json::String(pseudo_token(*p)),
            Value::Sub(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        SubPart::Text(t) => out.push_str(t),
                        SubPart::Param(name) => out.push_str(self.param(name)?),
                        SubPart::Ref(id) => out.push_str(&self.resource_token(id, None)?),
                        SubPart::Attr {
                            resource,
                            attribute,
                        } => out.push_str(&self.resource_token(resource, Some(attribute))?),
                        SubPart::Pseudo(p) => out.push_str(&pseudo_token(*p)),
                    }
                }
                Json::String(out)
            }
            Value::SubWith { template, vars } => {
                let mut out = template.clone();
                for (name, v) in vars {
                    let text = match self.resolve(v)? {
                        Some(Json::String(s)) => s,
                        Some(other) => other.to_string(),
                        None => String::new(),
                    };
                    out = out.replace(&format!("${{{}}}", name), &text);
                }
                Json::String(out)
            }
            Value::Split { delimiter, source } => match self.resolve(source)? {
                Some(Json::String(s)) => Json::Array(
                    s.split(delimiter.as_str())
                        .map(|piece| Json::String(piece.to_string()))
                        .collect(),
                ),
                _ => {
                    return Err(TemplateError::InvalidExpression {
                        site: "Fn::Split".to_string(),
                        detail: "source does not resolve to a string".to_string(),
                    })
                }
            },
            Value::If {
                condition,
                then,
                otherwise,
            } => {
                let site = Site::Condition(condition.clone());
                return if self.condition(condition, &site)? {
                    self.resolve(then)
                } else {
                    self.resolve(otherwise)
                };
            }
            Value::Absent => return Ok(None),
        };
        Ok(Some(out))
    }

    fn param(&self, name: &str) -> Result<&str, TemplateError> {
        match self.parameters.get(name) {
            Some(Some(v)) => Ok(v),
            Some(None) => Err(TemplateError::MissingParameterValue(name.to_string())),
            None => Err(TemplateError::UnknownReference {
                kind: RefKind::Parameter,
                name: name.to_string(),
                site: Site::Condition("<evaluation>".to_string()),
            }),
        }
    }

    fn condition(&self, name: &str, site: &Site) -> Result<bool, TemplateError> {
        self.conditions
            .get(name)
            .copied()
            .ok_or_else(|| TemplateError::UnknownReference {
                kind: RefKind::Condition,
                name: name.to_string(),
                site: site.clone(),
            })
    }

    fn resource_token(&self, id: &str, attribute: Option<&str>) -> Result<String, TemplateError> {
        if !self.is_created(id) {
            return Err(TemplateError::DanglingReference(id.to_string()));
        }
        Ok(match attribute {
            Some(attr) => format!("<{}.{}>", id, attr),
            None => format!("<{}>", id),
        })
    }

    fn eval_bool(&self, expr: &BoolExpr, owner: &str) -> Result<bool, TemplateError> {
        Ok(match expr {
            BoolExpr::Equals { param, literal } => self.param(param)? == literal,
            BoolExpr::Not(inner) => !self.eval_bool(inner, owner)?,
            BoolExpr::Or(items) => {
                let mut any = false;
                for item in items {
                    any |= self.eval_bool(item, owner)?;
                }
                any
            }
            BoolExpr::And(items) => {
                let mut all = true;
                for item in items {
                    all &= self.eval_bool(item, owner)?;
                }
                all
            }
            BoolExpr::Condition(name) => self.condition(name, &Site::Condition(owner.to_string()))?,
        })
    }
}

fn pseudo_token(p: Pseudo) -> String {
    format!("<{}>", p.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::{ResourceSpec, TemplateBuilder};
    use crate::core::conditions::{self, Sentinel};
    use crate::core::types::{ResourceKind, Sub};

    fn vpc_template() -> Template {
        let mut b = TemplateBuilder::new("eval");
        let vpc = b
            .add_parameter(Parameter::string("VPC").default(Sentinel::Unset))
            .unwrap();
        let subnets = b
            .add_parameter(Parameter::string("Subnets").default(Sentinel::Unset))
            .unwrap();
        let has_vpc = b
            .define_condition("HasVPC", conditions::is_supplied(&vpc, Sentinel::Unset))
            .unwrap();
        let project = b
            .declare_resource(
            "CodeBuild",
            ResourceSpec::new(ResourceKind::CodeBuildProject).prop(
                "VpcConfig",
                Value::optional(
                    &has_vpc,
                    Value::object([
                        ("VpcId", vpc.value()),
                        ("Subnets", Value::split(",", subnets.value())),
                    ]),
                ),
            ),
        )
        .unwrap();
        b.expose_output(
            "Name",
            Sub::new().pseudo(Pseudo::StackName).text("-").resource(&project),
        )
        .unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn test_eval_defaults_drop_optional() {
        let t = vpc_template();
        let e = evaluate(&t, &Overrides::new()).unwrap();
        assert!(!e.conditions["HasVPC"]);
        assert_eq!(e.resource_property("CodeBuild", "VpcConfig").unwrap(), None);
        assert_eq!(
            e.output("Name").unwrap(),
            Some(Json::String("<AWS::StackName>-<CodeBuild>".into()))
        );
    }

    #[test]
    fn test_eval_override_fills_optional() {
        let t = vpc_template();
        let mut o = Overrides::new();
        o.insert("VPC".into(), "vpc-1".into());
        o.insert("Subnets".into(), "a,b".into());
        let e = evaluate(&t, &o).unwrap();
        assert_eq!(
            e.resource_property("CodeBuild", "VpcConfig").unwrap(),
            Some(serde_json::json!({"VpcId": "vpc-1", "Subnets": ["a", "b"]}))
        );
    }

    #[test]
    fn test_eval_unknown_override() {
        let t = vpc_template();
        let mut o = Overrides::new();
        o.insert("Nope".into(), "x".into());
        assert_eq!(
            evaluate(&t, &o).unwrap_err(),
            TemplateError::UnknownOverride("Nope".into())
        );
    }

    #[test]
    fn test_eval_allowed_values_and_bounds() {
        let mut b = TemplateBuilder::new("eval");
        b.add_parameter(Parameter::string("UseChecks").allowed(&["true", "false"]).default("true"))
            .unwrap();
        b.add_parameter(Parameter::number("Wait").default(30).min(10).max(120))
            .unwrap();
        let t = b.finish().unwrap();

        let mut o = Overrides::new();
        o.insert("UseChecks".into(), "maybe".into());
        assert!(matches!(
            evaluate(&t, &o),
            Err(TemplateError::DisallowedValue { .. })
        ));

        let mut o = Overrides::new();
        o.insert("Wait".into(), "5".into());
        assert!(matches!(
            evaluate(&t, &o),
            Err(TemplateError::DisallowedValue { .. })
        ));

        let mut o = Overrides::new();
        o.insert("Wait".into(), "60".into());
        assert!(evaluate(&t, &o).is_ok());
    }

    #[test]
    fn test_eval_missing_value_only_when_read() {
        let mut b = TemplateBuilder::new("eval");
        let url = b.add_parameter(Parameter::string("BaseUrl")).unwrap();
        b.add_parameter(Parameter::string("Unused")).unwrap();
        b.expose_output("Url", url.value()).unwrap();
        let t = b.finish().unwrap();

        let e = evaluate(&t, &Overrides::new()).unwrap();
        assert_eq!(
            e.output("Url").unwrap_err(),
            TemplateError::MissingParameterValue("BaseUrl".into())
        );
    }

    #[test]
    fn test_eval_sub_with_binds_vars() {
        let mut b = TemplateBuilder::new("eval");
        let f = b
            .declare_resource("StepLambda", ResourceSpec::new(ResourceKind::LambdaFunction))
            .unwrap();
        b.expose_output(
            "Definition",
            Value::sub_with(r#"{"Resource":"${StepLambdaArn}"}"#, [("StepLambdaArn", f.arn())]),
        )
        .unwrap();
        let t = b.finish().unwrap();
        let e = evaluate(&t, &Overrides::new()).unwrap();
        assert_eq!(
            e.output("Definition").unwrap(),
            Some(Json::String(r#"{"Resource":"<StepLambda.Arn>"}"#.into()))
        );
    }
}
