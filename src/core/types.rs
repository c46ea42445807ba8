//! SG-001: Template data model: parameters, conditions, conditional values,
//! resources and outputs.
//!
//! Everything is insertion-ordered so that regenerating a template with the
//! same inputs yields byte-identical output. Serialization produces the
//! CloudFormation long-form intrinsic function syntax.

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;

pub const FORMAT_VERSION: &str = "2010-09-09";

// ============================================================================
// Handles
// ============================================================================

/// Handle to a declared parameter. Only the builder hands these out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamRef {
    name: String,
}

impl ParamRef {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `{"Ref": <param>}`
    pub fn value(&self) -> Value {
        Value::Param(self.name.clone())
    }
}

/// Handle to a declared, named condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionRef {
    name: String,
}

impl ConditionRef {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Handle to a declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    logical_id: String,
    kind: ResourceKind,
}

impl ResourceRef {
    pub(crate) fn new(logical_id: &str, kind: ResourceKind) -> Self {
        Self {
            logical_id: logical_id.to_string(),
            kind,
        }
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// `{"Ref": <resource>}`
    pub fn reference(&self) -> Value {
        Value::Ref(self.logical_id.clone())
    }

    /// `{"Fn::GetAtt": [<resource>, <attribute>]}`
    pub fn attr(&self, attribute: &str) -> Value {
        Value::GetAtt {
            resource: self.logical_id.clone(),
            attribute: attribute.to_string(),
        }
    }

    pub fn arn(&self) -> Value {
        self.attr("Arn")
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParamType {
    String,
    Number,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "String"),
            Self::Number => write!(f, "Number"),
        }
    }
}

/// A typed template input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(skip)]
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Type")]
    pub param_type: ParamType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
}

impl Parameter {
    fn new(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            param_type,
            default: None,
            allowed_values: Vec::new(),
            min_value: None,
            max_value: None,
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, ParamType::String)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, ParamType::Number)
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    pub fn default(mut self, value: impl fmt::Display) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn allowed(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn min(mut self, value: i64) -> Self {
        self.min_value = Some(value);
        self
    }

    pub fn max(mut self, value: i64) -> Self {
        self.max_value = Some(value);
        self
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Boolean expression evaluated by the provisioning engine at deploy time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolExpr {
    Equals { param: String, literal: String },
    Not(Box<BoolExpr>),
    Or(Vec<BoolExpr>),
    And(Vec<BoolExpr>),
    /// Reference to another named condition.
    Condition(String),
}

impl BoolExpr {
    /// Parameter names read by this expression, in order of appearance.
    pub fn params(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect(&mut out, &mut Vec::new());
        out
    }

    /// Condition names read by this expression, in order of appearance.
    pub fn conditions(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect(&mut Vec::new(), &mut out);
        out
    }

    fn collect<'a>(&'a self, params: &mut Vec<&'a str>, conditions: &mut Vec<&'a str>) {
        match self {
            Self::Equals { param, .. } => params.push(param),
            Self::Not(inner) => inner.collect(params, conditions),
            Self::Or(items) | Self::And(items) => {
                for item in items {
                    item.collect(params, conditions);
                }
            }
            Self::Condition(name) => conditions.push(name),
        }
    }
}

impl Serialize for BoolExpr {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Equals { param, literal } => single(
                s,
                "Fn::Equals",
                &(Value::Param(param.clone()), literal.as_str()),
            ),
            Self::Not(inner) => single(s, "Fn::Not", &[inner.as_ref()]),
            Self::Or(items) => single(s, "Fn::Or", items),
            Self::And(items) => single(s, "Fn::And", items),
            Self::Condition(name) => single(s, "Condition", name),
        }
    }
}

// ============================================================================
// Conditional values
// ============================================================================

/// Pseudo parameters supplied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pseudo {
    StackName,
    Region,
    AccountId,
}

impl Pseudo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StackName => "AWS::StackName",
            Self::Region => "AWS::Region",
            Self::AccountId => "AWS::AccountId",
        }
    }
}

/// One piece of an `Fn::Sub` template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubPart {
    Text(String),
    Param(String),
    Ref(String),
    Attr { resource: String, attribute: String },
    Pseudo(Pseudo),
}

/// A property value, possibly resolved at deploy time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(i64),
    Bool(bool),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    Param(String),
    Ref(String),
    GetAtt {
        resource: String,
        attribute: String,
    },
    Pseudo(Pseudo),
    Sub(Vec<SubPart>),
    /// Opaque template text with explicitly bound variables.
    SubWith {
        template: String,
        vars: IndexMap<String, Value>,
    },
    Split {
        delimiter: String,
        source: Box<Value>,
    },
    If {
        condition: String,
        then: Box<Value>,
        otherwise: Box<Value>,
    },
    /// Omit the field or list element entirely (`AWS::NoValue`).
    Absent,
}

/// A name read by a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    Param(&'a str),
    Resource(&'a str),
    Condition(&'a str),
}

impl Value {
    pub fn object<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// `{"Fn::If": [cond, then, otherwise]}`
    pub fn when(condition: &ConditionRef, then: impl Into<Value>, otherwise: impl Into<Value>) -> Self {
        Self::If {
            condition: condition.name().to_string(),
            then: Box::new(then.into()),
            otherwise: Box::new(otherwise.into()),
        }
    }

    /// The whole sub-structure, or nothing.
    pub fn optional(condition: &ConditionRef, value: impl Into<Value>) -> Self {
        Self::when(condition, value, Value::Absent)
    }

    /// `{"Fn::Split": [delimiter, source]}`
    pub fn split(delimiter: &str, source: Value) -> Self {
        Self::Split {
            delimiter: delimiter.to_string(),
            source: Box::new(source),
        }
    }

    /// `{"Fn::Sub": [template, vars]}` for text the generator does not own.
    pub fn sub_with<K: Into<String>>(
        template: &str,
        vars: impl IntoIterator<Item = (K, Value)>,
    ) -> Self {
        Self::SubWith {
            template: template.to_string(),
            vars: vars.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Every parameter, resource and condition name this value reads.
    pub fn references(&self) -> Vec<Reference<'_>> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<Reference<'a>>) {
        match self {
            Self::String(_) | Self::Number(_) | Self::Bool(_) | Self::Pseudo(_) | Self::Absent => {}
            Self::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            Self::Object(map) => map.values().for_each(|v| v.collect_references(out)),
            Self::Param(name) => out.push(Reference::Param(name)),
            Self::Ref(id) | Self::GetAtt { resource: id, .. } => out.push(Reference::Resource(id)),
            Self::Sub(parts) => {
                for part in parts {
                    match part {
                        SubPart::Param(name) => out.push(Reference::Param(name)),
                        SubPart::Ref(id) | SubPart::Attr { resource: id, .. } => {
                            out.push(Reference::Resource(id))
                        }
                        SubPart::Text(_) | SubPart::Pseudo(_) => {}
                    }
                }
            }
            Self::SubWith { vars, .. } => vars.values().for_each(|v| v.collect_references(out)),
            Self::Split { source, .. } => source.collect_references(out),
            Self::If {
                condition,
                then,
                otherwise,
            } => {
                out.push(Reference::Condition(condition));
                then.collect_references(out);
                otherwise.collect_references(out);
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Pseudo> for Value {
    fn from(p: Pseudo) -> Self {
        Self::Pseudo(p)
    }
}

impl From<&ParamRef> for Value {
    fn from(p: &ParamRef) -> Self {
        p.value()
    }
}

/// Typed `Fn::Sub` builder. Placeholders come from handles, so a
/// substitution can only name things that were declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sub {
    parts: Vec<SubPart>,
}

impl Sub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: &str) -> Self {
        self.parts.push(SubPart::Text(text.to_string()));
        self
    }

    pub fn param(mut self, param: &ParamRef) -> Self {
        self.parts.push(SubPart::Param(param.name().to_string()));
        self
    }

    pub fn resource(mut self, resource: &ResourceRef) -> Self {
        self.parts.push(SubPart::Ref(resource.logical_id().to_string()));
        self
    }

    pub fn attr(mut self, resource: &ResourceRef, attribute: &str) -> Self {
        self.parts.push(SubPart::Attr {
            resource: resource.logical_id().to_string(),
            attribute: attribute.to_string(),
        });
        self
    }

    pub fn pseudo(mut self, pseudo: Pseudo) -> Self {
        self.parts.push(SubPart::Pseudo(pseudo));
        self
    }

    pub fn append(mut self, other: Sub) -> Self {
        self.parts.extend(other.parts);
        self
    }

    /// The `Fn::Sub` template string.
    pub fn render(&self) -> String {
        render_sub(&self.parts)
    }
}

impl From<Sub> for Value {
    fn from(sub: Sub) -> Self {
        Value::Sub(sub.parts)
    }
}

pub(crate) fn render_sub(parts: &[SubPart]) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            SubPart::Text(text) => out.push_str(&text.replace("${", "${!")),
            SubPart::Param(name) | SubPart::Ref(name) => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            }
            SubPart::Attr {
                resource,
                attribute,
            } => {
                out.push_str(&format!("${{{}.{}}}", resource, attribute));
            }
            SubPart::Pseudo(p) => {
                out.push_str("${");
                out.push_str(p.as_str());
                out.push('}');
            }
        }
    }
    out
}

fn single<S: Serializer, V: Serialize + ?Sized>(s: S, key: &str, value: &V) -> Result<S::Ok, S::Error> {
    let mut map = s.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(v) => s.serialize_str(v),
            Self::Number(n) => s.serialize_i64(*n),
            Self::Bool(b) => s.serialize_bool(*b),
            Self::List(items) => {
                let mut seq = s.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(map) => map.serialize(s),
            Self::Param(name) | Self::Ref(name) => single(s, "Ref", name),
            Self::GetAtt {
                resource,
                attribute,
            } => single(s, "Fn::GetAtt", &[resource, attribute]),
            Self::Pseudo(p) => single(s, "Ref", p.as_str()),
            Self::Sub(parts) => single(s, "Fn::Sub", &render_sub(parts)),
            Self::SubWith { template, vars } => single(s, "Fn::Sub", &(template, vars)),
            Self::Split { delimiter, source } => {
                single(s, "Fn::Split", &(delimiter, source.as_ref()))
            }
            Self::If {
                condition,
                then,
                otherwise,
            } => single(
                s,
                "Fn::If",
                &(condition, then.as_ref(), otherwise.as_ref()),
            ),
            Self::Absent => single(s, "Ref", "AWS::NoValue"),
        }
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Resource kinds the generator emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    IamRole,
    IamPolicy,
    KmsKey,
    KmsAlias,
    LambdaFunction,
    LambdaPermission,
    LogGroup,
    StateMachine,
    RestApi,
    ApiResource,
    ApiMethod,
    CodeBuildProject,
}

impl ResourceKind {
    /// The engine's type identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IamRole => "AWS::IAM::Role",
            Self::IamPolicy => "AWS::IAM::Policy",
            Self::KmsKey => "AWS::KMS::Key",
            Self::KmsAlias => "AWS::KMS::Alias",
            Self::LambdaFunction => "AWS::Lambda::Function",
            Self::LambdaPermission => "AWS::Lambda::Permission",
            Self::LogGroup => "AWS::Logs::LogGroup",
            Self::StateMachine => "AWS::StepFunctions::StateMachine",
            Self::RestApi => "AWS::ApiGateway::RestApi",
            Self::ApiResource => "AWS::ApiGateway::Resource",
            Self::ApiMethod => "AWS::ApiGateway::Method",
            Self::CodeBuildProject => "AWS::CodeBuild::Project",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    Retain,
}

/// A declared resource. Append-only once in the template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(skip)]
    pub logical_id: String,

    #[serde(rename = "Type")]
    pub kind: ResourceKind,

    /// Created only when this condition holds
    #[serde(rename = "Condition", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Explicit ordering edges (implicit ones come from references)
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<DeletionPolicy>,

    #[serde(rename = "Properties", skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Value>,
}

/// A value exposed to downstream tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Condition", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    #[serde(rename = "Value")]
    pub value: Value,
}

// ============================================================================
// Template
// ============================================================================

/// A complete template, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description")]
    pub description: String,

    #[serde(rename = "Parameters", skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Parameter>,

    #[serde(rename = "Conditions", skip_serializing_if = "IndexMap::is_empty")]
    pub conditions: IndexMap<String, BoolExpr>,

    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, Resource>,

    #[serde(rename = "Outputs", skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Output>,
}

impl Template {
    pub fn new(description: &str) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.to_string(),
            parameters: IndexMap::new(),
            conditions: IndexMap::new(),
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }
}
