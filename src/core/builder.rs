//! SG-002: Template under construction.
//!
//! `TemplateBuilder` is threaded through every component. Each declaration
//! checks that the names it reads were declared earlier, so a builder can
//! never hold a forward reference or a cycle. `finish` orders the graph and
//! runs the lint pass before handing out the `Template`.

use super::conditions::{self, Sentinel};
use super::error::{RefKind, Site, TemplateError};
use super::lint;
use super::resolver;
use super::types::*;
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

const MAX_LOGICAL_ID_LEN: usize = 255;

/// Logical ids, parameter, condition and output names share this shape.
pub fn is_valid_logical_id(id: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new("^[A-Za-z0-9]+$").ok());
    id.len() <= MAX_LOGICAL_ID_LEN && pattern.as_ref().is_some_and(|re| re.is_match(id))
}

/// Everything about a resource except its logical id.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    kind: ResourceKind,
    properties: IndexMap<String, Value>,
    depends_on: Vec<String>,
    condition: Option<String>,
    deletion_policy: Option<DeletionPolicy>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            properties: IndexMap::new(),
            depends_on: Vec::new(),
            condition: None,
            deletion_policy: None,
        }
    }

    pub fn prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    /// Explicit ordering edge. Duplicates are ignored.
    pub fn depends_on(mut self, resource: &ResourceRef) -> Self {
        let id = resource.logical_id().to_string();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn condition(mut self, condition: &ConditionRef) -> Self {
        self.condition = Some(condition.name().to_string());
        self
    }

    pub fn deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }
}

/// A `DoCreate…` condition bound to the parameter it tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSwitch {
    condition: ConditionRef,
    supplied: ParamRef,
}

/// A resource that exists only when a parameter carries its "create"
/// sentinel. The raw handle is not exposed: every read goes through
/// `resolve`, `resolve_or` or a dependent declared under the same condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrReuse {
    created: ResourceRef,
    condition: ConditionRef,
    supplied: ParamRef,
}

impl CreateOrReuse {
    /// The `DoCreate…` condition gating the resource.
    pub fn condition(&self) -> &ConditionRef {
        &self.condition
    }

    /// `If(DoCreate, f(created), Ref(supplied))`
    pub fn resolve(&self, f: impl FnOnce(&ResourceRef) -> Value) -> Value {
        self.resolve_or(f, self.supplied.value())
    }

    /// `If(DoCreate, f(created), fallback)`
    pub fn resolve_or(&self, f: impl FnOnce(&ResourceRef) -> Value, fallback: impl Into<Value>) -> Value {
        Value::when(&self.condition, f(&self.created), fallback)
    }
}

/// Ordered, append-only template under construction.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    template: Template,
}

impl TemplateBuilder {
    pub fn new(description: &str) -> Self {
        Self {
            template: Template::new(description),
        }
    }

    /// Read-only view of what has been declared so far.
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn resource(&self, logical_id: &str) -> Option<ResourceRef> {
        self.template
            .resources
            .get(logical_id)
            .map(|r| ResourceRef::new(logical_id, r.kind))
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<ParamRef, TemplateError> {
        let name = parameter.name.clone();
        if !is_valid_logical_id(&name) {
            return Err(TemplateError::InvalidLogicalId(name));
        }
        if self.template.parameters.contains_key(&name) {
            return Err(TemplateError::DuplicateParameterName(name));
        }
        tracing::debug!(parameter = %name, kind = %parameter.param_type, "declare parameter");
        self.template.parameters.insert(name.clone(), parameter);
        Ok(ParamRef::new(&name))
    }

    /// Register a named condition. It may only read parameters and
    /// conditions declared before it.
    pub fn define_condition(
        &mut self,
        name: &str,
        expr: BoolExpr,
    ) -> Result<ConditionRef, TemplateError> {
        if !is_valid_logical_id(name) {
            return Err(TemplateError::InvalidLogicalId(name.to_string()));
        }
        if self.template.conditions.contains_key(name) {
            return Err(TemplateError::DuplicateConditionName(name.to_string()));
        }
        let site = Site::Condition(name.to_string());
        for param in expr.params() {
            self.require(RefKind::Parameter, param, &site)?;
        }
        for cond in expr.conditions() {
            self.require(RefKind::Condition, cond, &site)?;
        }
        tracing::debug!(condition = %name, "define condition");
        self.template.conditions.insert(name.to_string(), expr);
        Ok(ConditionRef::new(name))
    }

    pub fn declare_resource(
        &mut self,
        logical_id: &str,
        spec: ResourceSpec,
    ) -> Result<ResourceRef, TemplateError> {
        if !is_valid_logical_id(logical_id) {
            return Err(TemplateError::InvalidLogicalId(logical_id.to_string()));
        }
        if self.template.resources.contains_key(logical_id) {
            return Err(TemplateError::DuplicateLogicalId(logical_id.to_string()));
        }

        let site = Site::Resource(logical_id.to_string());
        if let Some(cond) = &spec.condition {
            self.require(RefKind::Condition, cond, &site)?;
        }
        for dep in &spec.depends_on {
            self.require(RefKind::Resource, dep, &site)?;
        }
        for value in spec.properties.values() {
            self.require_value(value, &site)?;
        }

        tracing::debug!(
            resource = %logical_id,
            kind = %spec.kind,
            condition = spec.condition.as_deref().unwrap_or("-"),
            "declare resource"
        );
        let kind = spec.kind;
        self.template.resources.insert(
            logical_id.to_string(),
            Resource {
                logical_id: logical_id.to_string(),
                kind,
                condition: spec.condition,
                depends_on: spec.depends_on,
                deletion_policy: spec.deletion_policy,
                properties: spec.properties,
            },
        );
        Ok(ResourceRef::new(logical_id, kind))
    }

    /// Declare `DoCreate = Equals(supplied, sentinel)`. The switch can be
    /// defined ahead of other conditions and used later by `create_or_reuse`.
    pub fn define_create_switch(
        &mut self,
        condition_name: &str,
        supplied: &ParamRef,
        sentinel: Sentinel,
    ) -> Result<CreateSwitch, TemplateError> {
        let condition = self.define_condition(
            condition_name,
            conditions::equals_sentinel(supplied, sentinel),
        )?;
        Ok(CreateSwitch {
            condition,
            supplied: supplied.clone(),
        })
    }

    /// Declare a resource gated by `switch`. Any condition already set on
    /// `spec` is replaced.
    pub fn create_or_reuse(
        &mut self,
        switch: &CreateSwitch,
        logical_id: &str,
        spec: ResourceSpec,
    ) -> Result<CreateOrReuse, TemplateError> {
        let created = self.declare_resource(logical_id, spec.condition(&switch.condition))?;
        Ok(CreateOrReuse {
            created,
            condition: switch.condition.clone(),
            supplied: switch.supplied.clone(),
        })
    }

    /// Declare a resource that only makes sense next to `owner`'s created
    /// resource. `build` sees the raw handle; the result is gated by the
    /// same condition and handed back as another `CreateOrReuse`.
    pub fn declare_dependent(
        &mut self,
        owner: &CreateOrReuse,
        logical_id: &str,
        build: impl FnOnce(&ResourceRef) -> ResourceSpec,
    ) -> Result<CreateOrReuse, TemplateError> {
        let spec = build(&owner.created).condition(&owner.condition);
        let created = self.declare_resource(logical_id, spec)?;
        Ok(CreateOrReuse {
            created,
            condition: owner.condition.clone(),
            supplied: owner.supplied.clone(),
        })
    }

    pub fn expose_output(&mut self, name: &str, value: impl Into<Value>) -> Result<(), TemplateError> {
        self.expose(name, value.into(), None, None)
    }

    /// Output with a description and/or a gating condition.
    pub fn expose(
        &mut self,
        name: &str,
        value: Value,
        description: Option<&str>,
        condition: Option<&ConditionRef>,
    ) -> Result<(), TemplateError> {
        if !is_valid_logical_id(name) {
            return Err(TemplateError::InvalidLogicalId(name.to_string()));
        }
        if self.template.outputs.contains_key(name) {
            return Err(TemplateError::DuplicateOutputName(name.to_string()));
        }
        let site = Site::Output(name.to_string());
        if let Some(cond) = condition {
            self.require(RefKind::Condition, cond.name(), &site)?;
        }
        self.require_value(&value, &site)?;

        tracing::debug!(output = %name, "expose output");
        self.template.outputs.insert(
            name.to_string(),
            Output {
                description: description.map(String::from),
                condition: condition.map(|c| c.name().to_string()),
                value,
            },
        );
        Ok(())
    }

    /// Order the graph, lint it and hand out the template. Returns the
    /// first defect found.
    pub fn finish(self) -> Result<Template, TemplateError> {
        let order = resolver::build_order(&self.template)?;
        if let Some(first) = lint::check_template(&self.template).into_iter().next() {
            return Err(first);
        }
        tracing::info!(
            description = %self.template.description,
            parameters = self.template.parameters.len(),
            conditions = self.template.conditions.len(),
            resources = order.len(),
            outputs = self.template.outputs.len(),
            "template assembled"
        );
        Ok(self.template)
    }

    fn require(&self, kind: RefKind, name: &str, site: &Site) -> Result<(), TemplateError> {
        let known = match kind {
            RefKind::Parameter => self.template.parameters.contains_key(name),
            RefKind::Condition => self.template.conditions.contains_key(name),
            RefKind::Resource => self.template.resources.contains_key(name),
        };
        if known {
            Ok(())
        } else {
            Err(TemplateError::UnknownReference {
                kind,
                name: name.to_string(),
                site: site.clone(),
            })
        }
    }

    fn require_value(&self, value: &Value, site: &Site) -> Result<(), TemplateError> {
        for reference in value.references() {
            match reference {
                Reference::Param(name) => self.require(RefKind::Parameter, name, site)?,
                Reference::Resource(id) => self.require(RefKind::Resource, id, site)?,
                Reference::Condition(name) => self.require(RefKind::Condition, name, site)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::conditions::is_supplied;

    fn builder() -> TemplateBuilder {
        TemplateBuilder::new("test")
    }

    #[test]
    fn test_builder_logical_id_validation() {
        assert!(is_valid_logical_id("WebhookLambdaRole"));
        assert!(is_valid_logical_id("Tag10Name"));
        assert!(!is_valid_logical_id(""));
        assert!(!is_valid_logical_id("Has-Dash"));
        assert!(!is_valid_logical_id("under_score"));
        assert!(!is_valid_logical_id(&"A".repeat(256)));
        assert!(is_valid_logical_id(&"A".repeat(255)));
    }

    #[test]
    fn test_builder_logical_id_ascii_only() {
        assert!(!is_valid_logical_id("Rôle"));
        assert!(!is_valid_logical_id("Key Alias"));
        assert!(!is_valid_logical_id("Key\n"));
        let mut b = builder();
        let err = b.add_parameter(Parameter::string("Señal")).unwrap_err();
        assert_eq!(err, TemplateError::InvalidLogicalId("Señal".into()));
        let err = b.define_condition("", BoolExpr::Condition("X".into())).unwrap_err();
        assert_eq!(err, TemplateError::InvalidLogicalId(String::new()));
    }

    #[test]
    fn test_builder_duplicate_parameter() {
        let mut b = builder();
        b.add_parameter(Parameter::string("VPC")).unwrap();
        let err = b.add_parameter(Parameter::string("VPC")).unwrap_err();
        assert_eq!(err, TemplateError::DuplicateParameterName("VPC".into()));
    }

    #[test]
    fn test_builder_duplicate_condition() {
        let mut b = builder();
        let vpc = b.add_parameter(Parameter::string("VPC").default("-NONE-")).unwrap();
        b.define_condition("HasVPC", is_supplied(&vpc, Sentinel::Unset)).unwrap();
        let err = b
            .define_condition("HasVPC", is_supplied(&vpc, Sentinel::Unset))
            .unwrap_err();
        assert_eq!(err, TemplateError::DuplicateConditionName("HasVPC".into()));
    }

    #[test]
    fn test_builder_condition_unknown_param() {
        let mut b = builder();
        let ghost = ParamRef::new("Ghost");
        let err = b
            .define_condition("HasGhost", is_supplied(&ghost, Sentinel::Unset))
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownReference {
                kind: RefKind::Parameter,
                name: "Ghost".into(),
                site: Site::Condition("HasGhost".into()),
            }
        );
    }

    #[test]
    fn test_builder_condition_must_precede_reader() {
        let mut b = builder();
        let err = b
            .define_condition("Outer", BoolExpr::Condition("Inner".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::UnknownReference {
                kind: RefKind::Condition,
                ..
            }
        ));
    }

    #[test]
    fn test_builder_duplicate_resource() {
        let mut b = builder();
        b.declare_resource("Logs", ResourceSpec::new(ResourceKind::LogGroup))
            .unwrap();
        let err = b
            .declare_resource("Logs", ResourceSpec::new(ResourceKind::LogGroup))
            .unwrap_err();
        assert_eq!(err, TemplateError::DuplicateLogicalId("Logs".into()));
    }

    #[test]
    fn test_builder_invalid_logical_id() {
        let mut b = builder();
        let err = b
            .declare_resource("my-logs", ResourceSpec::new(ResourceKind::LogGroup))
            .unwrap_err();
        assert_eq!(err, TemplateError::InvalidLogicalId("my-logs".into()));
    }

    #[test]
    fn test_builder_resource_forward_reference_rejected() {
        let mut b = builder();
        let later = ResourceRef::new("Later", ResourceKind::IamRole);
        let err = b
            .declare_resource(
                "Fn",
                ResourceSpec::new(ResourceKind::LambdaFunction).prop("Role", later.arn()),
            )
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownReference {
                kind: RefKind::Resource,
                name: "Later".into(),
                site: Site::Resource("Fn".into()),
            }
        );
    }

    #[test]
    fn test_builder_values_pass_through() {
        let mut b = builder();
        let retention = b
            .add_parameter(Parameter::number("LogsRetentionDays").default(30))
            .unwrap();
        let value = Value::object([("Nested", Value::list([retention.value(), 7.into()]))]);
        b.declare_resource(
            "Logs",
            ResourceSpec::new(ResourceKind::LogGroup).prop("Meta", value.clone()),
        )
        .unwrap();
        assert_eq!(b.template().resources["Logs"].properties["Meta"], value);
    }

    #[test]
    fn test_builder_create_or_reuse_branches() {
        let mut b = builder();
        let arn = b
            .add_parameter(Parameter::string("SecretsKMSArn").default("-CREATE-"))
            .unwrap();
        let switch = b
            .define_create_switch("DoCreateKMSKey", &arn, Sentinel::Create)
            .unwrap();
        let key = b
            .create_or_reuse(&switch, "SecretsKMSKey", ResourceSpec::new(ResourceKind::KmsKey))
            .unwrap();

        let t = b.template();
        assert_eq!(
            t.conditions["DoCreateKMSKey"],
            BoolExpr::Equals {
                param: "SecretsKMSArn".into(),
                literal: "-CREATE-".into(),
            }
        );
        assert_eq!(
            t.resources["SecretsKMSKey"].condition.as_deref(),
            Some("DoCreateKMSKey")
        );
        assert_eq!(
            key.resolve(|k| k.arn()),
            Value::If {
                condition: "DoCreateKMSKey".into(),
                then: Box::new(Value::GetAtt {
                    resource: "SecretsKMSKey".into(),
                    attribute: "Arn".into(),
                }),
                otherwise: Box::new(Value::Param("SecretsKMSArn".into())),
            }
        );
        assert_eq!(
            key.resolve_or(|k| k.reference(), "N/A"),
            Value::when(&ConditionRef::new("DoCreateKMSKey"), Value::Ref("SecretsKMSKey".into()), "N/A")
        );
    }

    #[test]
    fn test_builder_create_switch_precedes_other_conditions() {
        let mut b = builder();
        let arn = b
            .add_parameter(Parameter::string("SecretsKMSArn").default("-CREATE-"))
            .unwrap();
        let alias = b
            .add_parameter(Parameter::string("SecretsKMSAliasName").default("-DEFAULT-"))
            .unwrap();
        let switch = b
            .define_create_switch("DoCreateKMSKey", &arn, Sentinel::Create)
            .unwrap();
        let default_alias = b
            .define_condition(
                "UseDefaultAliasName",
                conditions::equals_sentinel(&alias, Sentinel::Default),
            )
            .unwrap();
        let key = b
            .create_or_reuse(
                &switch,
                "SecretsKMSKey",
                ResourceSpec::new(ResourceKind::KmsKey).condition(&default_alias),
            )
            .unwrap();
        assert_eq!(key.condition(), &ConditionRef::new("DoCreateKMSKey"));
        assert_eq!(
            b.template().resources["SecretsKMSKey"].condition.as_deref(),
            Some("DoCreateKMSKey")
        );
        let names: Vec<&str> = b.template().conditions.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["DoCreateKMSKey", "UseDefaultAliasName"]);

        let err = b.define_create_switch("DoCreateKMSKey", &arn, Sentinel::Create).unwrap_err();
        assert_eq!(err, TemplateError::DuplicateConditionName("DoCreateKMSKey".into()));
    }

    #[test]
    fn test_builder_dependent_shares_condition() {
        let mut b = builder();
        let arn = b
            .add_parameter(Parameter::string("SecretsKMSArn").default("-CREATE-"))
            .unwrap();
        let switch = b
            .define_create_switch("DoCreateKMSKey", &arn, Sentinel::Create)
            .unwrap();
        let key = b
            .create_or_reuse(&switch, "SecretsKMSKey", ResourceSpec::new(ResourceKind::KmsKey))
            .unwrap();
        let alias = b
            .declare_dependent(&key, "SecretsKMSKeyAlias", |k| {
                ResourceSpec::new(ResourceKind::KmsAlias).prop("TargetKeyId", k.reference())
            })
            .unwrap();
        assert_eq!(alias.condition(), key.condition());
        assert_eq!(
            b.template().resources["SecretsKMSKeyAlias"].condition.as_deref(),
            Some("DoCreateKMSKey")
        );
        b.expose_output("SecretsKMSArn", key.resolve(|k| k.arn())).unwrap();
        b.expose_output("SecretsKMSAlias", alias.resolve_or(|a| a.reference(), "N/A"))
            .unwrap();
        let t = b.finish().unwrap();
        assert_eq!(t.outputs.len(), 2);
    }

    #[test]
    fn test_builder_duplicate_output() {
        let mut b = builder();
        b.expose_output("Region", Pseudo::Region).unwrap();
        let err = b.expose_output("Region", Pseudo::Region).unwrap_err();
        assert_eq!(err, TemplateError::DuplicateOutputName("Region".into()));
    }

    #[test]
    fn test_builder_output_unknown_reference() {
        let mut b = builder();
        let err = b
            .expose_output("Name", Value::Ref("Missing".into()))
            .unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnknownReference {
                kind: RefKind::Resource,
                name: "Missing".into(),
                site: Site::Output("Name".into()),
            }
        );
    }

    #[test]
    fn test_builder_finish_rejects_dead_condition() {
        let mut b = builder();
        let vpc = b.add_parameter(Parameter::string("VPC").default("-NONE-")).unwrap();
        b.define_condition("HasVPC", is_supplied(&vpc, Sentinel::Unset)).unwrap();
        let err = b.finish().unwrap_err();
        assert_eq!(err, TemplateError::DeadCondition("HasVPC".into()));
    }

    #[test]
    fn test_builder_finish_rejects_unresolved_reuse_read() {
        let mut b = builder();
        let arn = b
            .add_parameter(Parameter::string("SecretsKMSArn").default("-CREATE-"))
            .unwrap();
        let switch = b
            .define_create_switch("DoCreateKMSKey", &arn, Sentinel::Create)
            .unwrap();
        b.create_or_reuse(&switch, "SecretsKMSKey", ResourceSpec::new(ResourceKind::KmsKey))
            .unwrap();
        // A raw reference bypassing the handle.
        b.expose_output("Raw", Value::Ref("SecretsKMSKey".into())).unwrap();
        let err = b.finish().unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingCreateOrReuseResolution {
                site: Site::Output("Raw".into()),
                target: "SecretsKMSKey".into(),
                condition: "DoCreateKMSKey".into(),
            }
        );
    }
}
