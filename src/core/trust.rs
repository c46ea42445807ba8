//! SG-007: Cross-resource trust wiring.
//!
//! Grants are standalone `AWS::IAM::Policy` resources attached to a role
//! through `Roles`, declared after both the role and the target exist.
//! Putting the statement inside the role instead would make the role read
//! the target while the target (e.g. a key policy) reads the role.

use super::builder::{ResourceSpec, TemplateBuilder};
use super::error::TemplateError;
use super::policy::{self, Statement};
use super::types::{ParamRef, ResourceKind, ResourceRef, Sub, Value};

/// The role receiving a grant.
#[derive(Debug, Clone, Copy)]
pub enum Grantee<'a> {
    /// A role declared in the same template.
    Role(&'a ResourceRef),
    /// A parameter naming a role from another stack.
    External(&'a ParamRef),
}

impl Grantee<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Role(r) => r.logical_id(),
            Self::External(p) => p.name(),
        }
    }

    fn role_name(&self) -> Value {
        match self {
            Self::Role(r) => r.reference(),
            Self::External(p) => p.value(),
        }
    }

    fn name_sub(&self) -> Sub {
        match self {
            Self::Role(r) => Sub::new().resource(r),
            Self::External(p) => Sub::new().param(p),
        }
    }
}

/// One policy attachment, possibly shared by several roles and covering
/// several targets.
#[derive(Debug, Clone)]
pub struct Grant<'a> {
    logical_id: Option<String>,
    policy_name: Option<Value>,
    grantees: Vec<Grantee<'a>>,
    statements: Vec<Statement>,
}

impl<'a> Grant<'a> {
    pub fn new() -> Self {
        Self {
            logical_id: None,
            policy_name: None,
            grantees: Vec::new(),
            statements: Vec::new(),
        }
    }

    /// Fixed logical id. Without one the id is derived from the first
    /// grantee and service, with a numeric suffix on collision.
    pub fn id(mut self, logical_id: &str) -> Self {
        self.logical_id = Some(logical_id.to_string());
        self
    }

    pub fn policy_name(mut self, name: impl Into<Value>) -> Self {
        self.policy_name = Some(name.into());
        self
    }

    pub fn to(mut self, grantee: Grantee<'a>) -> Self {
        self.grantees.push(grantee);
        self
    }

    /// Allow `actions` on `target`.
    pub fn allow(mut self, actions: &[&str], target: impl Into<Value>) -> Self {
        self.statements
            .push(Statement::allow(actions).on([target.into()]));
        self
    }

    pub fn declare(self, builder: &mut TemplateBuilder) -> Result<ResourceRef, TemplateError> {
        let service = self
            .statements
            .first()
            .and_then(|s| s.actions().first())
            .map(|a| {
                policy::service_of(a)
                    .chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect::<String>()
            });
        let (first, service) = match (self.grantees.first(), service) {
            (Some(first), Some(service)) => (*first, service),
            _ => {
                let label = self.logical_id.unwrap_or_else(|| "<unnamed>".to_string());
                return Err(TemplateError::EmptyGrant(label));
            }
        };
        if self.statements.iter().any(|s| s.actions().is_empty()) {
            let label = self.logical_id.unwrap_or_else(|| first.name().to_string());
            return Err(TemplateError::EmptyGrant(label));
        }

        let (logical_id, ordinal) = match self.logical_id {
            Some(id) => (id, 1),
            None => free_id(builder, &format!("{}{}", first.name(), service.to_uppercase())),
        };
        let policy_name = self.policy_name.unwrap_or_else(|| {
            let mut suffix = format!("-{}", service);
            if ordinal > 1 {
                suffix.push_str(&format!("-{}", ordinal));
            }
            first.name_sub().text(&suffix).into()
        });

        let spec = ResourceSpec::new(ResourceKind::IamPolicy)
            .prop(
                "Roles",
                Value::list(self.grantees.iter().map(Grantee::role_name)),
            )
            .prop("PolicyName", policy_name)
            .prop(
                "PolicyDocument",
                policy::document(self.statements.into_iter().map(Value::from)),
            );
        builder.declare_resource(&logical_id, spec)
    }
}

impl Default for Grant<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// First of `{stem}Policy`, `{stem}Policy2`, ... not yet declared.
fn free_id(builder: &TemplateBuilder, stem: &str) -> (String, usize) {
    let mut ordinal = 1;
    loop {
        let candidate = if ordinal == 1 {
            format!("{}Policy", stem)
        } else {
            format!("{}Policy{}", stem, ordinal)
        };
        if builder.resource(&candidate).is_none() {
            return (candidate, ordinal);
        }
        ordinal += 1;
    }
}

/// Allow `grantee` to perform `actions` on `target`. Calling this twice
/// for the same triple declares two independent policies.
pub fn grant_cross_access(
    builder: &mut TemplateBuilder,
    grantee: Grantee<'_>,
    target: impl Into<Value>,
    actions: &[&str],
) -> Result<ResourceRef, TemplateError> {
    Grant::new()
        .to(grantee)
        .allow(actions, target)
        .declare(builder)
}
