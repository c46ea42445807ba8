//! SG-009: Template lint. Lists every defect `finish` would reject.
//!
//! Passes run in a fixed order: names, references, expression arity, dead
//! conditions, create-or-reuse resolution for resources, then for outputs,
//! then dependency ordering.

use super::builder::is_valid_logical_id;
use super::conditions::MAX_OPERANDS;
use super::error::{RefKind, Site, TemplateError};
use super::resolver;
use super::types::{BoolExpr, Reference, SubPart, Template, Value};
use std::collections::HashSet;

/// Run every pass and collect the findings.
pub fn check_template(template: &Template) -> Vec<TemplateError> {
    let mut findings = Vec::new();
    check_names(template, &mut findings);
    check_references(template, &mut findings);
    check_arity(template, &mut findings);
    check_dead_conditions(template, &mut findings);
    check_resource_resolution(template, &mut findings);
    check_output_resolution(template, &mut findings);
    if let Err(e) = resolver::build_order(template) {
        if !findings.contains(&e) {
            findings.push(e);
        }
    }
    findings
}

fn check_names(template: &Template, findings: &mut Vec<TemplateError>) {
    let names = template
        .parameters
        .keys()
        .chain(template.conditions.keys())
        .chain(template.resources.keys())
        .chain(template.outputs.keys());
    for name in names {
        if !is_valid_logical_id(name) {
            findings.push(TemplateError::InvalidLogicalId(name.clone()));
        }
    }
}

fn check_references(template: &Template, findings: &mut Vec<TemplateError>) {
    let mut unknown = |kind: RefKind, name: &str, site: &Site| {
        let known = match kind {
            RefKind::Parameter => template.parameters.contains_key(name),
            RefKind::Condition => template.conditions.contains_key(name),
            RefKind::Resource => template.resources.contains_key(name),
        };
        if !known {
            findings.push(TemplateError::UnknownReference {
                kind,
                name: name.to_string(),
                site: site.clone(),
            });
        }
    };

    for (name, expr) in &template.conditions {
        let site = Site::Condition(name.clone());
        for param in expr.params() {
            unknown(RefKind::Parameter, param, &site);
        }
        for cond in expr.conditions() {
            unknown(RefKind::Condition, cond, &site);
        }
    }

    let mut check_value = |value: &Value, site: &Site| {
        for reference in value.references() {
            match reference {
                Reference::Param(n) => unknown(RefKind::Parameter, n, site),
                Reference::Resource(n) => unknown(RefKind::Resource, n, site),
                Reference::Condition(n) => unknown(RefKind::Condition, n, site),
            }
        }
    };
    for (id, resource) in &template.resources {
        let site = Site::Resource(id.clone());
        for value in resource.properties.values() {
            check_value(value, &site);
        }
    }
    for (name, output) in &template.outputs {
        check_value(&output.value, &Site::Output(name.clone()));
    }

    for (id, resource) in &template.resources {
        let site = Site::Resource(id.clone());
        if let Some(cond) = &resource.condition {
            unknown(RefKind::Condition, cond, &site);
        }
        for dep in &resource.depends_on {
            unknown(RefKind::Resource, dep, &site);
        }
    }
    for (name, output) in &template.outputs {
        if let Some(cond) = &output.condition {
            unknown(RefKind::Condition, cond, &Site::Output(name.clone()));
        }
    }
}

fn check_arity(template: &Template, findings: &mut Vec<TemplateError>) {
    fn walk(expr: &BoolExpr, site: &str, findings: &mut Vec<TemplateError>) {
        match expr {
            BoolExpr::Or(items) | BoolExpr::And(items) => {
                let op = if matches!(expr, BoolExpr::Or(_)) {
                    "Fn::Or"
                } else {
                    "Fn::And"
                };
                if !(2..=MAX_OPERANDS).contains(&items.len()) {
                    findings.push(TemplateError::InvalidExpression {
                        site: site.to_string(),
                        detail: format!(
                            "{} takes 2 to {} operands, got {}",
                            op,
                            MAX_OPERANDS,
                            items.len()
                        ),
                    });
                }
                for item in items {
                    walk(item, site, findings);
                }
            }
            BoolExpr::Not(inner) => walk(inner, site, findings),
            BoolExpr::Equals { .. } | BoolExpr::Condition(_) => {}
        }
    }

    for (name, expr) in &template.conditions {
        walk(expr, &Site::Condition(name.clone()).to_string(), findings);
    }
}

/// Conditions nothing reads. A condition read only by another dead
/// condition still counts as read.
fn check_dead_conditions(template: &Template, findings: &mut Vec<TemplateError>) {
    let mut used: HashSet<&str> = HashSet::new();
    for expr in template.conditions.values() {
        used.extend(expr.conditions());
    }
    let values = template
        .resources
        .values()
        .flat_map(|r| r.properties.values())
        .chain(template.outputs.values().map(|o| &o.value));
    for value in values {
        for reference in value.references() {
            if let Reference::Condition(name) = reference {
                used.insert(name);
            }
        }
    }
    used.extend(
        template
            .resources
            .values()
            .filter_map(|r| r.condition.as_deref()),
    );
    used.extend(template.outputs.values().filter_map(|o| o.condition.as_deref()));

    for name in template.conditions.keys() {
        if !used.contains(name.as_str()) {
            findings.push(TemplateError::DeadCondition(name.clone()));
        }
    }
}

/// Flags reads of a conditional resource that are not guarded by the
/// resource's own condition.
struct ResolutionCheck<'a> {
    template: &'a Template,
    site: Site,
    active: Vec<&'a str>,
    findings: Vec<TemplateError>,
}

impl<'a> ResolutionCheck<'a> {
    fn new(template: &'a Template, site: Site, gate: Option<&'a str>) -> Self {
        Self {
            template,
            site,
            active: gate.into_iter().collect(),
            findings: Vec::new(),
        }
    }

    fn target(&mut self, id: &str) {
        let Some(condition) = self
            .template
            .resources
            .get(id)
            .and_then(|r| r.condition.as_deref())
        else {
            return;
        };
        if self.active.contains(&condition) {
            return;
        }
        let finding = TemplateError::MissingCreateOrReuseResolution {
            site: self.site.clone(),
            target: id.to_string(),
            condition: condition.to_string(),
        };
        if !self.findings.contains(&finding) {
            self.findings.push(finding);
        }
    }

    fn walk(&mut self, value: &'a Value) {
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Pseudo(_) | Value::Absent | Value::Param(_) => {}
            Value::List(items) => items.iter().for_each(|v| self.walk(v)),
            Value::Object(map) => map.values().for_each(|v| self.walk(v)),
            Value::Ref(id) | Value::GetAtt { resource: id, .. } => self.target(id),
            Value::Sub(parts) => {
                for part in parts {
                    if let SubPart::Ref(id) | SubPart::Attr { resource: id, .. } = part {
                        self.target(id);
                    }
                }
            }
            Value::SubWith { vars, .. } => vars.values().for_each(|v| self.walk(v)),
            Value::Split { source, .. } => self.walk(source),
            Value::If {
                condition,
                then,
                otherwise,
            } => {
                self.active.push(condition);
                self.walk(then);
                self.active.pop();
                self.walk(otherwise);
            }
        }
    }
}

fn check_resource_resolution(template: &Template, findings: &mut Vec<TemplateError>) {
    for (id, resource) in &template.resources {
        let mut check = ResolutionCheck::new(
            template,
            Site::Resource(id.clone()),
            resource.condition.as_deref(),
        );
        for dep in &resource.depends_on {
            check.target(dep);
        }
        for value in resource.properties.values() {
            check.walk(value);
        }
        findings.append(&mut check.findings);
    }
}

fn check_output_resolution(template: &Template, findings: &mut Vec<TemplateError>) {
    for (name, output) in &template.outputs {
        let mut check = ResolutionCheck::new(
            template,
            Site::Output(name.clone()),
            output.condition.as_deref(),
        );
        check.walk(&output.value);
        findings.append(&mut check.findings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Output, Parameter, Resource, ResourceKind};
    use indexmap::IndexMap;

    fn resource(id: &str, condition: Option<&str>) -> Resource {
        Resource {
            logical_id: id.to_string(),
            kind: ResourceKind::KmsKey,
            condition: condition.map(String::from),
            depends_on: vec![],
            deletion_policy: None,
            properties: IndexMap::new(),
        }
    }

    fn base() -> Template {
        let mut t = Template::new("lint");
        t.parameters.insert(
            "SecretsKMSArn".into(),
            Parameter::string("SecretsKMSArn").default("-CREATE-"),
        );
        t.conditions.insert(
            "DoCreate".into(),
            BoolExpr::Equals {
                param: "SecretsKMSArn".into(),
                literal: "-CREATE-".into(),
            },
        );
        t.resources
            .insert("Key".into(), resource("Key", Some("DoCreate")));
        t
    }

    fn output(value: Value) -> Output {
        Output {
            description: None,
            condition: None,
            value,
        }
    }

    #[test]
    fn test_lint_clean_template() {
        assert!(check_template(&base()).is_empty());
    }

    #[test]
    fn test_lint_dead_condition() {
        let mut t = base();
        t.conditions.insert(
            "Unused".into(),
            BoolExpr::Equals {
                param: "SecretsKMSArn".into(),
                literal: "x".into(),
            },
        );
        assert_eq!(
            check_template(&t),
            vec![TemplateError::DeadCondition("Unused".into())]
        );
    }

    #[test]
    fn test_lint_condition_used_by_condition_is_live() {
        let mut t = base();
        t.conditions.insert(
            "Inner".into(),
            BoolExpr::Equals {
                param: "SecretsKMSArn".into(),
                literal: "x".into(),
            },
        );
        t.conditions
            .insert("Outer".into(), BoolExpr::Condition("Inner".into()));
        t.resources
            .insert("Other".into(), resource("Other", Some("Outer")));
        assert!(check_template(&t).is_empty());
    }

    #[test]
    fn test_lint_unresolved_output_and_resource_reported_separately() {
        let mut t = base();
        let mut reader = resource("Reader", None);
        reader
            .properties
            .insert("KeyId".into(), Value::Ref("Key".into()));
        t.resources.insert("Reader".into(), reader);
        t.outputs
            .insert("KeyArn".into(), output(Value::GetAtt {
                resource: "Key".into(),
                attribute: "Arn".into(),
            }));
        assert_eq!(
            check_template(&t),
            vec![
                TemplateError::MissingCreateOrReuseResolution {
                    site: Site::Resource("Reader".into()),
                    target: "Key".into(),
                    condition: "DoCreate".into(),
                },
                TemplateError::MissingCreateOrReuseResolution {
                    site: Site::Output("KeyArn".into()),
                    target: "Key".into(),
                    condition: "DoCreate".into(),
                },
            ]
        );
    }

    #[test]
    fn test_lint_if_guard_resolves() {
        let mut t = base();
        t.outputs.insert(
            "KeyArn".into(),
            output(Value::If {
                condition: "DoCreate".into(),
                then: Box::new(Value::Sub(vec![SubPart::Ref("Key".into())])),
                otherwise: Box::new(Value::Param("SecretsKMSArn".into())),
            }),
        );
        assert!(check_template(&t).is_empty());
    }

    #[test]
    fn test_lint_else_branch_is_not_guarded() {
        let mut t = base();
        t.outputs.insert(
            "KeyArn".into(),
            output(Value::If {
                condition: "DoCreate".into(),
                then: Box::new("x".into()),
                otherwise: Box::new(Value::Ref("Key".into())),
            }),
        );
        assert_eq!(check_template(&t).len(), 1);
    }

    #[test]
    fn test_lint_same_condition_resource_may_read() {
        let mut t = base();
        let mut alias = resource("Alias", Some("DoCreate"));
        alias
            .properties
            .insert("TargetKeyId".into(), Value::Ref("Key".into()));
        t.resources.insert("Alias".into(), alias);
        assert!(check_template(&t).is_empty());
    }

    #[test]
    fn test_lint_depends_on_conditional_resource() {
        let mut t = base();
        let mut reader = resource("Reader", None);
        reader.depends_on.push("Key".into());
        t.resources.insert("Reader".into(), reader);
        assert_eq!(check_template(&t).len(), 1);
    }

    #[test]
    fn test_lint_arity() {
        let mut t = base();
        t.conditions.insert(
            "Lonely".into(),
            BoolExpr::Or(vec![BoolExpr::Condition("DoCreate".into())]),
        );
        t.resources
            .insert("Gated".into(), resource("Gated", Some("Lonely")));
        let findings = check_template(&t);
        assert_eq!(findings.len(), 1);
        assert!(matches!(
            &findings[0],
            TemplateError::InvalidExpression { site, .. } if site == "condition 'Lonely'"
        ));
    }

    #[test]
    fn test_lint_unknown_references_and_names() {
        let mut t = base();
        let mut bad = resource("bad-id", None);
        bad.properties
            .insert("X".into(), Value::Param("Ghost".into()));
        t.resources.insert("bad-id".into(), bad);
        let findings = check_template(&t);
        assert!(findings.contains(&TemplateError::InvalidLogicalId("bad-id".into())));
        assert!(findings.contains(&TemplateError::UnknownReference {
            kind: RefKind::Parameter,
            name: "Ghost".into(),
            site: Site::Resource("bad-id".into()),
        }));
    }

    #[test]
    fn test_lint_reports_cycle() {
        let mut t = base();
        let mut a = resource("A", None);
        a.depends_on.push("B".into());
        let mut b = resource("B", None);
        b.depends_on.push("A".into());
        t.resources.insert("A".into(), a);
        t.resources.insert("B".into(), b);
        assert_eq!(
            check_template(&t),
            vec![TemplateError::CyclicDependency(vec!["A".into(), "B".into()])]
        );
    }
}
