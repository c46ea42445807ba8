//! SG-000: Construction-time defects. Every variant aborts generation.

use std::fmt;
use thiserror::Error;

/// What kind of name a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Parameter,
    Condition,
    Resource,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter => write!(f, "parameter"),
            Self::Condition => write!(f, "condition"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

/// Where a value was read from. Resources and outputs are checked by
/// separate passes, so findings keep the distinction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Site {
    Resource(String),
    Output(String),
    Condition(String),
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(id) => write!(f, "resource '{}'", id),
            Self::Output(name) => write!(f, "output '{}'", name),
            Self::Condition(name) => write!(f, "condition '{}'", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("duplicate logical id '{0}'")]
    DuplicateLogicalId(String),

    #[error("duplicate condition name '{0}'")]
    DuplicateConditionName(String),

    #[error("duplicate parameter name '{0}'")]
    DuplicateParameterName(String),

    #[error("duplicate output name '{0}'")]
    DuplicateOutputName(String),

    #[error("{site} references unknown {kind} '{name}'")]
    UnknownReference {
        kind: RefKind,
        name: String,
        site: Site,
    },

    #[error("dependency cycle detected involving: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("{site} reads '{target}' outside of condition '{condition}'; wrap it in Fn::If")]
    MissingCreateOrReuseResolution {
        site: Site,
        target: String,
        condition: String,
    },

    #[error("condition '{0}' is declared but never referenced")]
    DeadCondition(String),

    #[error("'{0}' is not a valid logical id (alphanumeric, at most 255 characters)")]
    InvalidLogicalId(String),

    #[error("invalid expression in {site}: {detail}")]
    InvalidExpression { site: String, detail: String },

    #[error("tag budget must be at least 1, got {0}")]
    InvalidTagBudget(usize),

    #[error("grant '{0}' needs at least one grantee, target and action")]
    EmptyGrant(String),

    #[error("parameter '{0}' has no value and no default")]
    MissingParameterValue(String),

    #[error("no parameter named '{0}' to override")]
    UnknownOverride(String),

    #[error("parameter '{param}' does not allow value '{value}'")]
    DisallowedValue { param: String, value: String },

    #[error("value references '{0}', which is not created under the evaluated parameters")]
    DanglingReference(String),

    #[error("serialize error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_offending_item() {
        let e = TemplateError::UnknownReference {
            kind: RefKind::Parameter,
            name: "Ghost".to_string(),
            site: Site::Resource("CodeBuild".to_string()),
        };
        assert_eq!(
            e.to_string(),
            "resource 'CodeBuild' references unknown parameter 'Ghost'"
        );
    }

    #[test]
    fn test_error_cycle_lists_members() {
        let e = TemplateError::CyclicDependency(vec!["A".into(), "B".into()]);
        assert_eq!(e.to_string(), "dependency cycle detected involving: A, B");
    }

    #[test]
    fn test_error_resolution_site_distinguishes_outputs() {
        let e = TemplateError::MissingCreateOrReuseResolution {
            site: Site::Output("SecretsKMSArn".to_string()),
            target: "SecretsKMSKey".to_string(),
            condition: "DoCreateKMSKey".to_string(),
        };
        assert!(e.to_string().starts_with("output 'SecretsKMSArn'"));
    }
}
