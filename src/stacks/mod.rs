//! Concrete stacks: the orchestrator control plane and the per-repository
//! CodeBuild stack.

pub mod individual;
pub mod orchestrator;

use crate::core::error::TemplateError;
use crate::core::types::Template;
use std::fmt;
use std::str::FromStr;

/// State-machine definition compiled into the binary. Used when no
/// `--definition` file is given.
pub const BUNDLED_DEFINITION: &str = include_str!("../../assets/state-machine-definition.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackKind {
    Orchestrator,
    Individual,
}

impl StackKind {
    pub const ALL: [StackKind; 2] = [StackKind::Orchestrator, StackKind::Individual];

    /// Output file name without extension.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Individual => "individual-codebuild",
        }
    }

    /// Assemble this stack. Only the orchestrator reads `definition`.
    pub fn build(&self, definition: &str) -> Result<Template, TemplateError> {
        match self {
            Self::Orchestrator => orchestrator::build(definition),
            Self::Individual => individual::build(),
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orchestrator => f.write_str("orchestrator"),
            Self::Individual => f.write_str("individual"),
        }
    }
}

impl FromStr for StackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orchestrator" => Ok(Self::Orchestrator),
            "individual" | "individual-codebuild" => Ok(Self::Individual),
            other => Err(format!(
                "unknown stack '{}' (expected orchestrator or individual)",
                other
            )),
        }
    }
}
