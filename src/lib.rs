//! stackgen: conditional CloudFormation template synthesis.
//!
//! Templates are assembled through a checked builder: every reference is
//! validated when it is declared, create-or-reuse resources can only be
//! read through their condition, and the finished graph is ordered and
//! linted before it is serialized.

pub mod cli;
pub mod core;
pub mod stacks;
