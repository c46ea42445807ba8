//! Core template logic: data model, builder, conditions, tags, trust
//! wiring, ordering, lint, evaluation and serialization.

pub mod builder;
pub mod codegen;
pub mod conditions;
pub mod digest;
pub mod error;
pub mod eval;
pub mod lint;
pub mod policy;
pub mod resolver;
pub mod tags;
pub mod trust;
pub mod types;

pub use builder::{CreateOrReuse, CreateSwitch, ResourceSpec, TemplateBuilder};
pub use error::TemplateError;
