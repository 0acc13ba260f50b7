//! Entity schema catalog
//!
//! Entity, attribute and relationship metadata loaded once per environment and
//! read-only for the rest of a run.

mod catalog;
mod models;
mod parse;

pub use catalog::EntityCatalog;
pub use models::{AttributeMetadata, AttributeType, EntityTypeDescriptor, Relationship};
pub use parse::parse_entity_definitions;
