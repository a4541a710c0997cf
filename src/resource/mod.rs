//! Resource declarations.
//!
//! This module defines the declared side of a deployment: resource nodes,
//! property values with deferred references, per-type schemas and property
//! hashing.

pub mod catalog;
mod hash;
mod node;
mod reference;
mod schema;
mod value;

pub use hash::PropertyHasher;
pub use node::{Deployment, OutputDecl, ResourceNode, ResourceType};
pub use reference::{ID_ATTRIBUTE, Reference};
pub use schema::{ResourceSchema, SchemaRegistry};
pub use value::{Attributes, Properties, REFERENCE_KEY, Value};
