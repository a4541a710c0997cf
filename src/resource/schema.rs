//! Per-type property schemas.
//!
//! A [`SchemaRegistry`] describes which resource types exist, which
//! properties each accepts and which output attributes it exposes. Nodes are
//! checked against it before the dependency graph is built.

use std::collections::{BTreeMap, BTreeSet};

use super::node::{ResourceNode, ResourceType};
use crate::error::DeclarationError;

/// Property schema for one resource type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSchema {
    /// Type tag described by this schema.
    pub type_tag: ResourceType,
    /// Human-readable description.
    pub description: String,
    /// Properties that must be declared.
    pub required: BTreeSet<String>,
    /// Properties that may be declared.
    pub optional: BTreeSet<String>,
    /// Output attributes reported by the provider.
    pub outputs: BTreeSet<String>,
}

impl ResourceSchema {
    /// Creates a schema with no properties.
    #[must_use]
    pub fn new(type_tag: impl Into<ResourceType>, description: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            description: description.into(),
            required: BTreeSet::new(),
            optional: BTreeSet::new(),
            outputs: BTreeSet::new(),
        }
    }

    /// Adds required properties.
    #[must_use]
    pub fn required(mut self, names: &[&str]) -> Self {
        self.required.extend(names.iter().map(ToString::to_string));
        self
    }

    /// Adds optional properties.
    #[must_use]
    pub fn optional(mut self, names: &[&str]) -> Self {
        self.optional.extend(names.iter().map(ToString::to_string));
        self
    }

    /// Adds output attributes.
    #[must_use]
    pub fn outputs(mut self, names: &[&str]) -> Self {
        self.outputs.extend(names.iter().map(ToString::to_string));
        self
    }

    /// Returns true if `name` is a declared property of this type.
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        self.required.contains(name) || self.optional.contains(name)
    }
}

/// Registry of known resource types.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<ResourceType, ResourceSchema>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Registers a schema, replacing any previous one for the same type.
    pub fn register(&mut self, schema: ResourceSchema) {
        self.schemas.insert(schema.type_tag.clone(), schema);
    }

    /// Registers a schema, builder style.
    #[must_use]
    pub fn with(mut self, schema: ResourceSchema) -> Self {
        self.register(schema);
        self
    }

    /// Looks up the schema of a type.
    #[must_use]
    pub fn get(&self, resource_type: &ResourceType) -> Option<&ResourceSchema> {
        self.schemas.get(resource_type)
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Returns true if no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Iterates over registered type tags.
    pub fn types(&self) -> impl Iterator<Item = &ResourceType> {
        self.schemas.keys()
    }

    /// Collects every schema violation of `node`.
    #[must_use]
    pub fn check(&self, node: &ResourceNode) -> Vec<DeclarationError> {
        let Some(schema) = self.get(&node.resource_type) else {
            return vec![DeclarationError::UnknownType {
                name: node.logical_name.clone(),
                resource_type: node.resource_type.to_string(),
            }];
        };

        let mut errors = Vec::new();

        for property in &schema.required {
            if !node.properties.contains_key(property) {
                errors.push(DeclarationError::MissingProperty {
                    name: node.logical_name.clone(),
                    property: property.clone(),
                });
            }
        }

        for property in node.properties.keys() {
            if !schema.accepts(property) {
                errors.push(DeclarationError::UnknownProperty {
                    name: node.logical_name.clone(),
                    property: property.clone(),
                });
            }
        }

        errors
    }

    /// Validates `node`, returning the first violation.
    ///
    /// # Errors
    ///
    /// Returns an error if the type is unknown, a required property is
    /// missing, or an unknown property is declared.
    pub fn validate(&self, node: &ResourceNode) -> Result<(), DeclarationError> {
        match self.check(node).into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
