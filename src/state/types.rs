//! Persisted per-resource state.
//!
//! A [`StateRecord`] is what the evaluator remembers about one applied
//! resource: its declared properties, the identifier assigned by the provider
//! and the attributes the provider reported back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::resource::{
    Attributes, ID_ATTRIBUTE, Properties, PropertyHasher, ResourceNode, ResourceType,
};

/// Last-applied state of one resource, keyed by logical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Logical name (from the declaration).
    pub logical_name: String,

    /// Resource type at the time of the last apply.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Identifier assigned by the provider.
    pub provider_id: String,

    /// Declared properties as last applied, references unresolved.
    pub properties: Properties,

    /// Output attributes reported by the provider.
    #[serde(default)]
    pub outputs: Attributes,

    /// Logical names this resource depended on when last applied.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    /// Hash of `properties`.
    pub properties_hash: String,

    /// When the resource was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl StateRecord {
    /// Creates a record for a freshly created resource.
    #[must_use]
    pub fn new(node: &ResourceNode, provider_id: impl Into<String>, outputs: Attributes) -> Self {
        let now = Utc::now();
        Self {
            logical_name: node.logical_name.clone(),
            resource_type: node.resource_type.clone(),
            provider_id: provider_id.into(),
            properties: node.properties.clone(),
            outputs,
            dependencies: node
                .dependency_names()
                .into_iter()
                .map(String::from)
                .collect(),
            properties_hash: PropertyHasher::new().hash_node(node),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns this record updated to match `node` and the new outputs.
    ///
    /// The provider id and creation time are kept.
    #[must_use]
    pub fn updated(&self, node: &ResourceNode, outputs: Attributes) -> Self {
        Self {
            created_at: self.created_at,
            ..Self::new(node, self.provider_id.clone(), outputs)
        }
    }

    /// Returns true if the recorded dependencies differ from those `node`
    /// declares now.
    #[must_use]
    pub fn dependencies_differ(&self, node: &ResourceNode) -> bool {
        let declared = node.dependency_names();
        self.dependencies.len() != declared.len()
            || self
                .dependencies
                .iter()
                .any(|d| !declared.contains(d.as_str()))
    }

    /// Returns this record with its dependencies taken from `node`.
    ///
    /// Properties, outputs and the provider id are kept.
    #[must_use]
    pub fn refreshed(&self, node: &ResourceNode) -> Self {
        Self {
            dependencies: node
                .dependency_names()
                .into_iter()
                .map(String::from)
                .collect(),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Returns the value of an output attribute.
    ///
    /// The `id` attribute always resolves to the provider identifier.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<serde_json::Value> {
        if name == ID_ATTRIBUTE {
            return Some(serde_json::Value::String(self.provider_id.clone()));
        }
        self.outputs.get(name).cloned()
    }

    /// Returns true if this record's properties reference `node`.
    #[must_use]
    pub fn references_node(&self, node: &str) -> bool {
        self.properties.values().any(|v| v.references_node(node))
    }
}
