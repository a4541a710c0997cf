//! Resource declarations and deployment units.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::reference::Reference;
use super::value::{Properties, Value};

/// Provider resource kind, written as a dotted tag such as `ec2.subnet`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    /// Creates a resource type from its tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the type tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last segment of the tag (`subnet` for `ec2.subnet`).
    #[must_use]
    pub fn kind(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// One declared infrastructure object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Stable identifier within the deployment.
    pub logical_name: String,

    /// Provider resource kind.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Declared property bag; values may be references.
    #[serde(default)]
    pub properties: Properties,

    /// Explicit ordering dependencies beyond those implied by references.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
}

impl ResourceNode {
    /// Creates a node with no properties.
    #[must_use]
    pub fn new(logical_name: impl Into<String>, resource_type: impl Into<ResourceType>) -> Self {
        Self {
            logical_name: logical_name.into(),
            resource_type: resource_type.into(),
            properties: Properties::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Sets a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Adds an explicit dependency.
    #[must_use]
    pub fn with_depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    /// Returns every reference held in the properties.
    #[must_use]
    pub fn references(&self) -> Vec<&Reference> {
        let mut refs = Vec::new();
        for value in self.properties.values() {
            value.collect_references(&mut refs);
        }
        refs
    }

    /// Returns the names of nodes referenced from properties.
    #[must_use]
    pub fn referenced_nodes(&self) -> BTreeSet<&str> {
        self.references().into_iter().map(|r| r.node.as_str()).collect()
    }

    /// Returns true if any property references `node`.
    #[must_use]
    pub fn references_node(&self, node: &str) -> bool {
        self.properties.values().any(|v| v.references_node(node))
    }

    /// Returns all nodes this one depends on, implied or explicit.
    #[must_use]
    pub fn dependency_names(&self) -> BTreeSet<&str> {
        let mut names = self.referenced_nodes();
        names.extend(self.depends_on.iter().map(String::as_str));
        names
    }

    /// Returns the properties in declared JSON form.
    #[must_use]
    pub fn properties_json(&self) -> serde_json::Value {
        Value::Map(self.properties.clone()).to_json()
    }
}

/// An exported value of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDecl {
    /// Export name.
    pub name: String,
    /// Attribute being exported.
    pub value: Reference,
}

/// A deployment unit: the declared nodes plus exported outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment name.
    pub name: String,

    /// Declared resources, in authoring order.
    #[serde(default)]
    pub nodes: Vec<ResourceNode>,

    /// Exported outputs.
    #[serde(default)]
    pub outputs: Vec<OutputDecl>,
}

impl Deployment {
    /// Creates an empty deployment.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Appends a node.
    #[must_use]
    pub fn with_node(mut self, node: ResourceNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Appends an exported output.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, value: Reference) -> Self {
        self.outputs.push(OutputDecl {
            name: name.into(),
            value,
        });
        self
    }

    /// Finds a node by logical name.
    #[must_use]
    pub fn node(&self, logical_name: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.logical_name == logical_name)
    }

    /// Removes a node by logical name, returning it if present.
    pub fn remove_node(&mut self, logical_name: &str) -> Option<ResourceNode> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.logical_name == logical_name)?;
        Some(self.nodes.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_names_merge_refs_and_explicit() {
        let node = ResourceNode::new("instance", "ec2.instance")
            .with_property("subnet_id", Value::id_of("subnet"))
            .with_property(
                "vpc_security_group_ids",
                Value::list([Value::id_of("sec_group")]),
            )
            .with_depends_on("route_table_assoc");

        let names: Vec<_> = node.dependency_names().into_iter().collect();
        assert_eq!(names, vec!["route_table_assoc", "sec_group", "subnet"]);
        assert!(node.references_node("subnet"));
        assert!(!node.references_node("route_table_assoc"));
    }

    #[test]
    fn test_resource_type_kind() {
        assert_eq!(ResourceType::new("ec2.subnet").kind(), "subnet");
        assert_eq!(ResourceType::new("bucket").kind(), "bucket");
    }

    #[test]
    fn test_node_yaml_roundtrip_keeps_references() {
        let yaml = r#"
logical_name: subnet
type: ec2.subnet
properties:
  cidr_block: 10.0.1.0/24
  vpc_id:
    $ref: main.id
"#;
        let node: ResourceNode = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(node.resource_type.as_str(), "ec2.subnet");
        assert_eq!(node.properties["vpc_id"], Value::id_of("main"));
        assert!(node.depends_on.is_empty());
    }
}
