//! Diff engine for comparing declarations against recorded state.
//!
//! This module classifies each declared node against its state record by
//! property hash, and explains differences field by field.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::resource::{Properties, PropertyHasher, ResourceNode};
use crate::state::StateRecord;

/// Engine for computing diffs between declarations and state.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Property hasher.
    hasher: PropertyHasher,
}

/// Difference for a single resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Resource name.
    pub name: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Details about the difference.
    pub details: Vec<DiffDetail>,
    /// Recorded hash (if applicable).
    pub old_hash: Option<String>,
    /// Declared hash (if applicable).
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Resource has no record and must be created.
    Create,
    /// Recorded properties differ from the declaration.
    Update,
    /// Resource type changed; the resource must be deleted and recreated.
    Replace,
    /// Record has no matching declaration.
    Delete,
    /// Resource is unchanged.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Old value, as JSON.
    pub old_value: Option<String>,
    /// New value, as JSON.
    pub new_value: Option<String>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: PropertyHasher::new(),
        }
    }

    /// Classifies a declared node against its record, if any.
    #[must_use]
    pub fn compare(&self, node: &ResourceNode, record: Option<&StateRecord>) -> ResourceDiff {
        let new_hash = self.hasher.hash_node(node);

        let Some(record) = record else {
            debug!("{} has no record, needs create", node.logical_name);
            return ResourceDiff {
                name: node.logical_name.clone(),
                diff_type: DiffType::Create,
                details: vec![],
                old_hash: None,
                new_hash: Some(new_hash),
            };
        };

        let old_hash = Some(record.properties_hash.clone());

        if record.resource_type != node.resource_type {
            debug!(
                "{} changed type {} -> {}, needs replacement",
                node.logical_name, record.resource_type, node.resource_type
            );
            return ResourceDiff {
                name: node.logical_name.clone(),
                diff_type: DiffType::Replace,
                details: vec![DiffDetail {
                    field: String::from("type"),
                    old_value: Some(record.resource_type.to_string()),
                    new_value: Some(node.resource_type.to_string()),
                }],
                old_hash,
                new_hash: Some(new_hash),
            };
        }

        if PropertyHasher::hashes_match(&record.properties_hash, &new_hash) {
            debug!("{} is up to date", node.logical_name);
            return ResourceDiff {
                name: node.logical_name.clone(),
                diff_type: DiffType::NoChange,
                details: vec![],
                old_hash,
                new_hash: Some(new_hash),
            };
        }

        let details = Self::compare_properties(&record.properties, &node.properties);
        let diff_type = if details.is_empty() {
            DiffType::NoChange
        } else {
            DiffType::Update
        };

        debug!("{} classified as {}", node.logical_name, diff_type);
        ResourceDiff {
            name: node.logical_name.clone(),
            diff_type,
            details,
            old_hash,
            new_hash: Some(new_hash),
        }
    }

    /// Describes a record that no longer has a declaration.
    #[must_use]
    pub fn orphaned(record: &StateRecord) -> ResourceDiff {
        debug!("Found orphaned record: {}", record.logical_name);
        ResourceDiff {
            name: record.logical_name.clone(),
            diff_type: DiffType::Delete,
            details: vec![DiffDetail {
                field: String::from("resource"),
                old_value: Some(record.provider_id.clone()),
                new_value: None,
            }],
            old_hash: Some(record.properties_hash.clone()),
            new_hash: None,
        }
    }

    /// Lists the properties that differ between two bags, ordered by key.
    #[must_use]
    pub fn compare_properties(old: &Properties, new: &Properties) -> Vec<DiffDetail> {
        let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

        keys.into_iter()
            .filter_map(|key| {
                let before = old.get(key);
                let after = new.get(key);
                (before != after).then(|| DiffDetail {
                    field: key.clone(),
                    old_value: before.map(|v| v.to_json().to_string()),
                    new_value: after.map(|v| v.to_json().to_string()),
                })
            })
            .collect()
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DiffDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.field,
            self.old_value.as_deref().unwrap_or("(none)"),
            self.new_value.as_deref().unwrap_or("(none)")
        )
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Attributes, Value};

    fn subnet(cidr: &str) -> ResourceNode {
        ResourceNode::new("subnet", "ec2.subnet")
            .with_property("vpc_id", Value::id_of("main"))
            .with_property("cidr_block", cidr)
    }

    #[test]
    fn test_create_without_record() {
        let diff = DiffEngine::new().compare(&subnet("10.0.1.0/24"), None);
        assert_eq!(diff.diff_type, DiffType::Create);
        assert!(diff.old_hash.is_none());
    }

    #[test]
    fn test_no_change() {
        let node = subnet("10.0.1.0/24");
        let record = StateRecord::new(&node, "subnet-1", Attributes::new());
        let diff = DiffEngine::new().compare(&node, Some(&record));
        assert_eq!(diff.diff_type, DiffType::NoChange);
    }

    #[test]
    fn test_update_with_details() {
        let record = StateRecord::new(&subnet("10.0.1.0/24"), "subnet-1", Attributes::new());
        let node = subnet("10.0.2.0/24").with_property("map_public_ip_on_launch", true);
        let diff = DiffEngine::new().compare(&node, Some(&record));

        assert_eq!(diff.diff_type, DiffType::Update);
        assert_eq!(diff.details.len(), 2);
        assert_eq!(diff.details[0].field, "cidr_block");
        assert_eq!(diff.details[0].old_value.as_deref(), Some("\"10.0.1.0/24\""));
        assert_eq!(diff.details[1].field, "map_public_ip_on_launch");
        assert!(diff.details[1].old_value.is_none());
        assert_eq!(diff.to_string(), "subnet: update (cidr_block, map_public_ip_on_launch)");
    }

    #[test]
    fn test_type_change_is_replace() {
        let record = StateRecord::new(&subnet("10.0.1.0/24"), "subnet-1", Attributes::new());
        let mut node = subnet("10.0.1.0/24");
        node.resource_type = "ec2.other_subnet".into();

        let diff = DiffEngine::new().compare(&node, Some(&record));
        assert_eq!(diff.diff_type, DiffType::Replace);
        assert_eq!(diff.details[0].field, "type");
    }

    #[test]
    fn test_stale_hash_with_equal_properties_is_no_change() {
        let node = subnet("10.0.1.0/24");
        let mut record = StateRecord::new(&node, "subnet-1", Attributes::new());
        record.properties_hash = String::from("stale");

        let diff = DiffEngine::new().compare(&node, Some(&record));
        assert_eq!(diff.diff_type, DiffType::NoChange);
    }
}
