//! Property hashing for change detection.
//!
//! Hashes are computed over the canonical JSON of the declared properties.
//! Keys are ordered, so equal property bags always hash equally.

use sha2::{Digest, Sha256};

use super::node::ResourceNode;
use super::value::{Properties, Value};

/// Hasher for computing property hashes.
#[derive(Debug, Default)]
pub struct PropertyHasher;

impl PropertyHasher {
    /// Creates a new property hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the hash of a declared property bag.
    #[must_use]
    pub fn hash_properties(&self, properties: &Properties) -> String {
        let canonical = Value::Map(properties.clone()).to_json().to_string();

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Computes the hash of a node's declared properties.
    ///
    /// Type and explicit dependencies are not part of the hash.
    #[must_use]
    pub fn hash_node(&self, node: &ResourceNode) -> String {
        self.hash_properties(&node.properties)
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes in constant time.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subnet(cidr: &str) -> ResourceNode {
        ResourceNode::new("subnet", "ec2.subnet")
            .with_property("vpc_id", Value::id_of("main"))
            .with_property("cidr_block", cidr)
    }

    #[test]
    fn test_hash_deterministic() {
        let hasher = PropertyHasher::new();
        assert_eq!(
            hasher.hash_node(&subnet("10.0.1.0/24")),
            hasher.hash_node(&subnet("10.0.1.0/24"))
        );
    }

    #[test]
    fn test_property_change_changes_hash() {
        let hasher = PropertyHasher::new();
        assert_ne!(
            hasher.hash_node(&subnet("10.0.1.0/24")),
            hasher.hash_node(&subnet("10.0.2.0/24"))
        );
    }

    #[test]
    fn test_explicit_dependency_not_hashed() {
        let hasher = PropertyHasher::new();
        let plain = subnet("10.0.1.0/24");
        let ordered = subnet("10.0.1.0/24").with_depends_on("igw");
        assert_eq!(hasher.hash_node(&plain), hasher.hash_node(&ordered));
    }

    #[test]
    fn test_short_hash_and_match() {
        let hasher = PropertyHasher::new();
        assert_eq!(hasher.short_hash("abcdef1234567890"), "abcdef12");
        assert!(PropertyHasher::hashes_match("abc123", "abc123"));
        assert!(!PropertyHasher::hashes_match("abc123", "abc124"));
        assert!(!PropertyHasher::hashes_match("abc123", "abc12"));
    }
}
