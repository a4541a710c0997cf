//! Deferred pointers to another resource's output attribute.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DeclarationError;

/// Attribute name that always resolves to the provider-assigned identifier.
pub const ID_ATTRIBUTE: &str = "id";

/// A reference to an output attribute of another resource node.
///
/// Written as `node.attribute`, e.g. `main.id` or `instance.public_ip`.
/// The attribute is unknown until the target node has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Reference {
    /// Logical name of the target node.
    pub node: String,
    /// Output attribute of the target node.
    pub attribute: String,
}

impl Reference {
    /// Creates a reference to `node.attribute`.
    #[must_use]
    pub fn new(node: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            attribute: attribute.into(),
        }
    }

    /// Creates a reference to the provider identifier of `node`.
    #[must_use]
    pub fn id_of(node: impl Into<String>) -> Self {
        Self::new(node, ID_ATTRIBUTE)
    }

    /// Parses a reference from `node.attribute` notation.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is empty or the dot is missing.
    pub fn parse(raw: &str) -> Result<Self, DeclarationError> {
        let malformed = || DeclarationError::MalformedReference {
            raw: raw.to_string(),
        };

        let (node, attribute) = raw.split_once('.').ok_or_else(malformed)?;
        if node.is_empty() || attribute.is_empty() || attribute.contains('.') {
            return Err(malformed());
        }

        Ok(Self::new(node, attribute))
    }

    /// Returns true if this reference points at the provider identifier.
    #[must_use]
    pub fn is_id(&self) -> bool {
        self.attribute == ID_ATTRIBUTE
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.attribute)
    }
}

impl FromStr for Reference {
    type Err = DeclarationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Reference {
    type Error = DeclarationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Reference> for String {
    fn from(reference: Reference) -> Self {
        reference.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference() {
        let reference: Reference = "main.id".parse().unwrap();
        assert_eq!(reference.node, "main");
        assert_eq!(reference.attribute, "id");
        assert!(reference.is_id());
        assert_eq!(reference.to_string(), "main.id");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for raw in ["main", ".id", "main.", "a.b.c", ""] {
            assert!(Reference::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let reference = Reference::new("instance", "public_ip");
        let json = serde_json::to_string(&reference).unwrap();
        assert_eq!(json, "\"instance.public_ip\"");

        let back: Reference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reference);
    }
}
