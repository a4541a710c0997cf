//! Property values that may contain deferred references.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use super::reference::Reference;

/// Key marking a reference when a value is written as JSON.
pub const REFERENCE_KEY: &str = "$ref";

/// Declared properties of a resource, ordered by key.
pub type Properties = BTreeMap<String, Value>;

/// Concrete attribute values exchanged with a provider.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// A declared property value.
///
/// Values form a tree; any leaf may be a [`Reference`] whose concrete value
/// is only known once the target resource has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// Explicit null.
    #[default]
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Numeric literal.
    Number(serde_json::Number),
    /// String literal.
    String(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested map of values.
    Map(BTreeMap<String, Value>),
    /// Deferred pointer to another node's output.
    Reference(Reference),
}

impl Value {
    /// Creates a reference value pointing at `node.attribute`.
    #[must_use]
    pub fn reference(node: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Reference(Reference::new(node, attribute))
    }

    /// Creates a reference value pointing at the provider id of `node`.
    #[must_use]
    pub fn id_of(node: impl Into<String>) -> Self {
        Self::Reference(Reference::id_of(node))
    }

    /// Builds a map value from key/value pairs.
    #[must_use]
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Self>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Builds a list value.
    #[must_use]
    pub fn list<V: Into<Self>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Returns true if this value is a reference.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Appends every reference contained in this value, depth first.
    pub fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Reference(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            Self::Map(entries) => entries.values().for_each(|v| v.collect_references(out)),
            Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => {}
        }
    }

    /// Returns true if any reference in this value targets `node`.
    #[must_use]
    pub fn references_node(&self, node: &str) -> bool {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs.iter().any(|r| r.node == node)
    }

    /// Substitutes every reference using `lookup`, producing a concrete value.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `lookup`.
    pub fn resolve<E>(
        &self,
        lookup: &mut impl FnMut(&Reference) -> Result<serde_json::Value, E>,
    ) -> Result<serde_json::Value, E> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|v| v.resolve(lookup))
                    .collect::<Result<_, _>>()?,
            ),
            Self::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.resolve(lookup)?);
                }
                serde_json::Value::Object(map)
            }
            Self::Reference(r) => lookup(r)?,
        })
    }

    /// Converts to JSON in declared form, writing references as `{"$ref": "node.attr"}`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Reference(r) => {
                let mut map = serde_json::Map::new();
                map.insert(
                    REFERENCE_KEY.to_string(),
                    serde_json::Value::String(r.to_string()),
                );
                serde_json::Value::Object(map)
            }
        }
    }

    /// Converts from declared-form JSON, recognising `{"$ref": "node.attr"}`.
    ///
    /// # Errors
    ///
    /// Returns an error if a `$ref` object holds a malformed reference.
    pub fn from_json(json: serde_json::Value) -> Result<Self, crate::error::DeclarationError> {
        Ok(match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(map) => {
                if map.len() == 1
                    && let Some(serde_json::Value::String(raw)) = map.get(REFERENCE_KEY)
                {
                    return Ok(Self::Reference(Reference::parse(raw)?));
                }
                let mut entries = BTreeMap::new();
                for (key, value) in map {
                    entries.insert(key, Self::from_json(value)?);
                }
                Self::Map(entries)
            }
        })
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(json).map_err(D::Error::custom)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Self::Number(n.into())
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Self::Reference(r)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::List(items)
    }
}
