//! Error types for the Strata resource-graph evaluator.
//!
//! This module provides the error hierarchy for every stage of the
//! evaluation lifecycle: declaration, graph building, planning, provider
//! calls, state management and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Strata evaluator.
#[derive(Debug, Error)]
pub enum StrataError {
    /// Malformed or duplicate declarations.
    #[error("Declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    /// Dependency graph errors (cycles, unknown references).
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Provider API errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// State store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors in the authored declaration set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// Two declarations share a logical name.
    #[error("Duplicate logical name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// A logical name does not follow the naming convention.
    #[error("Invalid logical name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: String,
    },

    /// The resource type is not registered in the schema registry.
    #[error("Unknown resource type '{resource_type}' for '{name}'")]
    UnknownType {
        /// Logical name of the offending node.
        name: String,
        /// The unregistered type tag.
        resource_type: String,
    },

    /// A required property is missing.
    #[error("Resource '{name}' is missing required property '{property}'")]
    MissingProperty {
        /// Logical name of the offending node.
        name: String,
        /// The missing property.
        property: String,
    },

    /// A property is not part of the type's schema.
    #[error("Resource '{name}' has unknown property '{property}'")]
    UnknownProperty {
        /// Logical name of the offending node.
        name: String,
        /// The unexpected property.
        property: String,
    },

    /// A reference string could not be parsed.
    #[error("Malformed reference '{raw}': expected NODE.ATTRIBUTE")]
    MalformedReference {
        /// The raw reference text.
        raw: String,
    },

    /// A destroy target names a resource that is neither declared nor recorded.
    #[error("Destroy target '{name}' is not a known resource")]
    UnknownTarget {
        /// The unknown target.
        name: String,
    },
}

/// Dependency graph errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency graph contains a cycle.
    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    Cycle {
        /// Logical names along the cycle, first name repeated at the end.
        cycle: Vec<String>,
    },

    /// A reference or explicit dependency points to an undeclared node.
    #[error("'{from}' references unknown resource '{target}'")]
    UnknownReference {
        /// The node (or output) holding the reference.
        from: String,
        /// The missing target.
        target: String,
    },
}

/// Planning errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A reference targets a resource scheduled for deletion in the same plan.
    #[error("'{node}' references '{target}', which is scheduled for deletion")]
    Conflict {
        /// The surviving node that holds the reference.
        node: String,
        /// The target scheduled for deletion.
        target: String,
    },
}

/// Provider API errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// A provider call failed.
    #[error("{operation} {resource_type} failed: {message}")]
    CallFailed {
        /// Operation that failed (create, update, delete, read).
        operation: String,
        /// Resource type tag.
        resource_type: String,
        /// Error message from the provider.
        message: String,
    },

    /// The provider does not know the given identifier.
    #[error("Resource not found: {provider_id}")]
    NotFound {
        /// The unknown provider identifier.
        provider_id: String,
    },

    /// The provider does not handle this resource type.
    #[error("Unsupported resource type: {resource_type}")]
    UnsupportedType {
        /// The unsupported type tag.
        resource_type: String,
    },

    /// A reference could not be resolved at apply time.
    #[error("Cannot resolve {reference}: {reason}")]
    UnresolvedReference {
        /// The reference text.
        reference: String,
        /// Why resolution failed.
        reason: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// The store could not be reached or rejected the operation.
    #[error("State store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// A state write failed after the provider call succeeded.
    #[error(
        "Failed to record state for '{resource}': {message}; manual reconciliation may be needed"
    )]
    ReconciliationRequired {
        /// Logical name whose record could not be written.
        resource: String,
        /// Underlying store error.
        message: String,
    },
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// An environment override holds an unusable value.
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// Result type alias for Strata operations.
pub type Result<T> = std::result::Result<T, StrataError>;

impl StrataError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error aborts planning without producing a plan.
    #[must_use]
    pub const fn is_fatal_to_planning(&self) -> bool {
        matches!(
            self,
            Self::Declaration(_) | Self::Graph(_) | Self::Plan(_) | Self::State(_)
        )
    }

    /// Returns true if the recorded state may no longer match reality.
    #[must_use]
    pub const fn requires_manual_reconciliation(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::ReconciliationRequired { .. } | StateError::Unavailable { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates an unavailable-store error with the given message.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a failed-call error.
    #[must_use]
    pub fn call_failed(
        operation: impl Into<String>,
        resource_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::CallFailed {
            operation: operation.into(),
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }

    /// Returns true if the provider reported the resource as gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_joins_path() {
        let err = GraphError::Cycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_reconciliation_flag() {
        let err = StrataError::State(StateError::ReconciliationRequired {
            resource: String::from("subnet"),
            message: String::from("disk full"),
        });
        assert!(err.requires_manual_reconciliation());
        assert!(err.to_string().contains("manual reconciliation may be needed"));

        let err = StrataError::Provider(ProviderError::call_failed("create", "ec2.vpc", "boom"));
        assert!(!err.requires_manual_reconciliation());
        assert!(!err.is_fatal_to_planning());
    }
}
