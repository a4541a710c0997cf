//! Configuration validation.
//!
//! Checks a loaded configuration before it is used, collecting every
//! problem and reporting the first.

use crate::error::{ConfigError, Result, StrataError};
use tracing::debug;

use super::spec::EngineConfig;

/// Largest accepted executor parallelism.
pub const MAX_PARALLELISM: usize = 64;

/// Parallelism above which a warning is reported.
const HIGH_PARALLELISM: usize = 32;

/// Validator for engine configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates an engine configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self, config: &EngineConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first) = result.errors.first() {
            return Err(StrataError::Config(ConfigError::validation(
                first.message.clone(),
                first.field.clone(),
            )));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Collects every problem without failing.
    #[must_use]
    pub fn check(&self, config: &EngineConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_name("project.name", &config.project.name, &mut result);
        Self::validate_name("project.environment", &config.project.environment, &mut result);

        if config.provider.name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("provider.name"),
                message: String::from("Provider name cannot be empty"),
            });
        }

        if config.provider.region.trim().is_empty() {
            result.errors.push(ValidationError {
                field: String::from("provider.region"),
                message: String::from("Region cannot be empty"),
            });
        }

        let parallelism = config.executor.parallelism;
        if !(1..=MAX_PARALLELISM).contains(&parallelism) {
            result.errors.push(ValidationError {
                field: String::from("executor.parallelism"),
                message: format!("Parallelism must be between 1 and {MAX_PARALLELISM}, got {parallelism}"),
            });
        } else if parallelism > HIGH_PARALLELISM {
            result.warnings.push(format!(
                "executor.parallelism: {parallelism} concurrent calls may hit provider rate limits"
            ));
        }

        result
    }

    fn validate_name(field: &str, name: &str, result: &mut ValidationResult) {
        if name.is_empty() {
            result.errors.push(ValidationError {
                field: field.to_string(),
                message: format!("{field} cannot be empty"),
            });
        } else if !is_valid_name(name) {
            result.errors.push(ValidationError {
                field: field.to_string(),
                message: format!(
                    "'{name}' is invalid. Must be lowercase alphanumeric with hyphens, starting with a letter."
                ),
            });
        }
    }
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_lowercase()
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.ends_with('-')
}
