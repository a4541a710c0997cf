//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `strata.yaml`
//! - Environment variable overrides
//! - Validation of configuration values

mod parser;
mod spec;
mod validator;

pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use spec::{EngineConfig, ExecutorConfig, ProjectConfig, ProviderConfig};
pub use validator::{ConfigValidator, MAX_PARALLELISM, ValidationError, ValidationResult};
