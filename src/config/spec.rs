//! Configuration types.
//!
//! This module defines the structs that map to `strata.yaml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::planner::DEFAULT_PARALLELISM;

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Provider configuration.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Executor configuration.
    #[serde(default)]
    pub executor: ExecutorConfig,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Name of the deployment unit.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Provider configuration, passed to every provider call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider name.
    #[serde(default = "default_provider")]
    pub name: String,
    /// Region resources are created in.
    #[serde(default = "default_region")]
    pub region: String,
    /// Free-form provider settings.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// Executor configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Maximum number of concurrent provider calls.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_environment() -> String {
    String::from("dev")
}

fn default_provider() -> String {
    String::from("simulated")
}

fn default_region() -> String {
    String::from("eu-central-1")
}

const fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

impl EngineConfig {
    /// Creates a configuration with defaults for the given project.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: ProjectConfig {
                name: project.into(),
                environment: default_environment(),
            },
            provider: ProviderConfig::default(),
            executor: ExecutorConfig::default(),
        }
    }

    /// Sets the provider region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.provider.region = region.into();
        self
    }

    /// Sets the executor parallelism.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.executor.parallelism = parallelism;
        self
    }

    /// Returns the fully qualified deployment name (`project-environment`).
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            region: default_region(),
            settings: BTreeMap::new(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new("web-server");
        assert_eq!(config.project.environment, "dev");
        assert_eq!(config.provider.name, "simulated");
        assert_eq!(config.provider.region, "eu-central-1");
        assert_eq!(config.executor.parallelism, 4);
        assert_eq!(config.full_name(), "web-server-dev");
    }
}
