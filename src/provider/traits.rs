//! Provider capability interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::ProviderError;
use crate::resource::{Attributes, ResourceType};

/// Ambient values passed explicitly to every provider call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderContext {
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Target region.
    pub region: String,
    /// Provider-specific settings.
    pub settings: BTreeMap<String, String>,
}

impl ProviderContext {
    /// Creates a context for a region.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }

    /// Derives the context from an engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            project: config.project.name.clone(),
            environment: config.project.environment.clone(),
            region: config.provider.region.clone(),
            settings: config.provider.settings.clone(),
        }
    }
}

/// Result of a successful create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponse {
    /// Identifier assigned by the provider.
    pub provider_id: String,
    /// Output attributes of the new resource.
    pub outputs: Attributes,
}

/// Provider operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create a resource.
    Create,
    /// Update a resource in place.
    Update,
    /// Delete a resource.
    Delete,
    /// Read a resource's current attributes.
    Read,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Read => "read",
        };
        write!(f, "{s}")
    }
}

/// External provider API, dispatched by resource type tag.
///
/// Properties passed in are fully resolved: every reference has been
/// replaced by the concrete value it points at.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name, for logs and reports.
    fn name(&self) -> &'static str;

    /// Creates a resource.
    async fn create(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        properties: &Attributes,
    ) -> Result<CreateResponse, ProviderError>;

    /// Updates a resource in place, returning its new outputs.
    async fn update(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
        properties: &Attributes,
    ) -> Result<Attributes, ProviderError>;

    /// Deletes a resource.
    ///
    /// Returns [`ProviderError::NotFound`] if the resource does not exist.
    async fn delete(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
    ) -> Result<(), ProviderError>;

    /// Reads a resource's current outputs, or `None` if it no longer exists.
    async fn read(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
    ) -> Result<Option<Attributes>, ProviderError>;
}

#[async_trait]
impl<T: Provider + ?Sized> Provider for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        properties: &Attributes,
    ) -> Result<CreateResponse, ProviderError> {
        (**self).create(ctx, resource_type, properties).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
        properties: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        (**self)
            .update(ctx, resource_type, provider_id, properties)
            .await
    }

    async fn delete(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
    ) -> Result<(), ProviderError> {
        (**self).delete(ctx, resource_type, provider_id).await
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
    ) -> Result<Option<Attributes>, ProviderError> {
        (**self).read(ctx, resource_type, provider_id).await
    }
}
