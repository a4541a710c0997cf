//! In-memory provider.
//!
//! Behaves like a cloud API closely enough to drive the evaluator end to end:
//! assigns identifiers, reports outputs, remembers what exists and can be
//! told to fail specific calls.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::traits::{CreateResponse, Operation, Provider, ProviderContext};
use crate::error::ProviderError;
use crate::resource::{Attributes, ID_ATTRIBUTE, ResourceType, catalog};

/// A resource held by the simulated provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedResource {
    /// Resource type.
    pub resource_type: ResourceType,
    /// Last properties received.
    pub properties: Attributes,
    /// Reported outputs.
    pub outputs: Attributes,
}

/// A recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    /// Operation performed.
    pub operation: Operation,
    /// Resource type tag.
    pub resource_type: ResourceType,
    /// Target identifier (update, delete, read) or assigned identifier (create).
    pub provider_id: Option<String>,
    /// Resolved properties sent (create, update).
    pub properties: Option<Attributes>,
}

/// In-memory implementation of [`Provider`].
#[derive(Debug, Default)]
pub struct SimulatedProvider {
    /// Existing resources keyed by provider id.
    resources: RwLock<HashMap<String, SimulatedResource>>,
    /// Calls that must fail, keyed by (operation, type tag).
    failures: RwLock<BTreeSet<(Operation, String)>>,
    /// Artificial delay applied to mutating calls.
    latency: Option<Duration>,
    /// Call log.
    calls: Mutex<Vec<ProviderCall>>,
    /// Mutating calls currently running.
    in_flight: AtomicUsize,
    /// Highest observed value of `in_flight`.
    max_in_flight: AtomicUsize,
    /// Counter used to hand out addresses.
    next_host: AtomicU32,
}

impl SimulatedProvider {
    /// Creates a provider with no resources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every create, update and delete by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes every `operation` on `resource_type` fail.
    pub async fn fail_on(&self, operation: Operation, resource_type: &str) {
        self.failures
            .write()
            .await
            .insert((operation, resource_type.to_string()));
    }

    /// Removes all injected failures.
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Returns a copy of the call log.
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().await.clone()
    }

    /// Returns the number of calls of one kind.
    pub async fn call_count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Returns the highest number of mutating calls that ran at once.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the number of existing resources.
    pub async fn resource_count(&self) -> usize {
        self.resources.read().await.len()
    }

    /// Looks up an existing resource.
    pub async fn resource(&self, provider_id: &str) -> Option<SimulatedResource> {
        self.resources.read().await.get(provider_id).cloned()
    }

    /// Deletes a resource behind the evaluator's back.
    pub async fn forget(&self, provider_id: &str) -> bool {
        self.resources.write().await.remove(provider_id).is_some()
    }

    /// Overwrites an output attribute behind the evaluator's back.
    pub async fn tamper(&self, provider_id: &str, key: &str, value: serde_json::Value) -> bool {
        match self.resources.write().await.get_mut(provider_id) {
            Some(resource) => {
                resource.outputs.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    async fn check_failure(
        &self,
        operation: Operation,
        resource_type: &ResourceType,
    ) -> Result<(), ProviderError> {
        let failures = self.failures.read().await;
        if failures.contains(&(operation, resource_type.as_str().to_string())) {
            return Err(ProviderError::call_failed(
                operation.to_string(),
                resource_type.as_str(),
                "injected failure",
            ));
        }
        Ok(())
    }

    async fn record(
        &self,
        operation: Operation,
        resource_type: &ResourceType,
        provider_id: Option<&str>,
        properties: Option<&Attributes>,
    ) {
        self.calls.lock().await.push(ProviderCall {
            operation,
            resource_type: resource_type.clone(),
            provider_id: provider_id.map(String::from),
            properties: properties.cloned(),
        });
    }

    async fn simulate_latency(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn new_id(resource_type: &ResourceType) -> String {
        let prefix = match resource_type.as_str() {
            catalog::VPC => "vpc",
            catalog::INTERNET_GATEWAY => "igw",
            catalog::SUBNET => "subnet",
            catalog::ROUTE_TABLE => "rtb",
            catalog::ROUTE_TABLE_ASSOCIATION => "rtbassoc",
            catalog::SECURITY_GROUP => "sg",
            catalog::INSTANCE => "i",
            _ => resource_type.kind(),
        };
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        format!("{prefix}-{suffix}")
    }

    fn outputs_for(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
        properties: &Attributes,
        previous: Option<&Attributes>,
    ) -> Attributes {
        let mut outputs = properties.clone();
        outputs.insert(
            ID_ATTRIBUTE.to_string(),
            serde_json::Value::String(provider_id.to_string()),
        );
        outputs.insert(
            String::from("arn"),
            serde_json::Value::String(format!(
                "arn:sim:{}:{}/{}",
                ctx.region, resource_type, provider_id
            )),
        );

        if resource_type.as_str() == catalog::INSTANCE {
            for key in ["public_ip", "private_ip"] {
                if let Some(existing) = previous.and_then(|p| p.get(key)) {
                    outputs.insert(key.to_string(), existing.clone());
                }
            }
            if !outputs.contains_key("public_ip") {
                let host = self.next_host.fetch_add(1, Ordering::SeqCst) % 250 + 4;
                outputs.insert(
                    String::from("public_ip"),
                    serde_json::Value::String(format!("203.0.113.{host}")),
                );
                outputs.insert(
                    String::from("private_ip"),
                    serde_json::Value::String(format!("10.0.1.{host}")),
                );
            }
        }

        outputs
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn create(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        properties: &Attributes,
    ) -> Result<CreateResponse, ProviderError> {
        self.simulate_latency().await;
        self.check_failure(Operation::Create, resource_type).await?;

        let provider_id = Self::new_id(resource_type);
        let outputs = self.outputs_for(ctx, resource_type, &provider_id, properties, None);

        self.resources.write().await.insert(
            provider_id.clone(),
            SimulatedResource {
                resource_type: resource_type.clone(),
                properties: properties.clone(),
                outputs: outputs.clone(),
            },
        );
        self.record(
            Operation::Create,
            resource_type,
            Some(&provider_id),
            Some(properties),
        )
        .await;
        debug!("Simulated create {resource_type} -> {provider_id}");

        Ok(CreateResponse {
            provider_id,
            outputs,
        })
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
        properties: &Attributes,
    ) -> Result<Attributes, ProviderError> {
        self.simulate_latency().await;
        self.check_failure(Operation::Update, resource_type).await?;

        let mut resources = self.resources.write().await;
        let resource = resources
            .get_mut(provider_id)
            .ok_or_else(|| ProviderError::NotFound {
                provider_id: provider_id.to_string(),
            })?;

        let outputs = self.outputs_for(
            ctx,
            resource_type,
            provider_id,
            properties,
            Some(&resource.outputs),
        );
        resource.properties = properties.clone();
        resource.outputs = outputs.clone();
        drop(resources);

        self.record(
            Operation::Update,
            resource_type,
            Some(provider_id),
            Some(properties),
        )
        .await;
        debug!("Simulated update {resource_type} {provider_id}");

        Ok(outputs)
    }

    async fn delete(
        &self,
        _ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
    ) -> Result<(), ProviderError> {
        self.simulate_latency().await;
        self.check_failure(Operation::Delete, resource_type).await?;
        self.record(Operation::Delete, resource_type, Some(provider_id), None)
            .await;

        if self.resources.write().await.remove(provider_id).is_none() {
            return Err(ProviderError::NotFound {
                provider_id: provider_id.to_string(),
            });
        }
        debug!("Simulated delete {resource_type} {provider_id}");
        Ok(())
    }

    async fn read(
        &self,
        _ctx: &ProviderContext,
        resource_type: &ResourceType,
        provider_id: &str,
    ) -> Result<Option<Attributes>, ProviderError> {
        self.check_failure(Operation::Read, resource_type).await?;
        self.record(Operation::Read, resource_type, Some(provider_id), None)
            .await;
        Ok(self
            .resources
            .read()
            .await
            .get(provider_id)
            .map(|r| r.outputs.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ProviderContext {
        ProviderContext::new("eu-central-1")
    }

    fn props(pairs: &[(&str, serde_json::Value)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_assigns_prefixed_id() {
        let provider = SimulatedProvider::new();
        let vpc = ResourceType::new(catalog::VPC);

        let created = provider
            .create(&ctx(), &vpc, &props(&[("cidr_block", json!("10.0.0.0/16"))]))
            .await
            .unwrap();

        assert!(created.provider_id.starts_with("vpc-"));
        assert_eq!(created.provider_id.len(), "vpc-".len() + 8);
        assert_eq!(created.outputs["cidr_block"], json!("10.0.0.0/16"));
        assert_eq!(created.outputs["id"], json!(created.provider_id));
        assert_eq!(provider.resource_count().await, 1);
    }

    #[tokio::test]
    async fn test_instance_reports_addresses_stably() {
        let provider = SimulatedProvider::new();
        let instance = ResourceType::new(catalog::INSTANCE);

        let created = provider
            .create(&ctx(), &instance, &props(&[("ami", json!("ami-1"))]))
            .await
            .unwrap();
        let ip = created.outputs["public_ip"].clone();

        let updated = provider
            .update(
                &ctx(),
                &instance,
                &created.provider_id,
                &props(&[("ami", json!("ami-2"))]),
            )
            .await
            .unwrap();
        assert_eq!(updated["public_ip"], ip);
        assert_eq!(updated["ami"], json!("ami-2"));
    }

    #[tokio::test]
    async fn test_injected_failure_and_call_log() {
        let provider = SimulatedProvider::new();
        provider.fail_on(Operation::Create, catalog::SUBNET).await;

        let err = provider
            .create(&ctx(), &ResourceType::new(catalog::SUBNET), &Attributes::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        assert_eq!(provider.call_count(Operation::Create).await, 0);

        provider.clear_failures().await;
        provider
            .create(&ctx(), &ResourceType::new(catalog::SUBNET), &Attributes::new())
            .await
            .unwrap();
        assert_eq!(provider.call_count(Operation::Create).await, 1);
    }

    #[tokio::test]
    async fn test_delete_and_read_missing() {
        let provider = SimulatedProvider::new();
        let vpc = ResourceType::new(catalog::VPC);
        let created = provider.create(&ctx(), &vpc, &Attributes::new()).await.unwrap();

        assert!(provider.read(&ctx(), &vpc, &created.provider_id).await.unwrap().is_some());
        provider.delete(&ctx(), &vpc, &created.provider_id).await.unwrap();
        assert!(provider.read(&ctx(), &vpc, &created.provider_id).await.unwrap().is_none());

        let err = provider
            .delete(&ctx(), &vpc, &created.provider_id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
