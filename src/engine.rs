//! Engine tying declarations, state and provider together.
//!
//! The engine owns the single-writer discipline: `apply` and `destroy` hold
//! the state lock for the whole run and release it even when the run fails.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::GraphBuilder;
use crate::planner::{ApplyReport, CancelSignal, ChangeSet, ChangeSetExecutor, PlanOptions, Planner};
use crate::provider::{Provider, ProviderContext};
use crate::resource::{Deployment, SchemaRegistry};
use crate::state::{StateStore, generate_holder_id};

/// Evaluates deployments against a provider and a state store.
pub struct Engine<P, S> {
    /// Provider API.
    provider: Arc<P>,
    /// State store.
    store: Arc<S>,
    /// Engine configuration.
    config: EngineConfig,
    /// Graph builder, with the schema registry if any.
    builder: GraphBuilder,
    /// Planner.
    planner: Planner,
    /// Lock holder identity.
    holder: String,
}

/// A resource whose provider-reported outputs differ from its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftedResource {
    /// Logical name.
    pub logical_name: String,
    /// Provider identifier.
    pub provider_id: String,
    /// Output keys that were added, removed or changed.
    pub fields: Vec<String>,
}

/// Report of drift detection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DriftReport {
    /// Number of records checked.
    pub checked: usize,
    /// Resources the provider no longer knows.
    pub missing: Vec<String>,
    /// Resources whose outputs changed outside the engine.
    pub changed: Vec<DriftedResource>,
}

impl<P, S> Engine<P, S>
where
    P: Provider + 'static,
    S: StateStore + 'static,
{
    /// Creates an engine.
    #[must_use]
    pub fn new(provider: Arc<P>, store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            provider,
            store,
            config,
            builder: GraphBuilder::new(),
            planner: Planner::new(),
            holder: generate_holder_id(),
        }
    }

    /// Validates declarations against a schema registry before planning.
    #[must_use]
    pub fn with_schema(mut self, registry: SchemaRegistry) -> Self {
        self.builder = GraphBuilder::new().with_schema(registry);
        self
    }

    /// Sets the lock holder identity.
    #[must_use]
    pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
        self.holder = holder.into();
        self
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the state store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the provider.
    #[must_use]
    pub const fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Computes the change-set for a deployment without applying it.
    ///
    /// # Errors
    ///
    /// Returns an error if the declarations are invalid, the graph has a
    /// cycle or an unknown reference, a destroy target conflicts, or the
    /// state cannot be listed.
    pub async fn plan(&self, deployment: &Deployment, options: &PlanOptions) -> Result<ChangeSet> {
        info!(
            "Planning {} ({}) with provider {}",
            deployment.name,
            self.config.full_name(),
            self.provider.name()
        );

        let graph = self.builder.build(deployment)?;
        let records = self.store.list().await?;
        debug!("Loaded {} state records", records.len());

        self.planner.plan(&graph, &records, options)
    }

    /// Plans and applies a deployment under the state lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held by another process, planning
    /// fails, or a state write fails during execution.
    pub async fn apply(
        &self,
        deployment: &Deployment,
        options: &PlanOptions,
        cancel: &CancelSignal,
    ) -> Result<ApplyReport> {
        self.with_lock(async {
            let changes = self.plan(deployment, options).await?;
            if changes.is_empty() {
                info!("No changes required - state is converged");
            }
            self.executor().execute(&changes, cancel).await
        })
        .await
    }

    /// Deletes every recorded resource, dependents first.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held by another process or a state
    /// operation fails.
    pub async fn destroy(&self, cancel: &CancelSignal) -> Result<ApplyReport> {
        self.with_lock(async {
            let records = self.store.list().await?;
            info!("Destroying {} recorded resources", records.len());
            let changes = self.planner.plan_destroy(&records)?;
            self.executor().execute(&changes, cancel).await
        })
        .await
    }

    /// Compares every record with what the provider currently reports.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be listed or a provider read fails.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        info!("Checking for drift in {}", self.config.full_name());

        let context = ProviderContext::from_config(&self.config);
        let records = self.store.list().await?;
        let mut report = DriftReport {
            checked: records.len(),
            ..DriftReport::default()
        };

        for record in records {
            let observed = self
                .provider
                .read(&context, &record.resource_type, &record.provider_id)
                .await?;

            match observed {
                None => {
                    warn!("{} ({}) no longer exists", record.logical_name, record.provider_id);
                    report.missing.push(record.logical_name);
                }
                Some(outputs) if outputs != record.outputs => {
                    let fields: Vec<String> = record
                        .outputs
                        .keys()
                        .chain(outputs.keys())
                        .collect::<BTreeSet<_>>()
                        .into_iter()
                        .filter(|key| record.outputs.get(*key) != outputs.get(*key))
                        .cloned()
                        .collect();
                    warn!("{} has drifted: {}", record.logical_name, fields.join(", "));
                    report.changed.push(DriftedResource {
                        logical_name: record.logical_name,
                        provider_id: record.provider_id,
                        fields,
                    });
                }
                Some(_) => debug!("{} matches its record", record.logical_name),
            }
        }

        Ok(report)
    }

    fn executor(&self) -> ChangeSetExecutor<P, S> {
        ChangeSetExecutor::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            ProviderContext::from_config(&self.config),
        )
        .with_parallelism(self.config.executor.parallelism)
    }

    /// Runs `work` while holding the state lock.
    async fn with_lock<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        let lock = self.store.acquire_lock(&self.holder).await?;
        debug!("Acquired state lock {}", lock.lock_id);

        let result = work.await;

        if let Err(e) = self.store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock {}: {e}", lock.lock_id);
        }
        result
    }
}

impl DriftReport {
    /// Returns true if any drift was detected.
    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.missing.is_empty() || !self.changed.is_empty()
    }

    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub fn is_converged(&self) -> bool {
        !self.has_drift()
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_drift() {
            return write!(f, "No drift detected - state is converged");
        }

        writeln!(f, "Drift detected:")?;
        for name in &self.missing {
            writeln!(f, "  - {name}: missing")?;
        }
        for resource in &self.changed {
            writeln!(f, "  - {}: {}", resource.logical_name, resource.fields.join(", "))?;
        }
        Ok(())
    }
}
