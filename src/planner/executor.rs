//! Change-set executor.
//!
//! Applies change-set entries against the provider, running independent
//! branches concurrently up to a fixed parallelism. Each successful provider
//! call is followed immediately by the matching state write. A failed call
//! blocks every entry that requires it, directly or transitively, while
//! unrelated branches carry on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::cancel::CancelSignal;
use super::plan::{Action, ChangeEntry, ChangeSet};
use crate::error::{ProviderError, Result, StateError, StrataError};
use crate::provider::{Provider, ProviderContext};
use crate::resource::{Attributes, Reference, ResourceNode, ResourceType};
use crate::state::{StateRecord, StateStore};

/// Default number of concurrent provider calls.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Executor for change-sets.
#[derive(Debug)]
pub struct ChangeSetExecutor<P, S> {
    /// Provider API.
    provider: Arc<P>,
    /// State store.
    store: Arc<S>,
    /// Context passed to every provider call.
    context: Arc<ProviderContext>,
    /// Maximum concurrent provider calls.
    parallelism: usize,
}

/// An entry that was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedChange {
    /// Logical name.
    pub logical_name: String,
    /// Action performed.
    pub action: Action,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Provider identifier of the resource.
    pub provider_id: String,
}

/// An entry whose provider call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedChange {
    /// Logical name.
    pub logical_name: String,
    /// Action attempted.
    pub action: Action,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Error message.
    pub error: String,
}

/// An entry that was never attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedChange {
    /// Logical name.
    pub logical_name: String,
    /// Action that was planned.
    pub action: Action,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of executing a change-set.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// Entries applied successfully, in change-set order.
    pub applied: Vec<AppliedChange>,
    /// Entries whose provider call failed.
    pub failed: Vec<FailedChange>,
    /// Entries blocked by a failure or by cancellation.
    pub skipped: Vec<SkippedChange>,
    /// Logical names that needed no change.
    pub unchanged: Vec<String>,
    /// Resolved deployment outputs.
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: DateTime<Utc>,
}

/// Final state of one entry.
#[derive(Debug, Clone)]
enum Outcome {
    Applied(String),
    Failed(String),
    Skipped(String),
    Unchanged,
}

/// Work handed to a spawned task.
enum Job {
    Create {
        node: ResourceNode,
        properties: Attributes,
    },
    Update {
        node: ResourceNode,
        prior: StateRecord,
        properties: Attributes,
    },
    Delete {
        prior: StateRecord,
    },
    /// Rewrites a record whose dependencies changed. No provider call.
    Refresh {
        record: StateRecord,
    },
}

/// Successful task result.
struct Completion {
    provider_id: String,
    record: Option<StateRecord>,
}

/// Failed task result.
enum TaskFailure {
    Provider(ProviderError),
    State(StrataError),
}

/// Mutable bookkeeping for one run.
struct Run<'a> {
    entries: &'a [ChangeEntry],
    outcomes: Vec<Option<Outcome>>,
    waiting: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    ready: BTreeSet<usize>,
    known: HashMap<String, StateRecord>,
}

impl<P, S> ChangeSetExecutor<P, S>
where
    P: Provider + 'static,
    S: StateStore + 'static,
{
    /// Creates an executor with the default parallelism.
    #[must_use]
    pub fn new(provider: Arc<P>, store: Arc<S>, context: ProviderContext) -> Self {
        Self {
            provider,
            store,
            context: Arc::new(context),
            parallelism: DEFAULT_PARALLELISM,
        }
    }

    /// Sets the maximum number of concurrent provider calls (at least 1).
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Executes a change-set.
    ///
    /// Provider failures are isolated to the failing entry and the entries
    /// that require it. Cancellation stops dispatching new calls; calls
    /// already running complete and their state is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::ReconciliationRequired`] if a state write fails
    /// after a successful provider call. Dispatch stops at that point and
    /// in-flight calls are drained before returning.
    pub async fn execute(&self, changes: &ChangeSet, cancel: &CancelSignal) -> Result<ApplyReport> {
        let started_at = Utc::now();
        info!("Executing change set: {}", changes.summary());

        let mut run = Run::new(&changes.entries);
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks: JoinSet<(usize, std::result::Result<Completion, TaskFailure>)> =
            JoinSet::new();
        let mut cancelled = false;
        let mut fatal: Option<StrataError> = None;

        loop {
            if !cancelled && cancel.is_cancelled() {
                warn!("Run cancelled; no further provider calls will be dispatched");
                cancelled = true;
            }

            if !cancelled && fatal.is_none() {
                self.dispatch(&mut run, &semaphore, &mut tasks);
            }

            if tasks.is_empty() {
                if run.ready.is_empty() || cancelled || fatal.is_some() {
                    break;
                }
                continue;
            }

            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, result))) => {
                        if let Some(err) = run.complete(index, result)
                            && fatal.is_none()
                        {
                            fatal = Some(err);
                        }
                    }
                    Some(Err(join_error)) => {
                        error!("Apply task aborted: {join_error}");
                        if fatal.is_none() {
                            fatal = Some(StrataError::internal(format!(
                                "apply task aborted: {join_error}"
                            )));
                        }
                    }
                    None => {}
                },
                () = cancel.cancelled(), if !cancelled => {}
            }
        }

        let leftover_reason = if fatal.is_some() {
            "run halted after state store failure"
        } else {
            "run cancelled"
        };
        run.skip_pending(leftover_reason);

        if let Some(err) = fatal {
            error!("{err}");
            return Err(err);
        }

        let report = run.into_report(&changes.outputs, cancelled, started_at);
        info!("{report}");
        Ok(report)
    }

    /// Spawns every ready entry a permit is available for.
    fn dispatch(
        &self,
        run: &mut Run<'_>,
        semaphore: &Arc<Semaphore>,
        tasks: &mut JoinSet<(usize, std::result::Result<Completion, TaskFailure>)>,
    ) {
        while let Some(&index) = run.ready.first() {
            let job = match run.prepare(index) {
                Ok(Some(job)) => job,
                Ok(None) => {
                    run.ready.pop_first();
                    run.outcomes[index] = Some(Outcome::Unchanged);
                    continue;
                }
                Err(err) => {
                    run.ready.pop_first();
                    run.fail(index, err.to_string());
                    continue;
                }
            };

            let Ok(permit) = Arc::clone(semaphore).try_acquire_owned() else {
                break;
            };
            run.ready.pop_first();

            let entry = &run.entries[index];
            debug!("Dispatching {}", entry.description());

            let provider = Arc::clone(&self.provider);
            let store = Arc::clone(&self.store);
            let context = Arc::clone(&self.context);
            tasks.spawn(async move {
                let result = Self::run_job(&*provider, &*store, &context, job, permit).await;
                (index, result)
            });
        }
    }

    /// Performs one provider call and the state write that follows it.
    async fn run_job(
        provider: &P,
        store: &S,
        context: &ProviderContext,
        job: Job,
        _permit: OwnedSemaphorePermit,
    ) -> std::result::Result<Completion, TaskFailure> {
        match job {
            Job::Create { node, properties } => {
                let created = provider
                    .create(context, &node.resource_type, &properties)
                    .await
                    .map_err(TaskFailure::Provider)?;
                info!(
                    "Created {} '{}' ({})",
                    node.resource_type, node.logical_name, created.provider_id
                );

                let record = StateRecord::new(&node, created.provider_id.clone(), created.outputs);
                store.put(&record).await.map_err(TaskFailure::State)?;
                Ok(Completion {
                    provider_id: created.provider_id,
                    record: Some(record),
                })
            }
            Job::Update {
                node,
                prior,
                properties,
            } => {
                let outputs = provider
                    .update(context, &node.resource_type, &prior.provider_id, &properties)
                    .await
                    .map_err(TaskFailure::Provider)?;
                info!(
                    "Updated {} '{}' ({})",
                    node.resource_type, node.logical_name, prior.provider_id
                );

                let record = prior.updated(&node, outputs);
                store.put(&record).await.map_err(TaskFailure::State)?;
                Ok(Completion {
                    provider_id: prior.provider_id,
                    record: Some(record),
                })
            }
            Job::Delete { prior } => {
                match provider
                    .delete(context, &prior.resource_type, &prior.provider_id)
                    .await
                {
                    Ok(()) => info!(
                        "Deleted {} '{}' ({})",
                        prior.resource_type, prior.logical_name, prior.provider_id
                    ),
                    Err(e) if e.is_not_found() => info!(
                        "{} '{}' was already deleted",
                        prior.resource_type, prior.logical_name
                    ),
                    Err(e) => return Err(TaskFailure::Provider(e)),
                }

                store
                    .delete(&prior.logical_name)
                    .await
                    .map_err(TaskFailure::State)?;
                Ok(Completion {
                    provider_id: prior.provider_id,
                    record: None,
                })
            }
            Job::Refresh { record } => {
                store.put(&record).await.map_err(TaskFailure::State)?;
                debug!("Refreshed recorded dependencies of '{}'", record.logical_name);
                Ok(Completion {
                    provider_id: record.provider_id.clone(),
                    record: Some(record),
                })
            }
        }
    }
}

impl<'a> Run<'a> {
    fn new(entries: &'a [ChangeEntry]) -> Self {
        let mut dependents = vec![Vec::new(); entries.len()];
        for (index, entry) in entries.iter().enumerate() {
            for &required in &entry.requires {
                dependents[required].push(index);
            }
        }

        let waiting: Vec<usize> = entries.iter().map(|e| e.requires.len()).collect();
        let ready = (0..entries.len()).filter(|&i| waiting[i] == 0).collect();

        // Unchanged resources are referenced through their recorded outputs.
        let known = entries
            .iter()
            .filter(|e| e.action == Action::NoOp)
            .filter_map(|e| e.prior.clone())
            .map(|r| (r.logical_name.clone(), r))
            .collect();

        Self {
            entries,
            outcomes: vec![None; entries.len()],
            waiting,
            dependents,
            ready,
            known,
        }
    }

    /// Builds the job for an entry, resolving references.
    fn prepare(&self, index: usize) -> std::result::Result<Option<Job>, StrataError> {
        let entry = &self.entries[index];
        let missing = |what: &str| {
            StrataError::internal(format!(
                "{} entry for '{}' has no {what}",
                entry.action, entry.logical_name
            ))
        };

        Ok(match entry.action {
            Action::NoOp => match (&entry.node, &entry.prior) {
                (Some(node), Some(prior)) if prior.dependencies_differ(node) => {
                    Some(Job::Refresh {
                        record: prior.refreshed(node),
                    })
                }
                _ => None,
            },
            Action::Create => {
                let node = entry.node.clone().ok_or_else(|| missing("declaration"))?;
                let properties = self.resolve(&node)?;
                Some(Job::Create { node, properties })
            }
            Action::Update => {
                let node = entry.node.clone().ok_or_else(|| missing("declaration"))?;
                let prior = entry.prior.clone().ok_or_else(|| missing("record"))?;
                let properties = self.resolve(&node)?;
                Some(Job::Update {
                    node,
                    prior,
                    properties,
                })
            }
            Action::Delete => {
                let prior = entry.prior.clone().ok_or_else(|| missing("record"))?;
                Some(Job::Delete { prior })
            }
        })
    }

    /// Substitutes every reference in a node's properties.
    fn resolve(&self, node: &ResourceNode) -> std::result::Result<Attributes, ProviderError> {
        let mut lookup = |r: &Reference| {
            let record = self
                .known
                .get(&r.node)
                .ok_or_else(|| ProviderError::UnresolvedReference {
                    reference: r.to_string(),
                    reason: format!("'{}' has not been applied", r.node),
                })?;
            record
                .attribute(&r.attribute)
                .ok_or_else(|| ProviderError::UnresolvedReference {
                    reference: r.to_string(),
                    reason: format!("'{}' has no attribute '{}'", r.node, r.attribute),
                })
        };

        let mut resolved = Attributes::new();
        for (key, value) in &node.properties {
            resolved.insert(key.clone(), value.resolve(&mut lookup)?);
        }
        Ok(resolved)
    }

    /// Records a finished task. Returns a fatal error if its state write failed.
    fn complete(
        &mut self,
        index: usize,
        result: std::result::Result<Completion, TaskFailure>,
    ) -> Option<StrataError> {
        let entries = self.entries;
        let entry = &entries[index];
        match result {
            Ok(done) => {
                match done.record {
                    Some(record) => {
                        self.known.insert(entry.logical_name.clone(), record);
                    }
                    None => {
                        self.known.remove(&entry.logical_name);
                    }
                }
                self.outcomes[index] = Some(if entry.action == Action::NoOp {
                    Outcome::Unchanged
                } else {
                    Outcome::Applied(done.provider_id)
                });

                for &dependent in &self.dependents[index] {
                    self.waiting[dependent] -= 1;
                    if self.waiting[dependent] == 0 && self.outcomes[dependent].is_none() {
                        self.ready.insert(dependent);
                    }
                }
                None
            }
            Err(TaskFailure::Provider(err)) => {
                self.fail(index, err.to_string());
                None
            }
            Err(TaskFailure::State(err)) => {
                error!(
                    "Failed to record state for '{}' after {}: {err}",
                    entry.logical_name, entry.action
                );
                self.outcomes[index] = Some(Outcome::Failed(err.to_string()));
                Some(
                    StateError::ReconciliationRequired {
                        resource: entry.logical_name.clone(),
                        message: err.to_string(),
                    }
                    .into(),
                )
            }
        }
    }

    /// Marks an entry failed and skips everything that requires it.
    fn fail(&mut self, index: usize, message: String) {
        let entries = self.entries;
        let name = &entries[index].logical_name;
        error!("Failed to {} '{}': {message}", entries[index].action, name);
        self.outcomes[index] = Some(Outcome::Failed(message));

        let mut queue: VecDeque<usize> = self.dependents[index].iter().copied().collect();
        while let Some(dependent) = queue.pop_front() {
            if self.outcomes[dependent].is_some() {
                continue;
            }
            warn!(
                "Skipping {}: blocked by failed '{}'",
                entries[dependent].description(),
                name
            );
            self.outcomes[dependent] = Some(Outcome::Skipped(format!("blocked by failed '{name}'")));
            self.ready.remove(&dependent);
            queue.extend(self.dependents[dependent].iter().copied());
        }
    }

    /// Marks every entry that never ran as skipped.
    fn skip_pending(&mut self, reason: &str) {
        for (index, outcome) in self.outcomes.iter_mut().enumerate() {
            if outcome.is_none() {
                warn!("Skipping {}: {reason}", self.entries[index].description());
                *outcome = Some(Outcome::Skipped(reason.to_string()));
            }
        }
    }

    fn into_report(
        self,
        outputs: &[crate::resource::OutputDecl],
        cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> ApplyReport {
        let resolved = outputs
            .iter()
            .filter_map(|decl| {
                self.known
                    .get(&decl.value.node)
                    .and_then(|r| r.attribute(&decl.value.attribute))
                    .map(|value| (decl.name.clone(), value))
            })
            .collect();

        let mut report = ApplyReport {
            applied: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            unchanged: Vec::new(),
            outputs: resolved,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        };

        for (entry, outcome) in self.entries.iter().zip(self.outcomes) {
            let logical_name = entry.logical_name.clone();
            let resource_type = entry.resource_type.clone();
            match outcome {
                Some(Outcome::Applied(provider_id)) => report.applied.push(AppliedChange {
                    logical_name,
                    action: entry.action,
                    resource_type,
                    provider_id,
                }),
                Some(Outcome::Failed(error)) => report.failed.push(FailedChange {
                    logical_name,
                    action: entry.action,
                    resource_type,
                    error,
                }),
                Some(Outcome::Skipped(reason)) => report.skipped.push(SkippedChange {
                    logical_name,
                    action: entry.action,
                    resource_type,
                    reason,
                }),
                Some(Outcome::Unchanged) | None => report.unchanged.push(logical_name),
            }
        }

        report
    }
}

impl ApplyReport {
    /// Returns true if every entry was applied or unchanged.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && !self.cancelled
    }

    /// Returns the logical names of applied entries.
    #[must_use]
    pub fn applied_names(&self) -> Vec<&str> {
        self.applied.iter().map(|c| c.logical_name.as_str()).collect()
    }

    /// Returns the logical names of failed entries.
    #[must_use]
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|c| c.logical_name.as_str()).collect()
    }

    /// Returns the logical names of skipped entries.
    #[must_use]
    pub fn skipped_names(&self) -> Vec<&str> {
        self.skipped.iter().map(|c| c.logical_name.as_str()).collect()
    }

    /// Returns the wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Applied {} changes: {} failed, {} skipped, {} unchanged",
            self.applied.len(),
            self.failed.len(),
            self.skipped.len(),
            self.unchanged.len()
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}
