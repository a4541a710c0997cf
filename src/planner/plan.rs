//! Change-set types and construction.
//!
//! This module turns a dependency graph and the recorded state into an
//! ordered change-set. Every entry lists the entries it requires, so the
//! executor can run independent branches concurrently.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use super::diff::{DiffDetail, DiffEngine, DiffType};
use crate::error::{DeclarationError, GraphError, PlanError, Result};
use crate::graph::Graph;
use crate::resource::{OutputDecl, ResourceNode, ResourceType};
use crate::state::StateRecord;

/// What to do with one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a new resource.
    Create,
    /// Update an existing resource in place.
    Update,
    /// Delete a recorded resource.
    Delete,
    /// Nothing to do.
    NoOp,
}

/// One entry of a change-set.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEntry {
    /// Action to perform.
    pub action: Action,
    /// Logical name of the resource.
    pub logical_name: String,
    /// Resource type the action applies to.
    pub resource_type: ResourceType,
    /// Desired declaration (create, update, no-op).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<ResourceNode>,
    /// Recorded state (update, delete, no-op).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior: Option<StateRecord>,
    /// Why this action was chosen.
    pub reason: String,
    /// Field-level differences.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<DiffDetail>,
    /// Indices of entries that must succeed before this one runs.
    pub requires: Vec<usize>,
}

/// An ordered change-set.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSet {
    /// When the change-set was computed.
    pub created_at: DateTime<Utc>,
    /// Entries in execution order.
    pub entries: Vec<ChangeEntry>,
    /// Outputs to resolve after execution.
    #[serde(skip)]
    pub outputs: Vec<OutputDecl>,
}

/// Options influencing planning.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Declared or recorded resources to delete.
    pub destroy: BTreeSet<String>,
}

/// Computes change-sets.
#[derive(Debug, Default)]
pub struct Planner {
    /// Diff engine.
    diff: DiffEngine,
}

/// Entry under construction, with its ordering key.
struct Draft {
    entry: ChangeEntry,
    rank: u8,
    position: usize,
}

impl PlanOptions {
    /// Adds a destroy target.
    #[must_use]
    pub fn with_destroy(mut self, name: impl Into<String>) -> Self {
        self.destroy.insert(name.into());
        self
    }
}

impl Planner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            diff: DiffEngine::new(),
        }
    }

    /// Plans the deletion of every recorded resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorded dependencies are cyclic.
    pub fn plan_destroy(&self, records: &[StateRecord]) -> Result<ChangeSet> {
        self.plan(&Graph::default(), records, &PlanOptions::default())
    }

    /// Computes the change-set taking `records` to the state declared in `graph`.
    ///
    /// # Errors
    ///
    /// Returns a declaration error for an unknown destroy target, a conflict
    /// error when a surviving node depends on a destroy target, and a cycle
    /// error if the recorded dependencies cannot be ordered.
    pub fn plan(
        &self,
        graph: &Graph,
        records: &[StateRecord],
        options: &PlanOptions,
    ) -> Result<ChangeSet> {
        let recorded: BTreeMap<&str, &StateRecord> = records
            .iter()
            .map(|r| (r.logical_name.as_str(), r))
            .collect();

        Self::check_destroy_targets(graph, &recorded, options)?;
        let cascaded = Self::cascaded_replacements(graph, &recorded, options);

        let mut drafts: Vec<Draft> = Vec::new();
        // Declared name -> index of its create, update or no-op draft.
        let mut live: HashMap<&str, usize> = HashMap::new();
        // Logical name -> index of its delete draft.
        let mut deletes: HashMap<&str, usize> = HashMap::new();

        for (position, node) in graph.nodes().iter().enumerate() {
            let name = node.logical_name.as_str();
            let record = recorded.get(name).copied();

            if options.destroy.contains(name) {
                if let Some(record) = record {
                    deletes.insert(name, drafts.len());
                    drafts.push(Self::delete_draft(
                        record,
                        "targeted for destruction",
                        position,
                    ));
                } else {
                    debug!("{name} targeted for destruction but never created");
                }
                continue;
            }

            if let Some(record) = record
                && let Some(parent) = cascaded.get(name)
            {
                deletes.insert(name, drafts.len());
                drafts.push(Self::delete_draft(
                    record,
                    &format!("depends on replaced '{parent}'"),
                    position,
                ));
                live.insert(name, drafts.len());
                drafts.push(Self::live_draft(
                    Action::Create,
                    node,
                    None,
                    &format!("recreated after '{parent}' is replaced"),
                    vec![],
                    position,
                ));
                continue;
            }

            let diff = self.diff.compare(node, record);
            match diff.diff_type {
                DiffType::Create => {
                    live.insert(name, drafts.len());
                    drafts.push(Self::live_draft(
                        Action::Create,
                        node,
                        None,
                        "not yet created",
                        diff.details,
                        position,
                    ));
                }
                DiffType::Update => {
                    live.insert(name, drafts.len());
                    drafts.push(Self::live_draft(
                        Action::Update,
                        node,
                        record,
                        "properties changed",
                        diff.details,
                        position,
                    ));
                }
                DiffType::Replace => {
                    if let Some(record) = record {
                        deletes.insert(name, drafts.len());
                        drafts.push(Self::delete_draft(
                            record,
                            &format!("type changed to {}; replacing", node.resource_type),
                            position,
                        ));
                        live.insert(name, drafts.len());
                        drafts.push(Self::live_draft(
                            Action::Create,
                            node,
                            None,
                            &format!("type changed from {}; replacing", record.resource_type),
                            diff.details,
                            position,
                        ));
                    }
                }
                // compare never yields Delete for a declared node
                DiffType::NoChange | DiffType::Delete => {
                    let reason = if record.is_some_and(|r| r.dependencies_differ(node)) {
                        "dependencies changed; state will be refreshed"
                    } else {
                        "up to date"
                    };
                    live.insert(name, drafts.len());
                    drafts.push(Self::live_draft(
                        Action::NoOp,
                        node,
                        record,
                        reason,
                        vec![],
                        position,
                    ));
                }
            }
        }

        Self::promote_stale_references(graph, &live, &mut drafts);

        for (name, record) in &recorded {
            if !graph.contains(name) {
                deletes.insert(*name, drafts.len());
                let mut draft =
                    Self::delete_draft(record, "removed from declarations", usize::MAX);
                draft.entry.details = DiffEngine::orphaned(record).details;
                drafts.push(draft);
            }
        }

        Self::link_requirements(graph, &recorded, &live, &deletes, &mut drafts);
        let ordering = Self::ordering_edges(graph, &live, &drafts);
        let entries = Self::sort(drafts, &ordering)?;

        let change_set = ChangeSet {
            created_at: Utc::now(),
            entries,
            outputs: graph.outputs().to_vec(),
        };
        info!("Plan computed: {}", change_set.summary());
        Ok(change_set)
    }

    fn check_destroy_targets(
        graph: &Graph,
        recorded: &BTreeMap<&str, &StateRecord>,
        options: &PlanOptions,
    ) -> Result<()> {
        for target in &options.destroy {
            if !graph.contains(target) && !recorded.contains_key(target.as_str()) {
                return Err(DeclarationError::UnknownTarget {
                    name: target.clone(),
                }
                .into());
            }
        }

        for node in graph.nodes() {
            if options.destroy.contains(&node.logical_name) {
                continue;
            }
            if let Some(target) = node
                .dependency_names()
                .into_iter()
                .find(|d| options.destroy.contains(*d))
            {
                return Err(PlanError::Conflict {
                    node: node.logical_name.clone(),
                    target: target.to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Finds declared nodes that must be recreated because a resource they
    /// were applied against is being replaced, mapped to that resource.
    ///
    /// The old resource cannot be deleted while they still point at it.
    fn cascaded_replacements<'a>(
        graph: &'a Graph,
        recorded: &BTreeMap<&str, &StateRecord>,
        options: &PlanOptions,
    ) -> BTreeMap<&'a str, &'a str> {
        let mut replaced: BTreeSet<&str> = graph
            .nodes()
            .iter()
            .filter(|n| !options.destroy.contains(&n.logical_name))
            .filter(|n| {
                recorded
                    .get(n.logical_name.as_str())
                    .is_some_and(|r| r.resource_type != n.resource_type)
            })
            .map(|n| n.logical_name.as_str())
            .collect();

        let mut cascaded = BTreeMap::new();
        let mut grew = !replaced.is_empty();
        while grew {
            grew = false;
            for node in graph.nodes() {
                let name = node.logical_name.as_str();
                if replaced.contains(name) || options.destroy.contains(name) {
                    continue;
                }
                let Some(record) = recorded.get(name) else {
                    continue;
                };
                if let Some(parent) = node
                    .dependency_names()
                    .into_iter()
                    .find(|d| replaced.contains(d) && record.dependencies.contains(*d))
                {
                    debug!("{name} was applied against replaced {parent}, recreating");
                    replaced.insert(name);
                    cascaded.insert(name, parent);
                    grew = true;
                }
            }
        }

        cascaded
    }

    fn live_draft(
        action: Action,
        node: &ResourceNode,
        prior: Option<&StateRecord>,
        reason: &str,
        details: Vec<DiffDetail>,
        position: usize,
    ) -> Draft {
        Draft {
            entry: ChangeEntry {
                action,
                logical_name: node.logical_name.clone(),
                resource_type: node.resource_type.clone(),
                node: Some(node.clone()),
                prior: prior.cloned(),
                reason: reason.to_string(),
                details,
                requires: vec![],
            },
            rank: 1,
            position,
        }
    }

    fn delete_draft(record: &StateRecord, reason: &str, position: usize) -> Draft {
        Draft {
            entry: ChangeEntry {
                action: Action::Delete,
                logical_name: record.logical_name.clone(),
                resource_type: record.resource_type.clone(),
                node: None,
                prior: Some(record.clone()),
                reason: reason.to_string(),
                details: vec![],
                requires: vec![],
            },
            rank: 0,
            position,
        }
    }

    /// Turns no-ops that reference a recreated node into updates.
    ///
    /// The identifier they were applied with no longer exists.
    fn promote_stale_references(graph: &Graph, live: &HashMap<&str, usize>, drafts: &mut [Draft]) {
        let recreated: BTreeSet<&str> = live
            .iter()
            .filter(|(_, i)| drafts[**i].entry.action == Action::Create)
            .map(|(name, _)| *name)
            .collect();
        if recreated.is_empty() {
            return;
        }

        for node in graph.nodes() {
            let Some(&index) = live.get(node.logical_name.as_str()) else {
                continue;
            };
            let draft = &mut drafts[index];
            if draft.entry.action != Action::NoOp {
                continue;
            }
            if let Some(target) = node
                .referenced_nodes()
                .into_iter()
                .find(|r| recreated.contains(r))
            {
                debug!("{} references recreated {target}, promoting to update", node.logical_name);
                draft.entry.action = Action::Update;
                draft.entry.reason = format!("references '{target}', which is being recreated");
            }
        }
    }

    /// Fills in each draft's `requires` list.
    fn link_requirements(
        graph: &Graph,
        recorded: &BTreeMap<&str, &StateRecord>,
        live: &HashMap<&str, usize>,
        deletes: &HashMap<&str, usize>,
        drafts: &mut [Draft],
    ) {
        let mut requires: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); drafts.len()];

        for node in graph.nodes() {
            let name = node.logical_name.as_str();
            let Some(&index) = live.get(name) else {
                continue;
            };
            if drafts[index].entry.action == Action::NoOp {
                continue;
            }

            requires[index].extend(Self::actionable_ancestors(graph, name, live, drafts));
            if drafts[index].entry.action == Action::Create
                && let Some(&delete) = deletes.get(name)
            {
                requires[index].insert(delete);
            }
        }

        for (&name, &index) in deletes {
            for (&other, &other_index) in deletes {
                if other != name
                    && recorded
                        .get(other)
                        .is_some_and(|r| r.dependencies.contains(name))
                {
                    requires[index].insert(other_index);
                }
            }

            for node in graph.nodes() {
                let Some(&live_index) = live.get(node.logical_name.as_str()) else {
                    continue;
                };
                let drops_reference = drafts[live_index].entry.action == Action::Update
                    && recorded
                        .get(node.logical_name.as_str())
                        .is_some_and(|r| r.dependencies.contains(name))
                    && !node.dependency_names().contains(name);
                if drops_reference {
                    requires[index].insert(live_index);
                }
            }
        }

        for (draft, reqs) in drafts.iter_mut().zip(requires) {
            draft.entry.requires = reqs.into_iter().collect();
        }
    }

    /// Finds the nearest create or update entries among a node's ancestors,
    /// looking through unchanged nodes.
    fn actionable_ancestors(
        graph: &Graph,
        name: &str,
        live: &HashMap<&str, usize>,
        drafts: &[Draft],
    ) -> BTreeSet<usize> {
        let mut found = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack = graph.dependencies(name);

        while let Some(dependency) = stack.pop() {
            if !visited.insert(dependency) {
                continue;
            }
            let Some(&index) = live.get(dependency) else {
                continue;
            };
            if drafts[index].entry.action == Action::NoOp {
                stack.extend(graph.dependencies(dependency));
            } else {
                found.insert(index);
            }
        }

        found
    }

    /// Edges used only for ordering: every declared entry follows the entries
    /// of its direct dependencies.
    fn ordering_edges(
        graph: &Graph,
        live: &HashMap<&str, usize>,
        drafts: &[Draft],
    ) -> Vec<BTreeSet<usize>> {
        let mut edges: Vec<BTreeSet<usize>> = drafts
            .iter()
            .map(|d| d.entry.requires.iter().copied().collect())
            .collect();

        for node in graph.nodes() {
            let Some(&index) = live.get(node.logical_name.as_str()) else {
                continue;
            };
            for dependency in graph.dependencies(&node.logical_name) {
                if let Some(&dep_index) = live.get(dependency) {
                    edges[index].insert(dep_index);
                }
            }
        }

        edges
    }

    /// Orders drafts with Kahn's algorithm.
    ///
    /// Among ready entries deletes go first, then declaration order, then
    /// logical name.
    fn sort(drafts: Vec<Draft>, edges: &[BTreeSet<usize>]) -> Result<Vec<ChangeEntry>> {
        let mut in_degree: Vec<usize> = edges.iter().map(BTreeSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); drafts.len()];
        for (index, reqs) in edges.iter().enumerate() {
            for &req in reqs {
                dependents[req].push(index);
            }
        }

        let key = |i: usize| {
            let d = &drafts[i];
            (d.rank, d.position, d.entry.logical_name.clone(), i)
        };

        let mut ready: BTreeSet<_> = (0..drafts.len())
            .filter(|&i| in_degree[i] == 0)
            .map(key)
            .collect();

        let mut order = Vec::with_capacity(drafts.len());
        while let Some((_, _, _, index)) = ready.pop_first() {
            order.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(key(dependent));
                }
            }
        }

        if order.len() < drafts.len() {
            let placed: BTreeSet<usize> = order.iter().copied().collect();
            let mut cycle: Vec<String> = (0..drafts.len())
                .filter(|i| !placed.contains(i))
                .map(|i| format!("{} {}", drafts[i].entry.action, drafts[i].entry.logical_name))
                .collect();
            if let Some(first) = cycle.first().cloned() {
                cycle.push(first);
            }
            return Err(GraphError::Cycle { cycle }.into());
        }

        let mut new_index = vec![0; drafts.len()];
        for (position, &old) in order.iter().enumerate() {
            new_index[old] = position;
        }

        let mut slots: Vec<Option<Draft>> = drafts.into_iter().map(Some).collect();
        let mut entries = Vec::with_capacity(slots.len());
        for old in order {
            if let Some(draft) = slots[old].take() {
                let mut entry = draft.entry;
                entry.requires = entry.requires.iter().map(|&r| new_index[r]).collect();
                entry.requires.sort_unstable();
                entries.push(entry);
            }
        }

        Ok(entries)
    }
}

impl ChangeSet {
    /// Returns true if no entry requires action.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.action == Action::NoOp)
    }

    /// Returns the entries that require action, in order.
    #[must_use]
    pub fn changes(&self) -> Vec<&ChangeEntry> {
        self.entries
            .iter()
            .filter(|e| e.action != Action::NoOp)
            .collect()
    }

    /// Returns `(action, logical name)` for each actionable entry, in order.
    #[must_use]
    pub fn actions(&self) -> Vec<(Action, &str)> {
        self.changes()
            .into_iter()
            .map(|e| (e.action, e.logical_name.as_str()))
            .collect()
    }

    /// Returns the number of entries with the given action.
    #[must_use]
    pub fn count(&self, action: Action) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    /// Returns the position of the entry for `name` with `action`.
    #[must_use]
    pub fn position(&self, name: &str, action: Action) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.logical_name == name && e.action == action)
    }

    /// Returns a one-line summary of the counts.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.count(Action::Create),
            self.count(Action::Update),
            self.count(Action::Delete),
            self.count(Action::NoOp)
        )
    }
}

impl ChangeEntry {
    /// Returns a human-readable description of the entry.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action {
            Action::Create => format!("Create {} '{}'", self.resource_type, self.logical_name),
            Action::Update => format!("Update {} '{}'", self.resource_type, self.logical_name),
            Action::Delete => format!("Delete {} '{}'", self.resource_type, self.logical_name),
            Action::NoOp => format!("No change for '{}'", self.logical_name),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoOp => "no-op",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.logical_name)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Change set ({}):", self.summary())?;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.action != Action::NoOp {
                writeln!(f, "  {i}. {entry}")?;
            }
        }
        Ok(())
    }
}
