// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Strata
//!
//! A declarative resource-graph evaluator: declare resources, get an ordered
//! change-set, apply it against a provider.
//!
//! ## Overview
//!
//! Strata takes a set of resource declarations and:
//!
//! - Builds a dependency graph from the references between properties
//! - Diffs the graph against the last recorded state of every resource
//! - Produces a change-set ordered so dependencies are created first and
//!   deleted last
//! - Applies the change-set through a provider, in parallel where the graph
//!   allows, recording state after every successful call
//!
//! ## Architecture
//!
//! 1. **Declarations**: a [`resource::Deployment`] of nodes and outputs
//! 2. **Graph**: [`graph::GraphBuilder`] validates names, schemas and
//!    references and rejects cycles
//! 3. **Plan**: [`planner::Planner`] classifies every node and orders the
//!    change-set
//! 4. **Apply**: [`planner::ChangeSetExecutor`] calls the [`provider::Provider`]
//!    and writes to the [`state::StateStore`]
//!
//! [`Engine`] wires these together under the state lock.
//!
//! ## Modules
//!
//! - [`resource`]: Nodes, values, references and schemas
//! - [`graph`]: Dependency graph construction
//! - [`planner`]: Diffing, change-sets and execution
//! - [`provider`]: Provider interface and a simulated provider
//! - [`state`]: State records, store interface and locking
//! - [`config`]: Configuration parsing and validation
//! - [`engine`]: Plan, apply, destroy and drift checks
//! - [`output`]: Report formatting
//! - [`topology`]: Built-in deployments
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: web-server
//!   environment: dev
//! provider:
//!   name: simulated
//!   region: eu-central-1
//! executor:
//!   parallelism: 4
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod output;
pub mod planner;
pub mod provider;
pub mod resource;
pub mod state;
pub mod topology;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigParser, ConfigValidator, EngineConfig};
pub use engine::{DriftReport, Engine};
pub use error::{Result, StrataError};
pub use graph::{Graph, GraphBuilder};
pub use output::{OutputFormat, OutputFormatter};
pub use planner::{ApplyReport, CancelSignal, ChangeSet, ChangeSetExecutor, PlanOptions, Planner};
pub use provider::{Provider, ProviderContext, SimulatedProvider};
pub use resource::{Deployment, Reference, ResourceNode, Value};
pub use state::{MemoryStateStore, StateRecord, StateStore};
