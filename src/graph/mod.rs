//! Dependency graph construction.
//!
//! The builder scans every node's properties for references, adds an edge
//! per reference and explicit dependency, and rejects cyclic or dangling
//! graphs before anything is planned.

mod builder;
mod dag;

pub use builder::{GraphBuilder, validate_logical_name};
pub use dag::Graph;
