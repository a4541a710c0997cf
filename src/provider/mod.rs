//! Provider API.
//!
//! The evaluator talks to infrastructure only through the [`Provider`]
//! trait. Real cloud clients live outside this crate; an in-memory
//! [`SimulatedProvider`] is included for tests and demos.

mod simulated;
mod traits;

pub use simulated::{ProviderCall, SimulatedProvider, SimulatedResource};
pub use traits::{CreateResponse, Operation, Provider, ProviderContext};

#[cfg(test)]
pub use traits::MockProvider;
