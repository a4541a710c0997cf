//! State management module.
//!
//! This module defines the per-resource state records the evaluator persists
//! after every successful provider call, the store interface, the
//! single-writer lock and an in-memory store.

mod lock;
mod memory;
mod store;
mod types;

pub use lock::{LOCK_EXPIRY_SECS, LockInfo, StateLock, generate_holder_id};
pub use memory::MemoryStateStore;
pub use store::StateStore;
pub use types::StateRecord;
