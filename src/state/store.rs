//! State store trait definition.
//!
//! This module defines the interface the evaluator uses to persist
//! per-resource state. Storage backends live outside this crate.

use async_trait::async_trait;
use std::sync::Arc;

use super::lock::LockInfo;
use super::types::StateRecord;
use crate::error::Result;

/// Trait for state storage backends.
///
/// Records are keyed by logical name. The evaluator writes one record at a
/// time, immediately after each successful provider call.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Gets the record for a logical name.
    ///
    /// Returns `None` if nothing is recorded.
    async fn get(&self, logical_name: &str) -> Result<Option<StateRecord>>;

    /// Inserts or replaces a record.
    async fn put(&self, record: &StateRecord) -> Result<()>;

    /// Removes the record for a logical name. Removing an absent record is not an error.
    async fn delete(&self, logical_name: &str) -> Result<()>;

    /// Lists all records, ordered by logical name.
    async fn list(&self) -> Result<Vec<StateRecord>>;

    /// Acquires a lock on the state.
    ///
    /// Returns lock information if successful.
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases a lock on the state.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the state is locked.
    async fn is_locked(&self) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn get(&self, logical_name: &str) -> Result<Option<StateRecord>> {
        (**self).get(logical_name).await
    }

    async fn put(&self, record: &StateRecord) -> Result<()> {
        (**self).put(record).await
    }

    async fn delete(&self, logical_name: &str) -> Result<()> {
        (**self).delete(logical_name).await
    }

    async fn list(&self) -> Result<Vec<StateRecord>> {
        (**self).list().await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn get(&self, logical_name: &str) -> Result<Option<StateRecord>> {
        (**self).get(logical_name).await
    }

    async fn put(&self, record: &StateRecord) -> Result<()> {
        (**self).put(record).await
    }

    async fn delete(&self, logical_name: &str) -> Result<()> {
        (**self).delete(logical_name).await
    }

    async fn list(&self) -> Result<Vec<StateRecord>> {
        (**self).list().await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
