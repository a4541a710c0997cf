//! In-memory state store.
//!
//! Keeps records in a map guarded by a tokio `RwLock`. Used by tests and the
//! demo binary; write failures can be injected to exercise the
//! manual-reconciliation path.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::lock::{LockInfo, StateLock};
use super::store::StateStore;
use super::types::StateRecord;
use crate::error::{Result, StateError};

/// In-memory state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    /// Records keyed by logical name.
    records: RwLock<BTreeMap<String, StateRecord>>,
    /// Lock slot.
    lock: Mutex<StateLock>,
    /// Logical names whose writes fail.
    failing: RwLock<BTreeSet<String>>,
    /// When set, every write fails.
    fail_all: AtomicBool,
    /// Number of successful writes (puts and deletes).
    writes: AtomicUsize,
}

impl MemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with records.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = StateRecord>) -> Self {
        Self {
            records: RwLock::new(
                records
                    .into_iter()
                    .map(|r| (r.logical_name.clone(), r))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// Makes every write touching `logical_name` fail.
    pub async fn fail_writes_for(&self, logical_name: &str) {
        self.failing.write().await.insert(logical_name.to_string());
    }

    /// Makes every write fail, or restores normal behaviour.
    pub fn fail_all_writes(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if no records are stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Serializes all records as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub async fn export_json(&self) -> Result<String> {
        let records = self.records.read().await;
        serde_json::to_string_pretty(&*records)
            .map_err(|e| StateError::serialization(e.to_string()).into())
    }

    async fn check_writable(&self, logical_name: &str) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) || self.failing.read().await.contains(logical_name)
        {
            return Err(StateError::unavailable(format!(
                "write rejected for '{logical_name}'"
            ))
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, logical_name: &str) -> Result<Option<StateRecord>> {
        Ok(self.records.read().await.get(logical_name).cloned())
    }

    async fn put(&self, record: &StateRecord) -> Result<()> {
        self.check_writable(&record.logical_name).await?;
        self.records
            .write()
            .await
            .insert(record.logical_name.clone(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Stored state record for {}", record.logical_name);
        Ok(())
    }

    async fn delete(&self, logical_name: &str) -> Result<()> {
        self.check_writable(logical_name).await?;
        if self.records.write().await.remove(logical_name).is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
            debug!("Removed state record for {logical_name}");
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StateRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        self.lock.lock().await.acquire(holder)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        self.lock.lock().await.release(lock_id);
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        Ok(self.lock.lock().await.info().cloned())
    }

    async fn is_locked(&self) -> Result<bool> {
        Ok(self.lock.lock().await.is_locked())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Attributes, ResourceNode};

    fn record(name: &str) -> StateRecord {
        StateRecord::new(&ResourceNode::new(name, "ec2.vpc"), format!("{name}-1"), Attributes::new())
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStateStore::new();
        assert!(store.get("main").await.unwrap().is_none());

        store.put(&record("main")).await.unwrap();
        let loaded = store.get("main").await.unwrap().unwrap();
        assert_eq!(loaded.provider_id, "main-1");

        store.delete("main").await.unwrap();
        assert!(store.is_empty().await);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_list_is_ordered() {
        let store = MemoryStateStore::from_records([record("zeta"), record("alpha")]);
        let names: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.logical_name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStateStore::new();
        store.fail_writes_for("main").await;

        assert!(store.put(&record("main")).await.is_err());
        assert!(store.put(&record("other")).await.is_ok());

        store.fail_all_writes(true);
        assert!(store.delete("other").await.is_err());
        store.fail_all_writes(false);
        assert!(store.delete("other").await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let store = MemoryStateStore::new();
        let lock = store.acquire_lock("holder-1").await.unwrap();
        assert!(store.is_locked().await.unwrap());
        assert!(store.acquire_lock("holder-2").await.is_err());

        store.release_lock(&lock.lock_id).await.unwrap();
        assert!(!store.is_locked().await.unwrap());
        assert_eq!(store.backend_type(), "memory");
    }

    #[tokio::test]
    async fn test_export_json() {
        let store = MemoryStateStore::from_records([record("main")]);
        let json = store.export_json().await.unwrap();
        assert!(json.contains("\"provider_id\": \"main-1\""));
    }
}
