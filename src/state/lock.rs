//! State locking for the single-writer rule.
//!
//! Only one apply may write state at a time. Locks carry an expiry so a
//! crashed holder does not block the store forever.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StateError};

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 300;

/// Information about a state lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a lock for `holder` with the default expiry.
    #[must_use]
    pub fn new(holder: &str) -> Self {
        Self::with_ttl(holder, Duration::seconds(LOCK_EXPIRY_SECS))
    }

    /// Creates a lock for `holder` expiring after `ttl`.
    #[must_use]
    pub fn with_ttl(holder: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// Lock slot shared by state store implementations.
#[derive(Debug, Default)]
pub struct StateLock {
    /// Currently held lock, if any.
    current: Option<LockInfo>,
}

impl StateLock {
    /// Creates an unlocked slot.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Takes the lock for `holder`.
    ///
    /// An empty holder gets a generated identifier. Expired locks are taken over.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::LockedByOther`] if an unexpired lock is held.
    pub fn acquire(&mut self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = &self.current {
            if !existing.is_expired() {
                return Err(StateError::LockedByOther {
                    holder: existing.holder.clone(),
                    since: existing.acquired_at.to_rfc3339(),
                }
                .into());
            }
            debug!("Expired lock held by {} found, taking over", existing.holder);
        }

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };

        let lock_info = LockInfo::new(&holder_id);
        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );
        self.current = Some(lock_info.clone());
        Ok(lock_info)
    }

    /// Installs an existing lock, replacing any current one.
    pub fn install(&mut self, lock: LockInfo) {
        self.current = Some(lock);
    }

    /// Releases the lock if `lock_id` matches. Returns whether it was released.
    pub fn release(&mut self, lock_id: &str) -> bool {
        match &self.current {
            Some(existing) if existing.lock_id == lock_id => {
                self.current = None;
                info!("Released state lock: {lock_id}");
                true
            }
            Some(existing) => {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
                false
            }
            None => false,
        }
    }

    /// Returns the current lock, expired or not.
    #[must_use]
    pub const fn info(&self) -> Option<&LockInfo> {
        self.current.as_ref()
    }

    /// Returns true if an unexpired lock is held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.current.as_ref().is_some_and(|l| !l.is_expired())
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get()
        .map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrataError;

    #[test]
    fn test_acquire_and_release() {
        let mut lock = StateLock::new();
        let info = lock.acquire("holder-1").unwrap();

        assert!(lock.is_locked());
        assert!(info.remaining_secs() > 0);
        assert!(!lock.release("someone-else"));
        assert!(lock.is_locked());
        assert!(lock.release(&info.lock_id));
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_conflict_reports_holder() {
        let mut lock = StateLock::new();
        lock.acquire("holder-1").unwrap();

        let err = lock.acquire("holder-2").unwrap_err();
        assert!(matches!(
            err,
            StrataError::State(StateError::LockedByOther { ref holder, .. }) if holder == "holder-1"
        ));
    }

    #[test]
    fn test_expired_lock_taken_over() {
        let mut lock = StateLock::new();
        lock.install(LockInfo::with_ttl("crashed", Duration::seconds(-1)));
        assert!(!lock.is_locked());

        let info = lock.acquire("holder-2").unwrap();
        assert_eq!(info.holder, "holder-2");
    }

    #[test]
    fn test_empty_holder_generates_id() {
        let mut lock = StateLock::new();
        let info = lock.acquire("").unwrap();
        assert!(info.holder.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();
        assert_ne!(id1, id2);
        assert!(id1.contains(&std::process::id().to_string()));
    }
}
