//! Per-transfer single-writer locks
//!
//! At most one task drives a given request_id at a time. A second driver
//! fails fast instead of queueing behind the first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::BridgeError;

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Default, Clone)]
pub struct RecordLocks {
    locks: LockMap,
}

/// Held while a transfer is being driven. Releases on drop.
#[derive(Debug)]
pub struct RecordGuard {
    request_id: String,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `request_id` or fail with [`BridgeError::TransferInProgress`]
    pub fn acquire(&self, request_id: &str) -> Result<RecordGuard, BridgeError> {
        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| BridgeError::Storage("record lock table poisoned".to_string()))?;
            locks
                .entry(request_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = mutex
            .try_lock_owned()
            .map_err(|_| BridgeError::TransferInProgress(request_id.to_string()))?;

        Ok(RecordGuard {
            request_id: request_id.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        })
    }

    pub fn is_locked(&self, request_id: &str) -> bool {
        self.locks
            .lock()
            .map(|locks| {
                locks
                    .get(request_id)
                    .map(|m| m.try_lock().is_err())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        self.guard.take();
        if let Ok(mut locks) = self.locks.lock() {
            // Only the table itself still references an idle entry
            let idle = locks
                .get(&self.request_id)
                .map(|m| Arc::strong_count(m) == 1)
                .unwrap_or(false);
            if idle {
                locks.remove(&self.request_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_driver_fails_fast() {
        let locks = RecordLocks::new();
        let guard = locks.acquire("req-1").unwrap();
        assert!(locks.is_locked("req-1"));

        let err = locks.acquire("req-1").unwrap_err();
        assert_eq!(err, BridgeError::TransferInProgress("req-1".to_string()));

        // other records are independent
        let _other = locks.acquire("req-2").unwrap();

        drop(guard);
        assert!(!locks.is_locked("req-1"));
        assert!(locks.acquire("req-1").is_ok());
    }

    #[test]
    fn test_idle_entries_are_removed() {
        let locks = RecordLocks::new();
        {
            let _a = locks.acquire("a").unwrap();
            let _b = locks.acquire("b").unwrap();
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);
    }
}
