//! In-process [`TransferStore`] for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use super::TransferStore;
use crate::error::BridgeError;
use crate::orchestrator::state::{BridgeState, BridgeTransfer};

/// Scripted save outage: `allowed` more saves succeed, then `failures` fail
#[derive(Debug, Default)]
struct SaveOutage {
    allowed: usize,
    failures: usize,
}

#[derive(Debug, Default)]
pub struct MemoryTransferStore {
    records: RwLock<HashMap<String, BridgeTransfer>>,
    saves: AtomicUsize,
    outage: Mutex<SaveOutage>,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `allowed` more saves through, then fail the next `failures`
    pub fn fail_saves_after(&self, allowed: usize, failures: usize) {
        if let Ok(mut outage) = self.outage.lock() {
            *outage = SaveOutage { allowed, failures };
        }
    }

    /// Number of successful `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> BridgeError {
    BridgeError::Storage("transfer store lock poisoned".to_string())
}

#[async_trait]
impl TransferStore for MemoryTransferStore {
    async fn save(&self, transfer: &BridgeTransfer) -> Result<(), BridgeError> {
        {
            let mut outage = self.outage.lock().map_err(|_| poisoned())?;
            if outage.failures > 0 {
                if outage.allowed > 0 {
                    outage.allowed -= 1;
                } else {
                    outage.failures -= 1;
                    return Err(BridgeError::Storage("connection to database lost".to_string()));
                }
            }
        }
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(transfer.request_id.clone(), transfer.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, request_id: &str) -> Result<Option<BridgeTransfer>, BridgeError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(request_id).cloned())
    }

    async fn list_in_states(
        &self,
        states: &[BridgeState],
    ) -> Result<Vec<BridgeTransfer>, BridgeError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut matching: Vec<BridgeTransfer> = records
            .values()
            .filter(|t| states.contains(&t.state))
            .cloned()
            .collect();
        matching.sort_by_key(|t| t.created_at);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_burn_receipt, sample_intent};

    #[tokio::test]
    async fn test_save_replaces_whole_record() {
        let store = MemoryTransferStore::new();
        let mut transfer = BridgeTransfer::initiate("req-m", sample_intent());
        store.save(&transfer).await.unwrap();

        transfer.record_burn(sample_burn_receipt()).unwrap();
        store.save(&transfer).await.unwrap();

        let loaded = store.get("req-m").await.unwrap().unwrap();
        assert_eq!(loaded, transfer);
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_save_outage() {
        let store = MemoryTransferStore::new();
        let transfer = BridgeTransfer::initiate("req-o", sample_intent());
        store.fail_saves_after(1, 2);

        store.save(&transfer).await.unwrap();
        assert!(matches!(
            store.save(&transfer).await,
            Err(BridgeError::Storage(_))
        ));
        assert!(store.save(&transfer).await.is_err());
        store.save(&transfer).await.unwrap();
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_list_in_states() {
        let store = MemoryTransferStore::new();
        let initiated = BridgeTransfer::initiate("a", sample_intent());
        let mut failed = BridgeTransfer::initiate("b", sample_intent());
        failed
            .fail(crate::orchestrator::state::FailureKind::BurnFailed, "reverted")
            .unwrap();
        store.save(&initiated).await.unwrap();
        store.save(&failed).await.unwrap();

        let open = store
            .list_in_states(&BridgeState::NON_TERMINAL)
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].request_id, "a");
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
