//! Status Tracker
//!
//! Maps a transaction receipt onto the three-valued transfer status.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BridgeError;
use crate::ledger::{LedgerClient, Receipt, TxId};

/// Status of a single on-chain transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Confirmed => "confirmed",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of checking one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: TransferStatus,
    /// `None` while the node does not know the transaction
    pub confirmations: Option<u64>,
}

/// Confirmation policy of one network
#[derive(Debug, Clone, Copy)]
pub struct StatusTracker {
    required_confirmations: u64,
}

impl StatusTracker {
    pub fn new(required_confirmations: u64) -> Self {
        Self {
            required_confirmations: required_confirmations.max(1),
        }
    }

    /// Classify a receipt. A reverted transaction is failed regardless of depth.
    pub fn classify(&self, receipt: Option<&Receipt>) -> TransferStatus {
        match receipt {
            None => TransferStatus::Pending,
            Some(r) if r.confirmations == 0 => TransferStatus::Pending,
            Some(r) if !r.succeeded => TransferStatus::Failed,
            Some(r) if r.confirmations >= self.required_confirmations => TransferStatus::Confirmed,
            Some(_) => TransferStatus::Pending,
        }
    }

    /// Look up and classify a caller-supplied transaction id.
    ///
    /// A malformed id can never confirm and is reported as failed.
    pub async fn check(
        &self,
        ledger: &dyn LedgerClient,
        tx_id: &str,
    ) -> Result<StatusReport, BridgeError> {
        let tx_id = match TxId::parse(tx_id) {
            Ok(tx_id) => tx_id,
            Err(_) => {
                return Ok(StatusReport {
                    status: TransferStatus::Failed,
                    confirmations: None,
                })
            }
        };

        let receipt = ledger.get_receipt(&tx_id).await?;
        Ok(StatusReport {
            status: self.classify(receipt.as_ref()),
            confirmations: receipt.map(|r| r.confirmations),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_registry, FakeLedger};

    fn receipt(confirmations: u64, succeeded: bool) -> Receipt {
        Receipt {
            confirmations,
            succeeded,
        }
    }

    #[test]
    fn test_classify() {
        let tracker = StatusTracker::new(3);
        assert_eq!(tracker.classify(None), TransferStatus::Pending);
        assert_eq!(tracker.classify(Some(&receipt(0, true))), TransferStatus::Pending);
        assert_eq!(tracker.classify(Some(&receipt(2, true))), TransferStatus::Pending);
        assert_eq!(tracker.classify(Some(&receipt(3, true))), TransferStatus::Confirmed);
        assert_eq!(tracker.classify(Some(&receipt(1, false))), TransferStatus::Failed);
    }

    #[test]
    fn test_zero_requirement_still_needs_inclusion() {
        let tracker = StatusTracker::new(0);
        assert_eq!(tracker.classify(Some(&receipt(0, true))), TransferStatus::Pending);
        assert_eq!(tracker.classify(Some(&receipt(1, true))), TransferStatus::Confirmed);
    }

    #[test]
    fn test_serialization() {
        assert_eq!(
            serde_json::to_string(&TransferStatus::Confirmed).unwrap(),
            "\"confirmed\""
        );
    }

    #[tokio::test]
    async fn test_check_malformed_and_unknown_ids() {
        let network = test_registry().resolve("base-sepolia").unwrap().clone();
        let ledger = FakeLedger::new(network);
        let tracker = StatusTracker::new(1);

        let malformed = tracker.check(&ledger, "0xnot-a-hash").await.unwrap();
        assert_eq!(malformed.status, TransferStatus::Failed);

        let unknown = tracker
            .check(&ledger, &format!("0x{}", "11".repeat(32)))
            .await
            .unwrap();
        assert_eq!(unknown.status, TransferStatus::Pending);
        assert_eq!(unknown.confirmations, None);
    }

    #[tokio::test]
    async fn test_check_confirmed_receipt() {
        let network = test_registry().resolve("base-sepolia").unwrap().clone();
        let ledger = FakeLedger::new(network);
        let tx = TxId::parse(&format!("0x{}", "22".repeat(32))).unwrap();
        ledger.set_receipt(&tx, receipt(4, true));

        let report = StatusTracker::new(2).check(&ledger, tx.as_str()).await.unwrap();
        assert_eq!(report.status, TransferStatus::Confirmed);
        assert_eq!(report.confirmations, Some(4));
    }
}
