//! Attestation Client
//!
//! Polls Circle's attestation service for the notary signature over a burn
//! message. The service is addressed by message hash:
//!
//! ```text
//! GET {CCTP_API_BASE}/attestations/{message_hash}
//! -> {"status": "pending_confirmations" | "complete", "attestation": "0x..."}
//! ```
//!
//! A 404 means the burn is not indexed yet and is treated like `pending`.
//! Other error responses count against a bounded error budget.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::AttestationConfig;
use crate::error::BridgeError;
use crate::ledger::MessageHash;
use crate::metrics;

const SERVICE: &str = "attestation-service";

/// Notary signature authorizing a mint. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attestation {
    pub message_hash: MessageHash,
    #[serde(rename = "signature", serialize_with = "serialize_hex")]
    pub signature_bytes: Vec<u8>,
    pub issued_at: DateTime<Utc>,
}

impl Attestation {
    pub fn signature_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.signature_bytes))
    }
}

fn serialize_hex<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

/// Result of a single attestation lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Complete(Attestation),
    /// Known to the service but not signed yet; carries the raw status
    Pending { status: String },
    /// Not indexed yet (HTTP 404)
    NotFound,
}

impl FetchOutcome {
    /// Status string reported to callers of the raw status query
    pub fn status(&self) -> &str {
        match self {
            FetchOutcome::Complete(_) => "complete",
            FetchOutcome::Pending { status } => status,
            FetchOutcome::NotFound => "unknown",
        }
    }
}

/// One request to the attestation service
#[async_trait]
pub trait AttestationApi: Send + Sync {
    async fn fetch(&self, message_hash: &MessageHash) -> Result<FetchOutcome, BridgeError>;
}

#[derive(Debug, Deserialize)]
struct AttestationResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    attestation: Option<String>,
}

/// HTTP client for Circle's Iris attestation API
#[derive(Debug, Clone)]
pub struct IrisAttestationApi {
    base_url: String,
    client: Client,
}

impl IrisAttestationApi {
    pub fn new(config: &AttestationConfig) -> Result<Self, BridgeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.api_base.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, message_hash: &MessageHash) -> String {
        format!("{}/attestations/{}", self.base_url, message_hash)
    }
}

#[async_trait]
impl AttestationApi for IrisAttestationApi {
    async fn fetch(&self, message_hash: &MessageHash) -> Result<FetchOutcome, BridgeError> {
        let response = self
            .client
            .get(self.url(message_hash))
            .send()
            .await
            .map_err(|e| BridgeError::network(SERVICE, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(BridgeError::network(SERVICE, format!("HTTP {status}")));
        }

        let body: AttestationResponse = response
            .json()
            .await
            .map_err(|e| BridgeError::network(SERVICE, format!("malformed response: {e}")))?;

        parse_response(message_hash, body)
    }
}

fn parse_response(
    message_hash: &MessageHash,
    body: AttestationResponse,
) -> Result<FetchOutcome, BridgeError> {
    let status = body
        .status
        .unwrap_or_else(|| "unknown".to_string())
        .to_lowercase();

    let signature = body
        .attestation
        .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("pending"));

    match (status.as_str(), signature) {
        ("complete", Some(signature)) => {
            let signature_bytes = hex::decode(signature.trim_start_matches("0x")).map_err(|_| {
                BridgeError::network(SERVICE, "attestation is not valid hex".to_string())
            })?;
            Ok(FetchOutcome::Complete(Attestation {
                message_hash: message_hash.clone(),
                signature_bytes,
                issued_at: Utc::now(),
            }))
        }
        _ => Ok(FetchOutcome::Pending { status }),
    }
}

/// Repeats [`AttestationApi::fetch`] until complete, timed out or cancelled
#[derive(Clone)]
pub struct AttestationPoller {
    api: Arc<dyn AttestationApi>,
    max_errors: u32,
}

impl AttestationPoller {
    pub fn new(api: Arc<dyn AttestationApi>, max_errors: u32) -> Self {
        Self { api, max_errors }
    }

    pub fn api(&self) -> &Arc<dyn AttestationApi> {
        &self.api
    }

    /// Poll every `interval` until the attestation is complete.
    ///
    /// `timeout` is a hard ceiling: the call returns
    /// [`BridgeError::AttestationTimeout`] no later than `timeout` after it
    /// started, even if a request is in flight. Cancellation returns
    /// [`BridgeError::Cancelled`].
    pub async fn poll(
        &self,
        message_hash: &MessageHash,
        timeout: Duration,
        interval: Duration,
        cancel: &CancelToken,
    ) -> Result<Attestation, BridgeError> {
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(message_hash = %message_hash, "Attestation poll cancelled");
                return Err(BridgeError::Cancelled(format!(
                    "attestation poll for {message_hash} cancelled"
                )));
            }
            result = tokio::time::timeout(timeout, self.poll_until_complete(message_hash, interval)) => result,
        };

        match result {
            Ok(Ok(attestation)) => {
                let waited = started.elapsed().as_secs_f64();
                metrics::record_attestation_wait(waited);
                info!(
                    message_hash = %message_hash,
                    waited_secs = waited,
                    "Attestation complete"
                );
                Ok(attestation)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    message_hash = %message_hash,
                    timeout_secs = timeout.as_secs(),
                    "Attestation not available before deadline"
                );
                Err(BridgeError::AttestationTimeout {
                    message_hash: message_hash.to_string(),
                    waited_secs: timeout.as_secs(),
                    reason: "attestation not complete before deadline".to_string(),
                })
            }
        }
    }

    async fn poll_until_complete(
        &self,
        message_hash: &MessageHash,
        interval: Duration,
    ) -> Result<Attestation, BridgeError> {
        let started = Instant::now();
        let mut errors = 0u32;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.api.fetch(message_hash).await {
                Ok(FetchOutcome::Complete(attestation)) => {
                    metrics::record_attestation_request("complete");
                    return Ok(attestation);
                }
                Ok(FetchOutcome::Pending { status }) => {
                    metrics::record_attestation_request("pending");
                    debug!(message_hash = %message_hash, attempts, status = %status, "Attestation pending");
                }
                Ok(FetchOutcome::NotFound) => {
                    metrics::record_attestation_request("not_found");
                    debug!(message_hash = %message_hash, attempts, "Message not indexed yet");
                }
                Err(e) => {
                    metrics::record_attestation_request("error");
                    errors += 1;
                    warn!(
                        message_hash = %message_hash,
                        errors,
                        max_errors = self.max_errors,
                        error = %e,
                        "Attestation service error"
                    );
                    if errors > self.max_errors {
                        return Err(BridgeError::AttestationTimeout {
                            message_hash: message_hash.to_string(),
                            waited_secs: started.elapsed().as_secs(),
                            reason: format!("attestation service failed {errors} times: {e}"),
                        });
                    }
                }
            }

            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;
    use crate::testing::{sample_message_hash, ScriptedAttestationApi};
    use tokio_test::{assert_err, assert_ok};

    fn body(status: Option<&str>, attestation: Option<&str>) -> AttestationResponse {
        AttestationResponse {
            status: status.map(String::from),
            attestation: attestation.map(String::from),
        }
    }

    #[test]
    fn test_parse_complete_response() {
        let hash = sample_message_hash();
        let outcome = assert_ok!(parse_response(&hash, body(Some("complete"), Some("0xdeadbeef"))));
        match outcome {
            FetchOutcome::Complete(a) => {
                assert_eq!(a.signature_bytes, vec![0xde, 0xad, 0xbe, 0xef]);
                assert_eq!(a.signature_hex(), "0xdeadbeef");
                assert_eq!(a.message_hash, hash);
            }
            other => panic!("expected complete, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pending_responses() {
        let hash = sample_message_hash();
        let pending = assert_ok!(parse_response(
            &hash,
            body(Some("pending_confirmations"), Some("PENDING"))
        ));
        assert_eq!(pending.status(), "pending_confirmations");

        // complete without a signature is still pending
        let incomplete = assert_ok!(parse_response(&hash, body(Some("complete"), None)));
        assert!(matches!(incomplete, FetchOutcome::Pending { .. }));

        assert_err!(parse_response(&hash, body(Some("complete"), Some("0xnothex"))));
    }

    #[test]
    fn test_attestation_serializes_signature_as_hex() {
        let attestation = Attestation {
            message_hash: sample_message_hash(),
            signature_bytes: vec![1, 2, 3],
            issued_at: Utc::now(),
        };
        let json = serde_json::to_value(&attestation).unwrap();
        assert_eq!(json["signature"], "0x010203");
    }

    #[tokio::test]
    async fn test_poll_completes_after_pending() {
        let api = Arc::new(ScriptedAttestationApi::complete_after(3));
        let poller = AttestationPoller::new(api.clone(), 3);

        let attestation = assert_ok!(
            poller
                .poll(
                    &sample_message_hash(),
                    Duration::from_secs(5),
                    Duration::from_millis(5),
                    &CancelToken::never(),
                )
                .await
        );
        assert_eq!(api.calls(), 3);
        assert!(!attestation.signature_bytes.is_empty());
    }

    #[tokio::test]
    async fn test_poll_times_out_within_bound() {
        let api = Arc::new(ScriptedAttestationApi::never_complete());
        let poller = AttestationPoller::new(api, 3);

        let timeout = Duration::from_millis(100);
        let interval = Duration::from_millis(20);
        let started = Instant::now();
        let err = poller
            .poll(&sample_message_hash(), timeout, interval, &CancelToken::never())
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::AttestationTimeout { .. }));
        assert!(started.elapsed() < timeout + interval + Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_error_budget() {
        let api = Arc::new(ScriptedAttestationApi::always_failing());
        let poller = AttestationPoller::new(api.clone(), 2);

        let err = poller
            .poll(
                &sample_message_hash(),
                Duration::from_secs(5),
                Duration::from_millis(1),
                &CancelToken::never(),
            )
            .await
            .unwrap_err();

        match err {
            BridgeError::AttestationTimeout { reason, .. } => assert!(reason.contains("3 times")),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_poll_cancellation() {
        let api = Arc::new(ScriptedAttestationApi::never_complete());
        let poller = AttestationPoller::new(api, 3);
        let (handle, token) = CancelHandle::new();

        let task = tokio::spawn(async move {
            poller
                .poll(
                    &sample_message_hash(),
                    Duration::from_secs(30),
                    Duration::from_millis(5),
                    &token,
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(BridgeError::Cancelled(_))));
    }
}
