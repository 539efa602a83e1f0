//! Transaction Broadcaster
//!
//! Submits a signed transaction and classifies the outcome as exactly one
//! of success, on-chain failure or transport failure. Only transport
//! failures are retried, and never blindly: the locally computed
//! transaction id is looked up before every resubmission.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::tracker::FinalityTracker;
use super::types::UnsignedTransaction;
use crate::error::ErrorCode;
use crate::rpc::{ExecutionStatus, SuiRpc, TransactionEffects, TransactionResponse};
use crate::sui::SerializedSignature;

// =============================================================================
// Outcome types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Contract aborted with a code
    MoveAbort,
    /// zkLogin validity window lapsed before submission
    EpochExpired,
    /// Validators refused the signed envelope
    Refused,
    Other,
}

/// Why the network rejected a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub abort_code: Option<u64>,
    pub module: Option<String>,
    pub function: Option<String>,
    pub message: String,
}

impl FailureReason {
    /// Classify the `effects.status.error` string of an executed transaction
    pub fn from_execution_error(message: &str) -> Self {
        if !message.starts_with("MoveAbort") {
            return Self {
                kind: FailureKind::Other,
                abort_code: None,
                module: None,
                function: None,
                message: message.to_string(),
            };
        }

        Self {
            kind: FailureKind::MoveAbort,
            abort_code: parse_abort_code(message),
            module: quoted_after(message, "name: Identifier(\""),
            function: quoted_after(message, "function_name: Some(\""),
            message: message.to_string(),
        }
    }

    /// Classify an RPC error returned instead of effects.
    ///
    /// Only rejections of the signed envelope itself count; anything else
    /// (rate limits, finality timeouts, overloaded nodes) leaves the outcome
    /// unknown and yields `None`.
    pub fn from_refusal(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        let epoch_expired = lower.contains("epoch expired")
            || (lower.contains("zklogin") && (lower.contains("expired") || lower.contains("max epoch")));
        let refused = epoch_expired || REFUSAL_MARKERS.iter().any(|m| lower.contains(m));
        if !refused {
            return None;
        }

        Some(Self {
            kind: if epoch_expired {
                FailureKind::EpochExpired
            } else {
                FailureKind::Refused
            },
            abort_code: None,
            module: None,
            function: None,
            message: message.to_string(),
        })
    }
}

/// Lowercased fragments of validator errors that reject the envelope
const REFUSAL_MARKERS: &[&str] = &[
    "invalid user signature",
    "invalid signature",
    "signature is not valid",
    "required signature",
    "transaction expired",
];

/// `MoveAbort(MoveLocation { .. }, 7) in command 1` -> 7
fn parse_abort_code(message: &str) -> Option<u64> {
    let end = message.rfind(')')?;
    let head = &message[..end];
    let start = head.rfind(", ")? + 2;
    head[start..].trim().parse().ok()
}

fn quoted_after(message: &str, marker: &str) -> Option<String> {
    let start = message.find(marker)? + marker.len();
    let len = message[start..].find('"')?;
    Some(message[start..start + len].to_string())
}

/// Terminal result of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionResult {
    Success(TransactionEffects),
    OnChainFailure(FailureReason),
    TransportFailure { message: String },
}

// =============================================================================
// Retry policy
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1` (attempts count from 1)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

pub struct Broadcaster {
    rpc: Arc<dyn SuiRpc>,
    policy: RetryPolicy,
    tracker: FinalityTracker,
}

impl Broadcaster {
    pub fn new(rpc: Arc<dyn SuiRpc>, policy: RetryPolicy, tracker: FinalityTracker) -> Self {
        Self { rpc, policy, tracker }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Submit `tx` with its single combined signature
    pub async fn submit(&self, tx: &UnsignedTransaction, signature: &SerializedSignature) -> ExecutionResult {
        let tx_bytes = tx.to_bytes();
        let tx_id = tx.transaction_id();
        let signatures = [signature.clone()];
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            if attempt > 1 {
                // The previous attempt may have landed
                match self.rpc.get_transaction(&tx_id).await {
                    Ok(Some(resp)) => {
                        crate::log_info!("broadcaster", "Transaction already known, not resubmitting", tx_id = tx_id);
                        return self.classify(&tx_id, resp).await;
                    }
                    Ok(None) => {}
                    Err(e) => crate::log_warn!("broadcaster", "Lookup before resubmit failed", tx_id = tx_id, error = e),
                }
            }

            crate::log_info!("broadcaster", "Submitting transaction", tx_id = tx_id, attempt = attempt);
            match self.rpc.execute_transaction(&tx_bytes, &signatures).await {
                Ok(resp) => return self.classify(&tx_id, resp).await,
                Err(e) if e.code == ErrorCode::RpcError => {
                    let text = match &e.details {
                        Some(d) => format!("{} ({})", e.message, d),
                        None => e.message.clone(),
                    };
                    if let Some(reason) = FailureReason::from_refusal(&text) {
                        crate::log_warn!("broadcaster", "Transaction refused", tx_id = tx_id, kind = format!("{:?}", reason.kind));
                        return ExecutionResult::OnChainFailure(reason);
                    }
                    // The node answered but did not say whether the transaction executed
                    crate::log_warn!("broadcaster", "Submission outcome unknown", tx_id = tx_id, attempt = attempt, error = e);
                    last_error = text;
                }
                Err(e) => {
                    crate::log_warn!("broadcaster", "Submission outcome unknown", tx_id = tx_id, attempt = attempt, error = e);
                    last_error = e.to_string();
                    if !e.is_retryable() {
                        break;
                    }
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.policy.backoff_for(attempt)).await;
            }
        }

        // One last look so a landed transaction is never reported as lost
        if let Ok(Some(resp)) = self.rpc.get_transaction(&tx_id).await {
            return self.classify(&tx_id, resp).await;
        }

        crate::log_error!("broadcaster", "Giving up on submission", tx_id = tx_id, attempts = attempts);
        ExecutionResult::TransportFailure { message: last_error }
    }

    async fn classify(&self, tx_id: &str, resp: TransactionResponse) -> ExecutionResult {
        if resp.digest != tx_id {
            crate::log_warn!("broadcaster", "Node reported a different transaction id", tx_id = tx_id, node_tx_id = resp.digest);
        }

        let resp = if resp.effects.is_some() {
            resp
        } else {
            match self.tracker.wait_for_effects(tx_id).await {
                Ok(Some(r)) => r,
                Ok(None) => {
                    return ExecutionResult::TransportFailure {
                        message: format!("No effects for {} after polling", tx_id),
                    }
                }
                Err(e) => return ExecutionResult::TransportFailure { message: e.to_string() },
            }
        };

        let effects = match resp.effects {
            Some(effects) => effects,
            None => {
                return ExecutionResult::TransportFailure {
                    message: format!("No effects for {}", tx_id),
                }
            }
        };

        if let ExecutionStatus::Failure { error } = &effects.status {
            let reason = FailureReason::from_execution_error(error);
            crate::log_warn!("broadcaster", "Transaction failed on chain", tx_id = tx_id, error = error);
            return ExecutionResult::OnChainFailure(reason);
        }

        crate::log_info!("broadcaster", "Transaction succeeded", tx_id = tx_id);
        ExecutionResult::Success(effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FROZEN_ABORT: &str = "MoveAbort(MoveLocation { module: ModuleId { address: 1b76449b6c4ba6f5b5c31dec9d578d9b0405ac8b53044b8235e6c2fc6f6d2c59, name: Identifier(\"shared_wallet\") }, function: 3, instruction: 12, function_name: Some(\"execute_transfer\") }, 1) in command 1";

    #[test]
    fn test_parse_move_abort() {
        let reason = FailureReason::from_execution_error(FROZEN_ABORT);
        assert_eq!(reason.kind, FailureKind::MoveAbort);
        assert_eq!(reason.abort_code, Some(1));
        assert_eq!(reason.module.as_deref(), Some("shared_wallet"));
        assert_eq!(reason.function.as_deref(), Some("execute_transfer"));
    }

    #[test]
    fn test_non_abort_failure() {
        let reason = FailureReason::from_execution_error("InsufficientGas");
        assert_eq!(reason.kind, FailureKind::Other);
        assert_eq!(reason.abort_code, None);
    }

    #[test]
    fn test_refusal_classification() {
        let expired = FailureReason::from_refusal("Invalid user signature: ZKLogin expired at epoch 45").unwrap();
        assert_eq!(expired.kind, FailureKind::EpochExpired);

        let refused = FailureReason::from_refusal("Invalid user signature: Required Signature from 0x1 is absent").unwrap();
        assert_eq!(refused.kind, FailureKind::Refused);

        assert!(FailureReason::from_refusal("Transaction timed out before reaching finality").is_none());
        assert!(FailureReason::from_refusal("sui_executeTransactionBlock returned HTTP 429 Too Many Requests").is_none());
    }

    #[test]
    fn test_backoff_growth() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
    }
}
