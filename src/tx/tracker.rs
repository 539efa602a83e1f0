//! Finality tracking
//!
//! Polls the node for a transaction's effects with a bounded number of
//! attempts.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StepSignResult;
use crate::rpc::{SuiRpc, TransactionResponse};

/// Bounded poll for a transaction's effects
#[derive(Clone)]
pub struct FinalityTracker {
    rpc: Arc<dyn SuiRpc>,
    interval: Duration,
    attempts: u32,
}

impl FinalityTracker {
    pub fn new(rpc: Arc<dyn SuiRpc>, interval: Duration, attempts: u32) -> Self {
        Self {
            rpc,
            interval,
            attempts: attempts.max(1),
        }
    }

    /// Poll until the node reports effects for `tx_id`.
    ///
    /// `Ok(None)` means the attempts ran out without effects. Retryable
    /// query errors are absorbed; others end the wait.
    pub async fn wait_for_effects(&self, tx_id: &str) -> StepSignResult<Option<TransactionResponse>> {
        for attempt in 1..=self.attempts {
            match self.rpc.get_transaction(tx_id).await {
                Ok(Some(resp)) if resp.effects.is_some() => {
                    crate::log_debug!("tracker", "Effects available", tx_id = tx_id, attempt = attempt);
                    return Ok(Some(resp));
                }
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    crate::log_debug!("tracker", "Poll failed", tx_id = tx_id, error = e);
                }
                Err(e) => return Err(e),
            }

            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        crate::log_warn!("tracker", "Gave up waiting for effects", tx_id = tx_id, attempts = self.attempts);
        Ok(None)
    }
}
