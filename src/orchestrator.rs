//! Co-signing orchestrator
//!
//! Drives one co-signed transaction end to end:
//!
//! ```text
//! Building -> DigestReady -> AwaitingRemoteSignature || AwaitingLocalSignature
//!          -> Combining -> Submitting -> Confirmed | Rejected | Failed
//! ```
//!
//! Both signers run concurrently in the calling task. Any failure before
//! submission ends the flow in `Failed`; the caller restarts from building.
//!
//! A shared wallet transfer can instead carry the hardware signature inside
//! the call itself. The peer signs the call first, then the local signer
//! signs the finished transaction alone:
//!
//! ```text
//! Building -> DigestReady -> AwaitingRemoteSignature -> AwaitingLocalSignature
//!          -> Submitting -> Confirmed | Rejected | Failed
//! ```

use serde::Serialize;
use std::sync::Arc;

use crate::error::{StepSignError, EPOCH_EXPIRED_MARKER};
use crate::multisig::MultisigPolicy;
use crate::rpc::{SuiRpc, TransactionEffects};
use crate::shared_wallet::SharedWallet;
use crate::signer::{CoSigner, RemoteSigner};
use crate::sui::SuiAddress;
use crate::tx::{Broadcaster, ExecutionResult, FailureKind, FailureReason, TransactionBuilder, TransactionDigest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoSignState {
    Building,
    DigestReady,
    AwaitingRemoteSignature,
    AwaitingLocalSignature,
    Combining,
    Submitting,
    Confirmed,
    Rejected,
    Failed,
}

/// Terminal outcome of one orchestrated transaction
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CoSignOutcome {
    Confirmed(TransactionEffects),
    /// The network executed or refused the transaction; resubmitting the
    /// same bytes will not help
    Rejected(FailureReason),
    Failed(StepSignError),
}

impl CoSignOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, CoSignOutcome::Confirmed(_))
    }

    pub fn state(&self) -> CoSignState {
        match self {
            CoSignOutcome::Confirmed(_) => CoSignState::Confirmed,
            CoSignOutcome::Rejected(_) => CoSignState::Rejected,
            CoSignOutcome::Failed(_) => CoSignState::Failed,
        }
    }
}

/// Outcome plus the states visited on the way
#[derive(Debug, Clone, Serialize)]
pub struct CoSignExecution {
    pub outcome: CoSignOutcome,
    pub trail: Vec<CoSignState>,
    /// Set once the transaction was built
    pub transaction_id: Option<String>,
}

struct Trail {
    states: Vec<CoSignState>,
    transaction_id: Option<String>,
}

impl Trail {
    fn new() -> Self {
        Self {
            states: Vec::new(),
            transaction_id: None,
        }
    }

    fn enter(&mut self, state: CoSignState) {
        crate::log_info!("orchestrator", "State transition", state = format!("{:?}", state));
        self.states.push(state);
    }

    fn finish(mut self, outcome: CoSignOutcome) -> CoSignExecution {
        self.enter(outcome.state());
        CoSignExecution {
            outcome,
            trail: self.states,
            transaction_id: self.transaction_id,
        }
    }
}

pub struct CoSignOrchestrator {
    rpc: Arc<dyn SuiRpc>,
    policy: MultisigPolicy,
    remote: Arc<RemoteSigner>,
    local: Arc<dyn CoSigner>,
    broadcaster: Broadcaster,
}

impl CoSignOrchestrator {
    pub fn new(
        rpc: Arc<dyn SuiRpc>,
        policy: MultisigPolicy,
        remote: Arc<RemoteSigner>,
        local: Arc<dyn CoSigner>,
        broadcaster: Broadcaster,
    ) -> Self {
        Self {
            rpc,
            policy,
            remote,
            local,
            broadcaster,
        }
    }

    pub fn policy(&self) -> &MultisigPolicy {
        &self.policy
    }

    /// Multisig address every plan must use as sender
    pub fn address(&self) -> SuiAddress {
        self.policy.address()
    }

    /// Build, co-sign and submit `plan`
    pub async fn execute_cosigned_transaction(&self, plan: TransactionBuilder) -> CoSignExecution {
        let mut trail = Trail::new();
        trail.enter(CoSignState::Building);

        if plan.sender() != self.address() {
            return trail.finish(CoSignOutcome::Failed(StepSignError::invalid_input(format!(
                "Sender {} is not the policy address {}",
                plan.sender(),
                self.address()
            ))));
        }

        let tx = match plan.build(self.rpc.as_ref()).await {
            Ok(tx) => tx,
            Err(e) => return trail.finish(CoSignOutcome::Failed(e)),
        };
        trail.transaction_id = Some(tx.transaction_id());

        let digest = TransactionDigest::of_transaction(&tx);
        trail.enter(CoSignState::DigestReady);
        crate::log_info!("orchestrator", "Digest ready", digest = digest, tx_id = tx.transaction_id());

        trail.enter(CoSignState::AwaitingRemoteSignature);
        trail.enter(CoSignState::AwaitingLocalSignature);
        let local = async {
            let result = self.local.produce_signature(&digest).await;
            if result.is_err() {
                // close the peer session before try_join drops its future
                self.remote.cancel_pending();
            }
            result
        };
        let (remote_sig, local_sig) = match tokio::try_join!(self.remote.request_signature(&digest), local) {
            Ok(pair) => pair,
            Err(e) => {
                crate::log_warn!("orchestrator", "Signing failed", error = e);
                return trail.finish(CoSignOutcome::Failed(e));
            }
        };

        trail.enter(CoSignState::Combining);
        let combined = match self.policy.combine(&[remote_sig, local_sig]) {
            Ok(combined) => combined,
            Err(e) => return trail.finish(CoSignOutcome::Failed(e)),
        };

        trail.enter(CoSignState::Submitting);
        let result = self.broadcaster.submit(&tx, combined.as_serialized()).await;
        trail.finish(settle(result))
    }

    /// Transfer `amount` out of `wallet` with the hardware signature
    /// embedded as a call argument.
    ///
    /// The sender is the local signer's own address, not the policy
    /// address. The peer signs the personal-message digest of the call
    /// built with a placeholder signature.
    pub async fn execute_cosigned_transfer(
        &self,
        wallet: &SharedWallet,
        amount: u64,
        recipient: SuiAddress,
        gas_budget: u64,
    ) -> CoSignExecution {
        let mut trail = Trail::new();
        trail.enter(CoSignState::Building);

        let sender = self.local.public_key().to_address();
        let digest = match wallet.cosign_digest(self.rpc.as_ref(), sender, amount, recipient).await {
            Ok(digest) => digest,
            Err(e) => return trail.finish(CoSignOutcome::Failed(e)),
        };
        trail.enter(CoSignState::DigestReady);
        crate::log_info!("orchestrator", "Call digest ready", digest = digest, sender = sender);

        trail.enter(CoSignState::AwaitingRemoteSignature);
        let hardware_signature = match self
            .remote
            .request_signature(&digest)
            .await
            .and_then(|partial| partial.signature.ed25519_parts())
        {
            Ok((raw, _)) => raw,
            Err(e) => {
                crate::log_warn!("orchestrator", "Remote signing failed", error = e);
                return trail.finish(CoSignOutcome::Failed(e));
            }
        };

        let mut plan = TransactionBuilder::new(sender);
        plan.gas_budget(gas_budget);
        if let Err(e) = wallet.cosign_and_transfer(&mut plan, &hardware_signature, amount, recipient) {
            return trail.finish(CoSignOutcome::Failed(e));
        }
        let tx = match plan.build(self.rpc.as_ref()).await {
            Ok(tx) => tx,
            Err(e) => return trail.finish(CoSignOutcome::Failed(e)),
        };
        trail.transaction_id = Some(tx.transaction_id());

        trail.enter(CoSignState::AwaitingLocalSignature);
        let local_sig = match self.local.produce_signature(&TransactionDigest::of_transaction(&tx)).await {
            Ok(sig) => sig,
            Err(e) => {
                crate::log_warn!("orchestrator", "Local signing failed", error = e);
                return trail.finish(CoSignOutcome::Failed(e));
            }
        };

        trail.enter(CoSignState::Submitting);
        let result = self.broadcaster.submit(&tx, &local_sig.signature).await;
        trail.finish(settle(result))
    }
}

fn settle(result: ExecutionResult) -> CoSignOutcome {
    match result {
        ExecutionResult::Success(effects) => CoSignOutcome::Confirmed(effects),
        ExecutionResult::OnChainFailure(reason) if reason.kind == FailureKind::EpochExpired => CoSignOutcome::Failed(
            StepSignError::on_chain_failure("Signature validity window has passed")
                .with_details(format!("{}: {}", EPOCH_EXPIRED_MARKER, reason.message)),
        ),
        ExecutionResult::OnChainFailure(reason) => CoSignOutcome::Rejected(reason),
        ExecutionResult::TransportFailure { message } => {
            CoSignOutcome::Failed(StepSignError::transport_failure("Submission outcome unknown").with_details(message))
        }
    }
}
