//! StepSign Core Library
//!
//! Co-signed transaction submission for a shared multisig wallet held by
//! an app key and a hardware key on a wireless peer device.
//!
//! # Architecture
//!
//! Data flows strictly forward:
//! - **tx**: transaction building, digest derivation, submission
//! - **signer**: local key, zkLogin and remote hardware signers
//! - **multisig**: weighted policy and signature combination
//! - **orchestrator**: the end-to-end co-signing state machine
//! - **shared_wallet**: bindings for the shared wallet contract
//! - **rpc**: network access behind the [`rpc::SuiRpc`] trait
//!
//! # Security
//!
//! Keys are never read from module state. Secrets (private keys, JWTs,
//! salts) are passed in at call time, held in `secrecy`/`zeroize` wrappers
//! and redacted from logs.
//!
//! # Example
//!
//! ```rust,ignore
//! use stepsign::{CoSignOrchestrator, SharedWallet, TransactionBuilder};
//!
//! let mut plan = TransactionBuilder::new(orchestrator.address());
//! wallet.execute_transfer(&mut plan, 10_000_000, recipient)?;
//! let execution = orchestrator.execute_cosigned_transaction(plan).await;
//! println!("{:?}", execution.trail);
//! ```

pub mod config;
pub mod error;
pub mod multisig;
pub mod orchestrator;
pub mod rpc;
pub mod shared_wallet;
pub mod signer;
pub mod sui;
pub mod tx;
pub mod utils;

pub use config::StepSignConfig;
pub use error::{ErrorCode, StepSignError, StepSignResult};
pub use multisig::{CombinedSignature, MultisigMember, MultisigPolicy, PartialSignature};
pub use orchestrator::{CoSignExecution, CoSignOrchestrator, CoSignOutcome, CoSignState};
pub use shared_wallet::{SharedWallet, WalletState};
pub use signer::{CoSigner, LocalKeySigner, RemoteSigner, ZkLoginSigner};
pub use sui::{PublicKey, SerializedSignature, SuiAddress, SuiKeyPair};
pub use tx::{
    Broadcaster, ExecutionResult, FailureReason, FinalityTracker, RetryPolicy, TransactionBuilder,
    TransactionDigest, UnsignedTransaction,
};
