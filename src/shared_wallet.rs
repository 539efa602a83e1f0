//! Shared wallet contract bindings
//!
//! Typed builders for the `shared_wallet` Move module. Each call appends to a
//! [`TransactionBuilder`]; the on-chain checks (threshold, frozen flag,
//! creator-only thaw) belong to the contract.

use serde::{Deserialize, Serialize};

use crate::error::{StepSignError, StepSignResult};
use crate::rpc::types::as_u64;
use crate::rpc::{ObjectData, SuiRpc};
use crate::sui::{ObjectId, ObjectRef, SuiAddress};
use crate::tx::{Argument, FailureReason, TransactionBuilder, TransactionDigest, TypedArg};

pub const MODULE: &str = "shared_wallet";

/// Type argument of `execute_transfer`
pub const SUI_COIN_TYPE: &str = "0x2::coin::Coin<0x2::sui::SUI>";

/// Abort name of the contract's frozen guard
pub const WALLET_FROZEN_ABORT: &str = "EWalletFrozen";

/// Raw Ed25519 signature length the contract expects from the hardware key
pub const HARDWARE_SIGNATURE_LEN: usize = 64;

/// A deployed shared wallet object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedWallet {
    package: ObjectId,
    wallet: ObjectId,
}

impl SharedWallet {
    pub fn new(package: ObjectId, wallet: ObjectId) -> Self {
        Self { package, wallet }
    }

    pub fn package(&self) -> ObjectId {
        self.package
    }

    pub fn wallet(&self) -> ObjectId {
        self.wallet
    }

    fn call(&self, builder: &mut TransactionBuilder, function: &str, args: Vec<Argument>) -> StepSignResult<Argument> {
        builder.move_call(&target(self.package, function), &[], args)
    }

    /// `create_and_share()`: new wallet owned by the sender, shared on creation
    pub fn create_and_share(builder: &mut TransactionBuilder, package: ObjectId) -> StepSignResult<Argument> {
        builder.move_call(&target(package, "create_and_share"), &[], Vec::new())
    }

    /// `freeze_wallet(wallet)`
    pub fn freeze_wallet(&self, builder: &mut TransactionBuilder) -> StepSignResult<Argument> {
        let wallet = builder.object(self.wallet);
        self.call(builder, "freeze_wallet", vec![wallet])
    }

    /// `thaw_wallet(wallet)`; only the creator may call it
    pub fn thaw_wallet(&self, builder: &mut TransactionBuilder) -> StepSignResult<Argument> {
        let wallet = builder.object(self.wallet);
        self.call(builder, "thaw_wallet", vec![wallet])
    }

    /// Split `amount` from gas and `deposit(wallet, coin)`
    pub fn deposit(&self, builder: &mut TransactionBuilder, amount: u64) -> StepSignResult<Argument> {
        let coin = split_from_gas(builder, amount)?;
        let wallet = builder.object(self.wallet);
        self.call(builder, "deposit", vec![wallet, coin])
    }

    /// Split `amount` from gas and `execute_transfer<Coin<SUI>>(wallet, coin, recipient)`
    pub fn execute_transfer(
        &self,
        builder: &mut TransactionBuilder,
        amount: u64,
        recipient: SuiAddress,
    ) -> StepSignResult<Argument> {
        let coin = split_from_gas(builder, amount)?;
        let wallet = builder.object(self.wallet);
        let recipient = builder.pure(TypedArg::address(recipient))?;
        builder.move_call(
            &target(self.package, "execute_transfer"),
            &[SUI_COIN_TYPE],
            vec![wallet, coin, recipient],
        )
    }

    /// `emergency_withdraw(wallet, safe_address)`
    pub fn emergency_withdraw(
        &self,
        builder: &mut TransactionBuilder,
        safe_address: SuiAddress,
    ) -> StepSignResult<Argument> {
        let wallet = builder.object(self.wallet);
        let safe = builder.pure(TypedArg::address(safe_address))?;
        self.call(builder, "emergency_withdraw", vec![wallet, safe])
    }

    /// `cosign_and_transfer(wallet, hardware_signature, amount, recipient)`
    pub fn cosign_and_transfer(
        &self,
        builder: &mut TransactionBuilder,
        hardware_signature: &[u8],
        amount: u64,
        recipient: SuiAddress,
    ) -> StepSignResult<Argument> {
        if hardware_signature.len() != HARDWARE_SIGNATURE_LEN {
            return Err(StepSignError::invalid_input(format!(
                "Hardware signature must be {} bytes, got {}",
                HARDWARE_SIGNATURE_LEN,
                hardware_signature.len()
            )));
        }
        let wallet = builder.object(self.wallet);
        let signature = builder.pure(TypedArg::bytes(hardware_signature))?;
        let amount = builder.pure(TypedArg::u64(amount))?;
        let recipient = builder.pure(TypedArg::address(recipient))?;
        self.call(builder, "cosign_and_transfer", vec![wallet, signature, amount, recipient])
    }

    /// Digest the hardware key signs for [`cosign_and_transfer`](Self::cosign_and_transfer).
    ///
    /// The signature cannot cover itself, so the kind is built with an
    /// all-zero signature in its place and framed with the personal-message
    /// intent.
    pub async fn cosign_digest(
        &self,
        rpc: &dyn SuiRpc,
        sender: SuiAddress,
        amount: u64,
        recipient: SuiAddress,
    ) -> StepSignResult<TransactionDigest> {
        let mut builder = TransactionBuilder::new(sender);
        self.cosign_and_transfer(&mut builder, &[0u8; HARDWARE_SIGNATURE_LEN], amount, recipient)?;
        let kind = builder.build_kind(rpc).await?;
        Ok(TransactionDigest::of_programmable(&kind))
    }

    /// Read the wallet object
    pub async fn state(&self, rpc: &dyn SuiRpc) -> StepSignResult<WalletState> {
        let object = rpc.get_object(self.wallet).await?;
        WalletState::from_object(&object)
    }
}

fn target(package: ObjectId, function: &str) -> String {
    format!("{}::{}::{}", package, MODULE, function)
}

fn split_from_gas(builder: &mut TransactionBuilder, amount: u64) -> StepSignResult<Argument> {
    if amount == 0 {
        return Err(StepSignError::invalid_input("Amount must be greater than zero"));
    }
    let amount = builder.pure(TypedArg::u64(amount))?;
    match builder.split_coins(Argument::GasCoin, vec![amount]) {
        Argument::Result(i) => Ok(Argument::NestedResult(i, 0)),
        other => Ok(other),
    }
}

/// Snapshot of the wallet's Move fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletState {
    pub object_ref: ObjectRef,
    pub is_frozen: bool,
    pub balance: Option<u64>,
}

impl WalletState {
    pub fn from_object(object: &ObjectData) -> StepSignResult<Self> {
        let is_frozen = object
            .fields
            .get("is_frozen")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| StepSignError::parse_error("Wallet object has no 'is_frozen' field"))?;
        let balance = object.fields.get("balance").and_then(|v| as_u64(v, "balance").ok());

        Ok(Self {
            object_ref: object.object_ref,
            is_frozen,
            balance,
        })
    }
}

impl FailureReason {
    /// The contract refused because the wallet is frozen
    pub fn is_wallet_frozen(&self) -> bool {
        self.message.contains(WALLET_FROZEN_ABORT)
    }
}
