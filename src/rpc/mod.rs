//! Network RPC
//!
//! [`SuiRpc`] is the read/execute surface the builder, broadcaster and
//! zkLogin signer need. [`SuiRpcClient`] implements it over JSON-RPC; tests
//! substitute in-memory networks.

mod client;
pub mod types;

pub use client::SuiRpcClient;
pub use types::{
    Coin, CreatedObject, ExecutionStatus, ObjectData, ObjectOwner, TransactionEffects,
    TransactionResponse,
};

use async_trait::async_trait;

use crate::error::StepSignResult;
use crate::sui::{ObjectId, SerializedSignature, SuiAddress};

#[async_trait]
pub trait SuiRpc: Send + Sync {
    /// Read an object with owner and content
    async fn get_object(&self, id: ObjectId) -> StepSignResult<ObjectData>;

    /// SUI coins owned by `owner`
    async fn get_coins(&self, owner: SuiAddress) -> StepSignResult<Vec<Coin>>;

    async fn reference_gas_price(&self) -> StepSignResult<u64>;

    async fn latest_epoch(&self) -> StepSignResult<u64>;

    /// Submit signed bytes.
    ///
    /// Errors with `RpcError` when the node answered and refused the
    /// envelope, and with `NetworkError`/`Timeout` when the outcome is
    /// unknown.
    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[SerializedSignature],
    ) -> StepSignResult<TransactionResponse>;

    /// Look a transaction up by id; `None` if the network has not seen it
    async fn get_transaction(&self, digest: &str) -> StepSignResult<Option<TransactionResponse>>;
}
