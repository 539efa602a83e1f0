use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::error::{ErrorCode, StepSignError, StepSignResult};
use crate::rpc::{
    Coin, ExecutionStatus, ObjectData, ObjectOwner, SuiRpc, TransactionEffects, TransactionResponse,
};
use crate::sui::{ObjectDigest, ObjectId, ObjectRef, SerializedSignature, SuiAddress};

fn addr(n: u8) -> SuiAddress {
    let mut bytes = [0u8; 32];
    bytes[31] = n;
    SuiAddress::new(bytes)
}

fn gas_ref() -> ObjectRef {
    ObjectRef::new(addr(5), 3, ObjectDigest([7u8; 32]))
}

/// SplitCoins(gas, [100]) + TransferObjects to 0xbb, built without network
fn golden_transaction() -> UnsignedTransaction {
    let mut builder = TransactionBuilder::new(addr(0xaa));
    let amount = builder.pure(TypedArg::u64(100)).unwrap();
    let recipient = builder.pure(TypedArg::address(addr(0xbb))).unwrap();
    let coin = builder.split_coins(Argument::GasCoin, vec![amount]);
    builder.transfer_objects(vec![coin], recipient);
    builder
        .gas_payment(vec![gas_ref()])
        .gas_price(1000)
        .gas_budget(10_000_000);
    builder.build_offline().unwrap()
}

const GOLDEN_TX_HEX: &str = "00000200086400000000000000002000000000000000000000000000000000000000000000000000000000000000bb02020001010000010102000001010000000000000000000000000000000000000000000000000000000000000000aa010000000000000000000000000000000000000000000000000000000000000005030000000000000020070707070707070707070707070707070707070707070707070707070707070700000000000000000000000000000000000000000000000000000000000000aae803000000000000809698000000000000";

// =============================================================================
// Encoding and digest
// =============================================================================

#[test]
fn test_golden_transaction_bytes() {
    assert_eq!(hex::encode(golden_transaction().to_bytes()), GOLDEN_TX_HEX);
}

#[test]
fn test_golden_transaction_digest() {
    let digest = TransactionDigest::of_transaction(&golden_transaction());
    assert_eq!(
        digest.to_hex(),
        "85b9482e58c270bf1906350a5cfbdd14e88d193c4b0f3b9032213a41f0c09e67"
    );
}

#[test]
fn test_golden_transaction_id() {
    assert_eq!(
        golden_transaction().transaction_id(),
        "x8nwNENGfQypye1tiCT7euiT6xiFTNtptRfjTTYsGup"
    );
}

#[test]
fn test_digest_is_deterministic() {
    let a = TransactionDigest::of_transaction(&golden_transaction());
    let b = TransactionDigest::of_transaction(&golden_transaction());
    assert_eq!(a, b);
    assert_ne!(a, TransactionDigest::of_kind(&golden_transaction()));
}

#[test]
fn test_digest_changes_with_budget() {
    let mut builder = TransactionBuilder::new(addr(0xaa));
    let amount = builder.pure(TypedArg::u64(100)).unwrap();
    builder.split_coins(Argument::GasCoin, vec![amount]);
    builder.gas_payment(vec![gas_ref()]).gas_price(1000);
    let mut cheaper = builder.clone();
    cheaper.gas_budget(1);
    builder.gas_budget(2);
    let a = cheaper.build_offline().unwrap();
    let b = builder.build_offline().unwrap();
    assert_ne!(TransactionDigest::of_transaction(&a), TransactionDigest::of_transaction(&b));
}

#[test]
fn test_expiration_encoding() {
    let mut builder = TransactionBuilder::new(addr(0xaa));
    let amount = builder.pure(TypedArg::u64(1)).unwrap();
    builder.split_coins(Argument::GasCoin, vec![amount]);
    builder.gas_payment(vec![gas_ref()]).gas_price(1).expiration_epoch(9);
    let bytes = builder.build_offline().unwrap().to_bytes();
    assert_eq!(&bytes[bytes.len() - 9..], &[1, 9, 0, 0, 0, 0, 0, 0, 0]);
}

// =============================================================================
// Builder validation
// =============================================================================

#[test]
fn test_builder_rejects_bad_pure_argument() {
    let mut builder = TransactionBuilder::new(addr(1));
    let err = builder.pure(TypedArg::new(PureType::U64, vec![1, 2])).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgumentEncoding);
}

#[test]
fn test_builder_rejects_dangling_result() {
    let mut builder = TransactionBuilder::new(addr(1));
    builder.transfer_objects(vec![Argument::Result(3)], Argument::Input(0));
    builder.gas_payment(vec![gas_ref()]).gas_price(1);
    let err = builder.build_offline().unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgumentEncoding);
}

#[test]
fn test_builder_rejects_unaddressable_input() {
    let mut builder = TransactionBuilder::new(addr(1));
    for _ in 0..=u16::MAX as usize {
        builder.pure(TypedArg::u8(1)).unwrap();
    }
    let err = builder.pure(TypedArg::u8(1)).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgumentEncoding);
}

#[test]
fn test_builder_rejects_unaddressable_object() {
    let mut builder = TransactionBuilder::new(addr(1));
    for _ in 0..=u16::MAX as usize {
        builder.pure(TypedArg::u8(1)).unwrap();
    }
    let coin = builder.owned_object(gas_ref());
    assert_eq!(coin, Argument::Input(u16::MAX));
    builder.transfer_objects(vec![coin], Argument::Input(0));
    builder.gas_payment(vec![gas_ref()]).gas_price(1);
    let err = builder.build_offline().unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgumentEncoding);
}

#[test]
fn test_builder_rejects_bad_type_argument() {
    let mut builder = TransactionBuilder::new(addr(1));
    let err = builder
        .move_call("0x2::coin::join", &["0x2::coin::Coin<"], vec![])
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidArgumentEncoding);
}

#[test]
fn test_builder_requires_command() {
    let mut builder = TransactionBuilder::new(addr(1));
    builder.gas_payment(vec![gas_ref()]).gas_price(1);
    assert_eq!(builder.build_offline().unwrap_err().code, ErrorCode::InvalidInput);
}

#[test]
fn test_offline_build_requires_gas() {
    let mut builder = TransactionBuilder::new(addr(1));
    let amount = builder.pure(TypedArg::u64(1)).unwrap();
    builder.split_coins(Argument::GasCoin, vec![amount]);
    assert_eq!(builder.build_offline().unwrap_err().code, ErrorCode::GasResolutionError);
}

// =============================================================================
// Mock network
// =============================================================================

#[derive(Default)]
struct MockRpc {
    objects: HashMap<ObjectId, ObjectData>,
    coins: Vec<Coin>,
    execute_results: Mutex<VecDeque<StepSignResult<TransactionResponse>>>,
    lookup_results: Mutex<VecDeque<Option<TransactionResponse>>>,
    execute_calls: AtomicU32,
    lookup_calls: AtomicU32,
}

#[async_trait]
impl SuiRpc for MockRpc {
    async fn get_object(&self, id: ObjectId) -> StepSignResult<ObjectData> {
        self.objects
            .get(&id)
            .cloned()
            .ok_or_else(|| StepSignError::rpc("notExists"))
    }

    async fn get_coins(&self, _owner: SuiAddress) -> StepSignResult<Vec<Coin>> {
        Ok(self.coins.clone())
    }

    async fn reference_gas_price(&self) -> StepSignResult<u64> {
        Ok(750)
    }

    async fn latest_epoch(&self) -> StepSignResult<u64> {
        Ok(10)
    }

    async fn execute_transaction(
        &self,
        _tx_bytes: &[u8],
        _signatures: &[SerializedSignature],
    ) -> StepSignResult<TransactionResponse> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.execute_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StepSignError::network("connection reset")))
    }

    async fn get_transaction(&self, _digest: &str) -> StepSignResult<Option<TransactionResponse>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup_results.lock().unwrap().pop_front().flatten())
    }
}

fn wallet_object(id: ObjectId) -> ObjectData {
    ObjectData {
        object_ref: ObjectRef::new(id, 40, ObjectDigest([1u8; 32])),
        owner: ObjectOwner::Shared {
            initial_shared_version: 12,
        },
        type_: None,
        fields: serde_json::json!({ "is_frozen": false }),
    }
}

fn coin(n: u8, balance: u64) -> Coin {
    Coin {
        object_ref: ObjectRef::new(addr(n), 1, ObjectDigest([n; 32])),
        balance,
    }
}

fn response(status: ExecutionStatus, with_effects: bool) -> TransactionResponse {
    let digest = golden_transaction().transaction_id();
    TransactionResponse {
        digest: digest.clone(),
        effects: with_effects.then(|| TransactionEffects {
            transaction_digest: digest,
            status,
            executed_epoch: Some(10),
            net_gas_used: 1_000,
            created: vec![],
        }),
        checkpoint: None,
    }
}

fn broadcaster(rpc: Arc<MockRpc>, max_attempts: u32) -> Broadcaster {
    let tracker = FinalityTracker::new(rpc.clone(), Duration::from_millis(100), 3);
    Broadcaster::new(
        rpc,
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        },
        tracker,
    )
}

fn dummy_signature() -> SerializedSignature {
    SerializedSignature(vec![0x03, 0, 0])
}

// =============================================================================
// Builder resolution
// =============================================================================

#[tokio::test]
async fn test_build_resolves_shared_object_and_gas() {
    let wallet = addr(0x77);
    let mut rpc = MockRpc::default();
    rpc.objects.insert(wallet, wallet_object(wallet));
    rpc.coins = vec![coin(0x21, 30_000_000), coin(0x22, 30_000_000), coin(0x23, 5)];

    let mut builder = TransactionBuilder::new(addr(0xaa));
    let w = builder.object(wallet);
    builder.move_call("0x99::shared_wallet::freeze_wallet", &[], vec![w]).unwrap();
    let tx = builder.build(&rpc).await.unwrap();

    assert_eq!(tx.gas_data().price, 750);
    assert_eq!(tx.gas_data().payment.len(), 2);
    assert_eq!(
        tx.kind().inputs[0],
        CallArg::Object(ObjectArg::Shared {
            id: wallet,
            initial_shared_version: 12,
            mutable: true,
        })
    );
}

#[tokio::test]
async fn test_build_without_coins_is_gas_resolution_error() {
    let rpc = MockRpc::default();
    let mut builder = TransactionBuilder::new(addr(0xaa));
    let amount = builder.pure(TypedArg::u64(1)).unwrap();
    builder.split_coins(Argument::GasCoin, vec![amount]);

    let err = builder.build(&rpc).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::GasResolutionError);
}

#[tokio::test]
async fn test_build_with_insufficient_gas() {
    let mut rpc = MockRpc::default();
    rpc.coins = vec![coin(0x21, 10)];
    let mut builder = TransactionBuilder::new(addr(0xaa));
    let amount = builder.pure(TypedArg::u64(1)).unwrap();
    builder.split_coins(Argument::GasCoin, vec![amount]);

    let err = builder.build(&rpc).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::GasResolutionError);
}

// =============================================================================
// Broadcaster
// =============================================================================

#[tokio::test]
async fn test_submit_success() {
    let rpc = Arc::new(MockRpc::default());
    rpc.execute_results
        .lock()
        .unwrap()
        .push_back(Ok(response(ExecutionStatus::Success, true)));

    let result = broadcaster(rpc.clone(), 3)
        .submit(&golden_transaction(), &dummy_signature())
        .await;
    assert!(matches!(result, ExecutionResult::Success(_)));
    assert_eq!(rpc.execute_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_on_chain_failure_is_not_retried() {
    let rpc = Arc::new(MockRpc::default());
    rpc.execute_results.lock().unwrap().push_back(Ok(response(
        ExecutionStatus::Failure {
            error: "MoveAbort(MoveLocation { module: ModuleId { address: 99, name: Identifier(\"shared_wallet\") }, function: 3, instruction: 12, function_name: Some(\"execute_transfer\") }, 1) in command 1".into(),
        },
        true,
    )));

    let result = broadcaster(rpc.clone(), 3)
        .submit(&golden_transaction(), &dummy_signature())
        .await;
    match result {
        ExecutionResult::OnChainFailure(reason) => assert_eq!(reason.kind, FailureKind::MoveAbort),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(rpc.execute_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refusal_is_on_chain_failure() {
    let rpc = Arc::new(MockRpc::default());
    rpc.execute_results
        .lock()
        .unwrap()
        .push_back(Err(StepSignError::rpc("Invalid user signature: ZKLogin expired at epoch 12")));

    let result = broadcaster(rpc.clone(), 3)
        .submit(&golden_transaction(), &dummy_signature())
        .await;
    match result {
        ExecutionResult::OnChainFailure(reason) => assert_eq!(reason.kind, FailureKind::EpochExpired),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(rpc.execute_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_finality_timeout_is_looked_up_not_rejected() {
    let rpc = Arc::new(MockRpc::default());
    rpc.execute_results
        .lock()
        .unwrap()
        .push_back(Err(StepSignError::rpc("Transaction timed out before reaching finality")));
    rpc.lookup_results
        .lock()
        .unwrap()
        .push_back(Some(response(ExecutionStatus::Success, true)));

    let result = broadcaster(rpc.clone(), 3)
        .submit(&golden_transaction(), &dummy_signature())
        .await;
    assert!(matches!(result, ExecutionResult::Success(_)), "{:?}", result);
    assert_eq!(rpc.execute_calls.load(Ordering::SeqCst), 1);
    assert_eq!(rpc.lookup_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_submission_is_retried() {
    let rpc = Arc::new(MockRpc::default());
    {
        let mut results = rpc.execute_results.lock().unwrap();
        results.push_back(Err(StepSignError::rpc("sui_executeTransactionBlock returned HTTP 429 Too Many Requests")));
        results.push_back(Ok(response(ExecutionStatus::Success, true)));
    }

    let result = broadcaster(rpc.clone(), 3)
        .submit(&golden_transaction(), &dummy_signature())
        .await;
    assert!(matches!(result, ExecutionResult::Success(_)), "{:?}", result);
    assert_eq!(rpc.execute_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_outcome_resolved_by_lookup() {
    let rpc = Arc::new(MockRpc::default());
    rpc.execute_results
        .lock()
        .unwrap()
        .push_back(Err(StepSignError::network("connection reset")));
    rpc.lookup_results
        .lock()
        .unwrap()
        .push_back(Some(response(ExecutionStatus::Success, true)));

    let result = broadcaster(rpc.clone(), 3)
        .submit(&golden_transaction(), &dummy_signature())
        .await;
    assert!(matches!(result, ExecutionResult::Success(_)));
    // Landed on the first attempt; never resubmitted
    assert_eq!(rpc.execute_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failure_after_attempts() {
    let rpc = Arc::new(MockRpc::default());
    let result = broadcaster(rpc.clone(), 3)
        .submit(&golden_transaction(), &dummy_signature())
        .await;
    assert!(matches!(result, ExecutionResult::TransportFailure { .. }));
    assert_eq!(rpc.execute_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_missing_effects_are_polled() {
    let rpc = Arc::new(MockRpc::default());
    rpc.execute_results
        .lock()
        .unwrap()
        .push_back(Ok(response(ExecutionStatus::Success, false)));
    {
        let mut lookups = rpc.lookup_results.lock().unwrap();
        lookups.push_back(None);
        lookups.push_back(Some(response(ExecutionStatus::Success, true)));
    }

    let result = broadcaster(rpc.clone(), 3)
        .submit(&golden_transaction(), &dummy_signature())
        .await;
    assert!(matches!(result, ExecutionResult::Success(_)));
    assert_eq!(rpc.lookup_calls.load(Ordering::SeqCst), 2);
}
