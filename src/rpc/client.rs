//! JSON-RPC client for a full node

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::types::{
    as_u64, parse_coins, parse_object, parse_transaction_response, Coin, ObjectData,
    TransactionResponse,
};
use super::SuiRpc;
use crate::error::{StepSignError, StepSignResult};
use crate::sui::{ObjectId, SerializedSignature, SuiAddress};
use crate::utils::http::{build_client, extract_domain};

const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Full-node JSON-RPC client
pub struct SuiRpcClient {
    url: String,
    http: Client,
    next_id: AtomicU64,
}

impl SuiRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> StepSignResult<Self> {
        Ok(Self {
            url: url.into(),
            http: build_client(timeout)?,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, method: &str, params: Value) -> StepSignResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        crate::log_debug!("rpc", "JSON-RPC call", method = method, host = extract_domain(&self.url));

        let response = self
            .http
            .post(&self.url)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(StepSignError::network(format!("{} returned HTTP {}", method, status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StepSignError::rpc(format!("{} returned HTTP {}", method, status)).with_details(body));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| StepSignError::parse_error(format!("Failed to parse {} response: {}", method, e)))?;

        if let Some(error) = body.error {
            return Err(StepSignError::rpc(error.message).with_details(format!("code {}", error.code)));
        }
        body.result
            .ok_or_else(|| StepSignError::parse_error(format!("No result in {} response", method)))
    }
}

#[async_trait]
impl SuiRpc for SuiRpcClient {
    async fn get_object(&self, id: ObjectId) -> StepSignResult<ObjectData> {
        let result = self
            .call(
                "sui_getObject",
                json!([id.to_hex(), { "showOwner": true, "showContent": true, "showType": true }]),
            )
            .await?;
        parse_object(&result)
    }

    async fn get_coins(&self, owner: SuiAddress) -> StepSignResult<Vec<Coin>> {
        let result = self
            .call("suix_getCoins", json!([owner.to_hex(), SUI_COIN_TYPE, Value::Null, 50]))
            .await?;
        parse_coins(&result)
    }

    async fn reference_gas_price(&self) -> StepSignResult<u64> {
        let result = self.call("suix_getReferenceGasPrice", json!([])).await?;
        as_u64(&result, "referenceGasPrice")
    }

    async fn latest_epoch(&self) -> StepSignResult<u64> {
        let result = self.call("suix_getLatestSuiSystemState", json!([])).await?;
        as_u64(&result["epoch"], "epoch")
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[SerializedSignature],
    ) -> StepSignResult<TransactionResponse> {
        let sigs: Vec<String> = signatures.iter().map(SerializedSignature::to_base64).collect();
        let result = self
            .call(
                "sui_executeTransactionBlock",
                json!([
                    STANDARD.encode(tx_bytes),
                    sigs,
                    { "showEffects": true },
                    "WaitForLocalExecution"
                ]),
            )
            .await?;
        parse_transaction_response(&result)
    }

    async fn get_transaction(&self, digest: &str) -> StepSignResult<Option<TransactionResponse>> {
        match self
            .call("sui_getTransactionBlock", json!([digest, { "showEffects": true }]))
            .await
        {
            Ok(result) => parse_transaction_response(&result).map(Some),
            Err(e) if e.code == crate::error::ErrorCode::RpcError && is_not_found(&e.message) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn is_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("could not find") || lower.contains("not found") || lower.contains("does not exist")
}
