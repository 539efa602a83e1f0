//! RPC response types
//!
//! The node returns numbers as either JSON strings or integers depending on
//! the field, so responses are read from `serde_json::Value` rather than
//! derived wire structs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StepSignError, StepSignResult};
use crate::sui::{ObjectDigest, ObjectId, ObjectRef, SuiAddress};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectOwner {
    Address(SuiAddress),
    Object(ObjectId),
    Shared { initial_shared_version: u64 },
    Immutable,
}

/// An on-chain object as returned by `sui_getObject`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectData {
    pub object_ref: ObjectRef,
    pub owner: ObjectOwner,
    pub type_: Option<String>,
    /// Move struct fields (`content.fields`), `Null` when content was not requested
    pub fields: Value,
}

/// A gas coin owned by an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub object_ref: ObjectRef,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedObject {
    pub object_ref: ObjectRef,
    pub owner: ObjectOwner,
}

/// Effects of an executed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEffects {
    pub transaction_digest: String,
    pub status: ExecutionStatus,
    pub executed_epoch: Option<u64>,
    /// computation + storage cost - storage rebate, saturating at zero
    pub net_gas_used: u64,
    pub created: Vec<CreatedObject>,
}

impl TransactionEffects {
    /// First created object that ended up shared
    pub fn created_shared(&self) -> Option<ObjectId> {
        self.created
            .iter()
            .find(|c| matches!(c.owner, ObjectOwner::Shared { .. }))
            .map(|c| c.object_ref.object_id)
    }
}

/// `sui_executeTransactionBlock` / `sui_getTransactionBlock` result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub digest: String,
    pub effects: Option<TransactionEffects>,
    pub checkpoint: Option<u64>,
}

// =============================================================================
// Parsing
// =============================================================================

fn missing(field: &str) -> StepSignError {
    StepSignError::parse_error(format!("Missing or invalid field '{}' in RPC response", field))
}

/// Accept `"123"` or `123`
pub(crate) fn as_u64(value: &Value, field: &str) -> StepSignResult<u64> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| missing(field)),
        Value::String(s) => s.parse::<u64>().map_err(|_| missing(field)),
        _ => Err(missing(field)),
    }
}

fn as_str<'a>(value: &'a Value, field: &str) -> StepSignResult<&'a str> {
    value.as_str().ok_or_else(|| missing(field))
}

fn parse_ref(id: &Value, version: &Value, digest: &Value) -> StepSignResult<ObjectRef> {
    Ok(ObjectRef::new(
        SuiAddress::from_string(as_str(id, "objectId")?)?,
        as_u64(version, "version")?,
        ObjectDigest::from_base58(as_str(digest, "digest")?)?,
    ))
}

pub(crate) fn parse_owner(value: &Value) -> StepSignResult<ObjectOwner> {
    if value.as_str() == Some("Immutable") {
        return Ok(ObjectOwner::Immutable);
    }
    if let Some(addr) = value.get("AddressOwner") {
        return Ok(ObjectOwner::Address(SuiAddress::from_string(as_str(addr, "AddressOwner")?)?));
    }
    if let Some(parent) = value.get("ObjectOwner") {
        return Ok(ObjectOwner::Object(SuiAddress::from_string(as_str(parent, "ObjectOwner")?)?));
    }
    if let Some(shared) = value.get("Shared") {
        return Ok(ObjectOwner::Shared {
            initial_shared_version: as_u64(&shared["initial_shared_version"], "initial_shared_version")?,
        });
    }
    Err(missing("owner"))
}

/// Parse the `result` of `sui_getObject`
pub fn parse_object(result: &Value) -> StepSignResult<ObjectData> {
    if let Some(err) = result.get("error") {
        return Err(StepSignError::rpc(format!("Object unavailable: {}", err)));
    }
    let data = result.get("data").ok_or_else(|| missing("data"))?;
    let object_ref = parse_ref(&data["objectId"], &data["version"], &data["digest"])?;
    let owner = parse_owner(&data["owner"])?;
    let type_ = data
        .get("type")
        .or_else(|| data.get("content").and_then(|c| c.get("type")))
        .and_then(Value::as_str)
        .map(str::to_string);
    let fields = data
        .get("content")
        .and_then(|c| c.get("fields"))
        .cloned()
        .unwrap_or(Value::Null);

    Ok(ObjectData {
        object_ref,
        owner,
        type_,
        fields,
    })
}

/// Parse the `result` of `suix_getCoins`
pub fn parse_coins(result: &Value) -> StepSignResult<Vec<Coin>> {
    let data = result
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| missing("data"))?;
    data.iter()
        .map(|c| {
            Ok(Coin {
                object_ref: parse_ref(&c["coinObjectId"], &c["version"], &c["digest"])?,
                balance: as_u64(&c["balance"], "balance")?,
            })
        })
        .collect()
}

fn parse_effects(effects: &Value) -> StepSignResult<TransactionEffects> {
    let status_obj = effects.get("status").ok_or_else(|| missing("effects.status"))?;
    let status = match as_str(&status_obj["status"], "effects.status.status")? {
        "success" => ExecutionStatus::Success,
        _ => ExecutionStatus::Failure {
            error: status_obj
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown execution failure")
                .to_string(),
        },
    };

    let gas = &effects["gasUsed"];
    let net_gas_used = if gas.is_object() {
        let cost = as_u64(&gas["computationCost"], "computationCost")?
            .saturating_add(as_u64(&gas["storageCost"], "storageCost")?);
        cost.saturating_sub(as_u64(&gas["storageRebate"], "storageRebate").unwrap_or(0))
    } else {
        0
    };

    let created = match effects.get("created").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .map(|c| {
                let r = &c["reference"];
                Ok(CreatedObject {
                    object_ref: parse_ref(&r["objectId"], &r["version"], &r["digest"])?,
                    owner: parse_owner(&c["owner"])?,
                })
            })
            .collect::<StepSignResult<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(TransactionEffects {
        transaction_digest: effects
            .get("transactionDigest")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status,
        executed_epoch: effects.get("executedEpoch").and_then(|e| as_u64(e, "executedEpoch").ok()),
        net_gas_used,
        created,
    })
}

/// Parse a transaction block response
pub fn parse_transaction_response(result: &Value) -> StepSignResult<TransactionResponse> {
    let digest = as_str(&result["digest"], "digest")?.to_string();
    let effects = match result.get("effects") {
        Some(e) if !e.is_null() => Some(parse_effects(e)?),
        _ => None,
    };
    let checkpoint = result.get("checkpoint").and_then(|c| as_u64(c, "checkpoint").ok());
    Ok(TransactionResponse {
        digest,
        effects,
        checkpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DIGEST: &str = "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi";

    #[test]
    fn test_parse_shared_object() {
        let result = json!({
            "data": {
                "objectId": "0xa85ce9e5525144cc598c012ac7b8b10959a4db2f4d82b014cdda9f7238fc0df5",
                "version": "17",
                "digest": DIGEST,
                "type": "0x1b76::shared_wallet::SharedWallet",
                "owner": { "Shared": { "initial_shared_version": 12 } },
                "content": {
                    "dataType": "moveObject",
                    "fields": { "is_frozen": true, "nonce": "3" }
                }
            }
        });
        let obj = parse_object(&result).unwrap();
        assert_eq!(obj.object_ref.version, 17);
        assert_eq!(obj.owner, ObjectOwner::Shared { initial_shared_version: 12 });
        assert_eq!(obj.fields["is_frozen"], json!(true));
    }

    #[test]
    fn test_parse_object_error() {
        let result = json!({ "error": { "code": "notExists", "object_id": "0x1" } });
        let err = parse_object(&result).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::RpcError);
    }

    #[test]
    fn test_parse_coins() {
        let result = json!({
            "data": [{
                "coinType": "0x2::sui::SUI",
                "coinObjectId": "0x5",
                "version": "3",
                "digest": DIGEST,
                "balance": "1000000000"
            }],
            "hasNextPage": false
        });
        let coins = parse_coins(&result).unwrap();
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].balance, 1_000_000_000);
    }

    #[test]
    fn test_parse_failed_effects() {
        let result = json!({
            "digest": "9NT7mqfAkVSYZkTmNmnbDAHkQmGTPZStDYF9fDhXGsSy",
            "effects": {
                "status": { "status": "failure", "error": "MoveAbort(..., 1) in command 1" },
                "executedEpoch": "44",
                "gasUsed": {
                    "computationCost": "1000000",
                    "storageCost": "2000000",
                    "storageRebate": "500000"
                },
                "transactionDigest": "9NT7mqfAkVSYZkTmNmnbDAHkQmGTPZStDYF9fDhXGsSy"
            }
        });
        let resp = parse_transaction_response(&result).unwrap();
        let effects = resp.effects.unwrap();
        assert!(matches!(effects.status, ExecutionStatus::Failure { .. }));
        assert_eq!(effects.net_gas_used, 2_500_000);
        assert_eq!(effects.executed_epoch, Some(44));
    }

    #[test]
    fn test_created_shared() {
        let result = json!({
            "digest": "abc",
            "effects": {
                "status": { "status": "success" },
                "created": [
                    { "owner": { "AddressOwner": "0x1" },
                      "reference": { "objectId": "0x10", "version": 2, "digest": DIGEST } },
                    { "owner": { "Shared": { "initial_shared_version": 2 } },
                      "reference": { "objectId": "0x11", "version": 2, "digest": DIGEST } }
                ]
            }
        });
        let effects = parse_transaction_response(&result).unwrap().effects.unwrap();
        assert_eq!(
            effects.created_shared(),
            Some(SuiAddress::from_string("0x11").unwrap())
        );
    }
}
