//! Sui addresses and object references
//!
//! Addresses and object ids are 32 bytes, displayed as 0x-prefixed hex.
//! Object digests travel as base58 on the RPC boundary.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{StepSignError, StepSignResult};
use crate::sui::bcs::BcsWriter;

/// Sui address is 32 bytes, displayed as 0x-prefixed hex
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuiAddress {
    pub bytes: [u8; 32],
}

impl SuiAddress {
    pub const ZERO: SuiAddress = SuiAddress { bytes: [0u8; 32] };

    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Parse from hex string (with or without 0x prefix)
    pub fn from_string(s: &str) -> StepSignResult<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);

        if s.is_empty() || s.len() > 64 {
            return Err(StepSignError::invalid_input(format!(
                "Invalid address length: {} hex chars",
                s.len()
            )));
        }

        // Short addresses such as 0x2 are left-padded
        let padded = format!("{:0>64}", s);

        let bytes = hex::decode(&padded)
            .map_err(|e| StepSignError::invalid_input(format!("Invalid hex: {}", e)))?;

        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self::new(arr))
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.bytes))
    }

    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    pub fn write_bcs(&self, w: &mut BcsWriter) {
        w.write_fixed(&self.bytes);
    }
}

impl fmt::Display for SuiAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for SuiAddress {
    type Err = StepSignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

impl Serialize for SuiAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SuiAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SuiAddress::from_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Known framework addresses
pub mod special_addresses {
    use super::SuiAddress;

    /// Sui framework address (0x2)
    pub fn sui_framework() -> SuiAddress {
        let mut bytes = [0u8; 32];
        bytes[31] = 0x02;
        SuiAddress::new(bytes)
    }

    /// Clock object (0x6)
    pub fn clock() -> SuiAddress {
        let mut bytes = [0u8; 32];
        bytes[31] = 0x06;
        SuiAddress::new(bytes)
    }
}

/// Sui Object ID (same format as address)
pub type ObjectId = SuiAddress;

/// 32-byte object digest, base58 on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectDigest(pub [u8; 32]);

impl ObjectDigest {
    pub fn from_base58(s: &str) -> StepSignResult<Self> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| StepSignError::parse_error(format!("Invalid base58 digest: {}", e)))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StepSignError::parse_error("Object digest must be 32 bytes"))?;
        Ok(Self(arr))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl Serialize for ObjectDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for ObjectDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectDigest::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

/// Sui Object Reference (ID, version, digest)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_id: ObjectId,
    pub version: u64,
    pub digest: ObjectDigest,
}

impl ObjectRef {
    pub fn new(object_id: ObjectId, version: u64, digest: ObjectDigest) -> Self {
        Self {
            object_id,
            version,
            digest,
        }
    }

    /// `(ObjectID, SequenceNumber, ObjectDigest)`; the digest is a
    /// length-prefixed byte vector
    pub fn write_bcs(&self, w: &mut BcsWriter) {
        self.object_id.write_bcs(w);
        w.write_u64(self.version);
        w.write_bytes(&self.digest.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parsing() {
        let addr = SuiAddress::from_string("0x2").unwrap();
        assert_eq!(addr.bytes[31], 0x02);
        assert_eq!(addr, special_addresses::sui_framework());
    }

    #[test]
    fn test_address_rejects_garbage() {
        assert!(SuiAddress::from_string("0xzz").is_err());
        assert!(SuiAddress::from_string("").is_err());
        assert!(SuiAddress::from_string(&"1".repeat(65)).is_err());
    }

    #[test]
    fn test_address_serde_is_hex() {
        let addr = special_addresses::clock();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(
            json,
            "\"0x0000000000000000000000000000000000000000000000000000000000000006\""
        );
        let back: SuiAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_object_ref_bcs_layout() {
        let r = ObjectRef::new(SuiAddress::new([7u8; 32]), 3, ObjectDigest([9u8; 32]));
        let mut w = BcsWriter::new();
        r.write_bcs(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 32 + 8 + 1 + 32);
        assert_eq!(bytes[32], 3);
        assert_eq!(bytes[40], 32);
    }

    #[test]
    fn test_digest_base58() {
        let d = ObjectDigest([1u8; 32]);
        let parsed = ObjectDigest::from_base58(&d.to_base58()).unwrap();
        assert_eq!(parsed, d);
        assert!(ObjectDigest::from_base58("abc").is_err());
    }
}
