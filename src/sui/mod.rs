//! Sui primitives
//!
//! Addresses, keys, signature encodings, BCS and Move type tags needed to
//! build and sign the co-signing envelope.

pub mod address;
pub mod bcs;
pub mod crypto;
pub mod keypair;
pub mod type_tag;

pub use address::{special_addresses, ObjectDigest, ObjectId, ObjectRef, SuiAddress};
pub use crypto::{blake2b256, PublicKey, SerializedSignature, SignatureScheme};
pub use keypair::{verify_ed25519, SuiKeyPair};
pub use type_tag::{StructTag, TypeTag};

/// 1 SUI in MIST
pub const MIST_PER_SUI: u64 = 1_000_000_000;
