//! Transaction data model
//!
//! Mirrors the network's `TransactionData::V1` layout closely enough that
//! the BCS bytes produced here are the bytes signers and the network hash.

use serde::{Deserialize, Serialize};

use crate::error::{StepSignError, StepSignResult};
use crate::sui::bcs::{BcsReader, BcsWriter};
use crate::sui::crypto::blake2b256;
use crate::sui::type_tag::{is_valid_identifier, TypeTag};
use crate::sui::{ObjectId, ObjectRef, SuiAddress};

// =============================================================================
// Pure arguments
// =============================================================================

/// Declared type of a pure (non-object) Move argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PureType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    U128,
    U256,
    Address,
    /// `vector<u8>`
    Bytes,
    /// `0x1::string::String` / `ascii::String`
    String,
}

/// A pure argument: declared type plus its already-serialized BCS form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedArg {
    pub ty: PureType,
    pub bytes: Vec<u8>,
}

impl TypedArg {
    /// Wrap caller-serialized bytes; checked by [`TypedArg::validate`]
    pub fn new(ty: PureType, bytes: Vec<u8>) -> Self {
        Self { ty, bytes }
    }

    pub fn bool(v: bool) -> Self {
        Self::new(PureType::Bool, vec![u8::from(v)])
    }

    pub fn u8(v: u8) -> Self {
        Self::new(PureType::U8, vec![v])
    }

    pub fn u64(v: u64) -> Self {
        Self::new(PureType::U64, v.to_le_bytes().to_vec())
    }

    pub fn address(addr: SuiAddress) -> Self {
        Self::new(PureType::Address, addr.bytes.to_vec())
    }

    pub fn bytes(data: &[u8]) -> Self {
        let mut w = BcsWriter::new();
        w.write_bytes(data);
        Self::new(PureType::Bytes, w.into_bytes())
    }

    pub fn string(s: &str) -> Self {
        let mut w = BcsWriter::new();
        w.write_str(s);
        Self::new(PureType::String, w.into_bytes())
    }

    /// Check that the serialized form matches the declared type
    pub fn validate(&self) -> StepSignResult<()> {
        let fixed = |n: usize| -> StepSignResult<()> {
            if self.bytes.len() == n {
                Ok(())
            } else {
                Err(StepSignError::invalid_argument_encoding(format!(
                    "{:?} argument must be {} bytes, got {}",
                    self.ty,
                    n,
                    self.bytes.len()
                )))
            }
        };

        match self.ty {
            PureType::Bool => {
                fixed(1)?;
                if self.bytes[0] > 1 {
                    return Err(StepSignError::invalid_argument_encoding(format!(
                        "Bool argument must be 0 or 1, got {}",
                        self.bytes[0]
                    )));
                }
                Ok(())
            }
            PureType::U8 => fixed(1),
            PureType::U16 => fixed(2),
            PureType::U32 => fixed(4),
            PureType::U64 => fixed(8),
            PureType::U128 => fixed(16),
            PureType::U256 | PureType::Address => fixed(32),
            PureType::Bytes | PureType::String => {
                let mut reader = BcsReader::new(&self.bytes);
                let decoded = if self.ty == PureType::String {
                    reader.read_str().map(|_| ())
                } else {
                    reader.read_bytes().map(|_| ())
                };
                decoded
                    .and_then(|_| reader.finish())
                    .map_err(|e| {
                        StepSignError::invalid_argument_encoding(format!(
                            "{:?} argument is not valid BCS: {}",
                            self.ty, e
                        ))
                    })
            }
        }
    }
}

// =============================================================================
// Inputs and commands
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectArg {
    ImmOrOwned(ObjectRef),
    Shared {
        id: ObjectId,
        initial_shared_version: u64,
        mutable: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    Pure(Vec<u8>),
    Object(ObjectArg),
}

/// Reference to a transaction input or an earlier command result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    GasCoin,
    Input(u16),
    Result(u16),
    NestedResult(u16, u16),
}

/// `package::module::function`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTarget {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
}

impl MoveTarget {
    pub fn parse(target: &str) -> StepSignResult<Self> {
        let parts: Vec<&str> = target.split("::").collect();
        if parts.len() != 3 {
            return Err(StepSignError::invalid_argument_encoding(format!(
                "Move target must be package::module::function, got '{}'",
                target
            )));
        }
        let package = SuiAddress::from_string(parts[0]).map_err(|e| {
            StepSignError::invalid_argument_encoding(format!("Invalid package id: {}", e.message))
        })?;
        for ident in &parts[1..] {
            if !is_valid_identifier(ident) {
                return Err(StepSignError::invalid_argument_encoding(format!(
                    "Invalid Move identifier '{}'",
                    ident
                )));
            }
        }
        Ok(Self {
            package,
            module: parts[1].to_string(),
            function: parts[2].to_string(),
        })
    }

    pub fn new(package: ObjectId, module: &str, function: &str) -> Self {
        Self {
            package,
            module: module.to_string(),
            function: function.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    pub target: MoveTarget,
    pub type_arguments: Vec<TypeTag>,
    pub arguments: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    MoveCall(Box<MoveCall>),
    TransferObjects(Vec<Argument>, Argument),
    SplitCoins(Argument, Vec<Argument>),
    MergeCoins(Argument, Vec<Argument>),
}

/// The transaction kind: ordered inputs plus commands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgrammableTransaction {
    pub inputs: Vec<CallArg>,
    pub commands: Vec<Command>,
}

impl ProgrammableTransaction {
    /// BCS bytes of the enclosing `TransactionKind`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = BcsWriter::new();
        write_kind(&mut w, self);
        w.into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasData {
    pub payment: Vec<ObjectRef>,
    pub owner: SuiAddress,
    pub price: u64,
    pub budget: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionExpiration {
    None,
    Epoch(u64),
}

// =============================================================================
// Unsigned transaction
// =============================================================================

/// An immutable, not-yet-signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    sender: SuiAddress,
    gas_data: GasData,
    kind: ProgrammableTransaction,
    expiration: TransactionExpiration,
}

impl UnsignedTransaction {
    pub(crate) fn from_parts(
        sender: SuiAddress,
        gas_data: GasData,
        kind: ProgrammableTransaction,
        expiration: TransactionExpiration,
    ) -> Self {
        Self {
            sender,
            gas_data,
            kind,
            expiration,
        }
    }

    pub fn sender(&self) -> SuiAddress {
        self.sender
    }

    pub fn gas_data(&self) -> &GasData {
        &self.gas_data
    }

    pub fn kind(&self) -> &ProgrammableTransaction {
        &self.kind
    }

    pub fn expiration(&self) -> TransactionExpiration {
        self.expiration
    }

    /// BCS bytes of `TransactionData::V1`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = BcsWriter::new();
        w.write_variant(0); // V1
        write_kind(&mut w, &self.kind);
        self.sender.write_bcs(&mut w);

        w.write_seq(&self.gas_data.payment, |w, r| r.write_bcs(w));
        self.gas_data.owner.write_bcs(&mut w);
        w.write_u64(self.gas_data.price);
        w.write_u64(self.gas_data.budget);

        match self.expiration {
            TransactionExpiration::None => {
                w.write_variant(0);
            }
            TransactionExpiration::Epoch(epoch) => {
                w.write_variant(1).write_u64(epoch);
            }
        }
        w.into_bytes()
    }

    /// BCS bytes of the `TransactionKind` alone
    pub fn kind_bytes(&self) -> Vec<u8> {
        self.kind.to_bytes()
    }

    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};
        STANDARD.encode(self.to_bytes())
    }

    /// The id the network will report for this transaction (base58)
    pub fn transaction_id(&self) -> String {
        let hash = blake2b256(&[b"TransactionData::", &self.to_bytes()]);
        bs58::encode(hash).into_string()
    }
}

fn write_argument(w: &mut BcsWriter, arg: &Argument) {
    match arg {
        Argument::GasCoin => {
            w.write_variant(0);
        }
        Argument::Input(i) => {
            w.write_variant(1).write_u16(*i);
        }
        Argument::Result(i) => {
            w.write_variant(2).write_u16(*i);
        }
        Argument::NestedResult(a, b) => {
            w.write_variant(3).write_u16(*a).write_u16(*b);
        }
    }
}

fn write_kind(w: &mut BcsWriter, kind: &ProgrammableTransaction) {
    w.write_variant(0); // ProgrammableTransaction

    w.write_seq(&kind.inputs, |w, input| match input {
        CallArg::Pure(bytes) => {
            w.write_variant(0).write_bytes(bytes);
        }
        CallArg::Object(ObjectArg::ImmOrOwned(r)) => {
            w.write_variant(1).write_variant(0);
            r.write_bcs(w);
        }
        CallArg::Object(ObjectArg::Shared {
            id,
            initial_shared_version,
            mutable,
        }) => {
            w.write_variant(1).write_variant(1);
            id.write_bcs(w);
            w.write_u64(*initial_shared_version).write_bool(*mutable);
        }
    });

    w.write_seq(&kind.commands, |w, command| match command {
        Command::MoveCall(call) => {
            w.write_variant(0);
            call.target.package.write_bcs(w);
            w.write_str(&call.target.module).write_str(&call.target.function);
            w.write_seq(&call.type_arguments, |w, t| t.write_bcs(w));
            w.write_seq(&call.arguments, write_argument);
        }
        Command::TransferObjects(objects, recipient) => {
            w.write_variant(1);
            w.write_seq(objects, write_argument);
            write_argument(w, recipient);
        }
        Command::SplitCoins(coin, amounts) => {
            w.write_variant(2);
            write_argument(w, coin);
            w.write_seq(amounts, write_argument);
        }
        Command::MergeCoins(destination, sources) => {
            w.write_variant(3);
            write_argument(w, destination);
            w.write_seq(sources, write_argument);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_arg_constructors_validate() {
        for arg in [
            TypedArg::bool(true),
            TypedArg::u8(3),
            TypedArg::u64(10_000_000),
            TypedArg::address(SuiAddress::new([1u8; 32])),
            TypedArg::bytes(&[0u8; 64]),
            TypedArg::string("Kinetis Gen 1"),
        ] {
            assert!(arg.validate().is_ok(), "{:?}", arg.ty);
        }
    }

    #[test]
    fn test_typed_arg_mismatches() {
        use crate::error::ErrorCode;

        let cases = [
            TypedArg::new(PureType::U64, vec![1, 2, 3]),
            TypedArg::new(PureType::Bool, vec![2]),
            TypedArg::new(PureType::Address, vec![0u8; 20]),
            TypedArg::new(PureType::Bytes, vec![5, 1, 2]),
            TypedArg::new(PureType::Bytes, vec![1, 1, 9]),
            TypedArg::new(PureType::String, vec![2, 0xff, 0xfe]),
        ];
        for arg in cases {
            let err = arg.validate().unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidArgumentEncoding);
        }
    }

    #[test]
    fn test_move_target_parse() {
        let target = MoveTarget::parse("0x2::coin::split").unwrap();
        assert_eq!(target.module, "coin");
        assert_eq!(target.function, "split");
        assert!(MoveTarget::parse("0x2::coin").is_err());
        assert!(MoveTarget::parse("0x2::coin::1split").is_err());
        assert!(MoveTarget::parse("zz::coin::split").is_err());
    }
}
