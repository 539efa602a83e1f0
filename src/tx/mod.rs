//! Transaction Module
//!
//! Building, digest derivation, submission and finality tracking.

mod broadcaster;
mod builder;
mod digest;
mod tracker;
pub mod types;

#[cfg(test)]
mod tests;

pub use broadcaster::*;
pub use builder::*;
pub use digest::*;
pub use tracker::*;
pub use types::{
    Argument, CallArg, Command, GasData, MoveCall, MoveTarget, ObjectArg, ProgrammableTransaction,
    PureType, TransactionExpiration, TypedArg, UnsignedTransaction,
};
