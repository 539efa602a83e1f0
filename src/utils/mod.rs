//! Utilities Module
//!
//! Logging and HTTP plumbing shared by the RPC and prover clients.

pub mod http;
pub mod logging;
