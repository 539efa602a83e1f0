//! Unified error types for StepSign
//!
//! Every stage of the co-signing flow reports failures through
//! [`StepSignError`], tagged with the [`ErrorCode`] of the stage that
//! produced it so callers can tell precondition failures from signer,
//! transport and on-chain failures.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all StepSign operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSignError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl StepSignError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn invalid_argument_encoding(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgumentEncoding, msg)
    }

    pub fn gas_resolution(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::GasResolutionError, msg)
    }

    pub fn signing_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningTimeout, msg)
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportError, msg)
    }

    pub fn session_busy(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SessionBusy, msg)
    }

    pub fn key_sign(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::KeySignError, msg)
    }

    pub fn proof_service(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProofServiceError, msg)
    }

    pub fn identity_assertion(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::IdentityAssertionInvalid, msg)
    }

    pub fn threshold_not_met(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ThresholdNotMet, msg)
    }

    pub fn unknown_signer(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnknownSigner, msg)
    }

    pub fn duplicate_signer(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DuplicateSigner, msg)
    }

    pub fn signature_rejected(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SignatureRejected, msg)
    }

    pub fn on_chain_failure(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::OnChainFailure, msg)
    }

    pub fn transport_failure(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportFailure, msg)
    }

    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcError, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, msg)
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Signer timeouts and transport errors are not: the whole flow restarts
    /// from transaction building.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::TransportFailure | ErrorCode::NetworkError | ErrorCode::Timeout
        )
    }

    /// Whether recovery requires a new identity assertion and ephemeral key
    /// rather than a new signature.
    pub fn requires_fresh_assertion(&self) -> bool {
        match self.code {
            ErrorCode::IdentityAssertionInvalid => true,
            ErrorCode::OnChainFailure => self
                .details
                .as_deref()
                .map(|d| d.contains(EPOCH_EXPIRED_MARKER))
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Marker placed in error details when a zkLogin validity window lapsed.
pub(crate) const EPOCH_EXPIRED_MARKER: &str = "epoch_expired";

impl fmt::Display for StepSignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for StepSignError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Precondition errors
    InvalidInput,
    InvalidArgumentEncoding,
    GasResolutionError,

    // Signer errors
    SigningTimeout,
    TransportError,
    SessionBusy,
    KeySignError,
    ProofServiceError,
    IdentityAssertionInvalid,
    SignatureRejected,

    // Combiner errors
    ThresholdNotMet,
    UnknownSigner,
    DuplicateSigner,

    // Submission errors
    OnChainFailure,
    TransportFailure,

    // Network errors
    RpcError,
    NetworkError,
    Timeout,

    // Parse / config errors
    ParseError,
    ConfigError,

    // Internal
    Internal,
}

/// Result type alias for StepSign operations
pub type StepSignResult<T> = Result<T, StepSignError>;

// Conversions from common error types

impl From<serde_json::Error> for StepSignError {
    fn from(e: serde_json::Error) -> Self {
        StepSignError::new(ErrorCode::ParseError, format!("JSON error: {}", e))
    }
}

impl From<hex::FromHexError> for StepSignError {
    fn from(e: hex::FromHexError) -> Self {
        StepSignError::new(ErrorCode::ParseError, format!("Hex error: {}", e))
    }
}

impl From<base64::DecodeError> for StepSignError {
    fn from(e: base64::DecodeError) -> Self {
        StepSignError::new(ErrorCode::ParseError, format!("Base64 error: {}", e))
    }
}

impl From<std::io::Error> for StepSignError {
    fn from(e: std::io::Error) -> Self {
        StepSignError::new(ErrorCode::Internal, e.to_string())
    }
}

impl From<toml::de::Error> for StepSignError {
    fn from(e: toml::de::Error) -> Self {
        StepSignError::new(ErrorCode::ConfigError, e.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for StepSignError {
    fn from(e: ed25519_dalek::SignatureError) -> Self {
        StepSignError::new(ErrorCode::SignatureRejected, format!("Ed25519 error: {}", e))
    }
}

impl From<reqwest::Error> for StepSignError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StepSignError::new(ErrorCode::Timeout, "Request timed out")
        } else if e.is_connect() {
            StepSignError::new(ErrorCode::NetworkError, "Connection failed")
        } else {
            StepSignError::new(ErrorCode::NetworkError, e.to_string())
        }
    }
}
