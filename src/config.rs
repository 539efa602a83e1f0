//! Configuration
//!
//! `StepSignConfig` is read from TOML. Every section has defaults, so an
//! empty file is a valid testnet configuration. Keys are never part of the
//! file; they are passed at call time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::{StepSignError, StepSignResult};
use crate::multisig::MultisigPolicy;
use crate::signer::zklogin::{DEFAULT_KEY_CLAIM, DEFAULT_VALIDITY_EPOCHS};
use crate::sui::{ObjectId, PublicKey, SuiAddress};
use crate::tx::{RetryPolicy, DEFAULT_GAS_BUDGET};

pub const DEFAULT_PROVER_URL: &str = "https://prover-dev.mystenlabs.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Localnet,
    Devnet,
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    pub fn rpc_url(self) -> &'static str {
        match self {
            Network::Localnet => "http://127.0.0.1:9000",
            Network::Devnet => "https://fullnode.devnet.sui.io:443",
            Network::Testnet => "https://fullnode.testnet.sui.io:443",
            Network::Mainnet => "https://fullnode.mainnet.sui.io:443",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `host:port` of the BLE bridge
    pub peer_address: Option<String>,
    /// `ed25519:<hex>` or bare hex
    pub peer_public_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            peer_address: None,
            peer_public_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_attempts: u32,
    pub request_timeout_secs: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
            max_backoff_ms: 8_000,
            poll_interval_ms: 1_000,
            poll_attempts: 10,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZkLoginConfig {
    pub prover_url: String,
    pub validity_epochs: u64,
    pub key_claim_name: String,
}

impl Default for ZkLoginConfig {
    fn default() -> Self {
        Self {
            prover_url: DEFAULT_PROVER_URL.to_string(),
            validity_epochs: DEFAULT_VALIDITY_EPOCHS,
            key_claim_name: DEFAULT_KEY_CLAIM.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberConfig {
    pub public_key: String,
    pub weight: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub threshold: u16,
    pub members: Vec<MemberConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepSignConfig {
    pub network: Network,
    /// Overrides the network's default endpoint
    pub rpc_url: Option<String>,
    pub package_id: Option<String>,
    pub gas_budget: Option<u64>,
    pub remote: RemoteConfig,
    pub submission: SubmissionConfig,
    pub zklogin: ZkLoginConfig,
    pub policy: Option<PolicyConfig>,
}

impl StepSignConfig {
    pub fn load(path: impl AsRef<Path>) -> StepSignResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            StepSignError::config(format!("Cannot read {}", path.display())).with_details(e.to_string())
        })?;
        let config = Self::from_toml_str(&text)?;
        crate::log_debug!("config", "Configuration loaded", path = path.display(), network = format!("{:?}", config.network));
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> StepSignResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StepSignResult<()> {
        validate_endpoint(self.rpc_url())?;
        validate_endpoint(&self.zklogin.prover_url)?;

        if self.remote.timeout_secs == 0 {
            return Err(StepSignError::config("remote.timeout_secs must be positive"));
        }
        if self.submission.max_attempts == 0 {
            return Err(StepSignError::config("submission.max_attempts must be at least 1"));
        }
        if self.zklogin.validity_epochs == 0 {
            return Err(StepSignError::config("zklogin.validity_epochs must be at least 1"));
        }
        if self.package_id.is_some() {
            self.package_id()?;
        }
        if self.remote.peer_public_key.is_some() {
            self.peer_public_key()?;
        }
        if self.policy.is_some() {
            self.multisig_policy()?;
        }
        Ok(())
    }

    pub fn rpc_url(&self) -> &str {
        self.rpc_url.as_deref().unwrap_or_else(|| self.network.rpc_url())
    }

    pub fn gas_budget(&self) -> u64 {
        self.gas_budget.unwrap_or(DEFAULT_GAS_BUDGET)
    }

    pub fn package_id(&self) -> StepSignResult<ObjectId> {
        let raw = self
            .package_id
            .as_deref()
            .ok_or_else(|| StepSignError::config("package_id is not set"))?;
        SuiAddress::from_string(raw)
            .map_err(|e| StepSignError::config(format!("Invalid package_id: {}", e.message)))
    }

    pub fn peer_public_key(&self) -> StepSignResult<[u8; 32]> {
        let raw = self
            .remote
            .peer_public_key
            .as_deref()
            .ok_or_else(|| StepSignError::config("remote.peer_public_key is not set"))?;
        let spec = if raw.contains(':') {
            raw.to_string()
        } else {
            format!("ed25519:{}", raw)
        };
        match PublicKey::parse(&spec) {
            Ok(PublicKey::Ed25519(pk)) => Ok(pk),
            Ok(_) => Err(StepSignError::config("remote.peer_public_key must be an Ed25519 key")),
            Err(e) => Err(StepSignError::config(format!("Invalid remote.peer_public_key: {}", e.message))),
        }
    }

    pub fn signing_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.submission.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.submission.poll_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.submission.max_attempts,
            initial_backoff: Duration::from_millis(self.submission.backoff_ms),
            max_backoff: Duration::from_millis(self.submission.max_backoff_ms),
        }
    }

    pub fn multisig_policy(&self) -> StepSignResult<MultisigPolicy> {
        let policy = self
            .policy
            .as_ref()
            .ok_or_else(|| StepSignError::config("No [policy] section"))?;
        let members = policy
            .members
            .iter()
            .map(|m| {
                PublicKey::parse(&m.public_key)
                    .map(|pk| (pk, m.weight))
                    .map_err(|e| StepSignError::config(format!("Invalid policy member key: {}", e.message)))
            })
            .collect::<StepSignResult<Vec<_>>>()?;
        MultisigPolicy::from_pairs(members, policy.threshold)
    }
}

/// Require an http(s) URL with a host, and TLS unless it is loopback
pub fn validate_endpoint(raw: &str) -> StepSignResult<Url> {
    let url = Url::parse(raw).map_err(|e| StepSignError::config(format!("Invalid URL '{}': {}", raw, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| StepSignError::config(format!("URL '{}' has no host", raw)))?;
    let loopback = host == "localhost" || host == "127.0.0.1" || host == "[::1]" || host == "::1";

    match url.scheme() {
        "https" => Ok(url),
        "http" if loopback => Ok(url),
        "http" => Err(StepSignError::config(format!("Endpoint '{}' must use HTTPS", raw))),
        other => Err(StepSignError::config(format!("Unsupported URL scheme '{}'", other))),
    }
}
