//! HTTP client construction
//!
//! One pooled async client per endpoint user (RPC client, prover client).

use reqwest::Client;
use std::time::Duration;

use crate::error::{StepSignError, StepSignResult};

const USER_AGENT: &str = concat!("stepsign/", env!("CARGO_PKG_VERSION"));

/// Build a pooled client with the given request timeout
pub fn build_client(timeout: Duration) -> StepSignResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(5)
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| StepSignError::network(format!("Failed to create HTTP client: {}", e)))
}

/// Host part of a URL, for log fields
pub fn extract_domain(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or(url)
        .to_string()
}
