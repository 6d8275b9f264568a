//! Configuration module for Move Guardian
//!
//! Values come from environment variables, with defaults from
//! `utils/constants.rs`.

use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::types::Network;
use crate::utils::constants::{
    default_fullnode_url, fullnode_env_var, DEFAULT_DEADLINE_MS, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_PUBLIC_URL, DEFAULT_RETENTION_DAYS,
};

/// Names of the dependencies guarded by circuit breakers
pub mod dependency {
    pub const CHAIN_RPC: &str = "chain_rpc";
    pub const THREAT_FEED: &str = "threat_feed";
    pub const LLM: &str = "llm";
    pub const NOTIFICATION_WEBHOOK: &str = "notification_webhook";
}

/// Thresholds for one circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures in CLOSED before tripping to OPEN
    pub failure_threshold: u32,
    /// Consecutive successes in HALF_OPEN before closing
    pub success_threshold: u32,
    /// Time spent OPEN before a trial call is allowed
    pub reset_timeout: Duration,
    /// Trial calls admitted while HALF_OPEN
    pub half_open_max_calls: u32,
}

impl BreakerConfig {
    pub fn new(failure_threshold: u32, success_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            reset_timeout,
            half_open_max_calls: success_threshold.max(1) + 1,
        }
    }

    /// Per-dependency thresholds, reflecting criticality and typical recovery time
    pub fn for_dependency(name: &str) -> Self {
        match name {
            dependency::CHAIN_RPC => Self::new(5, 2, Duration::from_secs(30)),
            dependency::THREAT_FEED => Self::new(3, 1, Duration::from_secs(60)),
            dependency::LLM => Self::new(3, 2, Duration::from_secs(120)),
            dependency::NOTIFICATION_WEBHOOK => Self::new(5, 1, Duration::from_secs(300)),
            _ => Self::new(5, 2, Duration::from_secs(60)),
        }
    }
}

/// Remote endpoint with optional API key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub url: String,
    pub api_key: Option<String>,
}

/// Configuration for the Guardian service
#[derive(Debug, Clone)]
pub struct GuardianConfig {
    /// Fullnode base URL per network
    pub fullnodes: HashMap<Network, String>,
    /// Remote threat feed (disabled when `None`)
    pub threat_feed: Option<EndpointConfig>,
    /// Semantic analyzer endpoint (disabled when `None`)
    pub llm: Option<EndpointConfig>,
    /// Known-incident database file
    pub incident_db_path: Option<String>,
    /// Soft deadline for the whole pipeline
    pub deadline: Duration,
    /// Per-request HTTP timeout
    pub http_timeout: Duration,
    /// Base for share URLs
    pub public_url: String,
    /// How long results are retained
    pub retention: Duration,
    /// Server bind host
    pub host: String,
    /// Server bind port
    pub port: u16,
}

impl GuardianConfig {
    /// Build configuration from the environment
    pub fn from_env() -> Self {
        let mut fullnodes = HashMap::new();
        for network in [Network::Mainnet, Network::Testnet, Network::Devnet] {
            let url = std::env::var(fullnode_env_var(network))
                .ok()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| default_fullnode_url(network).to_string());
            fullnodes.insert(network, url.trim_end_matches('/').to_string());
        }

        let threat_feed = endpoint_from_env("THREAT_FEED_URL", "THREAT_FEED_API_KEY");
        let llm = endpoint_from_env("LLM_ENDPOINT", "LLM_API_KEY");
        if threat_feed.is_some() {
            info!("🛰️ Threat feed configured (key hidden)");
        }
        if llm.is_some() {
            info!("🧠 Semantic analyzer configured (key hidden)");
        }

        let port = std::env::var("PORT")
            .or_else(|_| std::env::var("GUARDIAN_PORT"))
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Self {
            fullnodes,
            threat_feed,
            llm,
            incident_db_path: std::env::var("INCIDENT_DB_PATH").ok().filter(|p| !p.is_empty()),
            deadline: Duration::from_millis(env_u64("GUARDIAN_DEADLINE_MS", DEFAULT_DEADLINE_MS)),
            http_timeout: Duration::from_secs(env_u64(
                "GUARDIAN_HTTP_TIMEOUT_SECS",
                DEFAULT_HTTP_TIMEOUT_SECS,
            )),
            public_url: std::env::var("GUARDIAN_PUBLIC_URL")
                .unwrap_or_else(|_| DEFAULT_PUBLIC_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            retention: Duration::from_secs(
                env_u64("GUARDIAN_RETENTION_DAYS", DEFAULT_RETENTION_DAYS) * 24 * 3_600,
            ),
            host: std::env::var("GUARDIAN_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
        }
    }

    /// Fullnode URL for a network
    pub fn fullnode_url(&self, network: Network) -> &str {
        self.fullnodes
            .get(&network)
            .map(String::as_str)
            .unwrap_or_else(|| default_fullnode_url(network))
    }

    /// HTTP timeout per attempt, clamped so `attempts` tries plus backoff
    /// finish inside the pipeline deadline
    pub fn attempt_timeout(&self, attempts: u32) -> Duration {
        self.http_timeout.min(self.deadline / (attempts.max(1) + 1))
    }

    /// Share URL for a share id
    pub fn share_url(&self, share_id: &str) -> String {
        format!("{}/share/{}", self.public_url, share_id)
    }
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn endpoint_from_env(url_var: &str, key_var: &str) -> Option<EndpointConfig> {
    let url = std::env::var(url_var).ok().filter(|u| !u.is_empty())?;
    Some(EndpointConfig {
        url: url.trim_end_matches('/').to_string(),
        api_key: std::env::var(key_var).ok().filter(|k| !k.is_empty()),
    })
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("⚠️ Ignoring invalid {}={}, using {}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
