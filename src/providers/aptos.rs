//! Aptos Fullnode Client Module
//!
//! Reads published module interfaces from the fullnode REST API:
//! `GET {fullnode}/v1/accounts/{address}/module/{name}`.
//!
//! - HTTP 404 means the module does not exist (`Ok(None)`), not an error
//! - Any other non-2xx status is surfaced as an error
//! - Timeouts, connection failures, 429 and 5xx are retried with
//!   exponential backoff plus jitter
//! - Gzip compression and a fixed User-Agent on every request

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::GuardianConfig;
use crate::models::errors::{ErrorCode, GuardianError, GuardianResult};
use crate::models::types::Network;
use crate::utils::constants::{
    default_fullnode_url, FULLNODE_BASE_RETRY_MS, FULLNODE_MAX_ATTEMPTS, RETRY_JITTER_PERCENT,
    USER_AGENT as USER_AGENT_CONST,
};

// ============================================
// ABI DATA TRANSFER OBJECTS
// ============================================

/// Module as returned by the fullnode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveModuleBytecode {
    #[serde(default)]
    pub bytecode: String,
    pub abi: MoveModule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveModule {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub exposed_functions: Vec<MoveFunction>,
    #[serde(default)]
    pub structs: Vec<MoveStruct>,
}

impl MoveModule {
    pub fn function(&self, name: &str) -> Option<&MoveFunction> {
        self.exposed_functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Friend,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericTypeParam {
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveFunction {
    pub name: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub is_entry: bool,
    #[serde(default)]
    pub is_view: bool,
    #[serde(default)]
    pub generic_type_params: Vec<GenericTypeParam>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(rename = "return", default)]
    pub returns: Vec<String>,
}

impl MoveFunction {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Parameters the caller supplies as value arguments (signers are implicit)
    pub fn value_params(&self) -> impl Iterator<Item = &String> {
        self.params.iter().filter(|p| !is_signer_type(p))
    }
}

/// `signer`, `&signer`
pub fn is_signer_type(ty: &str) -> bool {
    ty.trim_start_matches('&').trim_start_matches("mut ").trim() == "signer"
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStructField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStruct {
    pub name: String,
    #[serde(default)]
    pub is_native: bool,
    #[serde(default)]
    pub abilities: Vec<String>,
    #[serde(default)]
    pub generic_type_params: Vec<GenericTypeParam>,
    #[serde(default)]
    pub fields: Vec<MoveStructField>,
}

impl MoveStruct {
    pub fn has_ability(&self, ability: &str) -> bool {
        self.abilities.iter().any(|a| a == ability)
    }
}

// ============================================
// FETCHER TRAIT
// ============================================

/// Source of published module interfaces
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    /// `Ok(None)` when the module does not exist on `network`
    async fn fetch_module(
        &self,
        network: Network,
        address: &str,
        module: &str,
    ) -> GuardianResult<Option<MoveModuleBytecode>>;
}

// ============================================
// HTTP CLIENT
// ============================================

/// Fullnode REST client with retry
#[derive(Clone)]
pub struct AptosClient {
    client: reqwest::Client,
    fullnodes: HashMap<Network, String>,
    max_attempts: u32,
}

impl AptosClient {
    pub fn new(config: &GuardianConfig) -> GuardianResult<Self> {
        let client = Self::build_client(config.attempt_timeout(FULLNODE_MAX_ATTEMPTS))?;
        info!(
            "🌐 Fullnode client ready (mainnet: {})",
            config.fullnode_url(Network::Mainnet)
        );
        Ok(Self {
            client,
            fullnodes: config.fullnodes.clone(),
            max_attempts: FULLNODE_MAX_ATTEMPTS,
        })
    }

    /// Client pointing every network at one base URL
    pub fn with_base_url(base_url: &str, timeout: Duration) -> GuardianResult<Self> {
        let base = base_url.trim_end_matches('/').to_string();
        let fullnodes = [Network::Mainnet, Network::Testnet, Network::Devnet]
            .into_iter()
            .map(|n| (n, base.clone()))
            .collect();
        Ok(Self {
            client: Self::build_client(timeout)?,
            fullnodes,
            max_attempts: FULLNODE_MAX_ATTEMPTS,
        })
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    fn build_client(timeout: Duration) -> GuardianResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| {
                GuardianError::with_source(
                    ErrorCode::ConfigInvalidValue,
                    "Failed to build HTTP client",
                    e,
                )
            })
    }

    fn base_url(&self, network: Network) -> &str {
        self.fullnodes
            .get(&network)
            .map(String::as_str)
            .unwrap_or_else(|| default_fullnode_url(network))
    }

    /// Exponential backoff (base, 2x base, ...) with ±20% jitter
    fn retry_delay(attempt: u32) -> Duration {
        let base = FULLNODE_BASE_RETRY_MS * 2_u64.pow(attempt.saturating_sub(1));
        let jitter_range = (base * RETRY_JITTER_PERCENT) / 100;
        let jitter: i64 =
            rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64));
        Duration::from_millis((base as i64 + jitter).max(50) as u64)
    }

    async fn fetch_once(&self, url: &str) -> GuardianResult<Option<MoveModuleBytecode>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(GuardianError::rpc_status(status.as_u16(), url));
        }

        let module = response.json::<MoveModuleBytecode>().await?;
        Ok(Some(module))
    }
}

fn is_transient(err: &GuardianError) -> bool {
    if err.code.is_retryable() {
        return true;
    }
    // 5xx from the fullnode
    err.code == ErrorCode::RpcError && err.message.starts_with("HTTP 5")
}

#[async_trait]
impl ModuleFetcher for AptosClient {
    async fn fetch_module(
        &self,
        network: Network,
        address: &str,
        module: &str,
    ) -> GuardianResult<Option<MoveModuleBytecode>> {
        let url = format!(
            "{}/v1/accounts/{}/module/{}",
            self.base_url(network),
            address,
            module
        );

        let mut last_error = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = Self::retry_delay(attempt);
                debug!(
                    "⏳ Retry {}/{} for {}::{} after {}ms",
                    attempt + 1,
                    self.max_attempts,
                    address,
                    module,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.fetch_once(&url).await {
                Ok(Some(m)) => {
                    debug!(
                        "📦 Fetched {}::{} ({} functions)",
                        address,
                        module,
                        m.abi.exposed_functions.len()
                    );
                    return Ok(Some(m));
                }
                Ok(None) => {
                    debug!("📭 Module {}::{} not found on {}", address, module, network.as_str());
                    return Ok(None);
                }
                Err(e) if is_transient(&e) => {
                    warn!("⚠️ Fullnode request failed ({}), attempt {}", e, attempt + 1);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GuardianError::rpc_connection_failed(format!("No attempt made for {}", url))
        }))
    }
}
