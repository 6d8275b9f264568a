//! Remote threat-intelligence feed.
//!
//! The feed is asked about a batch of addresses and answers with the ones it
//! knows to be malicious. Any provider speaking this small JSON contract can
//! be plugged in:
//!
//! ```text
//! POST {url}/v1/lookup   {"addresses": ["0xabc", ...]}
//! 200 {"matches": [{"address": "0xabc", "label": "...", "severity": "HIGH",
//!                   "confidence": 0.9, "category": "RUG_PULL"}]}
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::models::config::EndpointConfig;
use crate::models::errors::{ErrorCode, GuardianError, GuardianResult};
use crate::models::types::{Category, Severity};
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

/// One flagged address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatMatch {
    pub address: String,
    pub label: String,
    pub severity: Severity,
    /// Raw provider confidence; clamped into `[0, 1]` by the consumer
    #[serde(default = "default_feed_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub category: Option<Category>,
}

fn default_feed_confidence() -> f64 {
    0.9
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    matches: Vec<ThreatMatch>,
}

#[async_trait]
pub trait ThreatFeed: Send + Sync {
    /// Known-malicious entries among `addresses`
    async fn lookup(&self, addresses: &[String]) -> GuardianResult<Vec<ThreatMatch>>;
}

/// HTTP implementation of [`ThreatFeed`]
#[derive(Clone)]
pub struct HttpThreatFeed {
    client: reqwest::Client,
    endpoint: EndpointConfig,
}

impl HttpThreatFeed {
    pub fn new(endpoint: EndpointConfig, timeout: Duration) -> GuardianResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        if let Some(key) = &endpoint.api_key {
            let value = HeaderValue::from_str(key).map_err(|_| {
                GuardianError::new(ErrorCode::ConfigInvalidValue, "THREAT_FEED_API_KEY is not a valid header value")
            })?;
            headers.insert("x-api-key", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                GuardianError::with_source(ErrorCode::ConfigInvalidValue, "Failed to build HTTP client", e)
            })?;

        info!("🛰️ Threat feed client ready");
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ThreatFeed for HttpThreatFeed {
    async fn lookup(&self, addresses: &[String]) -> GuardianResult<Vec<ThreatMatch>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/lookup", self.endpoint.url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "addresses": addresses }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GuardianError::rpc_status(status.as_u16(), &url));
        }

        let body: LookupResponse = response.json().await?;
        debug!("🛰️ Threat feed: {} of {} addresses flagged", body.matches.len(), addresses.len());
        Ok(body.matches)
    }
}
