//! Semantic (LLM-backed) analyzer client.
//!
//! Prompt content lives with the remote service. This side sends the call
//! under analysis plus what the deterministic stages already know, and reads
//! back a list of findings.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::config::EndpointConfig;
use crate::models::errors::{ErrorCode, GuardianError, GuardianResult};
use crate::models::types::{AnalysisRequest, Category, Confidence, Issue, IssueSource, Severity};
use crate::providers::aptos::MoveFunction;
use crate::utils::constants::USER_AGENT as USER_AGENT_CONST;

/// What the deterministic stages established before the LLM runs
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticContext {
    /// Real ABI entry of the called function, when verified
    pub verified_function: Option<MoveFunction>,
    /// Pattern ids already reported by other stages
    pub prior_findings: Vec<String>,
}

#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        context: &SemanticContext,
    ) -> GuardianResult<Vec<Issue>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody<'a> {
    network: &'a str,
    function: String,
    sender: &'a str,
    type_arguments: &'a [String],
    arguments: &'a [serde_json::Value],
    simulation: Option<&'a crate::models::types::SimulationOutcome>,
    context: &'a SemanticContext,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    #[serde(default)]
    pattern_id: Option<String>,
    category: Category,
    severity: Severity,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    recommendation: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    issues: Vec<RawFinding>,
}

impl RawFinding {
    fn into_issue(self, index: usize) -> Issue {
        let pattern_id = match self.pattern_id {
            Some(id) if id.starts_with("llm:") => id,
            Some(id) => format!("llm:{}", id),
            None => format!("llm:finding:{}", index),
        };
        Issue::new(pattern_id, self.category, self.severity, IssueSource::Llm)
            .with_text(self.title, self.description, self.recommendation)
            .with_confidence(Confidence::clamped(self.confidence))
    }
}

/// HTTP implementation of [`SemanticAnalyzer`]
#[derive(Clone)]
pub struct LlmAnalyzer {
    client: reqwest::Client,
    endpoint: EndpointConfig,
}

impl LlmAnalyzer {
    pub fn new(endpoint: EndpointConfig, timeout: Duration) -> GuardianResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        if let Some(key) = &endpoint.api_key {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
                GuardianError::new(ErrorCode::ConfigInvalidValue, "LLM_API_KEY is not a valid header value")
            })?;
            headers.insert(AUTHORIZATION, bearer);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                GuardianError::with_source(ErrorCode::ConfigInvalidValue, "Failed to build HTTP client", e)
            })?;

        info!("🧠 Semantic analyzer client ready");
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SemanticAnalyzer for LlmAnalyzer {
    async fn analyze(
        &self,
        request: &AnalysisRequest,
        context: &SemanticContext,
    ) -> GuardianResult<Vec<Issue>> {
        let body = AnalyzeBody {
            network: request.network().as_str(),
            function: request.function().qualified(),
            sender: request.sender(),
            type_arguments: request.type_arguments(),
            arguments: request.arguments(),
            simulation: request.simulation(),
            context,
        };

        let response = self.client.post(&self.endpoint.url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GuardianError::rpc_status(status.as_u16(), &self.endpoint.url));
        }

        let parsed: AnalyzeResponse = response.json().await?;
        let issues: Vec<Issue> = parsed
            .issues
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.into_issue(i))
            .collect();

        if issues.iter().any(|i| i.severity == Severity::Critical) {
            warn!("🧠 Semantic analyzer reported a CRITICAL finding for {}", request.function());
        }
        debug!("🧠 Semantic analyzer returned {} findings", issues.len());
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_findings_are_prefixed_and_clamped() {
        let raw = r#"{"issues":[
            {"patternId":"hidden_admin","category":"PERMISSION","severity":"HIGH","title":"Hidden admin","confidence":1.7},
            {"category":"RUG_PULL","severity":"MEDIUM","title":"Odd","confidence":-2}
        ]}"#;
        let parsed: AnalyzeResponse = serde_json::from_str(raw).unwrap();
        let issues: Vec<Issue> = parsed
            .issues
            .into_iter()
            .enumerate()
            .map(|(i, f)| f.into_issue(i))
            .collect();

        assert_eq!(issues[0].pattern_id, "llm:hidden_admin");
        assert_eq!(issues[0].confidence.value(), 1.0);
        assert_eq!(issues[0].source, IssueSource::Llm);
        assert_eq!(issues[1].pattern_id, "llm:finding:1");
        assert_eq!(issues[1].confidence.value(), 0.0);
    }
}
