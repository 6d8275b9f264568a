//! Live threat-intel evidence source.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::core::context::argument_addresses;
use crate::core::sources::{EvidenceSource, SourcePriority};
use crate::models::config::dependency;
use crate::models::errors::{GuardianError, GuardianResult};
use crate::models::types::{AnalysisRequest, Category, Confidence, Issue, IssueSource};
use crate::providers::threat_feed::{ThreatFeed, ThreatMatch};
use crate::utils::circuit_breaker::CircuitBreaker;
use crate::utils::constants::{is_framework_address, DEFAULT_DEADLINE_MS};

/// Queries the threat feed about the called module and every address argument
pub struct ThreatIntelSource {
    feed: Arc<dyn ThreatFeed>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl ThreatIntelSource {
    pub fn new(feed: Arc<dyn ThreatFeed>, breaker: CircuitBreaker) -> Self {
        Self {
            feed,
            breaker,
            timeout: Duration::from_millis(DEFAULT_DEADLINE_MS),
        }
    }

    /// Lookups slower than `timeout` count against the breaker
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Addresses worth asking the feed about; framework addresses are skipped
pub fn lookup_addresses(request: &AnalysisRequest) -> Vec<String> {
    let mut addresses = vec![request.function().address.clone()];
    for a in argument_addresses(request) {
        if !addresses.contains(&a) {
            addresses.push(a);
        }
    }
    addresses.retain(|a| !is_framework_address(a));
    addresses
}

fn to_issue(m: &ThreatMatch, module_address: &str) -> Issue {
    let role = if m.address == module_address { "contract" } else { "counterparty" };
    Issue::new(
        format!("intel:threat_feed:{}", m.address),
        m.category.unwrap_or(Category::Exploit),
        m.severity,
        IssueSource::Pattern,
    )
    .with_text(
        format!("Flagged {}: {}", role, m.label),
        format!("{} is listed by the threat feed as {}.", m.address, m.label),
        "Do not interact with flagged addresses.",
    )
    .with_confidence(Confidence::clamped(m.confidence))
    .with_evidence(serde_json::json!({ "address": m.address, "label": m.label, "role": role }))
    .with_origin(dependency::THREAT_FEED)
}

#[async_trait]
impl EvidenceSource for ThreatIntelSource {
    fn name(&self) -> &'static str {
        dependency::THREAT_FEED
    }

    fn priority(&self) -> SourcePriority {
        SourcePriority::ThreatIntel
    }

    async fn collect(&self, request: &AnalysisRequest) -> GuardianResult<Vec<Issue>> {
        let addresses = lookup_addresses(request);
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let matches = self
            .breaker
            .call_within(self.timeout, || self.feed.lookup(&addresses))
            .await
            .map_err(GuardianError::from)?;

        let module_address = &request.function().address;
        Ok(matches.iter().map(|m| to_issue(m, module_address)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;
    use crate::models::types::{FunctionPath, Network, Severity};
    use crate::utils::cache::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticFeed {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl ThreatFeed for StaticFeed {
        async fn lookup(&self, addresses: &[String]) -> GuardianResult<Vec<ThreatMatch>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GuardianError::rpc_status(503, "feed"));
            }
            Ok(addresses
                .iter()
                .filter(|a| a.as_str() == "0xbad")
                .map(|a| ThreatMatch {
                    address: a.clone(),
                    label: "drainer".to_string(),
                    severity: Severity::Critical,
                    confidence: 3.0,
                    category: None,
                })
                .collect())
        }
    }

    fn request(path: &str, args: Vec<serde_json::Value>) -> AnalysisRequest {
        AnalysisRequest::new(Network::Mainnet, "0xa11ce", FunctionPath::parse(path).unwrap())
            .unwrap()
            .with_arguments(args)
    }

    fn source(fail: bool) -> (ThreatIntelSource, Arc<StaticFeed>) {
        let feed = Arc::new(StaticFeed {
            calls: AtomicU32::new(0),
            fail,
        });
        let breaker = CircuitBreaker::new(dependency::THREAT_FEED, Arc::new(MemoryStore::new()));
        (ThreatIntelSource::new(feed.clone(), breaker), feed)
    }

    #[test]
    fn test_lookup_addresses_skip_framework() {
        let req = request("0x1::coin::transfer", vec![serde_json::json!("0xbad")]);
        assert_eq!(lookup_addresses(&req), vec!["0xbad"]);
    }

    #[tokio::test]
    async fn test_flagged_counterparty() {
        let (src, _) = source(false);
        let req = request("0x1::coin::transfer", vec![serde_json::json!("0xbad"), serde_json::json!("5")]);
        let issues = src.collect(&req).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].pattern_id, "intel:threat_feed:0xbad");
        assert_eq!(issues[0].confidence.value(), 1.0);
        assert_eq!(issues[0].evidence["role"], "counterparty");
    }

    #[tokio::test]
    async fn test_framework_only_request_skips_feed() {
        let (src, feed) = source(false);
        let req = request("0x1::coin::transfer", vec![serde_json::json!("5")]);
        assert!(src.collect(&req).await.unwrap().is_empty());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_repeated_failures() {
        let (src, feed) = source(true);
        let req = request("0xcafe::vault::deposit", vec![]);
        for _ in 0..3 {
            let err = src.collect(&req).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::RpcError);
        }
        let err = src.collect(&req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CircuitOpen);
        assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
    }

    struct HangingFeed;

    #[async_trait]
    impl ThreatFeed for HangingFeed {
        async fn lookup(&self, _: &[String]) -> GuardianResult<Vec<ThreatMatch>> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_hanging_feed_trips_breaker() {
        let breaker = CircuitBreaker::new(dependency::THREAT_FEED, Arc::new(MemoryStore::new()));
        let src = ThreatIntelSource::new(Arc::new(HangingFeed), breaker.clone())
            .with_timeout(Duration::from_millis(20));
        let req = request("0xcafe::vault::deposit", vec![]);

        for _ in 0..3 {
            let err = src.collect(&req).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::SourceTimeout);
        }
        assert_eq!(src.collect(&req).await.unwrap_err().code, ErrorCode::CircuitOpen);
        assert_eq!(breaker.snapshot().await.failure_count, 3);
    }
}
