//! End-to-end verdicts through the full pipeline

mod common;

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use common::*;
use move_guardian::core::{Incident, IncidentDatabase};
use move_guardian::models::{Category, Confidence, IssueSource, LlmStatus, SimulationStatus, VerificationStatus, WarningKind};
use move_guardian::providers::{SemanticAnalyzer, SemanticContext, ThreatFeed, ThreatMatch};
use move_guardian::{AnalysisRequest, FunctionPath, GuardianError, GuardianResult, Issue, Network, Severity};

struct DownFeed;

#[async_trait]
impl ThreatFeed for DownFeed {
    async fn lookup(&self, _: &[String]) -> GuardianResult<Vec<ThreatMatch>> {
        Err(GuardianError::source_failed("feed unreachable"))
    }
}

struct FlaggingFeed;

#[async_trait]
impl ThreatFeed for FlaggingFeed {
    async fn lookup(&self, addresses: &[String]) -> GuardianResult<Vec<ThreatMatch>> {
        Ok(addresses
            .iter()
            .filter(|a| a.as_str() == "0xbeef")
            .map(|a| ThreatMatch {
                address: a.clone(),
                label: "phishing drainer".to_string(),
                severity: Severity::Critical,
                confidence: 0.97,
                category: None,
            })
            .collect())
    }
}

/// Records what it was asked and reports one finding
#[derive(Default)]
struct RecordingAnalyzer {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl SemanticAnalyzer for RecordingAnalyzer {
    async fn analyze(&self, _: &AnalysisRequest, context: &SemanticContext) -> GuardianResult<Vec<Issue>> {
        self.seen.lock().unwrap().extend(context.prior_findings.iter().cloned());
        Ok(vec![Issue::new("llm:hidden_recipient", Category::RugPull, Severity::Medium, IssueSource::Llm)
            .with_confidence(Confidence::MEDIUM)])
    }
}

#[tokio::test]
async fn test_verified_coin_transfer_is_clean_and_complete() {
    let g = guardian();
    let result = g.analyze(&coin_transfer()).await;

    assert_eq!(result.verification_status, VerificationStatus::Verified);
    assert_eq!(result.simulation_status, SimulationStatus::Provided);
    assert!(result.issues.is_empty(), "unexpected issues: {:?}", result.issues);
    assert_eq!(result.score, 0);
    assert_eq!(result.severity, Severity::Low);
    assert!(result.analysis_complete);
    assert!(result.warnings.is_empty());
    assert!(!result.whitelisted);
    assert_eq!(result.share_id.len(), 10);

    let stages: Vec<&str> = result.timings.iter().map(|t| t.stage.as_str()).collect();
    assert_eq!(stages, vec!["whitelist", "evidence", "patterns", "llm", "scoring", "total"]);
}

#[tokio::test]
async fn test_missing_function_is_critical() {
    let g = guardian();
    let request = AnalysisRequest::new(
        Network::Mainnet,
        "0xa11ce",
        FunctionPath::parse("0xcafe::treasury::withdraw_all").unwrap(),
    )
    .unwrap()
    .with_arguments(vec![serde_json::json!("5")])
    .with_simulation(successful_simulation());
    let result = g.analyze(&request).await;

    assert_eq!(result.verification_status, VerificationStatus::FunctionNotFound);
    assert_eq!(result.severity, Severity::Critical);
    let critical: Vec<&str> = result
        .issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .map(|i| i.pattern_id.as_str())
        .collect();
    assert_eq!(critical, vec!["bytecode:function:not_found"]);
    // The claimed name still matches the drain rule
    assert!(result.issues.iter().any(|i| i.pattern_id == "rug:admin_drain"));
    assert_eq!(result.llm_status, LlmStatus::NotNeeded);
}

#[tokio::test]
async fn test_missing_module_is_critical() {
    let g = guardian();
    let request = AnalysisRequest::new(Network::Mainnet, "0xa11ce", FunctionPath::parse("0xdead::ghost::run").unwrap())
        .unwrap()
        .with_simulation(successful_simulation());
    let result = g.analyze(&request).await;

    assert_eq!(result.verification_status, VerificationStatus::ModuleNotFound);
    assert_eq!(result.severity, Severity::Critical);
    assert!(result.issues.iter().any(|i| i.pattern_id == "bytecode:module:not_found"));
}

#[tokio::test]
async fn test_whitelisted_transfer_skips_analysis() {
    let g = move_guardian::Guardian::new(
        move_guardian::GuardianConfig::from_env(),
        Arc::new(move_guardian::MemoryStore::new()),
        fullnode(),
    );
    let result = g.analyze(&coin_transfer()).await;

    assert!(result.whitelisted);
    assert!(result.analysis_complete);
    assert_eq!(result.score, 0);
    assert_eq!(result.verification_status, VerificationStatus::Skipped);
    assert_eq!(result.llm_status, LlmStatus::Skipped);
}

#[tokio::test]
async fn test_flagged_type_argument_defeats_whitelist() {
    let incidents = IncidentDatabase::from_incidents(vec![Incident {
        id: "fake-usd".to_string(),
        name: "Fake USD".to_string(),
        address: "0xbad".to_string(),
        module: None,
        function: None,
        category: Category::Exploit,
        severity: Severity::Critical,
        date: None,
        description: "Counterfeit stablecoin".to_string(),
        loss_usd: None,
    }]);
    let g = move_guardian::Guardian::new(
        move_guardian::GuardianConfig::from_env(),
        Arc::new(move_guardian::MemoryStore::new()),
        fullnode(),
    )
    .with_incidents(incidents);

    let request = coin_transfer().with_type_arguments(vec!["0xbad::usd::USD".to_string()]);
    let result = g.analyze(&request).await;

    assert!(!result.whitelisted);
    assert_eq!(result.severity, Severity::Critical);
    assert!(result
        .issues
        .iter()
        .any(|i| i.pattern_id == "intel:incident:fake-usd:type_argument"));
}

#[tokio::test]
async fn test_threat_feed_outage_only_warns() {
    let g = guardian().with_threat_feed(Arc::new(DownFeed));
    let result = g.analyze(&coin_transfer()).await;

    assert_eq!(result.severity, Severity::Low);
    assert!(result.analysis_complete);
    assert!(result.warnings.iter().any(|w| w.source == "threat_feed"));
}

#[tokio::test]
async fn test_threat_feed_flags_counterparty() {
    let g = guardian().with_threat_feed(Arc::new(FlaggingFeed));
    let result = g.analyze(&coin_transfer()).await;

    assert_eq!(result.severity, Severity::Critical);
    assert_eq!(result.issues[0].pattern_id, "intel:threat_feed:0xbeef");
    assert_eq!(result.issues[0].source, IssueSource::Pattern);
    assert_eq!(result.issues[0].origin(), Some("threat_feed"));
    assert!(result.issues.iter().all(|i| matches!(
        serde_json::to_value(i.source).unwrap().as_str(),
        Some("pattern" | "llm" | "onchain")
    )));
}

#[tokio::test]
async fn test_semantic_analyzer_runs_on_complex_calls() {
    let analyzer = Arc::new(RecordingAnalyzer::default());
    let g = guardian().with_semantic(analyzer.clone());
    let result = g.analyze(&vault_call("withdraw_all")).await;

    assert_eq!(result.llm_status, LlmStatus::Used);
    assert!(result.analysis_complete);
    assert!(result.issues.iter().any(|i| i.pattern_id == "llm:hidden_recipient"));
    assert!(analyzer.seen.lock().unwrap().iter().any(|id| id == "rug:admin_drain"));
}

#[tokio::test]
async fn test_simple_calls_skip_semantic_analyzer() {
    let analyzer = Arc::new(RecordingAnalyzer::default());
    let g = guardian().with_semantic(analyzer.clone());
    let result = g.analyze(&vault_call("deposit")).await;

    assert_eq!(result.llm_status, LlmStatus::NotNeeded);
    assert!(analyzer.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_simulation_reference_is_incomplete() {
    let g = guardian();
    let request = AnalysisRequest::new(Network::Mainnet, "0xa11ce", FunctionPath::parse("0xcafe::vault::deposit").unwrap())
        .unwrap()
        .with_arguments(vec![serde_json::json!("5")]);
    let result = g.analyze_with_simulation_status(&request, SimulationStatus::NotFound).await;

    assert_eq!(result.simulation_status, SimulationStatus::NotFound);
    assert!(!result.analysis_complete);
    assert!(result.warnings.iter().any(|w| w.kind == WarningKind::SimulationUnavailable));
}

#[tokio::test]
async fn test_verdict_is_retrievable_by_share_id() {
    let g = guardian();
    let result = g.analyze(&vault_call("deposit")).await;

    let shared = g.results().by_share_id(&result.share_id).await.unwrap().unwrap();
    assert_eq!(shared.id, result.id);
    assert_eq!(shared.score, result.score);
    assert!(g.results().by_share_id("missing0000").await.unwrap().is_none());
}
