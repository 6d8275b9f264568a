//! Pipeline Orchestrator
//!
//! Per request: whitelist fast path, then a concurrent evidence fan-out
//! (on-chain verification alongside every registered source), the pattern
//! sweep, the complexity-gated semantic analyzer, and finally merge, dedupe,
//! scoring and display sort. Every stage is timed. A verdict is always
//! returned; degraded stages only add warnings and clear `analysis_complete`.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::core::context::ContextAnalyzer;
use crate::core::incidents::IncidentDatabase;
use crate::core::intel::ThreatIntelSource;
use crate::core::patterns::PatternEngine;
use crate::core::results::{new_share_id, ResultStore};
use crate::core::risk_score::{dedupe, sort_for_display, RiskScore};
use crate::core::sources::{isolate, merge, EvidenceSource, SourcePriority, SourceReport};
use crate::core::verifier::{OnchainVerifier, VerificationReport};
use crate::core::whitelist::{Whitelist, WhitelistDecision};
use crate::models::config::{dependency, GuardianConfig};
use crate::models::errors::{GuardianError, GuardianResult};
use crate::models::types::{
    AnalysisRequest, AnalysisResult, LlmStatus, Severity, SimulationStatus, StageTiming,
    VerificationStatus, Warning, WarningKind,
};
use crate::providers::aptos::{AptosClient, ModuleFetcher};
use crate::providers::llm::{LlmAnalyzer, SemanticAnalyzer, SemanticContext};
use crate::providers::threat_feed::{HttpThreatFeed, ThreatFeed};
use crate::utils::cache::KvStore;
use crate::utils::circuit_breaker::CircuitBreaker;
use crate::utils::telemetry::TelemetryCollector;

/// Complexity points at which the semantic analyzer is consulted
pub const LLM_COMPLEXITY_THRESHOLD: u32 = 2;

/// Cost-control heuristic for the semantic analyzer
pub fn complexity_score(request: &AnalysisRequest, report: &VerificationReport, patterns_matched: bool) -> u32 {
    let mut points = 0;

    let args = request.arguments();
    if args.len() > 3 {
        points += 1;
    }
    if args.iter().any(|a| a.is_array() || a.is_object()) {
        points += 1;
    }
    if request.type_arguments().len() > 1 {
        points += 1;
    }
    if let Some(sim) = request.simulation() {
        if sim.state_changes.len() > 5 || sim.events.len() > 5 {
            points += 1;
        }
    }
    if patterns_matched {
        points += 2;
    }
    if report.findings.iter().any(|i| i.severity >= Severity::High) {
        points += 1;
    }

    points
}

fn timing(stage: &str, started: Instant) -> StageTiming {
    StageTiming {
        stage: stage.to_string(),
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// The risk-verdict service
pub struct Guardian {
    config: GuardianConfig,
    store: Arc<dyn KvStore>,
    verifier: OnchainVerifier,
    patterns: PatternEngine,
    whitelist: Whitelist,
    incidents: Arc<IncidentDatabase>,
    threat_intel: Option<Arc<ThreatIntelSource>>,
    extra_sources: Vec<Arc<dyn EvidenceSource>>,
    semantic: Option<Arc<dyn SemanticAnalyzer>>,
    llm_breaker: CircuitBreaker,
    results: ResultStore,
    telemetry: Arc<TelemetryCollector>,
}

impl Guardian {
    /// Guardian with on-chain verification, patterns, context checks and an
    /// empty incident database. Optional sources are added with the builders.
    pub fn new(config: GuardianConfig, store: Arc<dyn KvStore>, fetcher: Arc<dyn ModuleFetcher>) -> Self {
        let verifier = OnchainVerifier::new(fetcher, CircuitBreaker::new(dependency::CHAIN_RPC, store.clone()));
        let results = ResultStore::new(store.clone(), config.retention);
        Self {
            llm_breaker: CircuitBreaker::new(dependency::LLM, store.clone()),
            config,
            store,
            verifier,
            patterns: PatternEngine::new(),
            whitelist: Whitelist::new(),
            incidents: Arc::new(IncidentDatabase::empty()),
            threat_intel: None,
            extra_sources: Vec::new(),
            semantic: None,
            results,
            telemetry: Arc::new(TelemetryCollector::new()),
        }
    }

    /// Wire real HTTP clients from configuration
    pub fn from_config(config: GuardianConfig, store: Arc<dyn KvStore>) -> GuardianResult<Self> {
        let fetcher = Arc::new(AptosClient::new(&config)?);
        let mut guardian = Self::new(config.clone(), store, fetcher);
        let single_call = config.attempt_timeout(1);

        if let Some(endpoint) = &config.threat_feed {
            guardian = guardian.with_threat_feed(Arc::new(HttpThreatFeed::new(endpoint.clone(), single_call)?));
        }
        if let Some(endpoint) = &config.llm {
            guardian = guardian.with_semantic(Arc::new(LlmAnalyzer::new(endpoint.clone(), single_call)?));
        }
        if let Some(path) = &config.incident_db_path {
            guardian = guardian.with_incidents(IncidentDatabase::from_file(path)?);
        }

        Ok(guardian)
    }

    pub fn with_threat_feed(mut self, feed: Arc<dyn ThreatFeed>) -> Self {
        let breaker = CircuitBreaker::new(dependency::THREAT_FEED, self.store.clone());
        let source = ThreatIntelSource::new(feed, breaker).with_timeout(self.config.deadline);
        self.threat_intel = Some(Arc::new(source));
        self
    }

    pub fn with_semantic(mut self, analyzer: Arc<dyn SemanticAnalyzer>) -> Self {
        self.semantic = Some(analyzer);
        self
    }

    pub fn with_incidents(mut self, incidents: IncidentDatabase) -> Self {
        self.incidents = Arc::new(incidents);
        self
    }

    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn with_patterns(mut self, patterns: PatternEngine) -> Self {
        self.patterns = patterns;
        self
    }

    /// Register an additional evidence source
    pub fn with_source(mut self, source: Arc<dyn EvidenceSource>) -> Self {
        self.extra_sources.push(source);
        self
    }

    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        self.telemetry.clone()
    }

    fn sources(&self) -> Vec<Arc<dyn EvidenceSource>> {
        let mut sources: Vec<Arc<dyn EvidenceSource>> = Vec::with_capacity(3 + self.extra_sources.len());
        if let Some(intel) = &self.threat_intel {
            sources.push(intel.clone());
        }
        sources.push(self.incidents.clone());
        sources.push(Arc::new(ContextAnalyzer));
        sources.extend(self.extra_sources.iter().cloned());
        sources
    }

    /// Analyze a request; the simulation status follows from whether one is attached
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let status = if request.simulation().is_some() {
            SimulationStatus::Provided
        } else {
            SimulationStatus::NotProvided
        };
        self.analyze_with_simulation_status(request, status).await
    }

    /// Analyze with an explicit simulation status (e.g. a referenced simulation was not found)
    pub async fn analyze_with_simulation_status(
        &self,
        request: &AnalysisRequest,
        simulation_status: SimulationStatus,
    ) -> AnalysisResult {
        let started = Instant::now();
        let deadline = started + self.config.deadline;
        let path = request.function();
        let mut timings = Vec::with_capacity(6);
        let mut result = AnalysisResult::empty(request.network(), path.clone(), request.sender().to_string());
        result.simulation_status = simulation_status;

        info!("🔍 Analyzing {} on {} for {}", path, request.network().as_str(), request.sender());

        // ============================================
        // STAGE 1: WHITELIST
        // ============================================
        let stage = Instant::now();
        let decision = self.whitelist.check(request, &self.incidents);
        timings.push(timing("whitelist", stage));
        if decision == WhitelistDecision::Allowed {
            info!("⚡ {} is whitelisted, skipping deep analysis", path);
            result.whitelisted = true;
            return self.finish(result, timings, started).await;
        }
        debug!("Whitelist decision for {}: {:?}", path, decision);

        // ============================================
        // STAGE 2: EVIDENCE FAN-OUT
        // ============================================
        let stage = Instant::now();
        let budget = remaining(deadline);
        let sources = self.sources();
        let verification = self.verifier.verify_within(request, budget);
        let fan_out = join_all(
            sources
                .iter()
                .map(|s| isolate(s.name(), s.priority(), budget, s.collect(request))),
        );
        let (report, mut reports) = tokio::join!(verification, fan_out);
        result.verification_status = report.status;

        reports.push(SourceReport {
            name: "onchain_verifier".to_string(),
            priority: SourcePriority::GroundTruth,
            issues: report.ground_truth.clone(),
            warning: report.warning.clone(),
            duration_ms: stage.elapsed().as_millis() as u64,
        });
        reports.push(SourceReport::ok(
            "bytecode_scan",
            SourcePriority::Deterministic,
            report.findings.clone(),
        ));
        timings.push(timing("evidence", stage));

        // ============================================
        // STAGE 3: PATTERN SWEEP
        // ============================================
        let stage = Instant::now();
        let pattern_issues = self.patterns.analyze(request);
        let patterns_matched = !pattern_issues.is_empty();
        reports.push(SourceReport::ok("patterns", SourcePriority::Deterministic, pattern_issues));
        timings.push(timing("patterns", stage));

        // ============================================
        // STAGE 4: SEMANTIC ANALYZER (gated)
        // ============================================
        let stage = Instant::now();
        let ground_truth_missing = matches!(
            report.status,
            VerificationStatus::ModuleNotFound | VerificationStatus::FunctionNotFound
        );
        let points = complexity_score(request, &report, patterns_matched);
        result.llm_status = if ground_truth_missing || points < LLM_COMPLEXITY_THRESHOLD {
            debug!("LLM not needed for {} (complexity {})", path, points);
            LlmStatus::NotNeeded
        } else {
            match &self.semantic {
                None => {
                    result.warnings.push(Warning::new(
                        WarningKind::LlmUnavailable,
                        dependency::LLM,
                        "Semantic analysis recommended for this call but no analyzer is configured",
                    ));
                    LlmStatus::Unavailable
                }
                Some(analyzer) => {
                    let context = SemanticContext {
                        verified_function: report.function.clone(),
                        prior_findings: reports
                            .iter()
                            .flat_map(|r| r.issues.iter().map(|i| i.pattern_id.clone()))
                            .collect(),
                    };
                    let budget = remaining(deadline);
                    let llm = isolate(dependency::LLM, SourcePriority::Semantic, budget, async {
                        self.llm_breaker
                            .call_within(budget, || analyzer.analyze(request, &context))
                            .await
                            .map_err(GuardianError::from)
                    })
                    .await;
                    let status = if llm.succeeded() { LlmStatus::Used } else { LlmStatus::Failed };
                    reports.push(llm);
                    status
                }
            }
        };
        timings.push(timing("llm", stage));

        // ============================================
        // STAGE 5: MERGE + SCORE
        // ============================================
        let stage = Instant::now();
        let (merged, warnings) = merge(reports);
        let mut issues = dedupe(merged);
        let score = RiskScore::calculate(&issues);
        sort_for_display(&mut issues);
        timings.push(timing("scoring", stage));

        result.issues = issues;
        result.score = score.total;
        result.severity = score.severity;
        result.warnings.extend(warnings);

        // ============================================
        // COMPLETENESS
        // ============================================
        let mut complete = true;
        match result.simulation_status {
            SimulationStatus::Provided => {}
            SimulationStatus::NotProvided => {
                complete = false;
                result.warnings.push(Warning::new(
                    WarningKind::SimulationUnavailable,
                    "simulation",
                    "No simulation supplied; state changes and events were not checked",
                ));
            }
            SimulationStatus::NotFound => {
                complete = false;
                result.warnings.push(Warning::new(
                    WarningKind::SimulationUnavailable,
                    "simulation",
                    "Referenced simulation not found or expired; state changes and events were not checked",
                ));
            }
        }
        if matches!(result.llm_status, LlmStatus::Failed | LlmStatus::Unavailable) {
            complete = false;
        }
        if result.verification_status == VerificationStatus::Error {
            complete = false;
        }
        if !complete && result.warnings.is_empty() {
            result.warnings.push(Warning::new(
                WarningKind::PartialAnalysis,
                "pipeline",
                "One or more analysis stages did not complete",
            ));
        }
        result.analysis_complete = complete;

        self.finish(result, timings, started).await
    }

    async fn finish(&self, mut result: AnalysisResult, mut timings: Vec<StageTiming>, started: Instant) -> AnalysisResult {
        timings.push(timing("total", started));
        let total_ms = started.elapsed().as_millis() as u64;
        result.timings = timings;
        result.share_id = new_share_id();

        if let Err(e) = self.results.persist(&result).await {
            warn!("⚠️ Failed to persist {}: {}", result.id, e);
        }
        self.telemetry.record(&result, total_ms);

        info!(
            "{} {} | {} | score {}/100 | {} issues | complete: {} | {}ms",
            result.severity.emoji(),
            result.function,
            result.severity,
            result.score,
            result.issues.len(),
            result.analysis_complete,
            total_ms
        );
        result
    }
}
