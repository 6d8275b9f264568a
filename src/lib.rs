//! Move Guardian Library
//!
//! Pre-signing risk verdicts for Move (Aptos) entry-function calls:
//! - On-chain ABI verification of the called function
//! - Declarative pattern rules over names, arguments and simulations
//! - Known-incident, threat-feed and semantic evidence behind circuit breakers
//! - Severity-dominant scoring with shareable, persisted results

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod utils;

pub use crate::core::{
    EvidenceSource, Guardian, IncidentDatabase, OnchainVerifier, PatternEngine, ResultStore, RiskScore,
    Whitelist,
};
pub use models::{
    AnalysisRequest, AnalysisResult, Confidence, FunctionPath, GuardianConfig, GuardianError, GuardianResult,
    Issue, Network, Severity, SimulationOutcome,
};
pub use providers::{AptosClient, ModuleFetcher, SemanticAnalyzer, ThreatFeed};
pub use utils::{CircuitBreaker, KvStore, MemoryStore, TelemetryCollector};
