//! Type definitions for Move Guardian
//! All core data structures for pre-signing transaction analysis

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::errors::{ErrorCode, GuardianError, GuardianResult};

// ============================================
// SEVERITY / CATEGORY / SOURCE
// ============================================

/// Finding severity. Declaration order is the ranking: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Most severe first
    pub const DESCENDING: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Base weight used by the risk scoring algorithm
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Low => 10.0,
            Severity::Medium => 30.0,
            Severity::High => 60.0,
            Severity::Critical => 90.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟠",
            Severity::High => "🔴",
            Severity::Critical => "💀",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(GuardianError::new(
                ErrorCode::RequestInvalidEnum,
                format!("Unknown severity: {}", other),
            )),
        }
    }
}

/// Risk category of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Exploit,
    RugPull,
    Permission,
    ExcessiveCost,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Exploit => "EXPLOIT",
            Category::RugPull => "RUG_PULL",
            Category::Permission => "PERMISSION",
            Category::ExcessiveCost => "EXCESSIVE_COST",
        }
    }
}

impl FromStr for Category {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EXPLOIT" => Ok(Category::Exploit),
            "RUG_PULL" => Ok(Category::RugPull),
            "PERMISSION" => Ok(Category::Permission),
            "EXCESSIVE_COST" => Ok(Category::ExcessiveCost),
            other => Err(GuardianError::new(
                ErrorCode::RequestInvalidEnum,
                format!("Unknown category: {}", other),
            )),
        }
    }
}

/// Which analysis path produced a finding.
///
/// Deterministic producers other than the rule engine (threat feeds,
/// incident database, context checks) report as `Pattern` and name
/// themselves in `evidence.origin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSource {
    /// Deterministic detectors
    Pattern,
    /// Semantic (LLM-backed) analyzer
    Llm,
    /// Fullnode ABI verification
    Onchain,
}

impl IssueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSource::Pattern => "pattern",
            IssueSource::Llm => "llm",
            IssueSource::Onchain => "onchain",
        }
    }
}

// ============================================
// CONFIDENCE
// ============================================

/// Confidence in `[0, 1]`. Construction outside the range is a contract error.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    pub const LOW: Confidence = Confidence(0.35);
    pub const MEDIUM: Confidence = Confidence(0.6);
    pub const HIGH: Confidence = Confidence(0.85);
    pub const VERY_HIGH: Confidence = Confidence(0.95);
    pub const CERTAIN: Confidence = Confidence(1.0);

    pub fn new(value: f64) -> GuardianResult<Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(GuardianError::new(
                ErrorCode::RequestInvalidConfidence,
                format!("Confidence {} outside [0, 1]", value),
            ))
        }
    }

    /// For values coming from external services: NaN becomes 0.
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Confidence {
    type Error = GuardianError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Confidence::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

// ============================================
// ISSUE
// ============================================

/// A single detected risk finding.
///
/// `pattern_id` is the identity used for de-duplication: two issues with the
/// same id are the same finding reported by different paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub pattern_id: String,
    pub category: Category,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub confidence: Confidence,
    pub source: IssueSource,
    #[serde(default)]
    pub evidence: serde_json::Value,
}

impl Issue {
    pub fn new(
        pattern_id: impl Into<String>,
        category: Category,
        severity: Severity,
        source: IssueSource,
    ) -> Self {
        Self {
            pattern_id: pattern_id.into(),
            category,
            severity,
            title: String::new(),
            description: String::new(),
            recommendation: String::new(),
            confidence: Confidence::MEDIUM,
            source,
            evidence: serde_json::Value::Null,
        }
    }

    pub fn with_text(
        mut self,
        title: impl Into<String>,
        description: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        self.title = title.into();
        self.description = description.into();
        self.recommendation = recommendation.into();
        self
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = evidence;
        self
    }

    /// Record the concrete producer under `evidence.origin`
    pub fn with_origin(mut self, origin: &str) -> Self {
        self.evidence = match std::mem::take(&mut self.evidence) {
            serde_json::Value::Object(mut map) => {
                map.insert("origin".to_string(), origin.into());
                serde_json::Value::Object(map)
            }
            serde_json::Value::Null => serde_json::json!({ "origin": origin }),
            other => serde_json::json!({ "origin": origin, "value": other }),
        };
        self
    }

    /// Concrete producer, when one was recorded
    pub fn origin(&self) -> Option<&str> {
        self.evidence.get("origin").and_then(|o| o.as_str())
    }
}

// ============================================
// REQUEST
// ============================================

/// Supported Move networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl FromStr for Network {
    type Err = GuardianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "devnet" => Ok(Network::Devnet),
            other => Err(GuardianError::unsupported_network(other)),
        }
    }
}

/// Normalize a Move account address: lowercase, `0x` prefix, no leading zeros.
///
/// Returns `None` when the input is not hex or longer than 32 bytes.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex_part.is_empty() || hex_part.len() > 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let stripped = hex_part.trim_start_matches('0').to_ascii_lowercase();
    if stripped.is_empty() {
        Some("0x0".to_string())
    } else {
        Some(format!("0x{}", stripped))
    }
}

/// `address::module::function`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionPath {
    pub address: String,
    pub module: String,
    pub function: String,
}

impl FunctionPath {
    pub fn new(address: &str, module: &str, function: &str) -> GuardianResult<Self> {
        let address = normalize_address(address)
            .ok_or_else(|| GuardianError::invalid_function_path(address))?;
        if !is_identifier(module) || !is_identifier(function) {
            return Err(GuardianError::invalid_function_path(&format!(
                "{}::{}::{}",
                address, module, function
            )));
        }
        Ok(Self {
            address,
            module: module.to_string(),
            function: function.to_string(),
        })
    }

    pub fn parse(path: &str) -> GuardianResult<Self> {
        let parts: Vec<&str> = path.trim().split("::").collect();
        match parts.as_slice() {
            [address, module, function] => Self::new(address, module, function),
            _ => Err(GuardianError::invalid_function_path(path)),
        }
    }

    /// `0x1::coin`
    pub fn module_id(&self) -> String {
        format!("{}::{}", self.address, self.module)
    }

    /// `0x1::coin::transfer`
    pub fn qualified(&self) -> String {
        format!("{}::{}::{}", self.address, self.module, self.function)
    }
}

impl fmt::Display for FunctionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.address, self.module, self.function)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Write-set entry from a simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    #[serde(rename = "type")]
    pub change_type: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Event emitted during a simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SimulatedEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: serde_json::Value::Null,
        }
    }
}

/// Pre-computed simulation of the proposed call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcome {
    pub success: bool,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default)]
    pub state_changes: Vec<StateChange>,
    #[serde(default)]
    pub events: Vec<SimulatedEvent>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The proposed function call under analysis. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    network: Network,
    sender: String,
    function: FunctionPath,
    type_arguments: Vec<String>,
    arguments: Vec<serde_json::Value>,
    simulation: Option<SimulationOutcome>,
}

impl AnalysisRequest {
    pub fn new(network: Network, sender: &str, function: FunctionPath) -> GuardianResult<Self> {
        let sender = normalize_address(sender).ok_or_else(|| {
            GuardianError::bad_request(format!("Invalid sender address: {}", sender))
        })?;
        Ok(Self {
            network,
            sender,
            function,
            type_arguments: Vec::new(),
            arguments: Vec::new(),
            simulation: None,
        })
    }

    pub fn with_type_arguments(mut self, type_arguments: Vec<String>) -> Self {
        self.type_arguments = type_arguments;
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<serde_json::Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationOutcome) -> Self {
        self.simulation = Some(simulation);
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn function(&self) -> &FunctionPath {
        &self.function
    }

    pub fn type_arguments(&self) -> &[String] {
        &self.type_arguments
    }

    pub fn arguments(&self) -> &[serde_json::Value] {
        &self.arguments
    }

    pub fn simulation(&self) -> Option<&SimulationOutcome> {
        self.simulation.as_ref()
    }
}

// ============================================
// RESULT
// ============================================

/// Non-fatal notice attached to a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    SourceFailed,
    SourceTimeout,
    CircuitOpen,
    VerificationError,
    SimulationUnavailable,
    LlmUnavailable,
    PartialAnalysis,
    StaleResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub source: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    ModuleNotFound,
    FunctionNotFound,
    Verified,
    Error,
    /// Not attempted (whitelist fast path)
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Provided,
    NotProvided,
    /// A simulation id was supplied but nothing is stored under it
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmStatus {
    Used,
    NotNeeded,
    Failed,
    /// Needed by the complexity heuristic but no analyzer is configured
    Unavailable,
    Skipped,
}

/// Wall-clock duration of one pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
}

/// Pipeline output. Created once per request and never mutated after persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub id: String,
    pub share_id: String,
    pub network: Network,
    pub function: String,
    pub sender: String,
    pub issues: Vec<Issue>,
    pub score: u8,
    pub severity: Severity,
    pub warnings: Vec<Warning>,
    pub analysis_complete: bool,
    pub whitelisted: bool,
    pub timings: Vec<StageTiming>,
    pub verification_status: VerificationStatus,
    pub simulation_status: SimulationStatus,
    pub llm_status: LlmStatus,
    /// Unix seconds
    pub created_at: i64,
}

impl AnalysisResult {
    /// Zero-risk verdict with fresh ids, to be filled in by the pipeline
    pub fn empty(network: Network, function: FunctionPath, sender: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            share_id: String::new(),
            network,
            function: function.qualified(),
            sender,
            issues: Vec::new(),
            score: 0,
            severity: Severity::Low,
            warnings: Vec::new(),
            analysis_complete: true,
            whitelisted: false,
            timings: Vec::new(),
            verification_status: VerificationStatus::Skipped,
            simulation_status: SimulationStatus::NotProvided,
            llm_status: LlmStatus::Skipped,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Pretty print the analysis result
    pub fn summary(&self) -> String {
        let mut output = format!(
            "\n{} Risk: {} | Score: {}/100 | {}\n",
            self.severity.emoji(),
            self.severity.as_str(),
            self.score,
            self.function
        );
        output.push_str(&format!("   Sender: {}\n", self.sender));
        output.push_str(&format!(
            "   Complete: {}{}\n",
            self.analysis_complete,
            if self.whitelisted { " (whitelisted)" } else { "" }
        ));

        if !self.issues.is_empty() {
            output.push_str("   Issues:\n");
            for issue in &self.issues {
                output.push_str(&format!(
                    "     - [{}] {} ({}, confidence {:.2})\n",
                    issue.severity, issue.title, issue.pattern_id, issue.confidence.value()
                ));
            }
        }

        if !self.warnings.is_empty() {
            output.push_str("   Warnings:\n");
            for warning in &self.warnings {
                output.push_str(&format!("     - {}: {}\n", warning.source, warning.message));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::DESCENDING[0], Severity::Critical);
    }

    #[test]
    fn test_severity_parse_rejects_unknown() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Critical);
        let err = "SEVERE".parse::<Severity>().unwrap_err();
        assert_eq!(err.code, ErrorCode::RequestInvalidEnum);
    }

    #[test]
    fn test_confidence_bounds() {
        assert!(Confidence::new(0.0).is_ok());
        assert!(Confidence::new(1.0).is_ok());
        assert!(Confidence::new(1.01).is_err());
        assert!(Confidence::new(-0.1).is_err());
        assert_eq!(Confidence::clamped(7.0).value(), 1.0);
        assert_eq!(Confidence::clamped(f64::NAN).value(), 0.0);
    }

    #[test]
    fn test_confidence_deserialize_validates() {
        assert!(serde_json::from_str::<Confidence>("0.4").is_ok());
        assert!(serde_json::from_str::<Confidence>("1.4").is_err());
    }

    #[test]
    fn test_address_normalization() {
        assert_eq!(normalize_address("0x0001").as_deref(), Some("0x1"));
        assert_eq!(normalize_address("0xABC").as_deref(), Some("0xabc"));
        assert_eq!(normalize_address("0x000").as_deref(), Some("0x0"));
        assert_eq!(normalize_address("xyz"), None);
        assert_eq!(normalize_address(""), None);
    }

    #[test]
    fn test_function_path_parse() {
        let path = FunctionPath::parse("0x00001::coin::transfer").unwrap();
        assert_eq!(path.address, "0x1");
        assert_eq!(path.module_id(), "0x1::coin");
        assert_eq!(path.qualified(), "0x1::coin::transfer");

        assert!(FunctionPath::parse("0x1::coin").is_err());
        assert!(FunctionPath::parse("0x1::coin::9bad").is_err());
        assert!(FunctionPath::parse("nothex::coin::transfer").is_err());
    }

    #[test]
    fn test_issue_serializes_camel_case() {
        let issue = Issue::new("x:y", Category::RugPull, Severity::High, IssueSource::Pattern)
            .with_confidence(Confidence::HIGH);
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["patternId"], "x:y");
        assert_eq!(json["category"], "RUG_PULL");
        assert_eq!(json["severity"], "HIGH");
        assert_eq!(json["source"], "pattern");
        assert_eq!(json["confidence"], 0.85);
    }

    #[test]
    fn test_origin_is_kept_in_evidence() {
        let issue = Issue::new("intel:x", Category::Exploit, Severity::High, IssueSource::Pattern)
            .with_evidence(serde_json::json!({ "address": "0xbeef" }))
            .with_origin("threat_feed");
        assert_eq!(issue.origin(), Some("threat_feed"));
        assert_eq!(issue.evidence["address"], "0xbeef");

        let bare = Issue::new("context:x", Category::Exploit, Severity::Low, IssueSource::Pattern).with_origin("context");
        assert_eq!(bare.evidence, serde_json::json!({ "origin": "context" }));
        assert!(serde_json::from_str::<IssueSource>("\"intel\"").is_err());
    }
}
