//! Contextual detectors over arguments and the simulation outcome.
//!
//! These are informational and merge last. They also expose the address
//! extraction helpers used by the intel sources and the whitelist.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::core::sources::{EvidenceSource, SourcePriority};
use crate::models::errors::GuardianResult;
use crate::models::types::{
    normalize_address, AnalysisRequest, Category, Confidence, Issue, IssueSource, Severity,
};

const U64_MAX: &str = "18446744073709551615";
const U128_MAX: &str = "340282366920938463463374607431768211455";

/// Above this many writes a call is touching unusually much state
const LARGE_WRITE_SET: usize = 20;

lazy_static! {
    static ref TYPE_ADDRESS: Regex = Regex::new(r"0x[0-9a-fA-F]{1,64}").expect("static regex");
}

fn push_unique(out: &mut Vec<String>, address: String) {
    if !out.contains(&address) {
        out.push(address);
    }
}

fn collect_addresses(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if s.starts_with("0x") => {
            if let Some(a) = normalize_address(s) {
                push_unique(out, a);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_addresses(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_addresses(v, out)),
        _ => {}
    }
}

/// Normalized `0x` addresses among the value arguments, first-seen order
pub fn argument_addresses(request: &AnalysisRequest) -> Vec<String> {
    let mut out = Vec::new();
    for arg in request.arguments() {
        collect_addresses(arg, &mut out);
    }
    out
}

/// Normalized addresses named inside the type arguments
pub fn type_argument_addresses(request: &AnalysisRequest) -> Vec<String> {
    let mut out = Vec::new();
    for ty in request.type_arguments() {
        for m in TYPE_ADDRESS.find_iter(ty) {
            if let Some(a) = normalize_address(m.as_str()) {
                push_unique(&mut out, a);
            }
        }
    }
    out
}

fn is_max_amount(value: &Value) -> bool {
    match value {
        Value::String(s) => s == U64_MAX || s == U128_MAX,
        Value::Number(n) => n.as_u64() == Some(u64::MAX),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAnalyzer;

impl ContextAnalyzer {
    pub fn analyze(&self, request: &AnalysisRequest) -> Vec<Issue> {
        let mut issues = Vec::new();

        if request.arguments().iter().any(is_max_amount) {
            issues.push(
                Issue::new("context:unlimited_amount", Category::Permission, Severity::Medium, IssueSource::Pattern)
                    .with_text(
                        "Unlimited amount",
                        "An argument is the maximum integer value, typically an unlimited approval or withdrawal.",
                        "Use the exact amount you intend to move.",
                    )
                    .with_confidence(Confidence::HIGH),
            );
        }

        let addresses = argument_addresses(request);
        if addresses.iter().any(|a| a == "0x0") {
            issues.push(
                Issue::new("context:zero_address_recipient", Category::Exploit, Severity::Medium, IssueSource::Pattern)
                    .with_text(
                        "Zero address argument",
                        "Assets sent to 0x0 are unrecoverable.",
                        "Double-check the recipient.",
                    )
                    .with_confidence(Confidence::MEDIUM),
            );
        }

        let is_transfer = request.function().function.contains("transfer");
        if is_transfer && addresses.iter().any(|a| a == request.sender()) {
            issues.push(
                Issue::new("context:self_transfer", Category::ExcessiveCost, Severity::Low, IssueSource::Pattern)
                    .with_text(
                        "Transfer to self",
                        "The recipient is the sender; the call only spends gas.",
                        "Check the recipient address.",
                    )
                    .with_confidence(Confidence::MEDIUM),
            );
        }

        if let Some(sim) = request.simulation() {
            if !sim.success {
                issues.push(
                    Issue::new("context:simulation_failed", Category::ExcessiveCost, Severity::Medium, IssueSource::Pattern)
                        .with_text(
                            "Simulation failed",
                            format!(
                                "The call aborted in simulation{}. Gas is still charged on chain.",
                                sim.error.as_deref().map(|e| format!(" ({})", e)).unwrap_or_default()
                            ),
                            "Do not submit a transaction that is expected to abort.",
                        )
                        .with_confidence(Confidence::HIGH)
                        .with_evidence(serde_json::json!({ "error": sim.error })),
                );
            }
            if sim.state_changes.len() > LARGE_WRITE_SET {
                issues.push(
                    Issue::new("context:large_write_set", Category::Exploit, Severity::Low, IssueSource::Pattern)
                        .with_text(
                            "Many state changes",
                            format!("The call writes {} resources.", sim.state_changes.len()),
                            "Review the simulated state changes.",
                        )
                        .with_confidence(Confidence::LOW),
                );
            }
        }

        issues.into_iter().map(|i| i.with_origin("context")).collect()
    }
}

#[async_trait]
impl EvidenceSource for ContextAnalyzer {
    fn name(&self) -> &'static str {
        "context"
    }

    fn priority(&self) -> SourcePriority {
        SourcePriority::Context
    }

    async fn collect(&self, request: &AnalysisRequest) -> GuardianResult<Vec<Issue>> {
        Ok(self.analyze(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{FunctionPath, Network, SimulationOutcome};
    use serde_json::json;

    fn request(path: &str) -> AnalysisRequest {
        AnalysisRequest::new(Network::Mainnet, "0xa11ce", FunctionPath::parse(path).unwrap()).unwrap()
    }

    fn ids(issues: &[Issue]) -> Vec<&str> {
        issues.iter().map(|i| i.pattern_id.as_str()).collect()
    }

    #[test]
    fn test_address_extraction() {
        let req = request("0x1::coin::transfer")
            .with_type_arguments(vec!["0x1::coin::Wrapper<0x00CAFE::usd::USD>".to_string()])
            .with_arguments(vec![json!("0x0b0b"), json!(["0xb0b", "0xc0c"]), json!("42")]);
        assert_eq!(argument_addresses(&req), vec!["0xb0b", "0xc0c"]);
        assert_eq!(type_argument_addresses(&req), vec!["0x1", "0xcafe"]);
    }

    #[test]
    fn test_plain_transfer_is_clean() {
        let req = request("0x1::coin::transfer").with_arguments(vec![json!("0xb0b"), json!("100")]);
        assert!(ContextAnalyzer.analyze(&req).is_empty());
    }

    #[test]
    fn test_argument_detectors() {
        let req = request("0x1::coin::transfer")
            .with_arguments(vec![json!("0x0"), json!(U64_MAX), json!("0xa11ce")]);
        let issues = ContextAnalyzer.analyze(&req);
        assert_eq!(
            ids(&issues),
            vec!["context:unlimited_amount", "context:zero_address_recipient", "context:self_transfer"]
        );
    }

    #[test]
    fn test_simulation_detectors() {
        let req = request("0xcafe::vault::deposit").with_simulation(SimulationOutcome {
            success: false,
            error: Some("EINSUFFICIENT_BALANCE".to_string()),
            ..Default::default()
        });
        let issues = ContextAnalyzer.analyze(&req);
        assert_eq!(ids(&issues), vec!["context:simulation_failed"]);
        assert!(issues[0].description.contains("EINSUFFICIENT_BALANCE"));
    }
}
