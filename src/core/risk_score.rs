//! Risk Scoring Module
//!
//! Deterministic `Issue[] -> (score 0..=100, severity)`.
//!
//! - Each issue contributes `SEVERITY_WEIGHT * confidence` to its bucket
//! - The LOW bucket is capped at 20 so volume of weak findings cannot
//!   inflate the score
//! - The single most severe issue sets a floor, so capping never dilutes it
//! - Any CRITICAL issue makes the verdict CRITICAL, whatever else is present

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::types::{Issue, Severity};

/// Upper bound on the LOW-severity accumulator
pub const LOW_SEVERITY_CAP: f64 = 20.0;

/// Per-severity weighted sums
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityBuckets {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl SeverityBuckets {
    fn add(&mut self, severity: Severity, weight: f64) {
        match severity {
            Severity::Critical => self.critical += weight,
            Severity::High => self.high += weight,
            Severity::Medium => self.medium += weight,
            Severity::Low => self.low += weight,
        }
    }

    /// Sum with the LOW bucket capped
    pub fn capped_total(&self) -> f64 {
        self.critical + self.high + self.medium + self.low.min(LOW_SEVERITY_CAP)
    }
}

/// Result of scoring an issue list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// Overall score (0-100)
    pub total: u8,
    pub severity: Severity,
    pub buckets: SeverityBuckets,
}

impl RiskScore {
    pub fn calculate(issues: &[Issue]) -> Self {
        if issues.is_empty() {
            return Self {
                total: 0,
                severity: Severity::Low,
                buckets: SeverityBuckets::default(),
            };
        }

        let mut buckets = SeverityBuckets::default();
        // (severity, confidence) of the most severe issue; ties keep the higher confidence
        let mut max: Option<(Severity, f64)> = None;

        for issue in issues {
            let confidence = issue.confidence.value();
            buckets.add(issue.severity, issue.severity.weight() * confidence);

            max = match max {
                None => Some((issue.severity, confidence)),
                Some((sev, _)) if issue.severity > sev => Some((issue.severity, confidence)),
                Some((sev, conf)) if issue.severity == sev && confidence > conf => {
                    Some((sev, confidence))
                }
                keep => keep,
            };
        }

        // Non-empty input always sets `max`
        let (max_severity, max_confidence) = max.unwrap_or((Severity::Low, 0.0));
        let floor = max_severity.weight() * max_confidence;
        let total = buckets.capped_total().max(floor).round().min(100.0) as u8;

        let severity = if max_severity == Severity::Critical {
            Severity::Critical
        } else if max_severity == Severity::High || total >= 60 {
            Severity::High
        } else if max_severity == Severity::Medium || total >= 30 {
            Severity::Medium
        } else {
            Severity::Low
        };

        Self {
            total,
            severity,
            buckets,
        }
    }

    /// Human-readable advice for the verdict
    pub fn recommendation(&self) -> &'static str {
        recommendation_for(self.severity)
    }
}

/// Advice shown with a verdict of the given overall severity
pub fn recommendation_for(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "✅ LOW RISK - Proceed with standard caution.",
        Severity::Medium => "🟠 ELEVATED RISK - Review the call and its arguments before signing.",
        Severity::High => "🔴 HIGH RISK - Likely dangerous. Do not sign unless you understand every finding.",
        Severity::Critical => "💀 CRITICAL RISK - DO NOT SIGN.",
    }
}

/// Collapse issues sharing a `pattern_id`, keeping the higher confidence.
///
/// The surviving entry takes the position of the first occurrence, so merge
/// order is preserved.
pub fn dedupe(issues: Vec<Issue>) -> Vec<Issue> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(issues.len());
    let mut out: Vec<Issue> = Vec::with_capacity(issues.len());

    for issue in issues {
        match index.get(&issue.pattern_id) {
            Some(&pos) => {
                if issue.confidence.value() > out[pos].confidence.value() {
                    out[pos] = issue;
                }
            }
            None => {
                index.insert(issue.pattern_id.clone(), out.len());
                out.push(issue);
            }
        }
    }
    out
}

/// Severity descending; stable, so ties keep merge-priority order
pub fn sort_for_display(issues: &mut [Issue]) {
    issues.sort_by(|a, b| b.severity.cmp(&a.severity));
}
