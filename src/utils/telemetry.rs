//! Telemetry Module
//!
//! In-process counters about produced verdicts, exposed through
//! `GET /v1/stats` and logged on shutdown.
//!
//! Privacy-first: no sender addresses or function paths are retained.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::models::types::{AnalysisResult, IssueSource, Severity};

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryStats {
    /// Verdicts produced (including whitelisted ones)
    pub total_analyzed: u64,
    /// Verdicts served from the whitelist fast path
    pub whitelisted: u64,
    /// Verdicts with `analysisComplete == false`
    pub degraded: u64,
    /// Verdict count by overall severity
    pub verdicts_by_severity: HashMap<String, u64>,
    /// Issue count by producing source
    pub issues_by_source: HashMap<String, u64>,
    /// Average end-to-end pipeline latency (ms)
    pub avg_latency_ms: f64,
    /// Collector start (unix seconds)
    pub period_start: i64,
}

impl TelemetryStats {
    /// One-paragraph human summary
    pub fn summary(&self) -> String {
        let critical = self
            .verdicts_by_severity
            .get(Severity::Critical.as_str())
            .copied()
            .unwrap_or(0);
        format!(
            "🛡️ {} analyzed | {} whitelisted | {} critical | {} degraded | avg {:.1}ms",
            self.total_analyzed, self.whitelisted, critical, self.degraded, self.avg_latency_ms
        )
    }
}

/// Main telemetry collector
pub struct TelemetryCollector {
    total_analyzed: AtomicU64,
    whitelisted: AtomicU64,
    degraded: AtomicU64,
    total_latency_ms: AtomicU64,
    by_severity: RwLock<HashMap<Severity, u64>>,
    by_source: RwLock<HashMap<IssueSource, u64>>,
    period_start: i64,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            total_analyzed: AtomicU64::new(0),
            whitelisted: AtomicU64::new(0),
            degraded: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            by_severity: RwLock::new(HashMap::new()),
            by_source: RwLock::new(HashMap::new()),
            period_start: chrono::Utc::now().timestamp(),
        }
    }

    /// Record a finished verdict
    pub fn record(&self, result: &AnalysisResult, latency_ms: u64) {
        self.total_analyzed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        if result.whitelisted {
            self.whitelisted.fetch_add(1, Ordering::Relaxed);
        }
        if !result.analysis_complete {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut counts) = self.by_severity.write() {
            *counts.entry(result.severity).or_insert(0) += 1;
        }
        if let Ok(mut counts) = self.by_source.write() {
            for issue in &result.issues {
                *counts.entry(issue.source).or_insert(0) += 1;
            }
        }
    }

    pub fn get_stats(&self) -> TelemetryStats {
        let total_analyzed = self.total_analyzed.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let verdicts_by_severity = self
            .by_severity
            .read()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), *v))
                    .collect()
            })
            .unwrap_or_default();

        let issues_by_source = self
            .by_source
            .read()
            .map(|counts| {
                counts
                    .iter()
                    .map(|(k, v)| (k.as_str().to_string(), *v))
                    .collect()
            })
            .unwrap_or_default();

        TelemetryStats {
            total_analyzed,
            whitelisted: self.whitelisted.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            verdicts_by_severity,
            issues_by_source,
            avg_latency_ms: if total_analyzed > 0 {
                total_latency as f64 / total_analyzed as f64
            } else {
                0.0
            },
            period_start: self.period_start,
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{Category, FunctionPath, Issue, Network};

    fn result(severity: Severity, whitelisted: bool, complete: bool) -> AnalysisResult {
        let mut r = AnalysisResult::empty(
            Network::Mainnet,
            FunctionPath::parse("0x1::coin::transfer").unwrap(),
            "0xabc".to_string(),
        );
        r.severity = severity;
        r.whitelisted = whitelisted;
        r.analysis_complete = complete;
        r
    }

    #[test]
    fn test_collector_counts() {
        let collector = TelemetryCollector::new();
        collector.record(&result(Severity::Low, true, true), 2);

        let mut critical = result(Severity::Critical, false, false);
        critical.issues.push(Issue::new(
            "bytecode:function:not_found",
            Category::Exploit,
            Severity::Critical,
            IssueSource::Onchain,
        ));
        collector.record(&critical, 40);

        let stats = collector.get_stats();
        assert_eq!(stats.total_analyzed, 2);
        assert_eq!(stats.whitelisted, 1);
        assert_eq!(stats.degraded, 1);
        assert_eq!(stats.verdicts_by_severity.get("CRITICAL"), Some(&1));
        assert_eq!(stats.issues_by_source.get("onchain"), Some(&1));
        assert_eq!(stats.avg_latency_ms, 21.0);
        assert!(stats.summary().contains("1 critical"));
    }

    #[test]
    fn test_empty_stats() {
        let stats = TelemetryCollector::default().get_stats();
        assert_eq!(stats.total_analyzed, 0);
        assert_eq!(stats.avg_latency_ms, 0.0);
    }
}
