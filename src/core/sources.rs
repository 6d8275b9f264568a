//! Evidence sources and fault isolation.
//!
//! Every source returns `GuardianResult<Vec<Issue>>`. The orchestrator runs
//! them through [`isolate`], which turns errors, panics and deadline
//! overruns into zero issues plus a typed warning, and then concatenates the
//! reports in [`SourcePriority`] order.

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::models::errors::{ErrorCode, GuardianError, GuardianResult};
use crate::models::types::{AnalysisRequest, Issue, Warning, WarningKind};

/// Merge order. Lower sorts first and wins display ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePriority {
    /// Live threat feeds
    ThreatIntel,
    /// Known-incident database
    IncidentDb,
    /// Ledger-derived facts (module/function missing, shape mismatch)
    GroundTruth,
    /// LLM-backed analyzer
    Semantic,
    /// Rule engine and ABI pattern scans
    Deterministic,
    /// Informational argument/simulation checks
    Context,
}

/// Independent analyzer contributing issues
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> SourcePriority;

    async fn collect(&self, request: &AnalysisRequest) -> GuardianResult<Vec<Issue>>;
}

/// What one source contributed
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub name: String,
    pub priority: SourcePriority,
    pub issues: Vec<Issue>,
    pub warning: Option<Warning>,
    pub duration_ms: u64,
}

impl SourceReport {
    pub fn ok(name: &str, priority: SourcePriority, issues: Vec<Issue>) -> Self {
        Self {
            name: name.to_string(),
            priority,
            issues,
            warning: None,
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.warning.is_none()
    }
}

/// Warning for a failed source, typed by the error code
pub fn warning_for(source: &str, err: &GuardianError) -> Warning {
    let kind = match err.code {
        ErrorCode::CircuitOpen => WarningKind::CircuitOpen,
        ErrorCode::SourceTimeout => WarningKind::SourceTimeout,
        _ => WarningKind::SourceFailed,
    };
    Warning::new(kind, source, err.to_string())
}

/// Run one source under a deadline. Never fails.
///
/// A source that overruns is dropped; nothing it produced afterwards can be
/// merged.
pub async fn isolate<F>(name: &str, priority: SourcePriority, budget: Duration, source: F) -> SourceReport
where
    F: Future<Output = GuardianResult<Vec<Issue>>>,
{
    let started = Instant::now();
    let outcome = tokio::time::timeout(budget, AssertUnwindSafe(source).catch_unwind()).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let (issues, warning) = match outcome {
        Ok(Ok(Ok(issues))) => {
            debug!("📥 {} contributed {} issues in {}ms", name, issues.len(), duration_ms);
            (issues, None)
        }
        Ok(Ok(Err(e))) => {
            warn!("⚠️ Source {} failed: {}", name, e);
            (Vec::new(), Some(warning_for(name, &e)))
        }
        Ok(Err(panic)) => {
            let e = GuardianError::source_failed(format!("{} panicked: {}", name, panic_message(&*panic)));
            warn!("💥 {}", e);
            (Vec::new(), Some(warning_for(name, &e)))
        }
        Err(_) => {
            warn!("⏱️ Source {} abandoned after {}ms", name, duration_ms);
            let e = GuardianError::source_timeout(name);
            (Vec::new(), Some(warning_for(name, &e)))
        }
    };

    SourceReport {
        name: name.to_string(),
        priority,
        issues,
        warning,
        duration_ms,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Concatenate issues in priority order (stable within a tier) and collect warnings
pub fn merge(mut reports: Vec<SourceReport>) -> (Vec<Issue>, Vec<Warning>) {
    reports.sort_by_key(|r| r.priority);
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    for report in reports {
        issues.extend(report.issues);
        warnings.extend(report.warning);
    }
    (issues, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{Category, IssueSource, Severity};

    fn issue(id: &str) -> Issue {
        Issue::new(id, Category::Exploit, Severity::Low, IssueSource::Pattern)
    }

    #[tokio::test]
    async fn test_isolate_success() {
        let report = isolate("ctx", SourcePriority::Context, Duration::from_secs(1), async {
            Ok(vec![issue("a")])
        })
        .await;
        assert!(report.succeeded());
        assert_eq!(report.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_isolate_error_becomes_warning() {
        let report = isolate("feed", SourcePriority::ThreatIntel, Duration::from_secs(1), async {
            Err(GuardianError::new(ErrorCode::CircuitOpen, "open"))
        })
        .await;
        assert!(report.issues.is_empty());
        assert_eq!(report.warning.unwrap().kind, WarningKind::CircuitOpen);
    }

    #[tokio::test]
    async fn test_isolate_abandons_slow_source() {
        let report = isolate("slow", SourcePriority::Semantic, Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![issue("late")])
        })
        .await;
        assert!(report.issues.is_empty());
        let warning = report.warning.unwrap();
        assert_eq!(warning.kind, WarningKind::SourceTimeout);
        assert_eq!(warning.source, "slow");
    }

    #[tokio::test]
    async fn test_isolate_contains_panicking_source() {
        let report = isolate("broken", SourcePriority::Context, Duration::from_secs(1), exploding()).await;
        assert!(report.issues.is_empty());
        let warning = report.warning.unwrap();
        assert_eq!(warning.kind, WarningKind::SourceFailed);
        assert!(warning.message.contains("index out of range"));
    }

    async fn exploding() -> GuardianResult<Vec<Issue>> {
        panic!("index out of range")
    }

    #[test]
    fn test_merge_orders_by_priority() {
        let reports = vec![
            SourceReport::ok("ctx", SourcePriority::Context, vec![issue("ctx")]),
            SourceReport::ok("rules", SourcePriority::Deterministic, vec![issue("rule1"), issue("rule2")]),
            SourceReport::ok("intel", SourcePriority::ThreatIntel, vec![issue("intel")]),
            SourceReport::ok("db", SourcePriority::IncidentDb, vec![issue("db")]),
        ];
        let (issues, warnings) = merge(reports);
        let ids: Vec<&str> = issues.iter().map(|i| i.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["intel", "db", "rule1", "rule2", "ctx"]);
        assert!(warnings.is_empty());
    }
}
