//! Pattern Matching Engine
//!
//! Evaluates every rule against a request. Per rule, matchers are tried in a
//! fixed order and the first one that matches decides the result:
//!
//! 1. custom predicate (severity may be adjusted, confidence from the predicate)
//! 2. function-name regex, on the qualified path and the bare name (MEDIUM)
//! 3. module regex (LOW)
//! 4. event patterns: every required pattern observed (HIGH, or VERY_HIGH
//!    when an optional pattern is observed too)
//! 5. gas range (HIGH)
//!
//! A rule that fails to evaluate is logged and skipped; the sweep continues.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::rules::{find_rule, RuleDefinition, GENERIC_TEMPLATE, RULES};
use crate::models::errors::{ErrorCode, GuardianError, GuardianResult};
use crate::models::types::{AnalysisRequest, Category, Confidence, Issue, IssueSource, Severity};

/// Which matcher produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    Predicate,
    FunctionName,
    Module,
    Events,
    Gas,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub rule_id: String,
    pub matched: bool,
    pub category: Category,
    pub severity: Severity,
    pub confidence: Confidence,
    pub matcher: MatcherKind,
}

/// Rule with its regexes compiled up front
struct CompiledRule {
    def: RuleDefinition,
    functions: Result<Vec<Regex>, regex::Error>,
    modules: Result<Vec<Regex>, regex::Error>,
    /// (regex, required)
    events: Result<Vec<(Regex, bool)>, regex::Error>,
}

impl CompiledRule {
    fn compile(def: RuleDefinition) -> Self {
        let functions = def.function_patterns.iter().map(|p| Regex::new(p)).collect();
        let modules = def.module_patterns.iter().map(|p| Regex::new(p)).collect();
        let events = def
            .event_patterns
            .iter()
            .map(|e| Regex::new(e.pattern).map(|re| (re, e.required)))
            .collect();
        Self {
            def,
            functions,
            modules,
            events,
        }
    }
}

fn invalid_regex(rule: &str, err: &regex::Error) -> GuardianError {
    GuardianError::new(
        ErrorCode::ConfigInvalidValue,
        format!("rule {} has an invalid pattern: {}", rule, err),
    )
}

pub struct PatternEngine {
    rules: Vec<CompiledRule>,
}

impl PatternEngine {
    /// Engine over the built-in rule table
    pub fn new() -> Self {
        Self::with_rules(RULES.iter().cloned().collect())
    }

    pub fn with_rules(rules: Vec<RuleDefinition>) -> Self {
        Self {
            rules: rules.into_iter().map(CompiledRule::compile).collect(),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate one rule
    fn match_rule(rule: &CompiledRule, request: &AnalysisRequest) -> GuardianResult<Option<MatchResult>> {
        let def = &rule.def;
        let hit = |matcher, severity, confidence| {
            Some(MatchResult {
                rule_id: def.id.to_string(),
                matched: true,
                category: def.category,
                severity,
                confidence,
                matcher,
            })
        };

        if let Some(predicate) = def.predicate {
            if let Some(p) = predicate(request)? {
                return Ok(hit(
                    MatcherKind::Predicate,
                    p.severity.unwrap_or(def.severity),
                    p.confidence,
                ));
            }
        }

        let functions = rule.functions.as_ref().map_err(|e| invalid_regex(def.id, e))?;
        if !functions.is_empty() {
            let qualified = request.function().qualified();
            let bare = &request.function().function;
            if functions.iter().any(|re| re.is_match(&qualified) || re.is_match(bare)) {
                return Ok(hit(MatcherKind::FunctionName, def.severity, Confidence::MEDIUM));
            }
        }

        let modules = rule.modules.as_ref().map_err(|e| invalid_regex(def.id, e))?;
        if !modules.is_empty() {
            let module_id = request.function().module_id();
            if modules.iter().any(|re| re.is_match(&module_id)) {
                return Ok(hit(MatcherKind::Module, def.severity, Confidence::LOW));
            }
        }

        let events = rule.events.as_ref().map_err(|e| invalid_regex(def.id, e))?;
        if !events.is_empty() {
            if let Some(sim) = request.simulation() {
                let observed: Vec<&str> = sim.events.iter().map(|e| e.event_type.as_str()).collect();
                if let Some(confidence) = events_match(events, &observed) {
                    return Ok(hit(MatcherKind::Events, def.severity, confidence));
                }
            }
        }

        if let (Some(range), Some(sim)) = (def.gas, request.simulation()) {
            if range.contains(sim.gas_used) {
                return Ok(hit(MatcherKind::Gas, def.severity, Confidence::HIGH));
            }
        }

        Ok(None)
    }

    /// Evaluate every rule; failing rules are skipped
    pub fn sweep(&self, request: &AnalysisRequest) -> Vec<MatchResult> {
        let mut matches = Vec::new();
        for rule in &self.rules {
            match Self::match_rule(rule, request) {
                Ok(Some(m)) => {
                    debug!("🎯 Rule {} matched via {:?}", m.rule_id, m.matcher);
                    matches.push(m);
                }
                Ok(None) => {}
                Err(e) => warn!("⚠️ Rule {} skipped: {}", rule.def.id, e),
            }
        }
        matches
    }

    /// Sweep and convert matches into issues
    pub fn analyze(&self, request: &AnalysisRequest) -> Vec<Issue> {
        self.sweep(request).iter().map(|m| self.to_issue(m)).collect()
    }

    /// Issue for a match, using the rule's template or the generic one
    pub fn to_issue(&self, m: &MatchResult) -> Issue {
        let template = self
            .rules
            .iter()
            .find(|r| r.def.id == m.rule_id)
            .map(|r| r.def.template.clone())
            .or_else(|| find_rule(&m.rule_id).map(|r| r.template.clone()))
            .unwrap_or(GENERIC_TEMPLATE);

        Issue::new(m.rule_id.clone(), m.category, m.severity, IssueSource::Pattern)
            .with_text(template.title, template.description, template.recommendation)
            .with_confidence(m.confidence)
            .with_evidence(serde_json::json!({ "matcher": m.matcher }))
    }
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Every required pattern must be observed and at least one must be
/// declared. Optional patterns never block a match; observing one
/// corroborates it.
fn events_match(patterns: &[(Regex, bool)], observed: &[&str]) -> Option<Confidence> {
    let seen = |re: &Regex| observed.iter().any(|e| re.is_match(e));

    let mut required = patterns.iter().filter(|(_, r)| *r).peekable();
    required.peek()?;
    if !required.all(|(re, _)| seen(re)) {
        return None;
    }

    let corroborated = patterns.iter().any(|(re, r)| !*r && seen(re));
    Some(if corroborated {
        Confidence::VERY_HIGH
    } else {
        Confidence::HIGH
    })
}
