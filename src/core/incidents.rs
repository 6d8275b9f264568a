//! Known-incident database.
//!
//! A static lookup table of addresses tied to past exploits and rug pulls,
//! loaded once from a JSON file (`INCIDENT_DB_PATH`). Matches are reported
//! against the called module, the value arguments and the type arguments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::core::context::{argument_addresses, type_argument_addresses};
use crate::core::sources::{EvidenceSource, SourcePriority};
use crate::models::errors::{ErrorCode, GuardianError, GuardianResult};
use crate::models::types::{
    normalize_address, AnalysisRequest, Category, Confidence, Issue, IssueSource, Severity,
};

const INCIDENT_ORIGIN: &str = "incident_db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub name: String,
    pub address: String,
    /// Restricts the match to one module
    #[serde(default)]
    pub module: Option<String>,
    /// Restricts the match to one function
    #[serde(default)]
    pub function: Option<String>,
    pub category: Category,
    pub severity: Severity,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub loss_usd: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct IncidentDatabase {
    /// Normalized address -> incidents
    by_address: HashMap<String, Vec<Incident>>,
}

impl IncidentDatabase {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_incidents(incidents: Vec<Incident>) -> Self {
        let mut by_address: HashMap<String, Vec<Incident>> = HashMap::new();
        for incident in incidents {
            match normalize_address(&incident.address) {
                Some(address) => by_address.entry(address).or_default().push(incident),
                None => warn!("⚠️ Skipping incident {} with bad address {}", incident.id, incident.address),
            }
        }
        Self { by_address }
    }

    pub fn from_json(raw: &str) -> GuardianResult<Self> {
        let incidents: Vec<Incident> = serde_json::from_str(raw).map_err(|e| {
            GuardianError::with_source(ErrorCode::ConfigInvalidValue, "Invalid incident database", e)
        })?;
        Ok(Self::from_incidents(incidents))
    }

    pub fn from_file(path: impl AsRef<Path>) -> GuardianResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let db = Self::from_json(&raw)?;
        info!("📚 Loaded {} incident addresses from {}", db.len(), path.as_ref().display());
        Ok(db)
    }

    /// Number of distinct flagged addresses
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    pub fn is_flagged(&self, address: &str) -> bool {
        normalize_address(address).map_or(false, |a| self.by_address.contains_key(&a))
    }

    fn incidents_at(&self, address: &str) -> &[Incident] {
        self.by_address.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lookup(&self, request: &AnalysisRequest) -> Vec<Issue> {
        let path = request.function();
        let mut issues = Vec::new();

        for incident in self.incidents_at(&path.address) {
            let module_ok = incident.module.as_deref().map_or(true, |m| m == path.module);
            let function_ok = incident.function.as_deref().map_or(true, |f| f == path.function);
            if module_ok && function_ok {
                issues.push(
                    incident_issue(incident, &format!("intel:incident:{}", incident.id), incident.severity)
                        .with_confidence(Confidence::VERY_HIGH)
                        .with_text(
                            format!("Known incident: {}", incident.name),
                            incident_description(incident),
                            "Do not interact with this contract.",
                        ),
                );
            }
        }

        for address in argument_addresses(request) {
            for incident in self.incidents_at(&address) {
                issues.push(
                    incident_issue(
                        incident,
                        &format!("intel:incident:{}:counterparty", incident.id),
                        incident.severity.min(Severity::High),
                    )
                    .with_confidence(Confidence::HIGH)
                    .with_text(
                        format!("Counterparty linked to {}", incident.name),
                        format!("Argument {} belongs to a known incident. {}", address, incident.description),
                        "Do not send assets to this address.",
                    ),
                );
            }
        }

        for address in type_argument_addresses(request) {
            for incident in self.incidents_at(&address) {
                issues.push(
                    incident_issue(
                        incident,
                        &format!("intel:incident:{}:type_argument", incident.id),
                        incident.severity,
                    )
                    .with_confidence(Confidence::HIGH)
                    .with_text(
                        format!("Type argument from {}", incident.name),
                        format!("A type argument is published by {}, linked to a known incident.", address),
                        "Verify every coin and object type in the request.",
                    ),
                );
            }
        }

        issues
    }
}

fn incident_issue(incident: &Incident, pattern_id: &str, severity: Severity) -> Issue {
    Issue::new(pattern_id, incident.category, severity, IssueSource::Pattern)
        .with_evidence(serde_json::json!({
            "incident": incident.id,
            "date": incident.date,
            "lossUsd": incident.loss_usd,
        }))
        .with_origin(INCIDENT_ORIGIN)
}

fn incident_description(incident: &Incident) -> String {
    match (&incident.date, incident.loss_usd) {
        (Some(date), Some(loss)) => format!("{} ({}, ~${:.0} lost)", incident.description, date, loss),
        (Some(date), None) => format!("{} ({})", incident.description, date),
        _ => incident.description.clone(),
    }
}

#[async_trait]
impl EvidenceSource for IncidentDatabase {
    fn name(&self) -> &'static str {
        "incident_db"
    }

    fn priority(&self) -> SourcePriority {
        SourcePriority::IncidentDb
    }

    async fn collect(&self, request: &AnalysisRequest) -> GuardianResult<Vec<Issue>> {
        Ok(self.lookup(request))
    }
}
