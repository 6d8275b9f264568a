//! Whitelist Module
//!
//! Fast path for high-volume framework calls that need no deep analysis.
//! The never-whitelist list always wins over the allow list, and the fast
//! path is refused when a type argument comes from a flagged publisher.

use tracing::{debug, warn};

use crate::core::context::type_argument_addresses;
use crate::core::incidents::IncidentDatabase;
use crate::models::types::{AnalysisRequest, FunctionPath};

/// Known-safe framework entry points. `*` matches any function of the module.
const ALLOW_LIST: &[&str] = &[
    "0x1::coin::transfer",
    "0x1::aptos_account::transfer",
    "0x1::aptos_account::transfer_coins",
    "0x1::aptos_account::create_account",
    "0x1::primary_fungible_store::transfer",
    "0x1::object::transfer",
];

/// Never fast-pathed, whatever the allow list says
const NEVER_WHITELIST: &[&str] = &[
    "0x1::code::publish_package_txn",
    "0x1::account::offer_signer_capability",
    "0x1::account::offer_rotation_capability",
    "0x1::account::rotate_authentication_key",
    "0x1::resource_account::*",
    "0x1::aptos_governance::*",
    "0x1::multisig_account::*",
    "0x1::object_code_deployment::*",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistDecision {
    Allowed,
    NotListed,
    /// Matched the never-whitelist override
    NeverWhitelist,
    /// Listed, but a type argument names a flagged address
    TypeArgumentFlagged(String),
}

impl WhitelistDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, WhitelistDecision::Allowed)
    }
}

fn owned(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone)]
pub struct Whitelist {
    allow: Vec<String>,
    never: Vec<String>,
}

impl Whitelist {
    /// Default framework lists
    pub fn new() -> Self {
        Self::with_entries(owned(ALLOW_LIST), owned(NEVER_WHITELIST))
    }

    pub fn with_entries(allow: Vec<String>, never: Vec<String>) -> Self {
        Self { allow, never }
    }

    /// No fast path at all
    pub fn empty() -> Self {
        Self::with_entries(Vec::new(), owned(NEVER_WHITELIST))
    }

    /// Decide the fast path. `incidents` vets the publishers of type arguments.
    pub fn check(&self, request: &AnalysisRequest, incidents: &IncidentDatabase) -> WhitelistDecision {
        let path = request.function();

        if self.never.iter().any(|e| entry_matches(e, path)) {
            debug!("🚫 {} is on the never-whitelist", path);
            return WhitelistDecision::NeverWhitelist;
        }
        if !self.allow.iter().any(|e| entry_matches(e, path)) {
            return WhitelistDecision::NotListed;
        }

        if let Some(flagged) = type_argument_addresses(request)
            .into_iter()
            .find(|a| incidents.is_flagged(a))
        {
            warn!("⚠️ Whitelist refused for {}: type argument from flagged {}", path, flagged);
            return WhitelistDecision::TypeArgumentFlagged(flagged);
        }

        WhitelistDecision::Allowed
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_matches(entry: &str, path: &FunctionPath) -> bool {
    match entry.strip_suffix("::*") {
        Some(module_id) => module_id == path.module_id(),
        None => entry == path.qualified(),
    }
}
