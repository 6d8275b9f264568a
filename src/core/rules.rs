//! Static rule table for the pattern engine.
//!
//! Rules are declared once and never mutated. Each one carries any subset of
//! matchers; the engine decides which one fires (see `core::patterns`).

use lazy_static::lazy_static;
use serde_json::Value;

use crate::models::errors::GuardianResult;
use crate::models::types::{normalize_address, AnalysisRequest, Category, Confidence, Severity};

/// Event-type regex, required or optional
#[derive(Debug, Clone)]
pub struct EventPattern {
    pub pattern: &'static str,
    pub required: bool,
}

impl EventPattern {
    pub const fn required(pattern: &'static str) -> Self {
        Self {
            pattern,
            required: true,
        }
    }

    pub const fn optional(pattern: &'static str) -> Self {
        Self {
            pattern,
            required: false,
        }
    }
}

/// Inclusive bounds on simulated gas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl GasRange {
    pub fn contains(&self, gas: u64) -> bool {
        self.min.map_or(true, |m| gas >= m) && self.max.map_or(true, |m| gas <= m)
    }
}

/// Outcome of a custom predicate; `severity` overrides the rule's base
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredicateHit {
    pub severity: Option<Severity>,
    pub confidence: Confidence,
}

pub type CustomPredicate = fn(&AnalysisRequest) -> GuardianResult<Option<PredicateHit>>;

#[derive(Debug, Clone)]
pub struct IssueTemplate {
    pub title: &'static str,
    pub description: &'static str,
    pub recommendation: &'static str,
}

#[derive(Clone)]
pub struct RuleDefinition {
    pub id: &'static str,
    pub category: Category,
    pub severity: Severity,
    pub function_patterns: Vec<&'static str>,
    pub module_patterns: Vec<&'static str>,
    pub event_patterns: Vec<EventPattern>,
    pub gas: Option<GasRange>,
    pub predicate: Option<CustomPredicate>,
    pub template: IssueTemplate,
}

impl RuleDefinition {
    fn new(id: &'static str, category: Category, severity: Severity, template: IssueTemplate) -> Self {
        Self {
            id,
            category,
            severity,
            function_patterns: Vec::new(),
            module_patterns: Vec::new(),
            event_patterns: Vec::new(),
            gas: None,
            predicate: None,
            template,
        }
    }

    pub fn functions(mut self, patterns: &[&'static str]) -> Self {
        self.function_patterns.extend_from_slice(patterns);
        self
    }

    pub fn modules(mut self, patterns: &[&'static str]) -> Self {
        self.module_patterns.extend_from_slice(patterns);
        self
    }

    pub fn events(mut self, patterns: &[EventPattern]) -> Self {
        self.event_patterns.extend_from_slice(patterns);
        self
    }

    pub fn gas(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.gas = Some(GasRange { min, max });
        self
    }

    pub fn predicate(mut self, predicate: CustomPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl std::fmt::Debug for RuleDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleDefinition")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("severity", &self.severity)
            .finish()
    }
}

/// Text used when a match names a rule that is not in the table
pub const GENERIC_TEMPLATE: IssueTemplate = IssueTemplate {
    title: "Suspicious pattern detected",
    description: "The call matched a known risk pattern.",
    recommendation: "Review the transaction carefully before signing.",
};

// ============================================
// CUSTOM PREDICATES
// ============================================

/// A coin type named like the framework coin but published elsewhere
fn counterfeit_coin_type(request: &AnalysisRequest) -> GuardianResult<Option<PredicateHit>> {
    for ty in request.type_arguments() {
        let head = ty.split('<').next().unwrap_or(ty);
        let parts: Vec<&str> = head.trim().split("::").collect();
        if let [address, module, name] = parts.as_slice() {
            let is_framework = normalize_address(address).as_deref() == Some("0x1");
            if !is_framework && *module == "aptos_coin" && *name == "AptosCoin" {
                return Ok(Some(PredicateHit {
                    severity: Some(Severity::Critical),
                    confidence: Confidence::VERY_HIGH,
                }));
            }
        }
    }
    Ok(None)
}

/// Simulation moves a `SignerCapability` resource
fn signer_capability_write(request: &AnalysisRequest) -> GuardianResult<Option<PredicateHit>> {
    let Some(sim) = request.simulation() else {
        return Ok(None);
    };
    let touched = sim.state_changes.iter().any(|c| {
        c.resource
            .as_deref()
            .map_or(false, |r| r.contains("SignerCapability"))
    });
    if !touched {
        return Ok(None);
    }
    // Writing the capability somewhere other than the sender is worse
    let foreign = sim.state_changes.iter().any(|c| {
        c.resource.as_deref().map_or(false, |r| r.contains("SignerCapability"))
            && c.address
                .as_deref()
                .and_then(normalize_address)
                .map_or(false, |a| a != request.sender())
    });
    Ok(Some(PredicateHit {
        severity: Some(if foreign { Severity::Critical } else { Severity::High }),
        confidence: Confidence::HIGH,
    }))
}

/// Many distinct recipients in one call
fn batch_recipients(request: &AnalysisRequest) -> GuardianResult<Option<PredicateHit>> {
    let recipients = request
        .arguments()
        .iter()
        .filter_map(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| s.starts_with("0x"))
                .count()
        })
        .max()
        .unwrap_or(0);
    Ok(match recipients {
        0..=9 => None,
        10..=49 => Some(PredicateHit {
            severity: None,
            confidence: Confidence::MEDIUM,
        }),
        _ => Some(PredicateHit {
            severity: Some(Severity::High),
            confidence: Confidence::HIGH,
        }),
    })
}

// ============================================
// RULE TABLE
// ============================================

lazy_static! {
    pub static ref RULES: Vec<RuleDefinition> = vec![
        RuleDefinition::new(
            "exploit:counterfeit_coin_type",
            Category::Exploit,
            Severity::High,
            IssueTemplate {
                title: "Counterfeit coin type",
                description: "A type argument imitates the native coin but is published outside the framework.",
                recommendation: "Do not sign. Verify the coin type address is 0x1.",
            },
        )
        .predicate(counterfeit_coin_type),
        RuleDefinition::new(
            "permission:signer_capability_transfer",
            Category::Permission,
            Severity::High,
            IssueTemplate {
                title: "Signer capability moved",
                description: "The simulated call writes a SignerCapability resource, which grants full control of an account.",
                recommendation: "Only sign if you intend to hand over control of the resource account.",
            },
        )
        .functions(&[r"(?i)signer_cap", r"(?i)retrieve_resource_account_cap"])
        .predicate(signer_capability_write),
        RuleDefinition::new(
            "rug:admin_drain",
            Category::RugPull,
            Severity::High,
            IssueTemplate {
                title: "Fund drain function",
                description: "The function name matches patterns used to sweep all funds out of a contract.",
                recommendation: "Confirm you are the owner of the funds being moved.",
            },
        )
        .functions(&[r"(?i)^(withdraw_all|drain\w*|emergency_withdraw|sweep\w*|rescue_funds)$"]),
        RuleDefinition::new(
            "permission:ownership_transfer",
            Category::Permission,
            Severity::High,
            IssueTemplate {
                title: "Ownership or admin change",
                description: "The call changes who controls the contract.",
                recommendation: "Verify the new owner address out-of-band.",
            },
        )
        .functions(&[r"(?i)(transfer_ownership|set_owner|set_admin|change_admin|update_admin)"]),
        RuleDefinition::new(
            "permission:code_upgrade",
            Category::Permission,
            Severity::Medium,
            IssueTemplate {
                title: "Code upgrade",
                description: "The call publishes or upgrades Move code.",
                recommendation: "Only sign upgrades you built or audited.",
            },
        )
        .functions(&[r"(?i)(publish_package|upgrade\w*|set_code)"]),
        RuleDefinition::new(
            "rug:unrestricted_mint",
            Category::RugPull,
            Severity::Medium,
            IssueTemplate {
                title: "Token minting",
                description: "The call mints new tokens, diluting existing holders.",
                recommendation: "Check who is allowed to mint and how much.",
            },
        )
        .functions(&[r"(?i)^mint(_to|_unlimited|_batch)?$"])
        .events(&[EventPattern::required(r"(?i)Mint(Event)?$")]),
        RuleDefinition::new(
            "exploit:flash_loan",
            Category::Exploit,
            Severity::High,
            IssueTemplate {
                title: "Flash loan",
                description: "The call borrows and repays within one transaction, a common exploit primitive.",
                recommendation: "Make sure you understand every step of the borrowed-funds flow.",
            },
        )
        .functions(&[r"(?i)flash_?loan"])
        .events(&[
            EventPattern::required(r"(?i)FlashLoan"),
            EventPattern::optional(r"(?i)Repay"),
        ]),
        RuleDefinition::new(
            "rug:liquidity_removal",
            Category::RugPull,
            Severity::High,
            IssueTemplate {
                title: "Liquidity removed",
                description: "The simulation removes pool liquidity.",
                recommendation: "Check the pool and the recipient of the withdrawn assets.",
            },
        )
        .events(&[
            EventPattern::required(r"(?i)(RemoveLiquidity|LiquidityRemoved)"),
            EventPattern::optional(r"(?i)Burn"),
            EventPattern::optional(r"(?i)Withdraw"),
        ]),
        RuleDefinition::new(
            "exploit:freeze_account",
            Category::Exploit,
            Severity::High,
            IssueTemplate {
                title: "Account freeze",
                description: "The simulation freezes a coin store, blocking transfers.",
                recommendation: "Do not sign unless you operate this coin.",
            },
        )
        .functions(&[r"(?i)^(freeze|freeze_coin_store|blacklist\w*)$"])
        .events(&[EventPattern::required(r"(?i)Freeze")]),
        RuleDefinition::new(
            "rug:airdrop_claim_module",
            Category::RugPull,
            Severity::Medium,
            IssueTemplate {
                title: "Airdrop claim lure",
                description: "The module name matches common fake-airdrop lures.",
                recommendation: "Verify the airdrop on the project's official channels.",
            },
        )
        .modules(&[r"(?i)::(airdrop\w*|claim_?rewards?|free_?mint|giveaway)$"]),
        RuleDefinition::new(
            "exploit:batch_transfer",
            Category::Exploit,
            Severity::Medium,
            IssueTemplate {
                title: "Batch transfer to many recipients",
                description: "One call sends assets to many addresses.",
                recommendation: "Check every recipient in the list.",
            },
        )
        .predicate(batch_recipients),
        RuleDefinition::new(
            "cost:excessive_gas",
            Category::ExcessiveCost,
            Severity::Medium,
            IssueTemplate {
                title: "Excessive gas",
                description: "The simulated call uses an unusually large amount of gas.",
                recommendation: "Lower the max gas amount or investigate why the call is so expensive.",
            },
        )
        .gas(Some(1_000_000), None),
    ];
}

pub fn find_rule(id: &str) -> Option<&'static RuleDefinition> {
    RULES.iter().find(|r| r.id == id)
}
