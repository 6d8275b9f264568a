//! On-chain Verifier Module
//!
//! Fetches the real module interface from the fullnode and checks that the
//! claimed function exists with the claimed shape. Its output is both an
//! evidence source (ABI findings) and ground truth for later stages.
//!
//! Ground-truth findings (not found, shape mismatch) are derived from the
//! ledger, not from the request, and cannot be gamed by the caller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::config::dependency;
use crate::models::errors::GuardianError;
use crate::models::types::{
    AnalysisRequest, Category, Confidence, Issue, IssueSource, Severity, VerificationStatus,
    Warning, WarningKind,
};
use crate::providers::aptos::{is_signer_type, ModuleFetcher, MoveFunction, MoveModule};
use crate::utils::circuit_breaker::{CircuitBreaker, CircuitError};
use crate::utils::constants::{is_framework_address, DEFAULT_DEADLINE_MS};

// ============================================
// DANGEROUS-NAME CATEGORIES
// ============================================

/// Function-name categories with their own severity policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerCategory {
    CriticalMutator,
    FundHandler,
    UnlimitedAccess,
}

const CRITICAL_MUTATOR_NAMES: &[&str] = &[
    "set_admin",
    "set_owner",
    "transfer_ownership",
    "upgrade",
    "destroy",
    "pause",
    "freeze",
    "blacklist",
    "set_fee",
    "update_config",
    "migrate",
];

const FUND_HANDLER_NAMES: &[&str] = &[
    "withdraw",
    "drain",
    "sweep",
    "rescue",
    "transfer_all",
    "claim_all",
    "emergency",
];

const UNLIMITED_ACCESS_NAMES: &[&str] = &[
    "unlimited",
    "approve_all",
    "infinite",
    "bypass",
    "skip_check",
    "unchecked",
];

impl DangerCategory {
    pub const ALL: [DangerCategory; 3] = [
        DangerCategory::CriticalMutator,
        DangerCategory::FundHandler,
        DangerCategory::UnlimitedAccess,
    ];

    fn names(&self) -> &'static [&'static str] {
        match self {
            DangerCategory::CriticalMutator => CRITICAL_MUTATOR_NAMES,
            DangerCategory::FundHandler => FUND_HANDLER_NAMES,
            DangerCategory::UnlimitedAccess => UNLIMITED_ACCESS_NAMES,
        }
    }

    /// First category whose keyword appears in `function_name`
    pub fn classify(function_name: &str) -> Option<DangerCategory> {
        let lower = function_name.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.names().iter().any(|k| lower.contains(k)))
    }

    pub fn severity_for(&self, function: &MoveFunction) -> Severity {
        match self {
            DangerCategory::CriticalMutator if function.is_entry => Severity::Critical,
            DangerCategory::CriticalMutator => Severity::High,
            DangerCategory::FundHandler if function.is_public() && function.is_entry => Severity::High,
            DangerCategory::FundHandler => Severity::Medium,
            DangerCategory::UnlimitedAccess => Severity::High,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            DangerCategory::CriticalMutator | DangerCategory::UnlimitedAccess => Category::Permission,
            DangerCategory::FundHandler => Category::RugPull,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DangerCategory::CriticalMutator => "critical_mutator",
            DangerCategory::FundHandler => "fund_handler",
            DangerCategory::UnlimitedAccess => "unlimited_access",
        }
    }
}

// ============================================
// REPORT
// ============================================

#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    pub module_exists: bool,
    pub function_exists: bool,
    /// Real ABI entry for the called function
    pub function: Option<MoveFunction>,
    /// Findings derived from ledger facts (not found, shape mismatch)
    pub ground_truth: Vec<Issue>,
    /// ABI dangerous-pattern findings
    pub findings: Vec<Issue>,
    pub warning: Option<Warning>,
}

impl VerificationReport {
    pub fn failed(warning: Warning) -> Self {
        Self {
            status: VerificationStatus::Error,
            module_exists: false,
            function_exists: false,
            function: None,
            ground_truth: Vec::new(),
            findings: Vec::new(),
            warning: Some(warning),
        }
    }
}

// ============================================
// VERIFIER
// ============================================

pub struct OnchainVerifier {
    fetcher: Arc<dyn ModuleFetcher>,
    breaker: CircuitBreaker,
}

impl OnchainVerifier {
    pub fn new(fetcher: Arc<dyn ModuleFetcher>, breaker: CircuitBreaker) -> Self {
        Self { fetcher, breaker }
    }

    pub async fn verify(&self, request: &AnalysisRequest) -> VerificationReport {
        self.verify_within(request, Duration::from_millis(DEFAULT_DEADLINE_MS)).await
    }

    /// Verify with the fullnode fetch bounded by `limit`. An overrun counts
    /// against the `chain_rpc` breaker.
    pub async fn verify_within(&self, request: &AnalysisRequest, limit: Duration) -> VerificationReport {
        let path = request.function();
        let fetched = self
            .breaker
            .call_within(limit, || {
                self.fetcher.fetch_module(request.network(), &path.address, &path.module)
            })
            .await;

        let module = match fetched {
            Ok(Some(m)) => m.abi,
            Ok(None) => {
                warn!("🚨 Module {} not found on {}", path.module_id(), request.network().as_str());
                return VerificationReport {
                    status: VerificationStatus::ModuleNotFound,
                    module_exists: false,
                    function_exists: false,
                    function: None,
                    ground_truth: vec![module_not_found(request)],
                    findings: Vec::new(),
                    warning: None,
                };
            }
            Err(CircuitError::Open { retry_after, .. }) => {
                return VerificationReport::failed(Warning::new(
                    WarningKind::CircuitOpen,
                    dependency::CHAIN_RPC,
                    format!(
                        "Fullnode circuit open, retry in {}s; function unverified",
                        retry_after.as_secs()
                    ),
                ));
            }
            Err(CircuitError::TimedOut { after, .. }) => {
                warn!("⏱️ On-chain verification of {} abandoned after {}ms", path, after.as_millis());
                return VerificationReport::failed(Warning::new(
                    WarningKind::SourceTimeout,
                    dependency::CHAIN_RPC,
                    "On-chain verification did not finish in time; function unverified",
                ));
            }
            Err(CircuitError::Inner(e)) => {
                warn!("⚠️ Verification of {} failed: {}", path, e);
                return VerificationReport::failed(verification_warning(&e));
            }
        };

        self.check_module(request, &module)
    }

    /// Checks against an already-fetched module
    pub fn check_module(&self, request: &AnalysisRequest, module: &MoveModule) -> VerificationReport {
        let path = request.function();
        let mut findings = scan_module(module, &path.function, &path.address);

        let Some(function) = module.function(&path.function).cloned() else {
            warn!("🚨 {} does not expose {}", path.module_id(), path.function);
            return VerificationReport {
                status: VerificationStatus::FunctionNotFound,
                module_exists: true,
                function_exists: false,
                function: None,
                ground_truth: vec![function_not_found(request, module)],
                findings,
                warning: None,
            };
        };

        let ground_truth = check_shape(request, &function);
        if let Some(danger) = DangerCategory::classify(&function.name) {
            findings.insert(0, dangerous_function(danger, &function, true));
        }

        info!(
            "✅ Verified {} ({} ground-truth, {} ABI findings)",
            path,
            ground_truth.len(),
            findings.len()
        );

        VerificationReport {
            status: VerificationStatus::Verified,
            module_exists: true,
            function_exists: true,
            function: Some(function),
            ground_truth,
            findings,
            warning: None,
        }
    }
}

fn verification_warning(err: &GuardianError) -> Warning {
    Warning::new(
        WarningKind::VerificationError,
        dependency::CHAIN_RPC,
        format!("On-chain verification failed ({}); function unverified", err.code_str()),
    )
}

fn module_not_found(request: &AnalysisRequest) -> Issue {
    let path = request.function();
    Issue::new(
        "bytecode:module:not_found",
        Category::Exploit,
        Severity::Critical,
        IssueSource::Onchain,
    )
    .with_text(
        "Module does not exist",
        format!(
            "{} is not published on {}. The transaction targets code that does not exist.",
            path.module_id(),
            request.network().as_str()
        ),
        "Do not sign. The request does not match the chain.",
    )
    .with_confidence(Confidence::VERY_HIGH)
    .with_evidence(serde_json::json!({ "module": path.module_id() }))
}

fn function_not_found(request: &AnalysisRequest, module: &MoveModule) -> Issue {
    let path = request.function();
    let available: Vec<&str> = module
        .exposed_functions
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    Issue::new(
        "bytecode:function:not_found",
        Category::Exploit,
        Severity::Critical,
        IssueSource::Onchain,
    )
    .with_text(
        "Function does not exist",
        format!(
            "{} does not expose a function named {}. The request misrepresents what will run.",
            path.module_id(),
            path.function
        ),
        "Do not sign. The claimed function is not on chain.",
    )
    .with_confidence(Confidence::VERY_HIGH)
    .with_evidence(serde_json::json!({
        "function": path.function,
        "available": available,
    }))
}

/// Claimed call shape vs. the real signature
fn check_shape(request: &AnalysisRequest, function: &MoveFunction) -> Vec<Issue> {
    let mut issues = Vec::new();

    if !function.is_entry {
        issues.push(
            Issue::new(
                "bytecode:function:not_entry",
                Category::Exploit,
                Severity::High,
                IssueSource::Onchain,
            )
            .with_text(
                "Function is not an entry function",
                format!("{} cannot be called directly by a transaction.", function.name),
                "The request is malformed or hides a different call. Do not sign.",
            )
            .with_confidence(Confidence::HIGH),
        );
    }

    let expected_types = function.generic_type_params.len();
    let supplied_types = request.type_arguments().len();
    if supplied_types != expected_types {
        issues.push(
            Issue::new(
                "bytecode:function:type_argument_mismatch",
                Category::Exploit,
                Severity::High,
                IssueSource::Onchain,
            )
            .with_text(
                "Type arguments do not match",
                format!(
                    "{} takes {} type arguments, the request supplies {}.",
                    function.name, expected_types, supplied_types
                ),
                "Check the coin or object types in the request.",
            )
            .with_confidence(Confidence::HIGH)
            .with_evidence(serde_json::json!({
                "expected": expected_types,
                "supplied": supplied_types,
            })),
        );
    }

    // Value arguments are only compared when the caller supplied some
    let expected_args = function.value_params().count();
    let supplied_args = request.arguments().len();
    if supplied_args > 0 && supplied_args != expected_args {
        issues.push(
            Issue::new(
                "bytecode:function:argument_mismatch",
                Category::Exploit,
                Severity::High,
                IssueSource::Onchain,
            )
            .with_text(
                "Arguments do not match",
                format!(
                    "{} takes {} arguments, the request supplies {}.",
                    function.name, expected_args, supplied_args
                ),
                "The displayed arguments may not be what executes. Do not sign.",
            )
            .with_confidence(Confidence::HIGH)
            .with_evidence(serde_json::json!({
                "expected": expected_args,
                "supplied": supplied_args,
                "params": function.params,
            })),
        );
    }

    issues
}

/// Dangerous-name finding, severity from the category policy
fn dangerous_function(danger: DangerCategory, function: &MoveFunction, called: bool) -> Issue {
    let kind = danger.as_str().replace('_', " ");
    let exposure = format!(
        "{} is {}{}.",
        function.name,
        if function.is_public() { "public" } else { "not public" },
        if function.is_entry { " and directly callable" } else { "" }
    );
    let (title, recommendation) = if called {
        (
            format!("Called function is a {}", kind),
            "Make sure you intend to call a privileged function.",
        )
    } else {
        (
            format!("Module exposes a {}", kind),
            "Check who controls this function before trusting the module.",
        )
    };

    Issue::new(
        format!("bytecode:dangerous:{}:{}", danger.as_str(), function.name),
        danger.category(),
        danger.severity_for(function),
        IssueSource::Onchain,
    )
    .with_text(title, exposure, recommendation)
    .with_confidence(if called { Confidence::HIGH } else { Confidence::MEDIUM })
    .with_evidence(serde_json::json!({
        "function": function.name,
        "called": called,
        "isEntry": function.is_entry,
        "visibility": function.visibility,
    }))
}

fn returns_capability(ty: &str) -> bool {
    let name = ty.rsplit("::").next().unwrap_or(ty);
    name.ends_with("Capability") || name.ends_with("Cap")
}

/// Module-wide ABI scan. Framework modules are trusted here.
fn scan_module(module: &MoveModule, called: &str, address: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    if is_framework_address(address) {
        return issues;
    }

    for function in module.exposed_functions.iter().filter(|f| f.name != called) {
        if let Some(danger) = DangerCategory::classify(&function.name) {
            issues.push(dangerous_function(danger, function, false));
        }
    }

    for function in &module.exposed_functions {
        let leaks_signer = function.returns.iter().any(|r| is_signer_type(r));
        let leaks_cap = function.returns.iter().any(|r| returns_capability(r));
        if !(leaks_signer || leaks_cap) {
            continue;
        }
        let kind = if leaks_signer { "signer" } else { "capability" };
        issues.push(
            Issue::new(
                format!("bytecode:function:returns_{}:{}", kind, function.name),
                Category::Permission,
                if function.is_public() { Severity::High } else { Severity::Medium },
                IssueSource::Onchain,
            )
            .with_text(
                format!("Function returns a {}", kind),
                format!(
                    "{} hands out a {} to its caller, granting authority beyond this call.",
                    function.name, kind
                ),
                "Check which modules can obtain this authority.",
            )
            .with_confidence(Confidence::MEDIUM)
            .with_evidence(serde_json::json!({ "returns": function.returns })),
        );
    }

    for st in &module.structs {
        if st.is_native {
            continue;
        }
        if st.has_ability("copy") && !st.has_ability("drop") {
            issues.push(
                Issue::new(
                    format!("bytecode:struct:copy_without_drop:{}", st.name),
                    Category::Exploit,
                    Severity::Medium,
                    IssueSource::Onchain,
                )
                .with_text(
                    "Copyable struct without drop",
                    format!("{} can be duplicated but not discarded.", st.name),
                    "Check whether values of this type represent assets.",
                )
                .with_confidence(Confidence::MEDIUM)
                .with_evidence(serde_json::json!({ "abilities": st.abilities })),
            );
        }
        if st.has_ability("key") && !st.has_ability("store") {
            issues.push(
                Issue::new(
                    format!("bytecode:struct:key_without_store:{}", st.name),
                    Category::Permission,
                    Severity::Low,
                    IssueSource::Onchain,
                )
                .with_text(
                    "Non-transferable resource",
                    format!("{} is a resource that cannot be moved between accounts.", st.name),
                    "Assets of this type may be locked to the issuing module.",
                )
                .with_confidence(Confidence::LOW)
                .with_evidence(serde_json::json!({ "abilities": st.abilities })),
            );
        }
    }

    if !module.friends.is_empty() {
        issues.push(
            Issue::new(
                "bytecode:module:friends",
                Category::Permission,
                Severity::Low,
                IssueSource::Onchain,
            )
            .with_text(
                "Module declares friends",
                format!(
                    "{} other modules may call its friend functions.",
                    module.friends.len()
                ),
                "Review the friend modules as part of the trusted surface.",
            )
            .with_confidence(Confidence::LOW)
            .with_evidence(serde_json::json!({ "friends": module.friends })),
        );
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::GuardianResult;
    use crate::models::types::{FunctionPath, Network};
    use crate::providers::aptos::{GenericTypeParam, MoveModuleBytecode, MoveStruct, Visibility};
    use crate::utils::cache::MemoryStore;
    use async_trait::async_trait;

    struct FixedFetcher(GuardianResult<Option<MoveModuleBytecode>>);

    #[async_trait]
    impl ModuleFetcher for FixedFetcher {
        async fn fetch_module(
            &self,
            _: Network,
            _: &str,
            _: &str,
        ) -> GuardianResult<Option<MoveModuleBytecode>> {
            match &self.0 {
                Ok(m) => Ok(m.clone()),
                Err(e) => Err(GuardianError::new(e.code, e.message.clone())),
            }
        }
    }

    fn func(name: &str, is_entry: bool, visibility: Visibility) -> MoveFunction {
        MoveFunction {
            name: name.to_string(),
            visibility,
            is_entry,
            is_view: false,
            generic_type_params: Vec::new(),
            params: vec!["&signer".to_string(), "u64".to_string()],
            returns: Vec::new(),
        }
    }

    fn module(address: &str, functions: Vec<MoveFunction>) -> MoveModuleBytecode {
        MoveModuleBytecode {
            bytecode: "0x".to_string(),
            abi: MoveModule {
                address: address.to_string(),
                name: "vault".to_string(),
                friends: Vec::new(),
                exposed_functions: functions,
                structs: Vec::new(),
            },
        }
    }

    fn verifier(result: GuardianResult<Option<MoveModuleBytecode>>) -> OnchainVerifier {
        let breaker = CircuitBreaker::new(dependency::CHAIN_RPC, Arc::new(MemoryStore::new()));
        OnchainVerifier::new(Arc::new(FixedFetcher(result)), breaker)
    }

    fn request(path: &str) -> AnalysisRequest {
        AnalysisRequest::new(Network::Mainnet, "0xa11ce", FunctionPath::parse(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_module_not_found() {
        let report = verifier(Ok(None)).verify(&request("0xcafe::vault::deposit")).await;
        assert_eq!(report.status, VerificationStatus::ModuleNotFound);
        assert!(!report.module_exists);
        assert_eq!(report.ground_truth.len(), 1);
        assert_eq!(report.ground_truth[0].pattern_id, "bytecode:module:not_found");
        assert_eq!(report.ground_truth[0].severity, Severity::Critical);
        assert!(report.findings.is_empty());
    }

    #[tokio::test]
    async fn test_function_not_found() {
        let m = module("0xcafe", vec![func("deposit", true, Visibility::Public)]);
        let report = verifier(Ok(Some(m))).verify(&request("0xcafe::vault::withdraw_all")).await;
        assert_eq!(report.status, VerificationStatus::FunctionNotFound);
        assert!(report.module_exists);
        assert!(!report.function_exists);
        let critical: Vec<&Issue> = report
            .ground_truth
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].pattern_id, "bytecode:function:not_found");
        assert_eq!(critical[0].confidence, Confidence::VERY_HIGH);
    }

    #[tokio::test]
    async fn test_fetch_error_is_a_warning() {
        let report = verifier(Err(GuardianError::rpc_status(500, "http://node")))
            .verify(&request("0xcafe::vault::deposit"))
            .await;
        assert_eq!(report.status, VerificationStatus::Error);
        assert!(report.ground_truth.is_empty());
        assert_eq!(report.warning.unwrap().kind, WarningKind::VerificationError);
    }

    #[tokio::test]
    async fn test_verified_with_shape_checks() {
        let mut f = func("deposit", false, Visibility::Public);
        f.generic_type_params = vec![GenericTypeParam { constraints: vec![] }];
        let m = module("0xcafe", vec![f]);
        let req = request("0xcafe::vault::deposit")
            .with_arguments(vec![serde_json::json!("1"), serde_json::json!("2")]);
        let report = verifier(Ok(Some(m))).verify(&req).await;

        assert_eq!(report.status, VerificationStatus::Verified);
        let ids: Vec<&str> = report.ground_truth.iter().map(|i| i.pattern_id.as_str()).collect();
        assert!(ids.contains(&"bytecode:function:not_entry"));
        assert!(ids.contains(&"bytecode:function:type_argument_mismatch"));
        assert!(ids.contains(&"bytecode:function:argument_mismatch"));
    }

    #[test]
    fn test_danger_policy() {
        let entry = func("set_admin", true, Visibility::Public);
        let inner = func("set_admin", false, Visibility::Public);
        assert_eq!(DangerCategory::classify("set_admin"), Some(DangerCategory::CriticalMutator));
        assert_eq!(DangerCategory::CriticalMutator.severity_for(&entry), Severity::Critical);
        assert_eq!(DangerCategory::CriticalMutator.severity_for(&inner), Severity::High);

        let public_entry = func("withdraw", true, Visibility::Public);
        let friend_entry = func("withdraw", true, Visibility::Friend);
        assert_eq!(DangerCategory::FundHandler.severity_for(&public_entry), Severity::High);
        assert_eq!(DangerCategory::FundHandler.severity_for(&friend_entry), Severity::Medium);

        assert_eq!(DangerCategory::classify("approve_all_unchecked"), Some(DangerCategory::UnlimitedAccess));
        assert_eq!(DangerCategory::UnlimitedAccess.severity_for(&inner), Severity::High);
        assert_eq!(DangerCategory::classify("transfer"), None);
    }

    #[tokio::test]
    async fn test_called_dangerous_function_and_siblings() {
        let m = module(
            "0xcafe",
            vec![
                func("set_admin", true, Visibility::Public),
                func("emergency_withdraw", true, Visibility::Public),
                func("sweep_fees", false, Visibility::Public),
            ],
        );
        let req = request("0xcafe::vault::set_admin").with_arguments(vec![serde_json::json!("1")]);
        let report = verifier(Ok(Some(m))).verify(&req).await;

        let called = &report.findings[0];
        assert_eq!(called.pattern_id, "bytecode:dangerous:critical_mutator:set_admin");
        assert_eq!(called.severity, Severity::Critical);

        let severity_of = |id: &str| report.findings.iter().find(|i| i.pattern_id == id).map(|i| i.severity);
        assert_eq!(severity_of("bytecode:dangerous:fund_handler:emergency_withdraw"), Some(Severity::High));
        assert_eq!(severity_of("bytecode:dangerous:fund_handler:sweep_fees"), Some(Severity::Medium));
    }

    #[tokio::test]
    async fn test_safe_call_still_reports_entry_set_admin() {
        let m = module(
            "0xcafe",
            vec![
                func("deposit", true, Visibility::Public),
                func("set_admin", true, Visibility::Public),
                func("approve_unlimited", false, Visibility::Friend),
            ],
        );
        let req = request("0xcafe::vault::deposit").with_arguments(vec![serde_json::json!("1")]);
        let report = verifier(Ok(Some(m))).verify(&req).await;

        let admin = report
            .findings
            .iter()
            .find(|i| i.pattern_id == "bytecode:dangerous:critical_mutator:set_admin")
            .unwrap();
        assert_eq!(admin.severity, Severity::Critical);
        assert_eq!(admin.evidence["called"], false);

        let unlimited = report
            .findings
            .iter()
            .find(|i| i.pattern_id == "bytecode:dangerous:unlimited_access:approve_unlimited")
            .unwrap();
        assert_eq!(unlimited.severity, Severity::High);
        assert!(report.ground_truth.is_empty());
    }

    #[tokio::test]
    async fn test_struct_and_return_scans() {
        let mut m = module("0xcafe", vec![func("deposit", true, Visibility::Public)]);
        let mut leak = func("get_signer", false, Visibility::Public);
        leak.returns = vec!["signer".to_string()];
        m.abi.exposed_functions.push(leak);
        m.abi.friends = vec!["0xcafe::admin".to_string()];
        m.abi.structs = vec![
            MoveStruct {
                name: "Ticket".to_string(),
                is_native: false,
                abilities: vec!["copy".to_string(), "store".to_string()],
                generic_type_params: Vec::new(),
                fields: Vec::new(),
            },
            MoveStruct {
                name: "Vault".to_string(),
                is_native: false,
                abilities: vec!["key".to_string()],
                generic_type_params: Vec::new(),
                fields: Vec::new(),
            },
        ];
        let req = request("0xcafe::vault::deposit").with_arguments(vec![serde_json::json!("1")]);
        let report = verifier(Ok(Some(m))).verify(&req).await;
        let ids: Vec<&str> = report.findings.iter().map(|i| i.pattern_id.as_str()).collect();

        assert!(ids.contains(&"bytecode:function:returns_signer:get_signer"));
        assert!(ids.contains(&"bytecode:struct:copy_without_drop:Ticket"));
        assert!(ids.contains(&"bytecode:struct:key_without_store:Vault"));
        assert!(ids.contains(&"bytecode:module:friends"));
        assert!(report.ground_truth.is_empty());
    }

    #[tokio::test]
    async fn test_framework_module_is_not_scanned() {
        let mut m = module("0x1", vec![func("transfer", true, Visibility::Public)]);
        m.abi.exposed_functions.push(func("withdraw", false, Visibility::Public));
        m.abi.friends = vec!["0x1::aptos_coin".to_string()];
        let req = request("0x1::vault::transfer").with_arguments(vec![serde_json::json!("1")]);
        let report = verifier(Ok(Some(m))).verify(&req).await;
        assert!(report.findings.is_empty());
        assert!(report.ground_truth.is_empty());
    }
}
