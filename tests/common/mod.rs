//! Shared fixtures: a fixed fullnode and ready-made requests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use move_guardian::core::Whitelist;
use move_guardian::providers::{GenericTypeParam, ModuleFetcher, MoveFunction, MoveModule, MoveModuleBytecode, Visibility};
use move_guardian::{
    AnalysisRequest, FunctionPath, Guardian, GuardianConfig, GuardianResult, MemoryStore, Network,
    SimulationOutcome,
};

/// Serves modules from a map keyed by `address::module`
#[derive(Default)]
pub struct FixedFullnode {
    modules: HashMap<String, MoveModuleBytecode>,
}

impl FixedFullnode {
    pub fn with_module(mut self, module: MoveModule) -> Self {
        self.modules.insert(
            format!("{}::{}", module.address, module.name),
            MoveModuleBytecode {
                bytecode: "0x".to_string(),
                abi: module,
            },
        );
        self
    }
}

#[async_trait]
impl ModuleFetcher for FixedFullnode {
    async fn fetch_module(&self, _: Network, address: &str, module: &str) -> GuardianResult<Option<MoveModuleBytecode>> {
        Ok(self.modules.get(&format!("{}::{}", address, module)).cloned())
    }
}

pub fn entry(name: &str, generics: usize, params: &[&str]) -> MoveFunction {
    MoveFunction {
        name: name.to_string(),
        visibility: Visibility::Public,
        is_entry: true,
        is_view: false,
        generic_type_params: (0..generics).map(|_| GenericTypeParam { constraints: Vec::new() }).collect(),
        params: params.iter().map(|p| p.to_string()).collect(),
        returns: Vec::new(),
    }
}

pub fn module(address: &str, name: &str, functions: Vec<MoveFunction>) -> MoveModule {
    MoveModule {
        address: address.to_string(),
        name: name.to_string(),
        friends: Vec::new(),
        exposed_functions: functions,
        structs: Vec::new(),
    }
}

/// `0x1::coin` exposing `transfer<CoinType>(&signer, address, u64)`
pub fn coin_module() -> MoveModule {
    module("0x1", "coin", vec![entry("transfer", 1, &["&signer", "address", "u64"])])
}

/// `0xcafe::vault` exposing `deposit` and `withdraw_all`
pub fn vault_module() -> MoveModule {
    module(
        "0xcafe",
        "vault",
        vec![
            entry("deposit", 0, &["&signer", "u64"]),
            entry("withdraw_all", 0, &["&signer", "u64"]),
        ],
    )
}

/// `0xcafe::treasury`, which has no withdrawal function at all
pub fn treasury_module() -> MoveModule {
    module("0xcafe", "treasury", vec![entry("deposit", 0, &["&signer", "u64"])])
}

pub fn fullnode() -> Arc<FixedFullnode> {
    Arc::new(
        FixedFullnode::default()
            .with_module(coin_module())
            .with_module(vault_module())
            .with_module(treasury_module()),
    )
}

/// Guardian over the fixed fullnode with the fast path disabled
pub fn guardian() -> Guardian {
    Guardian::new(GuardianConfig::from_env(), Arc::new(MemoryStore::new()), fullnode()).with_whitelist(Whitelist::empty())
}

pub fn successful_simulation() -> SimulationOutcome {
    SimulationOutcome {
        success: true,
        gas_used: 12,
        ..Default::default()
    }
}

pub fn coin_transfer() -> AnalysisRequest {
    AnalysisRequest::new(Network::Mainnet, "0xa11ce", FunctionPath::parse("0x1::coin::transfer").unwrap())
        .unwrap()
        .with_type_arguments(vec!["0x1::aptos_coin::AptosCoin".to_string()])
        .with_arguments(vec![serde_json::json!("0xbeef"), serde_json::json!("100")])
        .with_simulation(successful_simulation())
}

pub fn vault_call(function: &str) -> AnalysisRequest {
    AnalysisRequest::new(
        Network::Mainnet,
        "0xa11ce",
        FunctionPath::parse(&format!("0xcafe::vault::{}", function)).unwrap(),
    )
    .unwrap()
    .with_arguments(vec![serde_json::json!("5")])
    .with_simulation(successful_simulation())
}
