//! Constants Module - Single Source of Truth
//!
//! Fullnode endpoints, framework addresses, store key prefixes and the
//! retention/TTL values used across the crate live here.

use crate::models::types::Network;

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "MoveGuardian";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for outbound HTTP requests
pub const USER_AGENT: &str = concat!("MoveGuardian/", env!("CARGO_PKG_VERSION"));

// ============================================
// NETWORK CONSTANTS
// ============================================

/// Default ceiling for one fullnode/threat-feed/LLM request (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 2;

/// Default pipeline soft deadline (milliseconds)
pub const DEFAULT_DEADLINE_MS: u64 = 8_000;

/// Attempts per fullnode request (first try + retries)
pub const FULLNODE_MAX_ATTEMPTS: u32 = 3;

/// Base retry delay in milliseconds, doubled per attempt
pub const FULLNODE_BASE_RETRY_MS: u64 = 200;

/// Jitter percentage for retry delay
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Public fullnode base URL for a network
pub fn default_fullnode_url(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "https://fullnode.mainnet.aptoslabs.com",
        Network::Testnet => "https://fullnode.testnet.aptoslabs.com",
        Network::Devnet => "https://fullnode.devnet.aptoslabs.com",
    }
}

/// Environment variable overriding the fullnode URL for a network
pub fn fullnode_env_var(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "APTOS_MAINNET_URL",
        Network::Testnet => "APTOS_TESTNET_URL",
        Network::Devnet => "APTOS_DEVNET_URL",
    }
}

// ============================================
// FRAMEWORK ADDRESSES
// ============================================

/// Move framework (`0x1`), legacy token (`0x3`) and token objects (`0x4`)
pub const FRAMEWORK_ADDRESSES: [&str; 3] = ["0x1", "0x3", "0x4"];

/// Check whether a normalized address belongs to the framework
pub fn is_framework_address(address: &str) -> bool {
    FRAMEWORK_ADDRESSES.contains(&address)
}

// ============================================
// STORE KEYS & RETENTION
// ============================================

/// Circuit breaker state: `circuit:{name}`
pub const CIRCUIT_KEY_PREFIX: &str = "circuit:";

/// Shareable cached response: `guardian:{share_id}`
pub const SHARE_KEY_PREFIX: &str = "guardian:";

/// Persisted analysis record: `analysis:{id}`
pub const ANALYSIS_KEY_PREFIX: &str = "analysis:";

/// Stored simulation outcome: `simulation:{id}`
pub const SIMULATION_KEY_PREFIX: &str = "simulation:";

/// Circuit state TTL (seconds) - self-heals if the dependency goes unused
pub const CIRCUIT_STATE_TTL_SECS: u64 = 3_600;

/// Default result retention (days)
pub const DEFAULT_RETENTION_DAYS: u64 = 30;

/// Stored simulations are short-lived (seconds)
pub const SIMULATION_TTL_SECS: u64 = 900;

/// Results older than this are flagged stale on lookup (seconds)
pub const STALE_AFTER_SECS: i64 = 3_600;

/// Share-id length (alphanumeric)
pub const SHARE_ID_LEN: usize = 10;

/// Default public base URL for share links
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8080";
