//! Providers Module - External Service Integrations
//!
//! Fullnode REST, remote threat feed and semantic analyzer clients.
//! Each sits behind a trait so the pipeline can be driven by fakes in tests.

pub mod aptos;
pub mod llm;
pub mod threat_feed;

pub use aptos::*;
pub use llm::*;
pub use threat_feed::*;
