//! Core Module - Business Logic
//!
//! Evidence sources, pattern engine, on-chain verifier, risk scoring and
//! the pipeline that ties them into a single verdict.

pub mod context;
pub mod incidents;
pub mod intel;
pub mod patterns;
pub mod pipeline;
pub mod results;
pub mod risk_score;
pub mod rules;
pub mod sources;
pub mod verifier;
pub mod whitelist;

pub use context::*;
pub use incidents::*;
pub use intel::*;
pub use patterns::*;
pub use pipeline::*;
pub use results::*;
pub use risk_score::*;
pub use rules::*;
pub use sources::*;
pub use verifier::*;
pub use whitelist::*;
