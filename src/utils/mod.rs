//! Utils Module - Helper Functions & Shared Utilities
//!
//! Storage, time, circuit breaking and counters shared by every stage.

pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod constants;
pub mod telemetry;

pub use cache::*;
pub use circuit_breaker::*;
pub use clock::*;
pub use constants::*;
pub use telemetry::*;
