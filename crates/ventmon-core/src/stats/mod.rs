//! Sample publishing module
//!
//! - Lock-free ring buffer shared with monitoring readers ([`store`])
//! - Per-session append-only log file ([`logger`])

pub mod logger;
pub mod store;
