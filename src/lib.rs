//! RangeKeeper Library
//!
//! Dual-oracle keeper for a Uniswap v3 range vault

pub mod config;
pub mod error;
pub mod keeper;
pub mod oracle;
pub mod rebalance;
pub mod telemetry;
pub mod types;
pub mod vault;
