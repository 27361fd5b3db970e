//! Oracle module - dual-source price retrieval and consensus
//!
//! Fetches independent prices from Pyth (off-chain, Hermes API) and
//! Chainlink (on-chain aggregator) and cross-validates them into a single
//! trusted signal for the rebalance decision.

pub mod sources;
mod validator;

pub use validator::ConsensusValidator;
