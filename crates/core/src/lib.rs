//! Client-side orchestration of a whitelist-gated airdrop on Sui.
//!
//! The [`orchestrator`] drives one run end to end. The pieces it wires
//! together live in [`distribution`]; every network interaction goes through
//! the [`ledger::Ledger`] trait.

pub mod bcs;
pub mod config;
pub mod distribution;
pub mod ledger;
pub mod orchestrator;
pub mod whitelist;
