//! Airdrop distribution: batch planning, deployment, sequenced contract
//! calls, and state verification.
//!
//! ## Ordering
//!
//! deploy → fund → register → claim → withdraw. Each step awaits finality of
//! the previous one; reads in [`StateReader`] are only meaningful once the
//! writes they observe have returned.

pub mod controller;
pub mod deployer;
pub mod planner;
pub mod state_reader;

#[cfg(test)]
mod tests;

pub use controller::{
    ClaimError, DistributionController, FundError, RegisterError, RegistrationReport, WithdrawError,
};
pub use deployer::{ContractDeployer, DeployError, PublishResult};
pub use planner::{Batch, BatchPlanner, Batches, PlanError};
pub use state_reader::{GlobalSnapshot, QueryError, StateReader, WhitelistStatus};
