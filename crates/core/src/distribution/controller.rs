//! Sequenced state-changing calls against a deployed airdrop instance.
//!
//! Every operation builds its own [`MoveCall`], submits it, and returns only
//! after the ledger reports finality. Nothing is retried: a write that may
//! have landed is never resubmitted automatically.

use std::sync::Arc;

use crate::config::AbortCodes;
use crate::ledger::{
    CallArg, ExecutionReceipt, Ledger, LedgerError, MoveAbort, MoveCall, PureArg, SuiAddress,
};

use super::planner::{BatchPlanner, PlanError};
use super::PublishResult;

pub const DEPOSIT_FN: &str = "deposit";
pub const ADD_WHITELIST_FN: &str = "add_whitelist";
pub const CLAIM_FN: &str = "claim";
pub const WITHDRAW_FN: &str = "withdraw";

/// Framework module that aborts when a table key is missing.
const DYNAMIC_FIELD_MODULE: &str = "dynamic_field";
const E_FIELD_DOES_NOT_EXIST: u64 = 1;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FundError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(#[source] LedgerError),
    #[error("deposit rejected: {0}")]
    DepositRejected(#[source] LedgerError),
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("batch planning failed: {0}")]
    Plan(#[from] PlanError),
    #[error(
        "whitelist batch {index} failed after {entries_committed} entries were registered: {source}"
    )]
    BatchSubmissionFailed {
        index: usize,
        entries_committed: usize,
        /// Digests of the batches that did land, in submission order.
        digests: Vec<String>,
        source: LedgerError,
    },
}

impl RegisterError {
    /// Entries that reached finality before the failure.
    pub fn entries_committed(&self) -> usize {
        match self {
            RegisterError::Plan(_) => 0,
            RegisterError::BatchSubmissionFailed {
                entries_committed, ..
            } => *entries_committed,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("address is not whitelisted")]
    NotWhitelisted,
    #[error("address has already claimed")]
    AlreadyClaimed,
    #[error("claim rejected: {0}")]
    ClaimRejected(#[source] LedgerError),
}

#[derive(Debug, thiserror::Error)]
pub enum WithdrawError {
    #[error("signer is not the distribution owner")]
    Unauthorized,
    #[error("withdraw rejected: {0}")]
    WithdrawRejected(#[source] LedgerError),
}

/// Outcome of a fully successful [`DistributionController::register`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    pub batches: usize,
    pub entries: usize,
    pub digests: Vec<String>,
}

// =============================================================================
// DistributionController
// =============================================================================

pub struct DistributionController {
    ledger: Arc<dyn Ledger>,
    publish: PublishResult,
    module: String,
    abort_codes: AbortCodes,
    planner: BatchPlanner,
}

impl DistributionController {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        publish: PublishResult,
        module: impl Into<String>,
        abort_codes: AbortCodes,
        planner: BatchPlanner,
    ) -> Self {
        Self {
            ledger,
            publish,
            module: module.into(),
            abort_codes,
            planner,
        }
    }

    fn call(&self, function: &str) -> MoveCall {
        MoveCall::new(self.publish.package_id, self.module.as_str(), function)
            .argument(CallArg::Object(self.publish.global_id))
    }

    fn abort_in_module<'e>(&self, err: &'e LedgerError) -> Option<&'e MoveAbort> {
        err.move_abort().filter(|abort| abort.module == self.module)
    }

    /// Deposit `amount` of `coin_type` from `signer` into the reward pool.
    pub async fn fund(
        &self,
        coin_type: &str,
        amount: u64,
        signer: SuiAddress,
    ) -> Result<ExecutionReceipt, FundError> {
        let coin = match self
            .ledger
            .prepare_amount(signer, coin_type.to_string(), amount)
            .await
        {
            Ok(coin) => coin,
            Err(e @ LedgerError::InsufficientFunds { .. }) => {
                return Err(FundError::InsufficientFunds(e))
            }
            Err(e) => return Err(FundError::DepositRejected(e)),
        };

        let call = self
            .call(DEPOSIT_FN)
            .type_argument(coin_type)
            .argument(CallArg::Coin(coin));
        match self.ledger.execute(call, signer).await {
            Ok(receipt) => {
                tracing::info!(digest = %receipt.digest, amount, coin_type, "reward pool funded");
                Ok(receipt)
            }
            Err(e @ LedgerError::InsufficientFunds { .. }) => Err(FundError::InsufficientFunds(e)),
            Err(e) => Err(FundError::DepositRejected(e)),
        }
    }

    /// Register `addresses` in planned batches, one finalized call at a time.
    ///
    /// The whole plan is computed before anything is submitted. On the first
    /// failed batch the operation stops; earlier batches stay registered.
    pub async fn register(
        &self,
        addresses: &[SuiAddress],
        signer: SuiAddress,
    ) -> Result<RegistrationReport, RegisterError> {
        let batches = self.planner.plan_all(addresses)?;
        tracing::info!(
            entries = addresses.len(),
            batches = batches.len(),
            max_batch_entries = self.planner.max_entries(),
            max_batch_bytes = self.planner.max_bytes(),
            "registering whitelist"
        );

        let mut report = RegistrationReport::default();
        for batch in batches {
            let call = self
                .call(ADD_WHITELIST_FN)
                .argument(CallArg::Pure(PureArg::AddressVector(batch.entries.to_vec())));
            match self.ledger.execute(call, signer).await {
                Ok(receipt) => {
                    report.batches += 1;
                    report.entries += batch.len();
                    tracing::info!(
                        batch = batch.index,
                        first = batch.offset,
                        last = batch.offset + batch.len() - 1,
                        bytes = batch.serialized_size,
                        digest = %receipt.digest,
                        "whitelist batch registered"
                    );
                    report.digests.push(receipt.digest);
                }
                Err(source) => {
                    tracing::error!(
                        batch = batch.index,
                        entries_committed = report.entries,
                        error = %source,
                        "whitelist batch failed, halting registration"
                    );
                    return Err(RegisterError::BatchSubmissionFailed {
                        index: batch.index,
                        entries_committed: report.entries,
                        digests: report.digests,
                        source,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Claim the signer's share.
    pub async fn claim(&self, coin_type: &str, signer: SuiAddress) -> Result<ExecutionReceipt, ClaimError> {
        let call = self.call(CLAIM_FN).type_argument(coin_type);
        match self.ledger.execute(call, signer).await {
            Ok(receipt) => {
                tracing::info!(digest = %receipt.digest, %signer, "claimed");
                Ok(receipt)
            }
            Err(e) => Err(self.classify_claim(e)),
        }
    }

    fn classify_claim(&self, err: LedgerError) -> ClaimError {
        if let Some(abort) = self.abort_in_module(&err) {
            if abort.code == self.abort_codes.not_whitelisted {
                return ClaimError::NotWhitelisted;
            }
            if abort.code == self.abort_codes.already_claimed {
                return ClaimError::AlreadyClaimed;
            }
        }
        if let Some(abort) = err.move_abort() {
            if abort.module == DYNAMIC_FIELD_MODULE && abort.code == E_FIELD_DOES_NOT_EXIST {
                return ClaimError::NotWhitelisted;
            }
        }
        ClaimError::ClaimRejected(err)
    }

    /// Reclaim the unclaimed balance to the owner.
    pub async fn withdraw(
        &self,
        coin_type: &str,
        signer: SuiAddress,
    ) -> Result<ExecutionReceipt, WithdrawError> {
        let call = self.call(WITHDRAW_FN).type_argument(coin_type);
        match self.ledger.execute(call, signer).await {
            Ok(receipt) => {
                tracing::info!(digest = %receipt.digest, %signer, "residual balance withdrawn");
                Ok(receipt)
            }
            Err(e) => match self.abort_in_module(&e) {
                Some(abort) if abort.code == self.abort_codes.unauthorized => {
                    Err(WithdrawError::Unauthorized)
                }
                _ => Err(WithdrawError::WithdrawRejected(e)),
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
