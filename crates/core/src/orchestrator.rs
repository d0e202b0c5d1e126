//! End-to-end airdrop workflow.
//!
//! Steps run strictly in order, each awaiting finality before the next:
//! faucet → deploy → load whitelist → fund → register → claim → withdraw →
//! verify. The orchestrator owns no algorithm of its own; it wires the
//! distribution components together and records what was committed so a
//! failure can be reported with its partial progress.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AirdropConfig;
use crate::distribution::{
    BatchPlanner, ClaimError, ContractDeployer, DeployError, DistributionController, FundError,
    PublishResult, QueryError, RegisterError, RegistrationReport, StateReader, WhitelistStatus,
    WithdrawError,
};
use crate::ledger::{Ledger, LedgerError, SuiAddress};
use crate::whitelist::{self, WhitelistError};

/// One stage of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Faucet,
    Deploy,
    LoadWhitelist,
    Fund,
    Register,
    Claim,
    Withdraw,
    Verify,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Faucet => "faucet",
            Step::Deploy => "deploy",
            Step::LoadWhitelist => "load-whitelist",
            Step::Fund => "fund",
            Step::Register => "register",
            Step::Claim => "claim",
            Step::Withdraw => "withdraw",
            Step::Verify => "verify",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("faucet request failed: {0}")]
    Faucet(#[source] LedgerError),
    #[error(transparent)]
    Deploy(#[from] DeployError),
    #[error(transparent)]
    Whitelist(#[from] WhitelistError),
    #[error(transparent)]
    Fund(#[from] FundError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    Claim(#[from] ClaimError),
    #[error(transparent)]
    Withdraw(#[from] WithdrawError),
    #[error(transparent)]
    Verify(#[from] QueryError),
}

/// A failed run: the step that failed, what it failed with, and everything
/// committed before it.
#[derive(Debug, thiserror::Error)]
#[error("{step} step failed: {source}")]
pub struct WorkflowError {
    pub step: Step,
    pub source: StepError,
    pub progress: Box<WorkflowReport>,
}

impl WorkflowError {
    pub fn step(&self) -> Step {
        self.step
    }

    /// Whitelist entries that reached finality before the failure.
    pub fn entries_committed(&self) -> usize {
        self.progress.registration.entries
    }
}

/// What a run accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowReport {
    pub operator: Option<SuiAddress>,
    pub publish: Option<PublishResult>,
    /// Whether this run published the package (false when reusing one).
    pub deployed: bool,
    pub whitelist_entries: usize,
    pub fund_digest: Option<String>,
    pub registration: RegistrationReport,
    pub claim_digest: Option<String>,
    pub withdraw_digest: Option<String>,
    pub pool_balance: Option<u64>,
    pub operator_status: Option<WhitelistStatus>,
    pub listed_entries: Option<usize>,
}

/// Per-run inputs resolved by the caller.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub whitelist_path: PathBuf,
    pub package_path: PathBuf,
    pub coin_type: String,
    pub reward_amount: u64,
    /// Reuse this deployment instead of publishing.
    pub existing: Option<PublishResult>,
    pub request_faucet: bool,
    pub claim: bool,
    pub withdraw: bool,
}

pub struct Orchestrator {
    ledger: Arc<dyn Ledger>,
    config: AirdropConfig,
}

impl Orchestrator {
    pub fn new(ledger: Arc<dyn Ledger>, config: AirdropConfig) -> Self {
        Self { ledger, config }
    }

    pub async fn run(&self, options: &RunOptions) -> Result<WorkflowReport, WorkflowError> {
        let mut report = WorkflowReport::default();
        match self.drive(options, &mut report).await {
            Ok(()) => Ok(report),
            Err((step, source)) => {
                tracing::error!(
                    %step,
                    error = %source,
                    batches_committed = report.registration.batches,
                    entries_committed = report.registration.entries,
                    "airdrop workflow halted"
                );
                Err(WorkflowError {
                    step,
                    source,
                    progress: Box::new(report),
                })
            }
        }
    }

    async fn drive(&self, options: &RunOptions, report: &mut WorkflowReport) -> Result<(), (Step, StepError)> {
        let operator = self.ledger.active_address();
        report.operator = Some(operator);
        tracing::info!(%operator, coin_type = %options.coin_type, amount = options.reward_amount, "starting airdrop");

        if options.request_faucet {
            self.ledger
                .request_faucet(operator)
                .await
                .map_err(|e| (Step::Faucet, StepError::Faucet(e)))?;
        }

        let publish = match options.existing {
            Some(existing) => {
                tracing::info!(
                    package_id = %existing.package_id,
                    global_id = %existing.global_id,
                    "reusing existing deployment"
                );
                existing
            }
            None => {
                let deployer = ContractDeployer::new(self.ledger.clone(), &self.config.contract);
                let published = deployer
                    .deploy(&options.package_path, operator)
                    .await
                    .map_err(|e| (Step::Deploy, StepError::from(e)))?;
                report.deployed = true;
                published
            }
        };
        report.publish = Some(publish);

        let addresses = whitelist::load(&options.whitelist_path, operator, self.config.limits.max_whitelist)
            .await
            .map_err(|e| (Step::LoadWhitelist, StepError::from(e)))?;
        report.whitelist_entries = addresses.len();

        let controller = DistributionController::new(
            self.ledger.clone(),
            publish,
            self.config.contract.module.as_str(),
            self.config.contract.abort_codes,
            BatchPlanner::from_limits(&self.config.limits),
        );

        let funded = controller
            .fund(&options.coin_type, options.reward_amount, operator)
            .await
            .map_err(|e| (Step::Fund, StepError::from(e)))?;
        report.fund_digest = Some(funded.digest);

        match controller.register(&addresses, operator).await {
            Ok(registration) => report.registration = registration,
            Err(e) => {
                report.registration.entries = e.entries_committed();
                if let RegisterError::BatchSubmissionFailed { index, digests, .. } = &e {
                    report.registration.batches = *index;
                    report.registration.digests = digests.clone();
                }
                return Err((Step::Register, StepError::from(e)));
            }
        }

        if options.claim {
            let claimed = controller
                .claim(&options.coin_type, operator)
                .await
                .map_err(|e| (Step::Claim, StepError::from(e)))?;
            report.claim_digest = Some(claimed.digest);
        }

        if options.withdraw {
            let withdrawn = controller
                .withdraw(&options.coin_type, operator)
                .await
                .map_err(|e| (Step::Withdraw, StepError::from(e)))?;
            report.withdraw_digest = Some(withdrawn.digest);
        }

        let reader = StateReader::new(self.ledger.clone(), publish.global_id, &self.config.contract);
        let verify = |e: QueryError| (Step::Verify, StepError::from(e));
        let snapshot = reader.global_state().await.map_err(verify)?;
        let status = reader
            .lookup(snapshot.whitelist_table_id, operator)
            .await
            .map_err(verify)?;
        let listed = reader.list_whitelist().await.map_err(verify)?;
        tracing::info!(
            pool_balance = snapshot.balance,
            whitelist_size = snapshot.whitelist_size,
            listed = listed.len(),
            operator_status = %status,
            "airdrop state verified"
        );
        report.pool_balance = Some(snapshot.balance);
        report.operator_status = Some(status);
        report.listed_entries = Some(listed.len());
        Ok(())
    }
}
