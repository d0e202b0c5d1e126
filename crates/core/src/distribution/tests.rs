//! Lifecycle scenarios against the simulated ledger.

use std::path::Path;
use std::sync::Arc;

use testresult::TestResult;

use super::*;
use crate::config::{BatchLimits, ContractConfig};
use crate::ledger::{Ledger, SimulatedLedger, SuiAddress, SUI_COIN_TYPE};
use crate::whitelist;

const REWARD: u64 = 1_000_000_001;

struct Fixture {
    ledger: Arc<SimulatedLedger>,
    controller: DistributionController,
    reader: StateReader,
    operator: SuiAddress,
}

async fn deployed() -> Fixture {
    let ledger = Arc::new(SimulatedLedger::new());
    let operator = ledger.active_address();
    let contract = ContractConfig::default();
    let publish = ContractDeployer::new(ledger.clone(), &contract)
        .deploy(Path::new("move/suiadrop"), operator)
        .await
        .unwrap();
    let controller = DistributionController::new(
        ledger.clone(),
        publish,
        contract.module.as_str(),
        contract.abort_codes,
        BatchPlanner::from_limits(&BatchLimits::default()),
    );
    let reader = StateReader::new(ledger.clone(), publish.global_id, &contract);
    Fixture {
        ledger,
        controller,
        reader,
        operator,
    }
}

fn numbered(i: u16) -> SuiAddress {
    let mut bytes = [0x11; 32];
    bytes[30..].copy_from_slice(&i.to_be_bytes());
    SuiAddress::new(bytes)
}

/// 605 distinct lines, capped at 600, operator appended.
fn whitelist_601(operator: SuiAddress) -> Vec<SuiAddress> {
    let raw: String = (0..605u16).map(|i| format!("{}\n", numbered(i))).collect();
    whitelist::parse(&raw, operator, BatchLimits::default().max_whitelist).unwrap()
}

#[tokio::test]
async fn test_whitelist_of_601_registers_in_two_batches() -> TestResult {
    let fx = deployed().await;
    let addresses = whitelist_601(fx.operator);
    assert_eq!(addresses.len(), 601);

    let report = fx.controller.register(&addresses, fx.operator).await?;
    assert_eq!(report.batches, 2);
    assert_eq!(report.entries, 601);
    assert_eq!(fx.ledger.calls_to(controller::ADD_WHITELIST_FN), 2);
    assert_eq!(fx.ledger.registered_in_order(), addresses);

    let snapshot = fx.reader.global_state().await?;
    assert_eq!(snapshot.whitelist_size, 601);
    Ok(())
}

#[tokio::test]
async fn test_fund_register_claim_marks_operator_claimed() -> TestResult {
    let fx = deployed().await;
    fx.controller.fund(SUI_COIN_TYPE, REWARD, fx.operator).await?;
    assert_eq!(fx.reader.global_state().await?.balance, REWARD);

    let addresses = whitelist_601(fx.operator);
    fx.controller.register(&addresses, fx.operator).await?;
    assert_eq!(fx.reader.status(fx.operator).await?, WhitelistStatus::RegisteredUnclaimed);

    fx.controller.claim(SUI_COIN_TYPE, fx.operator).await?;
    assert_eq!(fx.reader.status(fx.operator).await?, WhitelistStatus::RegisteredClaimed);
    assert!(fx.reader.global_state().await?.balance < REWARD);
    Ok(())
}

#[tokio::test]
async fn test_never_registered_address_is_not_registered() -> TestResult {
    let fx = deployed().await;
    fx.controller.register(&whitelist_601(fx.operator), fx.operator).await?;
    let stranger = SuiAddress::new([0xfe; 32]);
    assert_eq!(fx.reader.status(stranger).await?, WhitelistStatus::NotRegistered);
    Ok(())
}

#[tokio::test]
async fn test_second_batch_failure_keeps_first_batch() -> TestResult {
    let fx = deployed().await;
    fx.ledger.fail_call(controller::ADD_WHITELIST_FN, 1);
    let addresses = whitelist_601(fx.operator);

    let err = fx.controller.register(&addresses, fx.operator).await.unwrap_err();
    match &err {
        RegisterError::BatchSubmissionFailed {
            index: 1,
            entries_committed: 511,
            digests,
            ..
        } => assert_eq!(digests.len(), 1),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(fx.ledger.registered_in_order(), addresses[..511].to_vec());

    let statuses = fx.reader.statuses(&[addresses[0], addresses[510], addresses[511], fx.operator]).await?;
    let registered: Vec<bool> = statuses.iter().map(|(_, s)| s.is_registered()).collect();
    assert_eq!(registered, vec![true, true, false, false]);
    Ok(())
}

#[tokio::test]
async fn test_claim_before_registration_is_not_whitelisted() -> TestResult {
    let fx = deployed().await;
    fx.controller.fund(SUI_COIN_TYPE, REWARD, fx.operator).await?;
    let err = fx.controller.claim(SUI_COIN_TYPE, fx.operator).await.unwrap_err();
    assert!(matches!(err, ClaimError::NotWhitelisted));
    assert_eq!(fx.reader.global_state().await?.balance, REWARD);
    Ok(())
}

#[tokio::test]
async fn test_second_claim_is_already_claimed() -> TestResult {
    let fx = deployed().await;
    fx.controller.fund(SUI_COIN_TYPE, REWARD, fx.operator).await?;
    fx.controller.register(&[fx.operator], fx.operator).await?;
    fx.controller.claim(SUI_COIN_TYPE, fx.operator).await?;
    let err = fx.controller.claim(SUI_COIN_TYPE, fx.operator).await.unwrap_err();
    assert!(matches!(err, ClaimError::AlreadyClaimed));
    Ok(())
}

#[tokio::test]
async fn test_withdraw_returns_residual_to_owner() -> TestResult {
    let fx = deployed().await;
    let before = fx.ledger.balance_of(fx.operator, SUI_COIN_TYPE);
    fx.controller.fund(SUI_COIN_TYPE, REWARD, fx.operator).await?;
    fx.controller.register(&whitelist_601(fx.operator), fx.operator).await?;
    fx.controller.withdraw(SUI_COIN_TYPE, fx.operator).await?;

    assert_eq!(fx.reader.global_state().await?.balance, 0);
    assert_eq!(fx.ledger.balance_of(fx.operator, SUI_COIN_TYPE), before);
    Ok(())
}

#[tokio::test]
async fn test_reads_are_repeatable() -> TestResult {
    let fx = deployed().await;
    fx.controller.fund(SUI_COIN_TYPE, REWARD, fx.operator).await?;
    fx.controller.register(&[fx.operator], fx.operator).await?;

    let first = fx.reader.global_state().await?;
    let second = fx.reader.global_state().await?;
    assert_eq!(first, second);
    assert_eq!(
        fx.reader.status(fx.operator).await?,
        fx.reader.status(fx.operator).await?
    );
    assert_eq!(fx.reader.list_whitelist().await?, vec![fx.operator]);
    Ok(())
}
