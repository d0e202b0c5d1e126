//! In-memory ledger emulating the airdrop contract.
//!
//! Transactions are atomic: every check runs before any state changes, so a
//! rejected call leaves nothing behind. Read responses mirror the JSON-RPC
//! shapes a Sui full node returns, so [`crate::distribution::StateReader`]
//! decodes them exactly as it would in production.
//!
//! Failures can be injected per entry point and occurrence with
//! [`SimulatedLedger::fail_call`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{
    CallArg, CoinHandle, CoinSource, DynamicFieldName, ExecutionReceipt, Ledger, LedgerError,
    LedgerFuture, MoveAbort, MoveCall, ObjectChange, ObjectId, PureArg, SuiAddress, SUI_COIN_TYPE,
};
use crate::config::AbortCodes;
use crate::distribution::PublishResult;

/// Operator the simulated keystore signs for.
pub const SIMULATED_OPERATOR: SuiAddress = SuiAddress::new([0xa1; 32]);
pub const OPERATOR_STARTING_BALANCE: u64 = 100_000_000_000;
pub const FAUCET_AMOUNT: u64 = 10_000_000_000;
/// Sui's `max_pure_argument_size`.
pub const MAX_PURE_ARG_BYTES: usize = 16 * 1024;

const DEFAULT_PAGE_SIZE: usize = 50;
const MODULE: &str = "suiadrop";

// =============================================================================
// State
// =============================================================================

struct Contract {
    package_id: ObjectId,
    global_id: ObjectId,
    table_id: ObjectId,
    owner: SuiAddress,
    pool: u64,
    pool_coin_type: Option<String>,
    whitelist: BTreeMap<SuiAddress, bool>,
    registration_order: Vec<SuiAddress>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    next_tx: u64,
    holdings: HashMap<(SuiAddress, String), u128>,
    contracts: Vec<Contract>,
    attempts: HashMap<String, usize>,
    injected_failures: HashSet<(String, usize)>,
}

impl State {
    fn fresh_id(&mut self) -> ObjectId {
        self.next_id += 1;
        let mut bytes = [0u8; 32];
        bytes[0] = 0x5e;
        bytes[24..].copy_from_slice(&self.next_id.to_be_bytes());
        ObjectId::new(bytes)
    }

    fn digest(&mut self) -> String {
        self.next_tx += 1;
        format!("sim-tx-{}", self.next_tx)
    }

    fn balance(&self, owner: SuiAddress, coin_type: &str) -> u128 {
        self.holdings
            .get(&(owner, coin_type.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn credit(&mut self, owner: SuiAddress, coin_type: &str, amount: u128) {
        *self
            .holdings
            .entry((owner, coin_type.to_string()))
            .or_insert(0) += amount;
    }

    fn publish(&mut self, owner: SuiAddress) -> (PublishResult, ExecutionReceipt) {
        let package_id = self.fresh_id();
        let global_id = self.fresh_id();
        let table_id = self.fresh_id();
        let upgrade_cap = self.fresh_id();
        self.contracts.push(Contract {
            package_id,
            global_id,
            table_id,
            owner,
            pool: 0,
            pool_coin_type: None,
            whitelist: BTreeMap::new(),
            registration_order: Vec::new(),
        });
        let receipt = ExecutionReceipt {
            digest: self.digest(),
            object_changes: vec![
                ObjectChange::Published { package_id },
                ObjectChange::Created {
                    object_id: upgrade_cap,
                    object_type: "0x2::package::UpgradeCap".to_string(),
                },
                ObjectChange::Created {
                    object_id: global_id,
                    object_type: format!("{package_id}::{MODULE}::Global"),
                },
            ],
        };
        (
            PublishResult {
                package_id,
                global_id,
            },
            receipt,
        )
    }

    fn contract_index(&self, package: ObjectId) -> Option<usize> {
        self.contracts.iter().position(|c| c.package_id == package)
    }
}

// =============================================================================
// SimulatedLedger
// =============================================================================

pub struct SimulatedLedger {
    operator: SuiAddress,
    abort_codes: AbortCodes,
    page_size: usize,
    state: Mutex<State>,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLedger {
    /// A ledger whose operator starts with `OPERATOR_STARTING_BALANCE` SUI.
    pub fn new() -> Self {
        Self::with_abort_codes(AbortCodes::default())
    }

    pub fn with_abort_codes(abort_codes: AbortCodes) -> Self {
        let mut state = State::default();
        state.credit(SIMULATED_OPERATOR, SUI_COIN_TYPE, u128::from(OPERATOR_STARTING_BALANCE));
        Self {
            operator: SIMULATED_OPERATOR,
            abort_codes,
            page_size: DEFAULT_PAGE_SIZE,
            state: Mutex::new(state),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Publish a contract owned by the operator without going through
    /// [`Ledger::publish`].
    pub fn deploy_fixture(&self) -> PublishResult {
        self.state.lock().publish(self.operator).0
    }

    /// Reject the `nth` (0-based) call to `function`, counting attempts.
    pub fn fail_call(&self, function: &str, nth: usize) {
        self.state
            .lock()
            .injected_failures
            .insert((function.to_string(), nth));
    }

    /// Attempts made against `function`, including rejected ones.
    pub fn calls_to(&self, function: &str) -> usize {
        self.state.lock().attempts.get(function).copied().unwrap_or(0)
    }

    pub fn credit(&self, owner: SuiAddress, coin_type: &str, amount: u64) {
        self.state.lock().credit(owner, coin_type, u128::from(amount));
    }

    pub fn balance_of(&self, owner: SuiAddress, coin_type: &str) -> u128 {
        self.state.lock().balance(owner, coin_type)
    }

    /// Reward pool of the most recently published contract.
    pub fn pool_balance(&self) -> u64 {
        self.state.lock().contracts.last().map_or(0, |c| c.pool)
    }

    /// Addresses registered in the most recent contract, in submission order.
    pub fn registered_in_order(&self) -> Vec<SuiAddress> {
        self.state
            .lock()
            .contracts
            .last()
            .map(|c| c.registration_order.clone())
            .unwrap_or_default()
    }

    /// Register addresses directly in the most recent contract.
    pub fn seed_whitelist(&self, addresses: &[SuiAddress]) {
        let mut state = self.state.lock();
        if let Some(contract) = state.contracts.last_mut() {
            for &address in addresses {
                if contract.whitelist.insert(address, false).is_none() {
                    contract.registration_order.push(address);
                }
            }
        }
    }

    fn abort(&self, function: &str, code: u64) -> LedgerError {
        LedgerError::MoveAbort(MoveAbort {
            module: MODULE.to_string(),
            function: Some(function.to_string()),
            code,
        })
    }

    fn apply(&self, state: &mut State, call: &MoveCall, signer: SuiAddress) -> Result<(), LedgerError> {
        let attempt = {
            let counter = state.attempts.entry(call.function.clone()).or_insert(0);
            *counter += 1;
            *counter - 1
        };

        for arg in &call.arguments {
            if let CallArg::Pure(pure) = arg {
                let size = pure.encoded_len();
                if size > MAX_PURE_ARG_BYTES {
                    return Err(LedgerError::ExecutionFailed(format!(
                        "pure argument of {size} bytes exceeds the {MAX_PURE_ARG_BYTES} byte limit"
                    )));
                }
            }
        }
        if state
            .injected_failures
            .contains(&(call.function.clone(), attempt))
        {
            return Err(LedgerError::ExecutionFailed(format!(
                "simulated rejection of {} (attempt {attempt})",
                call.function
            )));
        }

        let idx = state
            .contract_index(call.package)
            .ok_or_else(|| LedgerError::ExecutionFailed(format!("package {} not found", call.package)))?;
        if call.module != MODULE {
            return Err(LedgerError::ExecutionFailed(format!(
                "module {} not found",
                call.module
            )));
        }
        match call.arguments.first() {
            Some(CallArg::Object(id)) if *id == state.contracts[idx].global_id => {}
            _ => {
                return Err(LedgerError::ExecutionFailed(
                    "first argument must be the distribution state object".to_string(),
                ))
            }
        }

        match call.function.as_str() {
            "deposit" => {
                let coin_type = single_type_argument(call)?;
                let coin = match call.arguments.get(1) {
                    Some(CallArg::Coin(coin)) => coin,
                    _ => return Err(LedgerError::ExecutionFailed("deposit expects a coin".to_string())),
                };
                if coin.coin_type != coin_type {
                    return Err(LedgerError::ExecutionFailed(format!(
                        "coin of type {} passed where {coin_type} expected",
                        coin.coin_type
                    )));
                }
                let available = state.balance(signer, coin_type);
                if available < u128::from(coin.amount) {
                    return Err(LedgerError::InsufficientFunds {
                        coin_type: coin_type.to_string(),
                        required: coin.amount,
                        available,
                    });
                }
                let contract = &state.contracts[idx];
                if contract
                    .pool_coin_type
                    .as_deref()
                    .is_some_and(|existing| existing != coin_type)
                {
                    return Err(LedgerError::ExecutionFailed(
                        "pool already holds a different coin type".to_string(),
                    ));
                }
                let new_pool = contract
                    .pool
                    .checked_add(coin.amount)
                    .ok_or_else(|| LedgerError::ExecutionFailed("pool overflow".to_string()))?;

                let amount = coin.amount;
                *state
                    .holdings
                    .entry((signer, coin_type.to_string()))
                    .or_insert(0) -= u128::from(amount);
                let contract = &mut state.contracts[idx];
                contract.pool = new_pool;
                contract.pool_coin_type = Some(coin_type.to_string());
            }
            "add_whitelist" => {
                let addresses = match call.arguments.get(1) {
                    Some(CallArg::Pure(PureArg::AddressVector(addresses))) => addresses,
                    _ => {
                        return Err(LedgerError::ExecutionFailed(
                            "add_whitelist expects vector<address>".to_string(),
                        ))
                    }
                };
                let contract = &mut state.contracts[idx];
                if signer != contract.owner {
                    return Err(self.abort("add_whitelist", self.abort_codes.unauthorized));
                }
                // Re-registering keeps the existing claimed flag.
                for &address in addresses {
                    if !contract.whitelist.contains_key(&address) {
                        contract.whitelist.insert(address, false);
                        contract.registration_order.push(address);
                    }
                }
            }
            "claim" => {
                let coin_type = single_type_argument(call)?.to_string();
                let contract = &state.contracts[idx];
                match contract.whitelist.get(&signer) {
                    None => return Err(self.abort("claim", self.abort_codes.not_whitelisted)),
                    Some(true) => return Err(self.abort("claim", self.abort_codes.already_claimed)),
                    Some(false) => {}
                }
                if contract.pool_coin_type.as_deref().is_some_and(|t| t != coin_type) {
                    return Err(LedgerError::ExecutionFailed(
                        "claim type argument does not match the pool".to_string(),
                    ));
                }
                let unclaimed = contract.whitelist.values().filter(|claimed| !**claimed).count() as u64;
                let share = contract.pool / unclaimed.max(1);

                let contract = &mut state.contracts[idx];
                contract.pool -= share;
                contract.whitelist.insert(signer, true);
                state.credit(signer, &coin_type, u128::from(share));
            }
            "withdraw" => {
                let coin_type = single_type_argument(call)?.to_string();
                let contract = &mut state.contracts[idx];
                if signer != contract.owner {
                    return Err(self.abort("withdraw", self.abort_codes.unauthorized));
                }
                let residual = std::mem::take(&mut contract.pool);
                state.credit(signer, &coin_type, u128::from(residual));
            }
            other => {
                return Err(LedgerError::ExecutionFailed(format!(
                    "function {other} not found in module {MODULE}"
                )))
            }
        }
        Ok(())
    }

    fn global_json(contract: &Contract) -> Value {
        json!({
            "data": {
                "objectId": contract.global_id,
                "version": "1",
                "content": {
                    "dataType": "moveObject",
                    "type": format!("{}::{MODULE}::Global", contract.package_id),
                    "hasPublicTransfer": false,
                    "fields": {
                        "id": { "id": contract.global_id },
                        "owner": contract.owner,
                        "balance": contract.pool.to_string(),
                        "whitelist": {
                            "type": "0x2::table::Table<address, bool>",
                            "fields": {
                                "id": { "id": contract.table_id },
                                "size": contract.whitelist.len().to_string(),
                            }
                        }
                    }
                }
            }
        })
    }
}

fn single_type_argument(call: &MoveCall) -> Result<&str, LedgerError> {
    match call.type_arguments.as_slice() {
        [coin_type] => Ok(coin_type.as_str()),
        other => Err(LedgerError::ExecutionFailed(format!(
            "{} expects one type argument, got {}",
            call.function,
            other.len()
        ))),
    }
}

impl Ledger for SimulatedLedger {
    fn active_address(&self) -> SuiAddress {
        self.operator
    }

    fn request_faucet(&self, recipient: SuiAddress) -> LedgerFuture<'_, ()> {
        self.state
            .lock()
            .credit(recipient, SUI_COIN_TYPE, u128::from(FAUCET_AMOUNT));
        Box::pin(async { Ok(()) })
    }

    fn publish(&self, _package_path: PathBuf, signer: SuiAddress) -> LedgerFuture<'_, ExecutionReceipt> {
        let (_, receipt) = self.state.lock().publish(signer);
        Box::pin(async move { Ok(receipt) })
    }

    fn prepare_amount(
        &self,
        signer: SuiAddress,
        coin_type: String,
        amount: u64,
    ) -> LedgerFuture<'_, CoinHandle> {
        let available = self.state.lock().balance(signer, &coin_type);
        let result = if available < u128::from(amount) {
            Err(LedgerError::InsufficientFunds {
                coin_type,
                required: amount,
                available,
            })
        } else {
            let source = if coin_type == SUI_COIN_TYPE {
                CoinSource::Gas
            } else {
                CoinSource::Coins(Vec::new())
            };
            Ok(CoinHandle {
                coin_type,
                amount,
                source,
            })
        };
        Box::pin(async move { result })
    }

    fn execute(&self, call: MoveCall, signer: SuiAddress) -> LedgerFuture<'_, ExecutionReceipt> {
        let result = {
            let mut state = self.state.lock();
            match self.apply(&mut state, &call, signer) {
                Ok(()) => Ok(ExecutionReceipt {
                    digest: state.digest(),
                    object_changes: Vec::new(),
                }),
                Err(e) => Err(e),
            }
        };
        if let Err(e) = &result {
            tracing::debug!(target_fn = %call.target(), error = %e, "simulated call rejected");
        }
        Box::pin(async move { result })
    }

    fn get_object(&self, id: ObjectId) -> LedgerFuture<'_, Value> {
        let state = self.state.lock();
        let response = match state.contracts.iter().find(|c| c.global_id == id) {
            Some(contract) => Self::global_json(contract),
            None => json!({ "error": { "code": "notExists", "object_id": id } }),
        };
        Box::pin(async move { Ok(response) })
    }

    fn get_dynamic_fields(&self, parent: ObjectId, cursor: Option<String>) -> LedgerFuture<'_, Value> {
        let state = self.state.lock();
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let keys: Vec<SuiAddress> = state
            .contracts
            .iter()
            .find(|c| c.table_id == parent)
            .map(|c| c.whitelist.keys().copied().collect())
            .unwrap_or_default();

        let end = (start + self.page_size).min(keys.len());
        let page: Vec<Value> = keys
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .map(|address| {
                json!({
                    "name": { "type": "address", "value": address },
                    "type": "DynamicField",
                    "objectType": "bool",
                    "objectId": ObjectId::new(*address.as_bytes()),
                })
            })
            .collect();
        let has_next_page = end < keys.len();
        let response = json!({
            "data": page,
            "nextCursor": if has_next_page { Value::String(end.to_string()) } else { Value::Null },
            "hasNextPage": has_next_page,
        });
        Box::pin(async move { Ok(response) })
    }

    fn get_dynamic_field_object(
        &self,
        parent: ObjectId,
        name: DynamicFieldName,
    ) -> LedgerFuture<'_, Value> {
        let state = self.state.lock();
        let key = name
            .value
            .as_str()
            .and_then(|s| s.parse::<SuiAddress>().ok());
        let entry = state
            .contracts
            .iter()
            .find(|c| c.table_id == parent)
            .zip(key)
            .and_then(|(c, key)| c.whitelist.get(&key).map(|claimed| (key, *claimed)));

        let response = match entry {
            Some((key, claimed)) => json!({
                "data": {
                    "objectId": ObjectId::new(*key.as_bytes()),
                    "content": {
                        "dataType": "moveObject",
                        "type": "0x2::dynamic_field::Field<address, bool>",
                        "fields": {
                            "id": { "id": ObjectId::new(*key.as_bytes()) },
                            "name": key,
                            "value": claimed,
                        }
                    }
                }
            }),
            None => json!({
                "error": { "code": "dynamicFieldNotFound", "parent_object_id": parent }
            }),
        };
        Box::pin(async move { Ok(response) })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn call(publish: &PublishResult, function: &str) -> MoveCall {
        MoveCall::new(publish.package_id, MODULE, function).argument(CallArg::Object(publish.global_id))
    }

    #[tokio::test]
    async fn test_failed_call_has_no_effect() {
        let ledger = SimulatedLedger::new();
        let publish = ledger.deploy_fixture();
        ledger.fail_call("add_whitelist", 0);

        let addrs = vec![SuiAddress::new([3; 32])];
        let batch = call(&publish, "add_whitelist").argument(CallArg::Pure(PureArg::AddressVector(addrs.clone())));
        assert!(ledger.execute(batch.clone(), SIMULATED_OPERATOR).await.is_err());
        assert!(ledger.registered_in_order().is_empty());

        // Retrying a failed call is safe.
        ledger.execute(batch, SIMULATED_OPERATOR).await.unwrap();
        assert_eq!(ledger.registered_in_order(), addrs);
        assert_eq!(ledger.calls_to("add_whitelist"), 2);
    }

    #[tokio::test]
    async fn test_oversized_pure_argument_rejected() {
        let ledger = SimulatedLedger::new();
        let publish = ledger.deploy_fixture();
        let addrs = vec![SuiAddress::new([3; 32]); 600];
        let batch = call(&publish, "add_whitelist").argument(CallArg::Pure(PureArg::AddressVector(addrs)));
        assert!(matches!(
            ledger.execute(batch, SIMULATED_OPERATOR).await,
            Err(LedgerError::ExecutionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_splits_pool_among_unclaimed() {
        let ledger = SimulatedLedger::new();
        let publish = ledger.deploy_fixture();
        let other = SuiAddress::new([9; 32]);
        ledger.seed_whitelist(&[SIMULATED_OPERATOR, other]);

        let coin = ledger
            .prepare_amount(SIMULATED_OPERATOR, SUI_COIN_TYPE.to_string(), 100)
            .await
            .unwrap();
        let deposit = call(&publish, "deposit")
            .type_argument(SUI_COIN_TYPE)
            .argument(CallArg::Coin(coin));
        ledger.execute(deposit, SIMULATED_OPERATOR).await.unwrap();
        assert_eq!(ledger.pool_balance(), 100);

        ledger
            .execute(call(&publish, "claim").type_argument(SUI_COIN_TYPE), other)
            .await
            .unwrap();
        assert_eq!(ledger.balance_of(other, SUI_COIN_TYPE), 50);
        assert_eq!(ledger.pool_balance(), 50);

        let again = ledger
            .execute(call(&publish, "claim").type_argument(SUI_COIN_TYPE), other)
            .await
            .unwrap_err();
        assert_eq!(again.move_abort().map(|a| a.code), Some(AbortCodes::default().already_claimed));
    }

    #[tokio::test]
    async fn test_faucet_credits_recipient() {
        let ledger = SimulatedLedger::new();
        let fresh = SuiAddress::new([4; 32]);
        ledger.request_faucet(fresh).await.unwrap();
        assert_eq!(ledger.balance_of(fresh, SUI_COIN_TYPE), u128::from(FAUCET_AMOUNT));
    }

    #[tokio::test]
    async fn test_unknown_object_reports_not_exists() {
        let ledger = SimulatedLedger::new();
        let response = ledger.get_object(ObjectId::new([1; 32])).await.unwrap();
        assert_eq!(response["error"]["code"], "notExists");
    }
}
