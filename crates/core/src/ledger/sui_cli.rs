//! Production ledger backed by the `sui` binary and the JSON-RPC endpoint.
//!
//! Signed writes shell out to `sui client publish` / `sui client ptb` with
//! `--json`, so the keystore stays under the CLI's control. Reads and the
//! faucet go over HTTP.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::{json, Value};
use serde_with::{serde_as, DisplayFromStr};
use tokio::process::Command;

use super::{
    CallArg, CoinHandle, CoinSource, DynamicFieldName, ExecutionReceipt, Ledger, LedgerError,
    LedgerFuture, MoveAbort, MoveCall, ObjectId, PureArg, SuiAddress, SUI_COIN_TYPE,
};
use crate::config::NetworkConfig;

/// Page size for `suix_getCoins`.
const COIN_PAGE_LIMIT: u32 = 50;

// =============================================================================
// Response shapes
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    #[serde_as(as = "DisplayFromStr")]
    total_balance: u128,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinEntry {
    coin_object_id: ObjectId,
    #[serde_as(as = "DisplayFromStr")]
    balance: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinPage {
    data: Vec<CoinEntry>,
    next_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct ExecutionStatus {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Effects {
    status: ExecutionStatus,
}

/// `--json` output of a CLI transaction.
#[derive(Debug, Deserialize)]
struct CliTransaction {
    #[serde(flatten)]
    receipt: ExecutionReceipt,
    effects: Option<Effects>,
}

// =============================================================================
// SuiCliLedger
// =============================================================================

pub struct SuiCliLedger {
    http: reqwest::Client,
    rpc_url: String,
    faucet_url: Option<String>,
    sui_bin: PathBuf,
    gas_budget: u64,
    active: SuiAddress,
    request_id: AtomicU64,
}

impl SuiCliLedger {
    /// Build the HTTP client and resolve the CLI's active address.
    pub async fn connect(network: &NetworkConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(network.http_timeout())
            .build()?;
        let stdout = run_cli(&network.sui_bin, &["client", "active-address"]).await?;
        let active: SuiAddress = stdout
            .trim()
            .parse()
            .map_err(|e| LedgerError::Parse(format!("active address `{}`: {e}", stdout.trim())))?;
        tracing::info!(%active, rpc_url = %network.rpc_url, "connected to sui");
        Ok(Self {
            http,
            rpc_url: network.rpc_url.clone(),
            faucet_url: network.faucet_url.clone(),
            sui_bin: network.sui_bin.clone(),
            gas_budget: network.gas_budget,
            active,
            request_id: AtomicU64::new(1),
        })
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        tracing::debug!(method, id, "json-rpc request");
        let response: RpcResponse = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(err) = response.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        response
            .result
            .ok_or_else(|| LedgerError::Parse(format!("{method}: response has no result")))
    }

    fn ensure_signer(&self, signer: SuiAddress) -> Result<(), LedgerError> {
        if signer == self.active {
            Ok(())
        } else {
            Err(LedgerError::UnknownSigner(signer))
        }
    }

    async fn run_transaction(&self, args: Vec<String>) -> Result<ExecutionReceipt, LedgerError> {
        let stdout = run_cli(&self.sui_bin, &args).await?;
        let tx: CliTransaction = serde_json::from_str(&stdout)
            .map_err(|e| LedgerError::Parse(format!("transaction output: {e}")))?;
        if let Some(effects) = tx.effects {
            if effects.status.status != "success" {
                let message = effects.status.error.unwrap_or(effects.status.status);
                return Err(classify_failure(&message));
            }
        }
        Ok(tx.receipt)
    }

    async fn select_coins(
        &self,
        owner: SuiAddress,
        coin_type: &str,
        amount: u64,
    ) -> Result<Vec<ObjectId>, LedgerError> {
        let mut selected = Vec::new();
        let mut total: u128 = 0;
        let mut cursor: Option<String> = None;
        loop {
            let result = self
                .rpc(
                    "suix_getCoins",
                    json!([owner, coin_type, cursor, COIN_PAGE_LIMIT]),
                )
                .await?;
            let page: CoinPage = serde_json::from_value(result)
                .map_err(|e| LedgerError::Parse(format!("suix_getCoins: {e}")))?;
            for coin in page.data {
                selected.push(coin.coin_object_id);
                total += u128::from(coin.balance);
                if total >= u128::from(amount) {
                    return Ok(selected);
                }
            }
            if !page.has_next_page || page.next_cursor.is_none() {
                return Err(LedgerError::InsufficientFunds {
                    coin_type: coin_type.to_string(),
                    required: amount,
                    available: total,
                });
            }
            cursor = page.next_cursor;
        }
    }
}

impl Ledger for SuiCliLedger {
    fn active_address(&self) -> SuiAddress {
        self.active
    }

    fn request_faucet(&self, recipient: SuiAddress) -> LedgerFuture<'_, ()> {
        Box::pin(async move {
            let url = self
                .faucet_url
                .as_deref()
                .ok_or(LedgerError::NotConfigured("faucet_url"))?;
            let body = json!({ "FixedAmountRequest": { "recipient": recipient } });
            let response: Value = self
                .http
                .post(url)
                .json(&body)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            match response.get("error") {
                Some(Value::String(message)) => {
                    Err(LedgerError::ExecutionFailed(format!("faucet: {message}")))
                }
                _ => {
                    tracing::info!(%recipient, "faucet request accepted");
                    Ok(())
                }
            }
        })
    }

    fn publish(&self, package_path: PathBuf, signer: SuiAddress) -> LedgerFuture<'_, ExecutionReceipt> {
        Box::pin(async move {
            self.ensure_signer(signer)?;
            let args = vec![
                "client".to_string(),
                "publish".to_string(),
                package_path.display().to_string(),
                "--gas-budget".to_string(),
                self.gas_budget.to_string(),
                "--json".to_string(),
            ];
            self.run_transaction(args).await
        })
    }

    fn prepare_amount(
        &self,
        signer: SuiAddress,
        coin_type: String,
        amount: u64,
    ) -> LedgerFuture<'_, CoinHandle> {
        Box::pin(async move {
            if coin_type == SUI_COIN_TYPE {
                let result = self.rpc("suix_getBalance", json!([signer, coin_type])).await?;
                let balance: BalanceResponse = serde_json::from_value(result)
                    .map_err(|e| LedgerError::Parse(format!("suix_getBalance: {e}")))?;
                let required = u128::from(amount) + u128::from(self.gas_budget);
                if balance.total_balance < required {
                    return Err(LedgerError::InsufficientFunds {
                        coin_type,
                        required: amount,
                        available: balance.total_balance,
                    });
                }
                return Ok(CoinHandle {
                    coin_type,
                    amount,
                    source: CoinSource::Gas,
                });
            }
            let coins = self.select_coins(signer, &coin_type, amount).await?;
            Ok(CoinHandle {
                coin_type,
                amount,
                source: CoinSource::Coins(coins),
            })
        })
    }

    fn execute(&self, call: MoveCall, signer: SuiAddress) -> LedgerFuture<'_, ExecutionReceipt> {
        Box::pin(async move {
            self.ensure_signer(signer)?;
            let mut args = vec!["client".to_string(), "ptb".to_string()];
            args.extend(ptb_args(&call)?);
            args.extend([
                "--sender".to_string(),
                format!("@{signer}"),
                "--gas-budget".to_string(),
                self.gas_budget.to_string(),
                "--json".to_string(),
            ]);
            tracing::debug!(target_fn = %call.target(), "submitting programmable transaction");
            self.run_transaction(args).await
        })
    }

    fn get_object(&self, id: ObjectId) -> LedgerFuture<'_, Value> {
        Box::pin(async move {
            self.rpc(
                "sui_getObject",
                json!([id, { "showContent": true, "showType": true }]),
            )
            .await
        })
    }

    fn get_dynamic_fields(&self, parent: ObjectId, cursor: Option<String>) -> LedgerFuture<'_, Value> {
        Box::pin(async move {
            self.rpc("suix_getDynamicFields", json!([parent, cursor, Value::Null]))
                .await
        })
    }

    fn get_dynamic_field_object(
        &self,
        parent: ObjectId,
        name: DynamicFieldName,
    ) -> LedgerFuture<'_, Value> {
        Box::pin(async move {
            self.rpc("suix_getDynamicFieldObject", json!([parent, name]))
                .await
        })
    }
}

// =============================================================================
// CLI plumbing
// =============================================================================

/// Run the sui binary and return stdout, mapping failures to [`LedgerError`].
async fn run_cli<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> Result<String, LedgerError> {
    let program_name = program.display().to_string();
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| LedgerError::Command {
            program: program_name.clone(),
            message: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = if stderr.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.trim().to_string()
    };
    if let Some(abort) = parse_move_abort(&message) {
        return Err(LedgerError::MoveAbort(abort));
    }
    Err(LedgerError::Command {
        program: program_name,
        message,
    })
}

fn classify_failure(message: &str) -> LedgerError {
    match parse_move_abort(message) {
        Some(abort) => LedgerError::MoveAbort(abort),
        None => LedgerError::ExecutionFailed(message.to_string()),
    }
}

/// Render a [`MoveCall`] as `sui client ptb` arguments.
///
/// A coin handle backed by an empty coin list has nothing to split from and
/// is rejected.
pub fn ptb_args(call: &MoveCall) -> Result<Vec<String>, LedgerError> {
    let mut args = Vec::new();
    let mut rendered = Vec::with_capacity(call.arguments.len());

    for (i, arg) in call.arguments.iter().enumerate() {
        match arg {
            CallArg::Object(id) => rendered.push(format!("@{id}")),
            CallArg::Pure(PureArg::AddressVector(addrs)) => {
                let items: Vec<String> = addrs.iter().map(|a| format!("@{a}")).collect();
                rendered.push(format!("vector[{}]", items.join(",")));
            }
            CallArg::Coin(coin) => {
                let name = format!("coin_{i}");
                let source = match &coin.source {
                    CoinSource::Gas => "gas".to_string(),
                    CoinSource::Coins(ids) => {
                        let Some((primary, rest)) = ids.split_first() else {
                            return Err(LedgerError::InsufficientFunds {
                                coin_type: coin.coin_type.clone(),
                                required: coin.amount,
                                available: 0,
                            });
                        };
                        if !rest.is_empty() {
                            let others: Vec<String> = rest.iter().map(|id| format!("@{id}")).collect();
                            args.push("--merge-coins".to_string());
                            args.push(format!("@{primary}"));
                            args.push(format!("[{}]", others.join(",")));
                        }
                        format!("@{primary}")
                    }
                };
                args.push("--split-coins".to_string());
                args.push(source);
                args.push(format!("[{}]", coin.amount));
                args.push("--assign".to_string());
                args.push(name.clone());
                rendered.push(format!("{name}.0"));
            }
        }
    }

    args.push("--move-call".to_string());
    args.push(call.target());
    if !call.type_arguments.is_empty() {
        args.push(format!("<{}>", call.type_arguments.join(",")));
    }
    args.extend(rendered);
    Ok(args)
}

/// Extract a Move abort from a failure message.
///
/// Understands the raw status form
/// `MoveAbort(MoveLocation { module: ModuleId { .., name: Identifier("m") }, .., function_name: Some("f") }, 1)`
/// and the CLI's humanized form
/// `aborted within function '0x..::m::f' at instruction 12 with code 1`.
pub fn parse_move_abort(message: &str) -> Option<MoveAbort> {
    parse_raw_abort(message).or_else(|| parse_humanized_abort(message))
}

fn between<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = haystack.find(start)? + start.len();
    let len = haystack[from..].find(end)?;
    Some(&haystack[from..from + len])
}

fn leading_digits(s: &str) -> Option<u64> {
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn parse_raw_abort(message: &str) -> Option<MoveAbort> {
    let start = message.find("MoveAbort(")? + "MoveAbort(".len();
    let body = &message[start..];

    // Skip the balanced MoveLocation { .. } to reach the code.
    let open = body.find('{')?;
    let mut depth = 0usize;
    let mut location_end = None;
    for (i, ch) in body[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    location_end = Some(open + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let location = &body[..location_end?];
    let code = leading_digits(body[location_end?..].trim_start_matches([',', ' ']))?;

    Some(MoveAbort {
        module: between(location, "Identifier(\"", "\")")?.to_string(),
        function: between(location, "function_name: Some(\"", "\")").map(str::to_string),
        code,
    })
}

fn parse_humanized_abort(message: &str) -> Option<MoveAbort> {
    let target = between(message, "aborted within function '", "'")?;
    let mut parts = target.rsplit("::");
    let function = parts.next()?.to_string();
    let module = parts.next()?.to_string();
    let code_at = message.find("with code ")? + "with code ".len();
    let code = leading_digits(&message[code_at..])?;
    Some(MoveAbort {
        module,
        function: Some(function),
        code,
    })
}

// =============================================================================
// Tests
// =============================================================================
