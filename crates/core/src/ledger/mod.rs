//! Ledger seam: identifiers, call descriptions, receipts, and the [`Ledger`]
//! trait through which every network interaction flows.
//!
//! ## Architecture
//!
//! The distribution workflow never talks to Sui directly. Writes go through
//! [`Ledger::execute`] / [`Ledger::publish`], which return only once the
//! transaction has reached finality. Reads return the raw JSON snapshot the
//! node serves; typed decoding happens in
//! [`crate::distribution::StateReader`].
//!
//! Two implementations exist:
//! - [`SuiCliLedger`] drives the `sui` binary for signed writes and the
//!   JSON-RPC endpoint for reads.
//! - `SimulatedLedger` (test / `testing` feature) emulates the airdrop
//!   contract in memory.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::bcs;

#[cfg(any(test, feature = "testing"))]
pub mod simulated;
pub mod sui_cli;

#[cfg(any(test, feature = "testing"))]
pub use simulated::SimulatedLedger;
pub use sui_cli::SuiCliLedger;

/// Coin type of the native gas coin.
pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

// =============================================================================
// Identifiers
// =============================================================================

/// Errors from parsing a hex address or object id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("empty address")]
    Empty,
    #[error("invalid hex in address `{0}`")]
    InvalidHex(String),
    #[error("address has {0} hex digits, at most 64 allowed")]
    TooLong(usize),
}

/// Parse `0x`-prefixed (or bare) hex, left-padding short forms such as `0x2`.
fn parse_hex32(s: &str) -> Result<[u8; 32], AddressParseError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return Err(AddressParseError::Empty);
    }
    if digits.len() > 64 {
        return Err(AddressParseError::TooLong(digits.len()));
    }
    let padded = format!("{digits:0>64}");
    let bytes = hex::decode(padded).map_err(|_| AddressParseError::InvalidHex(s.to_string()))?;
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

macro_rules! hex32_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const fn new(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = AddressParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex32(s.trim()).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex32_id!(
    /// A 32-byte Sui account address.
    SuiAddress
);

hex32_id!(
    /// A 32-byte Sui object (or package) identifier.
    ObjectId
);

// =============================================================================
// Call descriptions
// =============================================================================

/// Spendable coin produced by [`Ledger::prepare_amount`].
///
/// The handle is consumed whole by the call it is passed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinHandle {
    pub coin_type: String,
    pub amount: u64,
    pub source: CoinSource,
}

/// Where the ledger splits a [`CoinHandle`] from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoinSource {
    /// Split from the gas coin (native SUI only).
    Gas,
    /// Merge these coins into the first one, then split.
    Coins(Vec<ObjectId>),
}

/// Pure (non-object) argument values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PureArg {
    AddressVector(Vec<SuiAddress>),
}

impl PureArg {
    /// BCS size as the value travels in the transaction.
    pub fn encoded_len(&self) -> usize {
        match self {
            PureArg::AddressVector(addrs) => bcs::vector_len(addrs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// Shared or owned object passed by id.
    Object(ObjectId),
    Coin(CoinHandle),
    Pure(PureArg),
}

/// A single entry-point invocation.
///
/// Built fresh for every operation and handed to [`Ledger::execute`] by
/// value; nothing about a call outlives its submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<CallArg>,
}

impl MoveCall {
    pub fn new(package: ObjectId, module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            package,
            module: module.into(),
            function: function.into(),
            type_arguments: Vec::new(),
            arguments: Vec::new(),
        }
    }

    pub fn type_argument(mut self, type_tag: impl Into<String>) -> Self {
        self.type_arguments.push(type_tag.into());
        self
    }

    pub fn argument(mut self, arg: CallArg) -> Self {
        self.arguments.push(arg);
        self
    }

    /// `package::module::function`
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

// =============================================================================
// Receipts
// =============================================================================

/// One entry of a transaction's `objectChanges`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectChange {
    #[serde(rename_all = "camelCase")]
    Published { package_id: ObjectId },
    #[serde(rename_all = "camelCase")]
    Created {
        object_id: ObjectId,
        object_type: String,
    },
    #[serde(other)]
    Other,
}

/// Result of a transaction that reached finality successfully.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
    pub digest: String,
    #[serde(default)]
    pub object_changes: Vec<ObjectChange>,
}

/// Key of a dynamic field as the JSON-RPC API expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicFieldName {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: Value,
}

impl DynamicFieldName {
    pub fn address(address: SuiAddress) -> Self {
        Self {
            type_name: "address".to_string(),
            value: Value::String(address.to_string()),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// A Move abort reported by transaction execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveAbort {
    /// Module the abort was raised in (e.g. `suiadrop`, `dynamic_field`).
    pub module: String,
    pub function: Option<String>,
    pub code: u64,
}

impl fmt::Display for MoveAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "{}::{} aborted with code {}", self.module, function, self.code),
            None => write!(f, "{} aborted with code {}", self.module, self.code),
        }
    }
}

/// Errors from the ledger collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("move abort: {0}")]
    MoveAbort(MoveAbort),
    #[error("transaction failed: {0}")]
    ExecutionFailed(String),
    #[error("insufficient {coin_type} balance: required {required}, available {available}")]
    InsufficientFunds {
        coin_type: String,
        required: u64,
        available: u128,
    },
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("`{program}` failed: {message}")]
    Command { program: String, message: String },
    #[error("failed to parse ledger response: {0}")]
    Parse(String),
    #[error("signer {0} is not available to this ledger")]
    UnknownSigner(SuiAddress),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

impl LedgerError {
    pub fn move_abort(&self) -> Option<&MoveAbort> {
        match self {
            LedgerError::MoveAbort(abort) => Some(abort),
            _ => None,
        }
    }
}

// =============================================================================
// Trait: Ledger
// =============================================================================

/// Boxed future returned by every [`Ledger`] method.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Abstraction over the Sui network for testability.
///
/// Every write resolves only after finality; a read issued after an awaited
/// write observes that write.
pub trait Ledger: Send + Sync + 'static {
    /// Address the ledger signs for by default.
    fn active_address(&self) -> SuiAddress;

    /// Ask the faucet for bootstrap gas.
    fn request_faucet(&self, recipient: SuiAddress) -> LedgerFuture<'_, ()>;

    /// Publish the Move package at `package_path`.
    fn publish(&self, package_path: PathBuf, signer: SuiAddress) -> LedgerFuture<'_, ExecutionReceipt>;

    /// Select (and, at execution time, merge/split) coins worth `amount`.
    fn prepare_amount(
        &self,
        signer: SuiAddress,
        coin_type: String,
        amount: u64,
    ) -> LedgerFuture<'_, CoinHandle>;

    /// Submit `call` and wait for finality.
    fn execute(&self, call: MoveCall, signer: SuiAddress) -> LedgerFuture<'_, ExecutionReceipt>;

    /// `sui_getObject` with content.
    fn get_object(&self, id: ObjectId) -> LedgerFuture<'_, Value>;

    /// `suix_getDynamicFields`, one page.
    fn get_dynamic_fields(&self, parent: ObjectId, cursor: Option<String>) -> LedgerFuture<'_, Value>;

    /// `suix_getDynamicFieldObject`; a missing key is reported in the
    /// response body, not as an `Err`.
    fn get_dynamic_field_object(
        &self,
        parent: ObjectId,
        name: DynamicFieldName,
    ) -> LedgerFuture<'_, Value>;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_short_form_is_left_padded() {
        let addr: SuiAddress = "0x2".parse().unwrap();
        let mut expected = [0u8; 32];
        expected[31] = 2;
        assert_eq!(addr.as_bytes(), &expected);
        assert_eq!(
            addr.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000002"
        );
    }

    #[test]
    fn test_address_parse_errors() {
        assert_eq!("0x".parse::<SuiAddress>(), Err(AddressParseError::Empty));
        assert!(matches!(
            "0xzz".parse::<SuiAddress>(),
            Err(AddressParseError::InvalidHex(_))
        ));
        let long = format!("0x{}", "a".repeat(65));
        assert_eq!(long.parse::<SuiAddress>(), Err(AddressParseError::TooLong(65)));
    }

    #[test]
    fn test_address_serde_as_string() {
        let addr = SuiAddress::new([0xab; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));
        let back: SuiAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn test_object_changes_decode() {
        let json = serde_json::json!({
            "digest": "9xQ",
            "objectChanges": [
                { "type": "mutated", "objectId": "0x5", "objectType": "0x2::coin::Coin<0x2::sui::SUI>" },
                { "type": "published", "packageId": "0xabc", "version": "1", "modules": ["suiadrop"] },
                { "type": "created", "objectId": "0xdef", "objectType": "0xabc::suiadrop::Global" }
            ]
        });
        let receipt: ExecutionReceipt = serde_json::from_value(json).unwrap();
        assert_eq!(receipt.object_changes.len(), 3);
        assert_eq!(receipt.object_changes[0], ObjectChange::Other);
        assert_eq!(
            receipt.object_changes[1],
            ObjectChange::Published {
                package_id: "0xabc".parse().unwrap()
            }
        );
    }

    #[test]
    fn test_move_call_target_and_pure_size() {
        let pkg: ObjectId = "0x1234".parse().unwrap();
        let call = MoveCall::new(pkg, "suiadrop", "add_whitelist")
            .argument(CallArg::Pure(PureArg::AddressVector(vec![SuiAddress::new([7; 32]); 3])));
        assert!(call.target().ends_with("::suiadrop::add_whitelist"));
        let CallArg::Pure(pure) = &call.arguments[0] else {
            panic!("expected pure argument");
        };
        assert_eq!(pure.encoded_len(), 1 + 3 * 32);
        let PureArg::AddressVector(addrs) = pure;
        assert_eq!(crate::bcs::encode::encode_vector(addrs).len(), pure.encoded_len());
    }
}
