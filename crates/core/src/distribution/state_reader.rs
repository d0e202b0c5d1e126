//! Read-only view of a deployed airdrop's on-chain state.
//!
//! The ledger hands back untyped JSON snapshots. Everything is decoded here
//! into typed structs; a snapshot that does not have the expected shape is
//! reported as [`QueryError::MalformedStateSnapshot`] instead of being
//! guessed at. A whitelist lookup that finds no entry is a normal
//! [`WhitelistStatus::NotRegistered`] result.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use serde_with::{serde_as, DisplayFromStr};

use crate::config::ContractConfig;
use crate::ledger::{DynamicFieldName, Ledger, LedgerError, ObjectId, SuiAddress};

/// Error code the node uses when a dynamic field key is absent.
const DYNAMIC_FIELD_NOT_FOUND: &str = "dynamicFieldNotFound";

/// Upper bound on listing pages, in case a node keeps returning cursors.
const MAX_LISTING_PAGES: usize = 10_000;

// =============================================================================
// Public types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("malformed state snapshot for {object}: {reason}")]
    MalformedStateSnapshot { object: ObjectId, reason: String },
    #[error("object {object} not found ({code})")]
    ObjectNotFound { object: ObjectId, code: String },
    #[error("query failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Decoded distribution-state object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSnapshot {
    pub global_id: ObjectId,
    /// Remaining reward pool.
    pub balance: u64,
    /// Backing table of the whitelist index.
    pub whitelist_table_id: ObjectId,
    pub whitelist_size: u64,
}

/// Observed status of one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhitelistStatus {
    NotRegistered,
    RegisteredUnclaimed,
    RegisteredClaimed,
}

impl WhitelistStatus {
    pub fn is_registered(self) -> bool {
        !matches!(self, WhitelistStatus::NotRegistered)
    }

    pub fn has_claimed(self) -> bool {
        matches!(self, WhitelistStatus::RegisteredClaimed)
    }
}

impl fmt::Display for WhitelistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WhitelistStatus::NotRegistered => "not registered",
            WhitelistStatus::RegisteredUnclaimed => "registered, unclaimed",
            WhitelistStatus::RegisteredClaimed => "registered, claimed",
        })
    }
}

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Debug, Deserialize)]
struct ObjectResponse<F> {
    data: Option<ObjectData<F>>,
    error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    code: String,
}

#[derive(Debug, Deserialize)]
struct ObjectData<F> {
    content: Option<MoveObjectContent<F>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveObjectContent<F> {
    data_type: String,
    #[serde(rename = "type")]
    type_name: String,
    fields: F,
}

#[derive(Debug, Deserialize)]
struct Nested<F> {
    fields: F,
}

#[derive(Debug, Deserialize)]
struct UidFields {
    id: ObjectId,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct TableFields {
    id: UidFields,
    #[serde_as(as = "DisplayFromStr")]
    size: u64,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct GlobalFields {
    #[serde_as(as = "DisplayFromStr")]
    balance: u64,
    whitelist: Nested<TableFields>,
}

#[derive(Debug, Deserialize)]
struct WhitelistFieldFields {
    value: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DynamicFieldPage {
    data: Vec<DynamicFieldInfo>,
    next_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct DynamicFieldInfo {
    name: DynamicFieldKey,
}

#[derive(Debug, Deserialize)]
struct DynamicFieldKey {
    #[serde(rename = "type")]
    type_name: String,
    value: Value,
}

fn decode<T: DeserializeOwned>(object: ObjectId, value: Value) -> Result<T, QueryError> {
    serde_json::from_value(value).map_err(|e| QueryError::MalformedStateSnapshot {
        object,
        reason: e.to_string(),
    })
}

fn malformed(object: ObjectId, reason: impl Into<String>) -> QueryError {
    QueryError::MalformedStateSnapshot {
        object,
        reason: reason.into(),
    }
}

// =============================================================================
// StateReader
// =============================================================================

#[derive(Clone)]
pub struct StateReader {
    ledger: Arc<dyn Ledger>,
    global_id: ObjectId,
    /// `::module::Struct` suffix the global object's type must carry.
    state_type_suffix: String,
}

impl StateReader {
    pub fn new(ledger: Arc<dyn Ledger>, global_id: ObjectId, contract: &ContractConfig) -> Self {
        Self {
            ledger,
            global_id,
            state_type_suffix: format!("::{}::{}", contract.module, contract.state_struct),
        }
    }

    /// Read and decode the distribution-state object.
    pub async fn global_state(&self) -> Result<GlobalSnapshot, QueryError> {
        let raw = self.ledger.get_object(self.global_id).await?;
        let response: ObjectResponse<GlobalFields> = decode(self.global_id, raw)?;

        if let Some(error) = response.error {
            return Err(QueryError::ObjectNotFound {
                object: self.global_id,
                code: error.code,
            });
        }
        let content = response
            .data
            .ok_or_else(|| malformed(self.global_id, "response has neither data nor error"))?
            .content
            .ok_or_else(|| malformed(self.global_id, "object has no content"))?;

        if content.data_type != "moveObject" {
            return Err(malformed(
                self.global_id,
                format!("expected a move object, got `{}`", content.data_type),
            ));
        }
        let base_type = content.type_name.split('<').next().unwrap_or_default();
        if !base_type.ends_with(&self.state_type_suffix) {
            return Err(malformed(
                self.global_id,
                format!("unexpected object type `{}`", content.type_name),
            ));
        }

        Ok(GlobalSnapshot {
            global_id: self.global_id,
            balance: content.fields.balance,
            whitelist_table_id: content.fields.whitelist.fields.id.id,
            whitelist_size: content.fields.whitelist.fields.size,
        })
    }

    /// Status of `address`, reading the table id fresh.
    pub async fn status(&self, address: SuiAddress) -> Result<WhitelistStatus, QueryError> {
        let snapshot = self.global_state().await?;
        self.lookup(snapshot.whitelist_table_id, address).await
    }

    /// Status of every address, with lookups issued concurrently.
    pub async fn statuses(
        &self,
        addresses: &[SuiAddress],
    ) -> Result<Vec<(SuiAddress, WhitelistStatus)>, QueryError> {
        let table_id = self.global_state().await?.whitelist_table_id;
        let lookups = addresses.iter().map(|&address| async move {
            let status = self.lookup(table_id, address).await?;
            Ok::<_, QueryError>((address, status))
        });
        futures::future::try_join_all(lookups).await
    }

    /// Look `address` up in the whitelist table `table_id`.
    pub async fn lookup(&self, table_id: ObjectId, address: SuiAddress) -> Result<WhitelistStatus, QueryError> {
        let raw = self
            .ledger
            .get_dynamic_field_object(table_id, DynamicFieldName::address(address))
            .await?;
        let response: ObjectResponse<WhitelistFieldFields> = decode(table_id, raw)?;

        match (response.data, response.error) {
            (_, Some(error)) if error.code == DYNAMIC_FIELD_NOT_FOUND => {
                tracing::debug!(%address, "address not in whitelist");
                Ok(WhitelistStatus::NotRegistered)
            }
            (_, Some(error)) => Err(QueryError::ObjectNotFound {
                object: table_id,
                code: error.code,
            }),
            (Some(data), None) => {
                let content = data
                    .content
                    .ok_or_else(|| malformed(table_id, "whitelist entry has no content"))?;
                let status = if content.fields.value {
                    WhitelistStatus::RegisteredClaimed
                } else {
                    WhitelistStatus::RegisteredUnclaimed
                };
                tracing::debug!(%address, %status, "whitelist entry found");
                Ok(status)
            }
            (None, None) => Err(malformed(table_id, "response has neither data nor error")),
        }
    }

    /// Every registered address, following listing cursors to the end.
    pub async fn list_whitelist(&self) -> Result<Vec<SuiAddress>, QueryError> {
        let snapshot = self.global_state().await?;
        let table_id = snapshot.whitelist_table_id;

        // `whitelist_size` is node-reported; don't size allocations from it.
        let mut addresses = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_LISTING_PAGES {
            let raw = self.ledger.get_dynamic_fields(table_id, cursor.take()).await?;
            let page: DynamicFieldPage = decode(table_id, raw)?;
            for info in page.data {
                if info.name.type_name != "address" {
                    return Err(malformed(
                        table_id,
                        format!("unexpected key type `{}`", info.name.type_name),
                    ));
                }
                addresses.push(decode(table_id, info.name.value)?);
            }
            match (page.has_next_page, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => return Ok(addresses),
            }
        }
        Err(malformed(table_id, "dynamic field listing did not terminate"))
    }
}

// =============================================================================
// Tests
// =============================================================================
