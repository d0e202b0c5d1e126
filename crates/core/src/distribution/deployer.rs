//! Publishing the airdrop package and locating its shared state object.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ContractConfig;
use crate::ledger::{ExecutionReceipt, Ledger, LedgerError, ObjectChange, ObjectId, SuiAddress};

/// Identifiers of one deployed airdrop instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub package_id: ObjectId,
    /// Shared distribution-state object created at publish time.
    pub global_id: ObjectId,
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(
        "deployment incomplete: expected exactly one published package and one state object, \
         found {published} package(s) and {state_objects} state object(s)"
    )]
    DeploymentIncomplete {
        published: usize,
        state_objects: usize,
    },
    #[error("publish failed: {0}")]
    Ledger(#[from] LedgerError),
}

pub struct ContractDeployer {
    ledger: Arc<dyn Ledger>,
    /// `::module::Struct` suffix identifying the state object type.
    state_type_suffix: String,
}

impl ContractDeployer {
    pub fn new(ledger: Arc<dyn Ledger>, contract: &ContractConfig) -> Self {
        Self {
            ledger,
            state_type_suffix: format!("::{}::{}", contract.module, contract.state_struct),
        }
    }

    /// Publish the package at `package_path` and wait for finality.
    pub async fn deploy(&self, package_path: &Path, signer: SuiAddress) -> Result<PublishResult, DeployError> {
        tracing::info!(path = %package_path.display(), %signer, "publishing airdrop package");
        let receipt = self.ledger.publish(package_path.to_path_buf(), signer).await?;
        let result = self.extract(&receipt)?;
        tracing::info!(
            digest = %receipt.digest,
            package_id = %result.package_id,
            global_id = %result.global_id,
            "airdrop package published"
        );
        Ok(result)
    }

    /// Pick the package id and state object id out of the publish effects.
    pub fn extract(&self, receipt: &ExecutionReceipt) -> Result<PublishResult, DeployError> {
        let packages: Vec<ObjectId> = receipt
            .object_changes
            .iter()
            .filter_map(|change| match change {
                ObjectChange::Published { package_id } => Some(*package_id),
                _ => None,
            })
            .collect();
        let states: Vec<ObjectId> = receipt
            .object_changes
            .iter()
            .filter_map(|change| match change {
                ObjectChange::Created {
                    object_id,
                    object_type,
                } if self.is_state_type(object_type) => Some(*object_id),
                _ => None,
            })
            .collect();

        match (packages.as_slice(), states.as_slice()) {
            ([package_id], [global_id]) => Ok(PublishResult {
                package_id: *package_id,
                global_id: *global_id,
            }),
            _ => Err(DeployError::DeploymentIncomplete {
                published: packages.len(),
                state_objects: states.len(),
            }),
        }
    }

    fn is_state_type(&self, object_type: &str) -> bool {
        let base = object_type.split('<').next().unwrap_or(object_type);
        base.ends_with(&self.state_type_suffix)
    }
}
