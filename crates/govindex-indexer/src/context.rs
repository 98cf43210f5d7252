//! Shared handles and tunables for the indexing pipeline.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use govindex_core::cache::CacheConfig;
use govindex_core::error::IndexerError;
use govindex_core::model::{ContractConfig, GovernanceTrack};
use govindex_core::source::ChainSource;
use govindex_core::store::GovernanceStore;
use govindex_core::types::ContractActivity;
use govindex_storage::{GatewayConfig, PersistenceGateway};

use crate::delegation::DelegationResolver;
use crate::periods::PeriodCalculator;
use crate::processor::OperationProcessor;

/// Indexer tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    /// Row cap of one transaction listing. Reaching it aborts the run.
    pub page_size: usize,
    /// Attempts per persisted record, including the first.
    pub max_persist_attempts: u32,
    /// Pause before the first persistence retry (milliseconds); doubles per retry.
    pub persist_backoff_ms: u64,
    /// Sizing of the resolved-voter cache.
    pub delegation_cache: CacheConfig,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            page_size: 10_000,
            max_persist_attempts: 3,
            persist_backoff_ms: 500,
            delegation_cache: CacheConfig::default(),
        }
    }
}

impl IndexerSettings {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_attempts: self.max_persist_attempts,
            backoff: Duration::from_millis(self.persist_backoff_ms),
        }
    }
}

fn default_active() -> bool {
    true
}

/// A governance contract to index, as listed in the contracts file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTarget {
    pub address: String,
    pub track: GovernanceTrack,
    /// Inactive contracts are indexed up to their last activity only.
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Everything an indexing run needs, cheap to clone.
#[derive(Clone)]
pub struct IndexerContext {
    pub source: Arc<dyn ChainSource>,
    pub gateway: Arc<PersistenceGateway>,
    pub settings: IndexerSettings,
    pub periods: PeriodCalculator,
    pub delegation: Arc<DelegationResolver>,
}

impl IndexerContext {
    pub fn new(source: Arc<dyn ChainSource>, store: Arc<dyn GovernanceStore>, settings: IndexerSettings) -> Self {
        let gateway = Arc::new(PersistenceGateway::new(store, settings.gateway_config()));
        let delegation = Arc::new(DelegationResolver::new(source.clone(), &settings.delegation_cache));
        Self {
            periods: PeriodCalculator::new(source.clone()),
            source,
            gateway,
            settings,
            delegation,
        }
    }

    pub fn processor(&self) -> OperationProcessor {
        OperationProcessor::new(self.source.clone(), self.periods.clone(), self.delegation.clone())
    }

    /// Read a contract's configuration from its genesis storage snapshot.
    pub async fn load_contract(&self, target: &ContractTarget) -> Result<(ContractConfig, ContractActivity), IndexerError> {
        let activity = self
            .source
            .contract_activity(&target.address)
            .await?
            .ok_or_else(|| IndexerError::Config(format!("contract {} not found upstream", target.address)))?;
        let genesis = self
            .source
            .contract_storage(&target.address, activity.first_activity)
            .await?
            .ok_or_else(|| {
                IndexerError::Consistency(format!(
                    "contract {} has no storage at its first activity level {}",
                    target.address, activity.first_activity
                ))
            })?;
        let config = genesis.contract_config(&target.address, target.track, target.active)?;
        debug!(
            contract = %config.address,
            started_at = config.started_at_level,
            period_length = config.period_length,
            "contract config loaded"
        );
        Ok((config, activity))
    }

    /// Stored configuration if present, otherwise the genesis snapshot.
    pub async fn stored_or_chain_contract(&self, target: &ContractTarget) -> Result<ContractConfig, IndexerError> {
        if let Some(config) = self.gateway.contract(&target.address).await? {
            return Ok(config);
        }
        let (config, _) = self.load_contract(target).await?;
        self.gateway.upsert_contract(&config).await;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_defaults_to_active() {
        let target: ContractTarget =
            serde_json::from_str(r#"{"address":"KT1gov","track":"security_kernel"}"#).unwrap();
        assert!(target.active);
        assert_eq!(target.track, GovernanceTrack::SecurityKernel);
    }

    #[test]
    fn gateway_config_from_settings() {
        let cfg = IndexerSettings::default().gateway_config();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.backoff, Duration::from_millis(500));
    }
}
