//! The contracts file.
//!
//! ```toml
//! [[contracts]]
//! address = "KT1..."
//! track   = "kernel"        # kernel | security_kernel | sequencer
//! active  = true            # optional, defaults to true
//!
//! [indexer]                 # optional
//! page_size = 10000
//!
//! [live]                    # optional
//! reconnect_max_ms = 60000
//!
//! [log.components]          # optional
//! govindex-live = "debug"
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use govindex_indexer::{ContractTarget, IndexerSettings};
use govindex_live::LiveConfig;

use crate::logging::LogConfig;

#[derive(Debug, Deserialize)]
pub struct FileConfig {
    pub contracts: Vec<ContractTarget>,
    #[serde(default)]
    pub indexer: IndexerSettings,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let config: FileConfig = toml::from_str(text).context("invalid contracts file")?;
        if config.contracts.is_empty() {
            bail!("contracts file lists no contracts");
        }
        let mut seen = std::collections::HashSet::new();
        for target in &config.contracts {
            if !seen.insert(target.address.as_str()) {
                bail!("contract {} is listed twice", target.address);
            }
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("loading {}", path.display()))
    }

    /// Targets, narrowed to `only` when given.
    pub fn targets(&self, only: Option<&str>) -> Result<Vec<ContractTarget>> {
        match only {
            None => Ok(self.contracts.clone()),
            Some(address) => {
                let found: Vec<_> = self.contracts.iter().filter(|t| t.address == address).cloned().collect();
                if found.is_empty() {
                    bail!("contract {address} is not in the contracts file");
                }
                Ok(found)
            }
        }
    }
}
