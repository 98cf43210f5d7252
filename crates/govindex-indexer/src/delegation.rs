//! DelegationResolver: expands a baker into every address voting through it.
//!
//! A governance operation counts for its sender and for every address that
//! delegated its voting rights to the sender on the delegation contract.
//! Each address is priced at its registered voting power in the protocol
//! voting epoch containing the operation's level.

use std::sync::Arc;

use tracing::{debug, warn};

use govindex_core::cache::{BoundedCache, CacheConfig, CacheStats};
use govindex_core::error::IndexerError;
use govindex_core::source::ChainSource;
use govindex_core::types::{find_voting_period, Voter};

pub struct DelegationResolver {
    source: Arc<dyn ChainSource>,
    /// Keyed by `(baker, global_voting_index)`; past epochs never change.
    voters: BoundedCache<(String, u64), Vec<Voter>>,
}

impl DelegationResolver {
    pub fn new(source: Arc<dyn ChainSource>, cache: &CacheConfig) -> Self {
        Self {
            source,
            voters: BoundedCache::new(cache),
        }
    }

    /// Index of the protocol voting epoch containing `level`.
    pub async fn global_voting_index(&self, level: u64) -> Result<Option<u64>, IndexerError> {
        let epochs = self.source.global_voting_periods().await?;
        Ok(find_voting_period(&epochs, level).map(|e| e.index))
    }

    /// Voters for `address` at `level` within epoch `global_index`.
    ///
    /// A failure listing delegators aborts; a failure pricing one address
    /// drops that address with a warning and leaves the result uncached.
    /// Addresses without registered voting power are dropped.
    pub async fn resolve_voters(
        &self,
        address: &str,
        level: u64,
        global_index: u64,
    ) -> Result<Vec<Voter>, IndexerError> {
        let key = (address.to_string(), global_index);
        if let Some(voters) = self.voters.get(&key) {
            return Ok(voters);
        }

        let mut addresses = vec![address.to_string()];
        for delegator in self.source.delegators(address, level).await? {
            if !addresses.contains(&delegator) {
                addresses.push(delegator);
            }
        }

        let mut voters = Vec::with_capacity(addresses.len());
        let mut complete = true;
        for addr in &addresses {
            match self.source.voter(global_index, addr).await {
                Ok(Some(voter)) => voters.push(voter),
                Ok(None) => debug!(address = %addr, global_index, "no registered voting power"),
                Err(e) => {
                    complete = false;
                    warn!(
                        baker = %address,
                        address = %addr,
                        global_index,
                        error = %e,
                        "voting power lookup failed, dropping voter"
                    );
                }
            }
        }

        if complete {
            self.voters.set(key, voters.clone());
        }
        Ok(voters)
    }

    /// [`resolve_voters`](Self::resolve_voters) at the epoch containing `level`.
    /// An uncovered level resolves to no voters.
    pub async fn resolve_at_level(&self, address: &str, level: u64) -> Result<Vec<Voter>, IndexerError> {
        match self.global_voting_index(level).await? {
            Some(index) => self.resolve_voters(address, level, index).await,
            None => {
                warn!(address, level, "no global voting period found, no voters resolved");
                Ok(Vec::new())
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.voters.stats()
    }
}
