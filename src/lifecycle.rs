//! # Pool Lifecycle
//!
//! ```text
//! Deployed ──prepare_index_pool──▶ InitializerAssigned ──finish_prepared_index_pool──▶ Finalized
//! ```
//!
//! `prepare_index_pool` deploys the pool and its initializer in one action, so a
//! pool is only ever observed as `Deployed` when metadata was restored without an
//! initializer. Only the initializer bound at preparation may finalize it, and
//! preparation refuses an initializer deployed anywhere but its derived address.

use crate::constants::{INITIALIZER_IMPLEMENTATION_ID, MAX_INDEX_SIZE, MIN_INDEX_SIZE, SELLER_IMPLEMENTATION_ID};
use crate::controller::IndexController;
use crate::error::{ControllerError, ControllerResult};
use crate::events::ControllerEvent;
use crate::fixed_point::fits_u144;
use crate::metrics;
use crate::proxy::{pool_companion_salt, pool_salt};
use crate::weighting::{self, compute_weights, weighted_balance, weights_from_values};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStage {
    Deployed,
    InitializerAssigned,
    Finalized,
}

impl PoolStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStage::Deployed => "deployed",
            PoolStage::InitializerAssigned => "initializer_assigned",
            PoolStage::Finalized => "finalized",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPoolMeta {
    pub category_id: u64,
    pub index_size: usize,
    pub initialized: bool,
    pub initializer: Option<Address>,
}

impl IndexPoolMeta {
    pub fn stage(&self) -> PoolStage {
        match (self.initialized, self.initializer) {
            (true, _) => PoolStage::Finalized,
            (false, Some(_)) => PoolStage::InitializerAssigned,
            (false, None) => PoolStage::Deployed,
        }
    }
}

/// Metadata of every pool the controller deployed, keyed by pool address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolBook {
    pools: HashMap<Address, IndexPoolMeta>,
}

impl PoolBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn get(&self, pool: Address) -> Option<&IndexPoolMeta> {
        self.pools.get(&pool)
    }

    pub fn require(&self, pool: Address) -> ControllerResult<&IndexPoolMeta> {
        self.pools.get(&pool).ok_or(ControllerError::PoolNotFound(pool))
    }

    pub fn require_finalized(&self, pool: Address) -> ControllerResult<&IndexPoolMeta> {
        let meta = self.require(pool)?;
        if !meta.initialized {
            return Err(ControllerError::PoolNotFinalized(pool));
        }
        Ok(meta)
    }

    /// Pool already deployed for `(category_id, index_size)`, if any.
    pub fn find(&self, category_id: u64, index_size: usize) -> Option<Address> {
        self.pools
            .iter()
            .find(|(_, meta)| meta.category_id == category_id && meta.index_size == index_size)
            .map(|(pool, _)| *pool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &IndexPoolMeta)> {
        self.pools.iter()
    }

    pub(crate) fn insert(&mut self, pool: Address, meta: IndexPoolMeta) {
        self.pools.insert(pool, meta);
    }

    pub(crate) fn mark_finalized(&mut self, pool: Address) {
        if let Some(meta) = self.pools.get_mut(&pool) {
            meta.initialized = true;
        }
    }
}

impl IndexController {
    pub fn pool_meta(&self, pool: Address) -> Option<IndexPoolMeta> {
        self.pools.get(pool).copied()
    }

    pub fn pool_stage(&self, pool: Address) -> ControllerResult<PoolStage> {
        Ok(self.pools.require(pool)?.stage())
    }

    pub fn pools(&self) -> &PoolBook {
        &self.pools
    }

    /// Top `index_size` tokens of a category and the balance of each worth its
    /// market-cap weight of `total_value`.
    pub fn get_initial_tokens_and_balances(
        &self,
        category_id: u64,
        index_size: usize,
        total_value: U256,
        now: u64,
    ) -> ControllerResult<(Vec<Address>, Vec<U256>)> {
        let tokens = self.registry.get_top_tokens(category_id, index_size, now)?;
        let prices = self
            .collaborators
            .oracle
            .compute_average_prices(&tokens)
            .map_err(ControllerError::collaborator)?;
        let caps = self.compute_average_market_caps(&tokens)?;
        let weights = compute_weights(&tokens, &caps)?;

        let balances = weights
            .iter()
            .zip(&prices)
            .map(|(weight, price)| weighted_balance(total_value, *weight, *price))
            .collect::<Result<Vec<U256>, _>>()?;
        Ok((tokens, balances))
    }

    /// Deploys an index pool for the top `index_size` tokens of a category together
    /// with the initializer that will collect `initial_value` worth of them.
    ///
    /// Returns `(pool, initializer)`.
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_index_pool(
        &mut self,
        caller: Address,
        category_id: u64,
        index_size: usize,
        initial_value: U256,
        name: &str,
        symbol: &str,
        now: u64,
    ) -> ControllerResult<(Address, Address)> {
        let result = self.try_prepare_index_pool(caller, category_id, index_size, initial_value, name, symbol, now);
        Self::observe("prepare_index_pool", result)
    }

    #[allow(clippy::too_many_arguments)]
    fn try_prepare_index_pool(
        &mut self,
        caller: Address,
        category_id: u64,
        index_size: usize,
        initial_value: U256,
        name: &str,
        symbol: &str,
        now: u64,
    ) -> ControllerResult<(Address, Address)> {
        self.require_owner(caller)?;
        if !(MIN_INDEX_SIZE..=MAX_INDEX_SIZE).contains(&index_size) {
            return Err(ControllerError::IndexSizeOutOfRange(index_size));
        }
        if !fits_u144(initial_value) {
            return Err(ControllerError::ValueOutOfRange(initial_value));
        }
        if let Some(existing) = self.pools.find(category_id, index_size) {
            return Err(ControllerError::PoolAlreadyExists(existing));
        }

        let (tokens, balances) =
            self.get_initial_tokens_and_balances(category_id, index_size, initial_value, now)?;

        let pool = self
            .collaborators
            .pool_factory
            .deploy_index_pool(pool_salt(category_id, index_size), name, symbol)
            .map_err(ControllerError::collaborator)?;
        if self.pools.get(pool).is_some() {
            return Err(ControllerError::PoolAlreadyExists(pool));
        }

        let salt = pool_companion_salt(pool);
        let initializer = self
            .collaborators
            .proxy_manager
            .deploy_proxy_many_to_one(*INITIALIZER_IMPLEMENTATION_ID, salt)
            .map_err(ControllerError::collaborator)?;
        let expected = self.compute_initializer_address(pool);
        if initializer != expected {
            warn!("🚨 initializer for {:?} deployed at {:?}, expected {:?}", pool, initializer, expected);
            return Err(ControllerError::ProxyAddressMismatch {
                expected,
                actual: initializer,
            });
        }
        self.collaborators
            .initializers
            .initialize(initializer, pool, &tokens, &balances)
            .map_err(ControllerError::collaborator)?;

        self.pools.insert(
            pool,
            IndexPoolMeta {
                category_id,
                index_size,
                initialized: false,
                initializer: Some(initializer),
            },
        );
        self.events.push(ControllerEvent::NewPoolInitializer {
            pool,
            initializer,
            category_id,
            index_size,
        });
        metrics::increment_pool_stage("prepared");
        info!(
            "🏗️ Prepared pool {:?} ({} tokens, category {}), initializer {:?}",
            pool, index_size, category_id, initializer
        );
        Ok((pool, initializer))
    }

    /// Finalizes a prepared pool with the contributions its initializer collected.
    ///
    /// Weights are proportional to the value of each contributed balance, so the pool
    /// starts at whatever mix was actually delivered.
    pub fn finish_prepared_index_pool(
        &mut self,
        caller: Address,
        pool: Address,
        tokens: &[Address],
        balances: &[U256],
        now: u64,
    ) -> ControllerResult<()> {
        let result = self.try_finish_prepared_index_pool(caller, pool, tokens, balances, now);
        Self::observe("finish_prepared_index_pool", result)
    }

    fn try_finish_prepared_index_pool(
        &mut self,
        caller: Address,
        pool: Address,
        tokens: &[Address],
        balances: &[U256],
        now: u64,
    ) -> ControllerResult<()> {
        let meta = *self.pools.require(pool)?;
        if meta.initializer != Some(caller) {
            warn!("🚨 {:?} tried to finalize pool {:?}", caller, pool);
            return Err(ControllerError::NotInitializer { caller, pool });
        }
        if meta.initialized {
            return Err(ControllerError::AlreadyFinalized(pool));
        }
        if tokens.len() != balances.len() {
            return Err(ControllerError::ArrayLengthMismatch(tokens.len(), balances.len()));
        }
        if tokens.len() != meta.index_size {
            return Err(ControllerError::ArrayLengthMismatch(tokens.len(), meta.index_size));
        }

        let values = self
            .collaborators
            .oracle
            .compute_average_amounts_out(tokens, balances)
            .map_err(ControllerError::collaborator)?;
        let weights = weights_from_values(&values)?;
        let denorms = weighting::denormalize_weights(&weights)?;

        let seller = self.compute_seller_address(pool);
        self.collaborators
            .pools
            .initialize(pool, tokens, balances, &denorms, self.config.address, seller)
            .map_err(ControllerError::collaborator)?;
        let deployed_seller = self
            .collaborators
            .proxy_manager
            .deploy_proxy_many_to_one(*SELLER_IMPLEMENTATION_ID, pool_companion_salt(pool))
            .map_err(ControllerError::collaborator)?;
        if deployed_seller != seller {
            return Err(ControllerError::ProxyAddressMismatch {
                expected: seller,
                actual: deployed_seller,
            });
        }
        self.collaborators
            .sellers
            .initialize(seller, pool, self.default_seller_premium)
            .map_err(ControllerError::collaborator)?;

        self.pools.mark_finalized(pool);
        self.schedule.start(pool, now);
        self.events.push(ControllerEvent::PoolInitialized {
            pool,
            token_seller: seller,
            category_id: meta.category_id,
            index_size: meta.index_size,
        });
        metrics::increment_pool_stage("finalized");
        info!("✅ Finalized pool {:?} with token seller {:?}", pool, seller);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(initialized: bool, initializer: Option<Address>) -> IndexPoolMeta {
        IndexPoolMeta {
            category_id: 1,
            index_size: 3,
            initialized,
            initializer,
        }
    }

    #[test]
    fn test_stage_from_meta() {
        assert_eq!(meta(false, None).stage(), PoolStage::Deployed);
        assert_eq!(
            meta(false, Some(Address::from_low_u64_be(9))).stage(),
            PoolStage::InitializerAssigned
        );
        assert_eq!(meta(true, Some(Address::from_low_u64_be(9))).stage(), PoolStage::Finalized);
    }

    #[test]
    fn test_pool_book_lookups() {
        let mut book = PoolBook::new();
        let pool = Address::from_low_u64_be(1);
        assert!(matches!(book.require(pool), Err(ControllerError::PoolNotFound(_))));

        book.insert(pool, meta(false, Some(Address::from_low_u64_be(2))));
        assert!(matches!(
            book.require_finalized(pool),
            Err(ControllerError::PoolNotFinalized(_))
        ));
        assert_eq!(book.find(1, 3), Some(pool));
        assert_eq!(book.find(1, 4), None);

        book.mark_finalized(pool);
        assert!(book.require_finalized(pool).is_ok());
        assert_eq!(book.len(), 1);
    }
}
