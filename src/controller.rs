//! # Index Controller
//!
//! The single stateful service object. It owns category membership (through the
//! [`CategoryRegistry`]), pool metadata (through the [`PoolBook`]) and rebalance
//! cadence (through the [`UpdateSchedule`]), and it is the only path by which any of
//! them change.
//!
//! Every public action is a transaction: it validates, computes, issues its
//! collaborator instructions, and only then commits its own state and appends
//! events. An error at any step leaves the controller untouched.
//!
//! Time is never read from a clock; actions that depend on it take `now`.
//!
//! Pool lifecycle actions live in [`crate::lifecycle`], rebalancing in
//! [`crate::scheduler`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut controller = IndexController::new(config, collaborators)?;
//! let category = controller.create_category(owner, metadata_hash)?;
//! controller.add_tokens(owner, category, &tokens)?;
//! controller.sort_category(category, now)?;
//! let (pool, initializer) =
//!     controller.prepare_index_pool(owner, category, 3, value, "Index", "IDX", now)?;
//! ```

use crate::categories::CategoryRegistry;
use crate::constants::{INITIALIZER_IMPLEMENTATION_ID, MAX_SELLER_PREMIUM, SELLER_IMPLEMENTATION_ID};
use crate::error::{ControllerError, ControllerResult, ErrorClass};
use crate::events::ControllerEvent;
use crate::interfaces::{
    IndexPoolGateway, PoolFactory, PoolInitializerGateway, PriceOracle, ProxyManager,
    TokenSellerGateway, TokenSupply,
};
use crate::lifecycle::PoolBook;
use crate::metrics;
use crate::proxy::{pool_companion_salt, ProxyDeriver};
use crate::scheduler::UpdateSchedule;
use crate::settings::Settings;
use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Static controller configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    pub address: Address,
    pub owner: Address,
    pub default_seller_premium: u8,
    pub proxy_init_code_hash: H256,
}

impl ControllerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            address: settings.controller.address,
            owner: settings.controller.owner,
            default_seller_premium: settings.controller.default_seller_premium,
            proxy_init_code_hash: settings.proxy.init_code_hash,
        }
    }
}

/// External services the controller instructs.
#[derive(Clone)]
pub struct Collaborators {
    pub oracle: Arc<dyn PriceOracle>,
    pub tokens: Arc<dyn TokenSupply>,
    pub pool_factory: Arc<dyn PoolFactory>,
    pub proxy_manager: Arc<dyn ProxyManager>,
    pub pools: Arc<dyn IndexPoolGateway>,
    pub initializers: Arc<dyn PoolInitializerGateway>,
    pub sellers: Arc<dyn TokenSellerGateway>,
}

pub struct IndexController {
    pub(crate) config: ControllerConfig,
    pub(crate) default_seller_premium: u8,
    pub(crate) proxies: ProxyDeriver,
    pub(crate) registry: CategoryRegistry,
    pub(crate) pools: PoolBook,
    pub(crate) schedule: UpdateSchedule,
    pub(crate) events: Vec<ControllerEvent>,
    pub(crate) collaborators: Collaborators,
}

impl IndexController {
    /// Fails with `InvalidPremium` when the configured default premium is outside 1..=19.
    pub fn new(config: ControllerConfig, collaborators: Collaborators) -> ControllerResult<Self> {
        validate_premium(config.default_seller_premium)?;
        let proxies = ProxyDeriver::new(
            collaborators.proxy_manager.address(),
            config.proxy_init_code_hash,
        );
        Ok(Self {
            config,
            default_seller_premium: config.default_seller_premium,
            proxies,
            registry: CategoryRegistry::new(),
            pools: PoolBook::new(),
            schedule: UpdateSchedule::new(),
            events: Vec::new(),
            collaborators,
        })
    }

    pub fn address(&self) -> Address {
        self.config.address
    }

    pub fn owner(&self) -> Address {
        self.config.owner
    }

    pub fn default_seller_premium(&self) -> u8 {
        self.default_seller_premium
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Drains the event log.
    pub fn take_events(&mut self) -> Vec<ControllerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[ControllerEvent] {
        &self.events
    }

    pub(crate) fn require_owner(&self, caller: Address) -> ControllerResult<()> {
        if caller != self.config.owner {
            return Err(ControllerError::Unauthorized(caller));
        }
        Ok(())
    }

    /// Records the outcome of a public action for metrics and logs.
    pub(crate) fn observe<T>(action: &'static str, result: ControllerResult<T>) -> ControllerResult<T> {
        if let Err(err) = &result {
            let class = err.class();
            metrics::increment_rejection(action, class.as_str());
            if class == ErrorClass::Integrity {
                warn!("🚨 {} rejected: {}", action, err);
            } else {
                debug!("{} rejected: {}", action, err);
            }
        }
        result
    }

    // --- Categories ---

    pub fn create_category(&mut self, caller: Address, metadata_hash: H256) -> ControllerResult<u64> {
        Self::observe("create_category", self.try_create_category(caller, metadata_hash))
    }

    fn try_create_category(&mut self, caller: Address, metadata_hash: H256) -> ControllerResult<u64> {
        self.require_owner(caller)?;
        let category_id = self.registry.create_category(metadata_hash);
        self.events.push(ControllerEvent::CategoryAdded {
            category_id,
            metadata_hash,
        });
        Ok(category_id)
    }

    pub fn add_token(&mut self, caller: Address, category_id: u64, token: Address) -> ControllerResult<()> {
        self.add_tokens(caller, category_id, &[token])
    }

    /// Adds tokens to a category and records a price observation for each.
    pub fn add_tokens(&mut self, caller: Address, category_id: u64, tokens: &[Address]) -> ControllerResult<()> {
        Self::observe("add_tokens", self.try_add_tokens(caller, category_id, tokens))
    }

    fn try_add_tokens(&mut self, caller: Address, category_id: u64, tokens: &[Address]) -> ControllerResult<()> {
        self.require_owner(caller)?;

        // validate against a scratch copy so the oracle is only touched on success
        let mut staged = self.registry.clone();
        staged.add_tokens(category_id, tokens)?;
        self.collaborators
            .oracle
            .update_prices(tokens)
            .map_err(ControllerError::collaborator)?;
        self.registry = staged;

        for token in tokens {
            self.events.push(ControllerEvent::TokenAdded {
                token: *token,
                category_id,
            });
        }
        metrics::set_category_tokens(category_id, self.registry.category(category_id)?.tokens().len());
        info!("➕ {} token(s) added to category {}", tokens.len(), category_id);
        Ok(())
    }

    pub fn remove_token(&mut self, caller: Address, category_id: u64, token: Address) -> ControllerResult<()> {
        Self::observe("remove_token", self.try_remove_token(caller, category_id, token))
    }

    fn try_remove_token(&mut self, caller: Address, category_id: u64, token: Address) -> ControllerResult<()> {
        self.require_owner(caller)?;
        self.registry.remove_token(category_id, token)?;
        self.events.push(ControllerEvent::TokenRemoved { token, category_id });
        metrics::set_category_tokens(category_id, self.registry.category(category_id)?.tokens().len());
        Ok(())
    }

    /// Average market caps (price × total supply) of `tokens`, in token order.
    pub fn compute_average_market_caps(&self, tokens: &[Address]) -> ControllerResult<Vec<U256>> {
        let supplies = tokens
            .iter()
            .map(|token| self.collaborators.tokens.total_supply(*token))
            .collect::<anyhow::Result<Vec<U256>>>()
            .map_err(ControllerError::collaborator)?;
        self.collaborators
            .oracle
            .compute_average_amounts_out(tokens, &supplies)
            .map_err(ControllerError::collaborator)
    }

    pub fn category_market_caps(&self, category_id: u64) -> ControllerResult<Vec<U256>> {
        let tokens = self.registry.category_tokens(category_id)?;
        self.compute_average_market_caps(&tokens)
    }

    /// Records a price observation for every member of a category.
    pub fn update_category_prices(&self, category_id: u64) -> ControllerResult<Vec<bool>> {
        let tokens = self.registry.category_tokens(category_id)?;
        self.collaborators
            .oracle
            .update_prices(&tokens)
            .map_err(ControllerError::collaborator)
    }

    /// Proposes a descending market-cap order. Ties keep their current relative order.
    pub fn compute_sorted_order(&self, category_id: u64) -> ControllerResult<Vec<Address>> {
        let tokens = self.registry.category_tokens(category_id)?;
        let caps = self.compute_average_market_caps(&tokens)?;
        let mut ranked: Vec<(Address, U256)> = tokens.into_iter().zip(caps).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(ranked.into_iter().map(|(token, _)| token).collect())
    }

    /// Verifies and records a proposed ranking. Anyone may call this.
    pub fn order_tokens_by_market_cap(
        &mut self,
        category_id: u64,
        proposed_order: &[Address],
        now: u64,
    ) -> ControllerResult<()> {
        Self::observe(
            "order_tokens_by_market_cap",
            self.try_order_tokens(category_id, proposed_order, now),
        )
    }

    fn try_order_tokens(&mut self, category_id: u64, proposed_order: &[Address], now: u64) -> ControllerResult<()> {
        self.registry.validate_permutation(category_id, proposed_order)?;
        let caps = self.compute_average_market_caps(proposed_order)?;
        self.registry
            .order_tokens_by_market_cap(category_id, proposed_order, &caps, now)?;
        self.events.push(ControllerEvent::CategorySorted {
            category_id,
            timestamp: now,
        });
        Ok(())
    }

    /// Computes the ranking off-chain style and submits it.
    pub fn sort_category(&mut self, category_id: u64, now: u64) -> ControllerResult<Vec<Address>> {
        let order = Self::observe("sort_category", self.compute_sorted_order(category_id))?;
        self.order_tokens_by_market_cap(category_id, &order, now)?;
        Ok(order)
    }

    pub fn get_top_category_tokens(&self, category_id: u64, count: usize, now: u64) -> ControllerResult<Vec<Address>> {
        self.registry.get_top_tokens(category_id, count, now)
    }

    // --- Administration (owner-gated passthroughs) ---

    /// Premium (percent) given to new token sellers.
    pub fn set_default_seller_premium(&mut self, caller: Address, premium_percent: u8) -> ControllerResult<()> {
        Self::observe(
            "set_default_seller_premium",
            self.try_set_default_seller_premium(caller, premium_percent),
        )
    }

    fn try_set_default_seller_premium(&mut self, caller: Address, premium_percent: u8) -> ControllerResult<()> {
        self.require_owner(caller)?;
        validate_premium(premium_percent)?;
        self.default_seller_premium = premium_percent;
        self.events.push(ControllerEvent::SellerPremiumUpdated {
            token_seller: None,
            premium_percent,
        });
        Ok(())
    }

    pub fn update_seller_premium(&mut self, caller: Address, pool: Address, premium_percent: u8) -> ControllerResult<()> {
        Self::observe(
            "update_seller_premium",
            self.try_update_seller_premium(caller, pool, premium_percent),
        )
    }

    fn try_update_seller_premium(&mut self, caller: Address, pool: Address, premium_percent: u8) -> ControllerResult<()> {
        self.require_owner(caller)?;
        validate_premium(premium_percent)?;
        self.pools.require_finalized(pool)?;
        let seller = self.compute_seller_address(pool);
        self.collaborators
            .sellers
            .set_premium_rate(seller, premium_percent)
            .map_err(ControllerError::collaborator)?;
        self.events.push(ControllerEvent::SellerPremiumUpdated {
            token_seller: Some(seller),
            premium_percent,
        });
        Ok(())
    }

    pub fn set_swap_fee(&self, caller: Address, pool: Address, swap_fee: U256) -> ControllerResult<()> {
        Self::observe(
            "set_swap_fee",
            self.pool_passthrough(caller, pool, |pools| pools.set_swap_fee(pool, swap_fee)),
        )
    }

    /// Pauses (`false`) or resumes (`true`) public trading.
    pub fn set_public_swap(&self, caller: Address, pool: Address, enabled: bool) -> ControllerResult<()> {
        Self::observe(
            "set_public_swap",
            self.pool_passthrough(caller, pool, |pools| pools.set_public_swap(pool, enabled)),
        )
    }

    pub fn force_unbind_token(&self, caller: Address, pool: Address, token: Address) -> ControllerResult<()> {
        Self::observe(
            "force_unbind_token",
            self.pool_passthrough(caller, pool, |pools| pools.unbind(pool, token)),
        )
    }

    pub fn set_minimum_balance(
        &self,
        caller: Address,
        pool: Address,
        token: Address,
        minimum_balance: U256,
    ) -> ControllerResult<()> {
        Self::observe(
            "set_minimum_balance",
            self.pool_passthrough(caller, pool, |pools| {
                pools.set_minimum_balance(pool, token, minimum_balance)
            }),
        )
    }

    /// Forces the pool's token seller to swap. Returns the amount of `token_in` spent.
    pub fn emergency_swap_tokens_for_exact_tokens(
        &self,
        caller: Address,
        pool: Address,
        token_in: Address,
        token_out: Address,
        max_amount_in: U256,
        amount_out: U256,
    ) -> ControllerResult<U256> {
        Self::observe(
            "emergency_swap_tokens_for_exact_tokens",
            self.try_emergency_swap(caller, pool, token_in, token_out, max_amount_in, amount_out),
        )
    }

    fn try_emergency_swap(
        &self,
        caller: Address,
        pool: Address,
        token_in: Address,
        token_out: Address,
        max_amount_in: U256,
        amount_out: U256,
    ) -> ControllerResult<U256> {
        self.require_owner(caller)?;
        self.pools.require_finalized(pool)?;
        let seller = self.compute_seller_address(pool);
        self.collaborators
            .sellers
            .emergency_execute_swap_tokens_for_exact_tokens(
                seller,
                token_in,
                token_out,
                max_amount_in,
                amount_out,
            )
            .map_err(ControllerError::collaborator)
    }

    fn pool_passthrough<F>(&self, caller: Address, pool: Address, call: F) -> ControllerResult<()>
    where
        F: FnOnce(&dyn IndexPoolGateway) -> anyhow::Result<()>,
    {
        self.require_owner(caller)?;
        self.pools.require_finalized(pool)?;
        call(self.collaborators.pools.as_ref()).map_err(ControllerError::collaborator)
    }

    // --- Address derivation ---

    pub fn compute_initializer_address(&self, pool: Address) -> Address {
        self.proxies.derive_address(
            *INITIALIZER_IMPLEMENTATION_ID,
            pool_companion_salt(pool),
        )
    }

    pub fn compute_seller_address(&self, pool: Address) -> Address {
        self.proxies
            .derive_address(*SELLER_IMPLEMENTATION_ID, pool_companion_salt(pool))
    }
}

pub(crate) fn validate_premium(premium_percent: u8) -> ControllerResult<()> {
    if premium_percent == 0 || premium_percent >= MAX_SELLER_PREMIUM {
        return Err(ControllerError::InvalidPremium(premium_percent));
    }
    Ok(())
}
