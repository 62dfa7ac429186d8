//! # Collaborator Interfaces
//!
//! The controller never reimplements the pool AMM, the oracle's moving averages, token
//! mechanics or proxy deployment. It talks to them through the traits in this module.
//!
//! Contract-style collaborators that exist once per pool (the pool itself, its
//! initializer and its token seller) are reached through a gateway trait whose methods
//! take the target address first, the way an RPC client addresses a contract.
//!
//! All collaborators return `anyhow::Result`; the controller wraps failures into
//! [`ControllerError::Collaborator`](crate::error::ControllerError::Collaborator) and
//! commits none of its own state when that happens.
//!
//! See [`crate::simulation`] for in-memory implementations.

use crate::fixed_point::Uq112x112;
use anyhow::Result;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Trailing moving-average price oracle. Prices are quote units per token unit.
pub trait PriceOracle: Send + Sync {
    /// Records a new price observation if one is due. Returns `true` if updated.
    fn update_price(&self, token: Address) -> Result<bool>;

    fn update_prices(&self, tokens: &[Address]) -> Result<Vec<bool>> {
        tokens.iter().map(|token| self.update_price(*token)).collect()
    }

    fn compute_average_price(&self, token: Address) -> Result<Uq112x112>;

    fn compute_average_prices(&self, tokens: &[Address]) -> Result<Vec<Uq112x112>> {
        tokens
            .iter()
            .map(|token| self.compute_average_price(*token))
            .collect()
    }

    /// Value of `amount` tokens in quote units at the average price.
    fn compute_average_amount_out(&self, token: Address, amount: U256) -> Result<U256>;

    fn compute_average_amounts_out(&self, tokens: &[Address], amounts: &[U256]) -> Result<Vec<U256>> {
        anyhow::ensure!(tokens.len() == amounts.len(), "ERR_ARR_LEN");
        tokens
            .iter()
            .zip(amounts)
            .map(|(token, amount)| self.compute_average_amount_out(*token, *amount))
            .collect()
    }
}

/// ERC20 supply lookups.
pub trait TokenSupply: Send + Sync {
    fn total_supply(&self, token: Address) -> Result<U256>;
}

pub trait PoolFactory: Send + Sync {
    fn deploy_index_pool(&self, salt: H256, name: &str, symbol: &str) -> Result<Address>;
}

pub trait ProxyManager: Send + Sync {
    /// Address the proxies are deployed from (input to address derivation).
    fn address(&self) -> Address;

    fn deploy_proxy_many_to_one(&self, implementation_id: H256, salt: H256) -> Result<Address>;
}

/// Per-token state kept by an index pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub bound: bool,
    /// Balance has reached the minimum balance and the token can be swapped out.
    pub ready: bool,
    pub denorm: u128,
    pub desired_denorm: u128,
    pub index: u8,
    pub balance: U256,
}

/// The managed basket.
pub trait IndexPoolGateway: Send + Sync {
    fn initialize(
        &self,
        pool: Address,
        tokens: &[Address],
        balances: &[U256],
        denorms: &[u128],
        controller: Address,
        token_seller: Address,
    ) -> Result<()>;

    /// Replaces the desired token set.
    fn reindex_tokens(
        &self,
        pool: Address,
        tokens: &[Address],
        desired_denorms: &[u128],
        minimum_balances: &[U256],
    ) -> Result<()>;

    /// Adjusts target weights of the current desired tokens.
    fn reweigh_tokens(&self, pool: Address, tokens: &[Address], desired_denorms: &[u128]) -> Result<()>;

    fn set_swap_fee(&self, pool: Address, swap_fee: U256) -> Result<()>;

    fn set_public_swap(&self, pool: Address, enabled: bool) -> Result<()>;

    fn unbind(&self, pool: Address, token: Address) -> Result<()>;

    fn set_minimum_balance(&self, pool: Address, token: Address, minimum_balance: U256) -> Result<()>;

    fn get_current_tokens(&self, pool: Address) -> Result<Vec<Address>>;

    fn get_current_desired_tokens(&self, pool: Address) -> Result<Vec<Address>>;

    fn get_balance(&self, pool: Address, token: Address) -> Result<U256>;

    fn get_used_balance(&self, pool: Address, token: Address) -> Result<U256>;

    /// Reference token and its virtual balance (see [`crate::valuation`]).
    fn extrapolate_pool_value_from_token(&self, pool: Address) -> Result<(Address, U256)>;

    fn total_supply(&self, pool: Address) -> Result<U256>;

    fn get_token_record(&self, pool: Address, token: Address) -> Result<TokenRecord>;
}

/// Collects the initial contributions for a prepared pool.
pub trait PoolInitializerGateway: Send + Sync {
    fn initialize(
        &self,
        initializer: Address,
        pool: Address,
        tokens: &[Address],
        balances: &[U256],
    ) -> Result<()>;
}

/// Sells tokens removed from a pool at a premium.
pub trait TokenSellerGateway: Send + Sync {
    fn initialize(&self, seller: Address, pool: Address, premium_percent: u8) -> Result<()>;

    fn set_premium_rate(&self, seller: Address, premium_percent: u8) -> Result<()>;

    /// Returns the amount of `token_in` spent.
    fn emergency_execute_swap_tokens_for_exact_tokens(
        &self,
        seller: Address,
        token_in: Address,
        token_out: Address,
        max_amount_in: U256,
        amount_out: U256,
    ) -> Result<U256>;
}
