//! # In-Memory Collaborators
//!
//! Deterministic stand-ins for every external service the controller instructs, used
//! by scenario replay and by tests. State lives in `DashMap`s so the collaborators can
//! be shared behind `Arc` exactly like live adapters.
//!
//! The pool keeps a Balancer-style token record per token and records every
//! instruction it accepts. Instructions can be made to fail with
//! [`SimulatedPools::set_failing`] to exercise all-or-nothing behavior.

use crate::controller::Collaborators;
use crate::fixed_point::Uq112x112;
use crate::interfaces::{
    IndexPoolGateway, PoolFactory, PoolInitializerGateway, PriceOracle, ProxyManager, TokenRecord,
    TokenSellerGateway, TokenSupply,
};
use crate::proxy::ProxyDeriver;
use crate::valuation::extrapolate_from_records;
use crate::weighting::quote_value;
use anyhow::{anyhow, bail, Result};
use dashmap::DashMap;
use ethers::types::{Address, H256, U256};
use ethers::utils::{get_create2_address_from_hash, keccak256};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Pool tokens minted to the initializer on finalization (100e18).
pub const INIT_POOL_SUPPLY: u128 = 100_000_000_000_000_000_000;

// ------------------------------------------------------------------
// Oracle & ERC20 supplies
// ------------------------------------------------------------------

/// Oracle whose "moving average" is simply the last price set.
#[derive(Default)]
pub struct SimulatedOracle {
    prices: DashMap<Address, Uq112x112>,
    observations: DashMap<Address, u64>,
}

impl SimulatedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, token: Address, price: Uq112x112) {
        self.prices.insert(token, price);
    }

    /// Number of `update_price` calls recorded for `token`.
    pub fn observations(&self, token: Address) -> u64 {
        self.observations.get(&token).map(|n| *n).unwrap_or(0)
    }
}

impl PriceOracle for SimulatedOracle {
    fn update_price(&self, token: Address) -> Result<bool> {
        *self.observations.entry(token).or_insert(0) += 1;
        Ok(self.prices.contains_key(&token))
    }

    fn compute_average_price(&self, token: Address) -> Result<Uq112x112> {
        self.prices
            .get(&token)
            .map(|price| *price)
            .ok_or_else(|| anyhow!("no price for token {:?}", token))
    }

    fn compute_average_amount_out(&self, token: Address, amount: U256) -> Result<U256> {
        let price = self.compute_average_price(token)?;
        Ok(quote_value(price, amount)?)
    }
}

#[derive(Default)]
pub struct SimulatedTokens {
    supplies: DashMap<Address, U256>,
}

impl SimulatedTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_supply(&self, token: Address, supply: U256) {
        self.supplies.insert(token, supply);
    }
}

impl TokenSupply for SimulatedTokens {
    fn total_supply(&self, token: Address) -> Result<U256> {
        self.supplies
            .get(&token)
            .map(|supply| *supply)
            .ok_or_else(|| anyhow!("unknown token {:?}", token))
    }
}

// ------------------------------------------------------------------
// Deployers
// ------------------------------------------------------------------

pub struct SimulatedPoolFactory {
    address: Address,
    pool_init_code_hash: H256,
    deployed: DashMap<Address, (String, String)>,
}

impl SimulatedPoolFactory {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            pool_init_code_hash: H256::from(keccak256(b"IndexPool")),
            deployed: DashMap::new(),
        }
    }

    /// `(name, symbol)` of a deployed pool.
    pub fn pool_details(&self, pool: Address) -> Option<(String, String)> {
        self.deployed.get(&pool).map(|entry| entry.value().clone())
    }
}

impl PoolFactory for SimulatedPoolFactory {
    fn deploy_index_pool(&self, salt: H256, name: &str, symbol: &str) -> Result<Address> {
        let pool = get_create2_address_from_hash(self.address, salt, self.pool_init_code_hash);
        if self.deployed.contains_key(&pool) {
            bail!("pool {:?} already deployed", pool);
        }
        self.deployed.insert(pool, (name.to_string(), symbol.to_string()));
        Ok(pool)
    }
}

pub struct SimulatedProxyManager {
    deriver: ProxyDeriver,
    deployed: DashMap<Address, H256>,
}

impl SimulatedProxyManager {
    pub fn new(address: Address, init_code_hash: H256) -> Self {
        Self {
            deriver: ProxyDeriver::new(address, init_code_hash),
            deployed: DashMap::new(),
        }
    }

    /// Implementation ID behind a deployed proxy.
    pub fn implementation_of(&self, proxy: Address) -> Option<H256> {
        self.deployed.get(&proxy).map(|id| *id)
    }
}

impl ProxyManager for SimulatedProxyManager {
    fn address(&self) -> Address {
        self.deriver.deployer
    }

    fn deploy_proxy_many_to_one(&self, implementation_id: H256, salt: H256) -> Result<Address> {
        let proxy = self.deriver.derive_address(implementation_id, salt);
        if self.deployed.contains_key(&proxy) {
            bail!("proxy {:?} already deployed", proxy);
        }
        self.deployed.insert(proxy, implementation_id);
        Ok(proxy)
    }
}

// ------------------------------------------------------------------
// Index pools
// ------------------------------------------------------------------

/// Instructions accepted by [`SimulatedPools`], in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "instruction", rename_all = "snake_case")]
pub enum PoolInstruction {
    Initialize { pool: Address, tokens: Vec<Address>, denorms: Vec<u128> },
    Reindex { pool: Address, tokens: Vec<Address>, denorms: Vec<u128>, minimum_balances: Vec<U256> },
    Reweigh { pool: Address, tokens: Vec<Address>, denorms: Vec<u128> },
    SetSwapFee { pool: Address, swap_fee: U256 },
    SetPublicSwap { pool: Address, enabled: bool },
    Unbind { pool: Address, token: Address },
    SetMinimumBalance { pool: Address, token: Address, minimum_balance: U256 },
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedPool {
    pub controller: Address,
    pub token_seller: Address,
    pub swap_fee: U256,
    pub public_swap: bool,
    pub total_supply: U256,
    /// Token records in bind order.
    pub records: Vec<(Address, TokenRecord)>,
    pub minimum_balances: Vec<(Address, U256)>,
}

impl SimulatedPool {
    fn record_mut(&mut self, token: Address) -> Option<&mut TokenRecord> {
        self.records
            .iter_mut()
            .find(|(t, _)| *t == token)
            .map(|(_, record)| record)
    }

    fn record(&self, token: Address) -> Option<&TokenRecord> {
        self.records.iter().find(|(t, _)| *t == token).map(|(_, record)| record)
    }

    fn total_denorm(&self) -> u128 {
        self.records
            .iter()
            .filter(|(_, record)| record.bound && record.ready)
            .map(|(_, record)| record.denorm)
            .sum()
    }

    fn minimum_balance(&self, token: Address) -> U256 {
        self.minimum_balances
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, minimum)| *minimum)
            .unwrap_or_default()
    }

    fn set_minimum(&mut self, token: Address, minimum: U256) {
        match self.minimum_balances.iter_mut().find(|(t, _)| *t == token) {
            Some(entry) => entry.1 = minimum,
            None => self.minimum_balances.push((token, minimum)),
        }
    }
}

#[derive(Default)]
pub struct SimulatedPools {
    pools: DashMap<Address, SimulatedPool>,
    instructions: Mutex<Vec<PoolInstruction>>,
    failing: AtomicBool,
}

impl SimulatedPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every mutating instruction is rejected.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn pool(&self, pool: Address) -> Option<SimulatedPool> {
        self.pools.get(&pool).map(|entry| entry.value().clone())
    }

    pub fn instructions(&self) -> Vec<PoolInstruction> {
        self.instructions
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Overwrites a token's balance, e.g. to model trading between rebalances.
    pub fn set_balance(&self, pool: Address, token: Address, balance: U256) -> Result<()> {
        let mut entry = self.pools.get_mut(&pool).ok_or_else(|| anyhow!("unknown pool {:?}", pool))?;
        let record = entry
            .record_mut(token)
            .ok_or_else(|| anyhow!("token {:?} not in pool {:?}", token, pool))?;
        record.balance = balance;
        Ok(())
    }

    fn check_enabled(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("pool rejected the instruction");
        }
        Ok(())
    }

    fn log(&self, instruction: PoolInstruction) -> Result<()> {
        self.instructions
            .lock()
            .map_err(|_| anyhow!("instruction log poisoned"))?
            .push(instruction);
        Ok(())
    }

    fn with_pool<T>(&self, pool: Address, f: impl FnOnce(&mut SimulatedPool) -> Result<T>) -> Result<T> {
        let mut entry = self.pools.get_mut(&pool).ok_or_else(|| anyhow!("unknown pool {:?}", pool))?;
        f(entry.value_mut())
    }

    fn read_pool<T>(&self, pool: Address, f: impl FnOnce(&SimulatedPool) -> T) -> Result<T> {
        let entry = self.pools.get(&pool).ok_or_else(|| anyhow!("unknown pool {:?}", pool))?;
        Ok(f(entry.value()))
    }
}

impl IndexPoolGateway for SimulatedPools {
    fn initialize(
        &self,
        pool: Address,
        tokens: &[Address],
        balances: &[U256],
        denorms: &[u128],
        controller: Address,
        token_seller: Address,
    ) -> Result<()> {
        self.check_enabled()?;
        if tokens.len() != balances.len() || tokens.len() != denorms.len() {
            bail!("initialize: array length mismatch");
        }
        if self.pools.contains_key(&pool) {
            bail!("pool {:?} already initialized", pool);
        }
        let records = tokens
            .iter()
            .zip(balances.iter().zip(denorms))
            .enumerate()
            .map(|(i, (token, (balance, denorm)))| {
                (
                    *token,
                    TokenRecord {
                        bound: true,
                        ready: true,
                        denorm: *denorm,
                        desired_denorm: *denorm,
                        index: i as u8,
                        balance: *balance,
                    },
                )
            })
            .collect();
        self.pools.insert(
            pool,
            SimulatedPool {
                controller,
                token_seller,
                swap_fee: U256::zero(),
                public_swap: true,
                total_supply: U256::from(INIT_POOL_SUPPLY),
                records,
                minimum_balances: Vec::new(),
            },
        );
        self.log(PoolInstruction::Initialize {
            pool,
            tokens: tokens.to_vec(),
            denorms: denorms.to_vec(),
        })
    }

    fn reindex_tokens(
        &self,
        pool: Address,
        tokens: &[Address],
        desired_denorms: &[u128],
        minimum_balances: &[U256],
    ) -> Result<()> {
        self.check_enabled()?;
        if tokens.len() != desired_denorms.len() || tokens.len() != minimum_balances.len() {
            bail!("reindex: array length mismatch");
        }
        self.with_pool(pool, |state| {
            for (token, record) in state.records.iter_mut() {
                if !tokens.contains(token) {
                    record.desired_denorm = 0;
                }
            }
            for ((token, denorm), minimum) in tokens.iter().zip(desired_denorms).zip(minimum_balances) {
                match state.record(*token).map(|record| record.ready) {
                    Some(ready) => {
                        if let Some(record) = state.record_mut(*token) {
                            record.desired_denorm = *denorm;
                        }
                        if !ready {
                            state.set_minimum(*token, *minimum);
                        }
                    }
                    None => {
                        let index = state.records.len() as u8;
                        state.records.push((
                            *token,
                            TokenRecord {
                                bound: true,
                                ready: false,
                                denorm: 0,
                                desired_denorm: *denorm,
                                index,
                                balance: U256::zero(),
                            },
                        ));
                        state.set_minimum(*token, *minimum);
                    }
                }
            }
            Ok(())
        })?;
        self.log(PoolInstruction::Reindex {
            pool,
            tokens: tokens.to_vec(),
            denorms: desired_denorms.to_vec(),
            minimum_balances: minimum_balances.to_vec(),
        })
    }

    fn reweigh_tokens(&self, pool: Address, tokens: &[Address], desired_denorms: &[u128]) -> Result<()> {
        self.check_enabled()?;
        if tokens.len() != desired_denorms.len() {
            bail!("reweigh: array length mismatch");
        }
        self.with_pool(pool, |state| {
            for token in tokens {
                if state.record(*token).map(|r| r.bound) != Some(true) {
                    bail!("token {:?} is not bound", token);
                }
            }
            for (token, denorm) in tokens.iter().zip(desired_denorms) {
                if let Some(record) = state.record_mut(*token) {
                    record.desired_denorm = *denorm;
                }
            }
            Ok(())
        })?;
        self.log(PoolInstruction::Reweigh {
            pool,
            tokens: tokens.to_vec(),
            denorms: desired_denorms.to_vec(),
        })
    }

    fn set_swap_fee(&self, pool: Address, swap_fee: U256) -> Result<()> {
        self.check_enabled()?;
        self.with_pool(pool, |state| {
            state.swap_fee = swap_fee;
            Ok(())
        })?;
        self.log(PoolInstruction::SetSwapFee { pool, swap_fee })
    }

    fn set_public_swap(&self, pool: Address, enabled: bool) -> Result<()> {
        self.check_enabled()?;
        self.with_pool(pool, |state| {
            state.public_swap = enabled;
            Ok(())
        })?;
        self.log(PoolInstruction::SetPublicSwap { pool, enabled })
    }

    fn unbind(&self, pool: Address, token: Address) -> Result<()> {
        self.check_enabled()?;
        self.with_pool(pool, |state| {
            let position = state
                .records
                .iter()
                .position(|(t, _)| *t == token)
                .ok_or_else(|| anyhow!("token {:?} is not bound", token))?;
            state.records.remove(position);
            for (i, (_, record)) in state.records.iter_mut().enumerate() {
                record.index = i as u8;
            }
            state.minimum_balances.retain(|(t, _)| *t != token);
            Ok(())
        })?;
        self.log(PoolInstruction::Unbind { pool, token })
    }

    fn set_minimum_balance(&self, pool: Address, token: Address, minimum_balance: U256) -> Result<()> {
        self.check_enabled()?;
        self.with_pool(pool, |state| {
            match state.record(token) {
                Some(record) if record.bound && !record.ready => {}
                Some(_) => bail!("token {:?} is already ready", token),
                None => bail!("token {:?} is not bound", token),
            }
            state.set_minimum(token, minimum_balance);
            Ok(())
        })?;
        self.log(PoolInstruction::SetMinimumBalance {
            pool,
            token,
            minimum_balance,
        })
    }

    fn get_current_tokens(&self, pool: Address) -> Result<Vec<Address>> {
        self.read_pool(pool, |state| {
            state
                .records
                .iter()
                .filter(|(_, record)| record.bound)
                .map(|(token, _)| *token)
                .collect()
        })
    }

    fn get_current_desired_tokens(&self, pool: Address) -> Result<Vec<Address>> {
        self.read_pool(pool, |state| {
            state
                .records
                .iter()
                .filter(|(_, record)| record.bound && record.desired_denorm > 0)
                .map(|(token, _)| *token)
                .collect()
        })
    }

    fn get_balance(&self, pool: Address, token: Address) -> Result<U256> {
        self.read_pool(pool, |state| state.record(token).map(|record| record.balance))?
            .ok_or_else(|| anyhow!("token {:?} is not bound", token))
    }

    fn get_used_balance(&self, pool: Address, token: Address) -> Result<U256> {
        self.read_pool(pool, |state| {
            state.record(token).map(|record| {
                if record.ready {
                    record.balance
                } else {
                    state.minimum_balance(token)
                }
            })
        })?
        .ok_or_else(|| anyhow!("token {:?} is not bound", token))
    }

    fn extrapolate_pool_value_from_token(&self, pool: Address) -> Result<(Address, U256)> {
        let (records, total_denorm) =
            self.read_pool(pool, |state| (state.records.clone(), state.total_denorm()))?;
        Ok(extrapolate_from_records(pool, &records, total_denorm)?)
    }

    fn total_supply(&self, pool: Address) -> Result<U256> {
        self.read_pool(pool, |state| state.total_supply)
    }

    fn get_token_record(&self, pool: Address, token: Address) -> Result<TokenRecord> {
        self.read_pool(pool, |state| state.record(token).cloned())?
            .ok_or_else(|| anyhow!("token {:?} is not bound", token))
    }
}

// ------------------------------------------------------------------
// Initializers & token sellers
// ------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializerState {
    pub pool: Address,
    pub tokens: Vec<Address>,
    pub desired_balances: Vec<U256>,
}

#[derive(Default)]
pub struct SimulatedInitializers {
    initializers: DashMap<Address, InitializerState>,
}

impl SimulatedInitializers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, initializer: Address) -> Option<InitializerState> {
        self.initializers.get(&initializer).map(|entry| entry.value().clone())
    }
}

impl PoolInitializerGateway for SimulatedInitializers {
    fn initialize(&self, initializer: Address, pool: Address, tokens: &[Address], balances: &[U256]) -> Result<()> {
        if self.initializers.contains_key(&initializer) {
            bail!("initializer {:?} already initialized", initializer);
        }
        self.initializers.insert(
            initializer,
            InitializerState {
                pool,
                tokens: tokens.to_vec(),
                desired_balances: balances.to_vec(),
            },
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellerState {
    pub pool: Address,
    pub premium_percent: u8,
}

#[derive(Default)]
pub struct SimulatedSellers {
    sellers: DashMap<Address, SellerState>,
}

impl SimulatedSellers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, seller: Address) -> Option<SellerState> {
        self.sellers.get(&seller).map(|entry| *entry)
    }
}

impl TokenSellerGateway for SimulatedSellers {
    fn initialize(&self, seller: Address, pool: Address, premium_percent: u8) -> Result<()> {
        if self.sellers.contains_key(&seller) {
            bail!("seller {:?} already initialized", seller);
        }
        self.sellers.insert(seller, SellerState { pool, premium_percent });
        Ok(())
    }

    fn set_premium_rate(&self, seller: Address, premium_percent: u8) -> Result<()> {
        let mut state = self
            .sellers
            .get_mut(&seller)
            .ok_or_else(|| anyhow!("unknown seller {:?}", seller))?;
        state.premium_percent = premium_percent;
        Ok(())
    }

    /// Spends `amount_out` plus the premium, in `token_in` units at parity.
    fn emergency_execute_swap_tokens_for_exact_tokens(
        &self,
        seller: Address,
        token_in: Address,
        token_out: Address,
        max_amount_in: U256,
        amount_out: U256,
    ) -> Result<U256> {
        let state = self.state(seller).ok_or_else(|| anyhow!("unknown seller {:?}", seller))?;
        if token_in == token_out {
            bail!("cannot swap a token for itself");
        }
        let premium = amount_out
            .checked_mul(U256::from(state.premium_percent))
            .ok_or_else(|| anyhow!("amount overflow"))?
            / U256::from(100u64);
        let amount_in = amount_out.checked_add(premium).ok_or_else(|| anyhow!("amount overflow"))?;
        if amount_in > max_amount_in {
            bail!("amount in {} exceeds maximum {}", amount_in, max_amount_in);
        }
        Ok(amount_in)
    }
}

// ------------------------------------------------------------------
// Bundle
// ------------------------------------------------------------------

/// One set of simulated collaborators, with typed handles kept for inspection.
#[derive(Clone)]
pub struct Simulation {
    pub oracle: Arc<SimulatedOracle>,
    pub tokens: Arc<SimulatedTokens>,
    pub pool_factory: Arc<SimulatedPoolFactory>,
    pub proxy_manager: Arc<SimulatedProxyManager>,
    pub pools: Arc<SimulatedPools>,
    pub initializers: Arc<SimulatedInitializers>,
    pub sellers: Arc<SimulatedSellers>,
}

impl Simulation {
    pub fn new(factory: Address, proxy_manager: Address, proxy_init_code_hash: H256) -> Self {
        Self {
            oracle: Arc::new(SimulatedOracle::new()),
            tokens: Arc::new(SimulatedTokens::new()),
            pool_factory: Arc::new(SimulatedPoolFactory::new(factory)),
            proxy_manager: Arc::new(SimulatedProxyManager::new(proxy_manager, proxy_init_code_hash)),
            pools: Arc::new(SimulatedPools::new()),
            initializers: Arc::new(SimulatedInitializers::new()),
            sellers: Arc::new(SimulatedSellers::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            oracle: self.oracle.clone(),
            tokens: self.tokens.clone(),
            pool_factory: self.pool_factory.clone(),
            proxy_manager: self.proxy_manager.clone(),
            pools: self.pools.clone(),
            initializers: self.initializers.clone(),
            sellers: self.sellers.clone(),
        }
    }

    /// Sets a token's price (`numerator / denominator` quote units per token unit)
    /// and total supply in one call.
    pub fn list_token(&self, token: Address, numerator: U256, denominator: U256, supply: U256) -> Result<()> {
        self.oracle.set_price(token, Uq112x112::fraction(numerator, denominator)?);
        self.tokens.set_supply(token, supply);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn initialized_pools() -> SimulatedPools {
        let pools = SimulatedPools::new();
        pools
            .initialize(
                addr(100),
                &[addr(1), addr(2)],
                &[U256::from(1_000u64), U256::from(2_000u64)],
                &[10, 15],
                addr(200),
                addr(300),
            )
            .unwrap();
        pools
    }

    #[test]
    fn test_oracle_amount_out() {
        let oracle = SimulatedOracle::new();
        oracle.set_price(addr(1), Uq112x112::fraction(U256::from(3u64), U256::from(2u64)).unwrap());
        assert_eq!(
            oracle.compute_average_amount_out(addr(1), U256::from(10u64)).unwrap(),
            U256::from(15u64)
        );
        assert!(oracle.compute_average_price(addr(2)).is_err());
        assert!(oracle.update_price(addr(1)).unwrap());
        assert!(!oracle.update_price(addr(2)).unwrap());
        assert_eq!(oracle.observations(addr(1)), 1);
    }

    #[test]
    fn test_proxy_manager_matches_derivation() {
        let manager = SimulatedProxyManager::new(addr(5), H256::from_low_u64_be(6));
        let deriver = ProxyDeriver::new(addr(5), H256::from_low_u64_be(6));
        let id = H256::from_low_u64_be(7);
        let salt = H256::from_low_u64_be(8);
        let proxy = manager.deploy_proxy_many_to_one(id, salt).unwrap();
        assert_eq!(proxy, deriver.derive_address(id, salt));
        assert!(manager.deploy_proxy_many_to_one(id, salt).is_err());
    }

    #[test]
    fn test_reindex_adds_unready_token_and_zeroes_dropped() {
        let pools = initialized_pools();
        pools
            .reindex_tokens(addr(100), &[addr(2), addr(3)], &[20, 5], &[U256::from(1u64), U256::from(7u64)])
            .unwrap();
        let state = pools.pool(addr(100)).unwrap();
        assert_eq!(state.record(addr(1)).unwrap().desired_denorm, 0);
        assert_eq!(state.record(addr(2)).unwrap().desired_denorm, 20);
        assert!(!state.record(addr(3)).unwrap().ready);
        assert_eq!(pools.get_used_balance(addr(100), addr(3)).unwrap(), U256::from(7u64));
        assert_eq!(
            pools.get_current_desired_tokens(addr(100)).unwrap(),
            vec![addr(2), addr(3)]
        );
    }

    #[test]
    fn test_failing_pool_rejects_and_keeps_state() {
        let pools = initialized_pools();
        pools.set_failing(true);
        assert!(pools.reweigh_tokens(addr(100), &[addr(1)], &[99]).is_err());
        pools.set_failing(false);
        assert_eq!(pools.get_token_record(addr(100), addr(1)).unwrap().desired_denorm, 10);
        assert_eq!(pools.instructions().len(), 1);
    }

    #[test]
    fn test_extrapolation_uses_first_ready_token() {
        let pools = initialized_pools();
        let (token, balance) = pools.extrapolate_pool_value_from_token(addr(100)).unwrap();
        assert_eq!(token, addr(1));
        // 1000 * 25 / 10
        assert_eq!(balance, U256::from(2_500u64));
    }

    #[test]
    fn test_emergency_swap_respects_maximum() {
        let sellers = SimulatedSellers::new();
        sellers.initialize(addr(9), addr(100), 2).unwrap();
        let spent = sellers
            .emergency_execute_swap_tokens_for_exact_tokens(addr(9), addr(1), addr(2), U256::from(200u64), U256::from(100u64))
            .unwrap();
        assert_eq!(spent, U256::from(102u64));
        assert!(sellers
            .emergency_execute_swap_tokens_for_exact_tokens(addr(9), addr(1), addr(2), U256::from(101u64), U256::from(100u64))
            .is_err());
    }

    #[test]
    fn test_emergency_swap_premium_overflow_is_an_error() {
        let sellers = SimulatedSellers::new();
        sellers.initialize(addr(9), addr(100), 5).unwrap();
        let err = sellers
            .emergency_execute_swap_tokens_for_exact_tokens(addr(9), addr(1), addr(2), U256::MAX, U256::MAX)
            .unwrap_err();
        assert_eq!(err.to_string(), "amount overflow");
    }
}
