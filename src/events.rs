//! Controller events, appended on every successful mutating action.
//!
//! Indexers and auditors replay these instead of diffing controller state.

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    CategoryAdded {
        category_id: u64,
        metadata_hash: H256,
    },
    TokenAdded {
        token: Address,
        category_id: u64,
    },
    TokenRemoved {
        token: Address,
        category_id: u64,
    },
    CategorySorted {
        category_id: u64,
        timestamp: u64,
    },
    NewPoolInitializer {
        pool: Address,
        initializer: Address,
        category_id: u64,
        index_size: usize,
    },
    PoolInitialized {
        pool: Address,
        token_seller: Address,
        category_id: u64,
        index_size: usize,
    },
    PoolReindexed {
        pool: Address,
        update_index: u64,
        tokens: Vec<Address>,
        denorms: Vec<u128>,
        minimum_balances: Vec<U256>,
        timestamp: u64,
    },
    PoolReweighed {
        pool: Address,
        update_index: u64,
        tokens: Vec<Address>,
        denorms: Vec<u128>,
        timestamp: u64,
    },
    SellerPremiumUpdated {
        token_seller: Option<Address>,
        premium_percent: u8,
    },
}

impl ControllerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ControllerEvent::CategoryAdded { .. } => "CategoryAdded",
            ControllerEvent::TokenAdded { .. } => "TokenAdded",
            ControllerEvent::TokenRemoved { .. } => "TokenRemoved",
            ControllerEvent::CategorySorted { .. } => "CategorySorted",
            ControllerEvent::NewPoolInitializer { .. } => "NewPoolInitializer",
            ControllerEvent::PoolInitialized { .. } => "PoolInitialized",
            ControllerEvent::PoolReindexed { .. } => "PoolReindexed",
            ControllerEvent::PoolReweighed { .. } => "PoolReweighed",
            ControllerEvent::SellerPremiumUpdated { .. } => "SellerPremiumUpdated",
        }
    }
}
