// src/constants.rs
// Compatibility constants. Changing any of these breaks bit-exact replay.

use ethers::types::H256;
use ethers::utils::keccak256;
use once_cell::sync::Lazy;

/// 1e18
pub const BONE: u128 = 1_000_000_000_000_000_000;

/// Total denormalized weight of a freshly weighted pool.
pub const WEIGHT_MULTIPLIER: u128 = BONE * 25;

/// Smallest number of tokens an index pool may hold.
pub const MIN_INDEX_SIZE: usize = 2;
/// Largest number of tokens an index pool may hold.
pub const MAX_INDEX_SIZE: usize = 8;

/// Maximum members per category.
pub const MAX_CATEGORY_TOKENS: usize = 15;

/// How long a category ranking stays usable for top-N queries.
pub const MAX_SORT_DELAY: u64 = 24 * 60 * 60;

/// Minimum time between two rebalance actions on the same pool.
pub const POOL_REWEIGH_DELAY: u64 = 14 * 24 * 60 * 60;

/// Reweighs performed between two reindexes.
pub const REWEIGHS_BEFORE_REINDEX: u64 = 3;

/// Minimum balance is `pool value / MIN_BALANCE_DIVISOR` worth of a token (1%).
pub const MIN_BALANCE_DIVISOR: u64 = 100;

/// Default premium (percent) granted to buyers of unbound tokens.
pub const DEFAULT_SELLER_PREMIUM: u8 = 2;
/// Premium must stay strictly below this percentage.
pub const MAX_SELLER_PREMIUM: u8 = 20;

/// Proxy implementation ID of the pool initializer.
pub static INITIALIZER_IMPLEMENTATION_ID: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256("PoolInitializer.sol")));

/// Proxy implementation ID of the unbound token seller.
pub static SELLER_IMPLEMENTATION_ID: Lazy<H256> =
    Lazy::new(|| H256::from(keccak256("UnboundTokenSeller.sol")));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_constants() {
        assert_eq!(REWEIGHS_BEFORE_REINDEX + 1, 4);
        assert_eq!(POOL_REWEIGH_DELAY, 1_209_600);
        assert!(MIN_INDEX_SIZE < MAX_INDEX_SIZE && MAX_INDEX_SIZE <= MAX_CATEGORY_TOKENS);
    }

    #[test]
    fn test_implementation_ids_distinct() {
        assert_ne!(*INITIALIZER_IMPLEMENTATION_ID, *SELLER_IMPLEMENTATION_ID);
    }
}
