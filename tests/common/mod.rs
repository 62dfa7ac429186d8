//! Shared fixture: a controller wired to in-memory collaborators and a few listed
//! tokens priced at exactly 1 quote unit, so market caps equal total supplies.

#![allow(dead_code)]

use ethers::types::{Address, H256, U256};
use index_controller_sdk::constants::DEFAULT_SELLER_PREMIUM;
use index_controller_sdk::simulation::Simulation;
use index_controller_sdk::{ControllerConfig, ControllerResult, IndexController};

pub const DAY: u64 = 24 * 60 * 60;
pub const REWEIGH_DELAY: u64 = 14 * DAY;
pub const START: u64 = 1_700_000_000;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub fn owner() -> Address {
    addr(0xa11ce)
}

pub fn stranger() -> Address {
    addr(0xbad)
}

/// Market cap 400e18
pub fn token_a() -> Address {
    addr(0xa)
}
/// Market cap 100e18
pub fn token_b() -> Address {
    addr(0xb)
}
/// Market cap 25e18
pub fn token_c() -> Address {
    addr(0xc)
}
/// Market cap 900e18, listed but not in any category
pub fn token_d() -> Address {
    addr(0xd)
}
/// Market cap 100e18 (ties with B)
pub fn token_e() -> Address {
    addr(0xe)
}

pub fn e18(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

pub struct Fixture {
    pub controller: IndexController,
    pub sim: Simulation,
}

pub fn fixture() -> Fixture {
    fixture_with(|_| {}).unwrap()
}

/// Simulation whose proxy manager deploys with `init_code_hash`, with the five
/// tokens listed.
pub fn simulation(init_code_hash: H256) -> Simulation {
    let sim = Simulation::new(addr(0xfac7), addr(0xbeef), init_code_hash);
    for (token, supply) in [
        (token_a(), 400),
        (token_b(), 100),
        (token_c(), 25),
        (token_d(), 900),
        (token_e(), 100),
    ] {
        sim.list_token(token, U256::one(), U256::one(), e18(supply)).unwrap();
    }
    sim
}

pub fn controller_config() -> ControllerConfig {
    ControllerConfig {
        address: addr(0xc0),
        owner: owner(),
        default_seller_premium: DEFAULT_SELLER_PREMIUM,
        proxy_init_code_hash: H256::from_low_u64_be(0x1234),
    }
}

/// Fixture with the controller config adjusted by `tweak`. The simulation always
/// uses the default init-code hash.
pub fn fixture_with(tweak: impl FnOnce(&mut ControllerConfig)) -> ControllerResult<Fixture> {
    let sim = simulation(H256::from_low_u64_be(0x1234));
    let mut config = controller_config();
    tweak(&mut config);
    let controller = IndexController::new(config, sim.collaborators())?;
    Ok(Fixture { controller, sim })
}

impl Fixture {
    /// Category holding C, A, B (insertion order), sorted at `now`.
    pub fn sorted_category(&mut self, now: u64) -> u64 {
        let id = self.controller.create_category(owner(), H256::from_low_u64_be(1)).unwrap();
        self.controller
            .add_tokens(owner(), id, &[token_c(), token_a(), token_b()])
            .unwrap();
        self.controller.sort_category(id, now).unwrap();
        id
    }

    /// Prepared and finalized pool over the top `size` tokens of `category`, at `now`.
    pub fn finalized_pool(&mut self, category: u64, size: usize, now: u64) -> Address {
        let (pool, initializer) = self
            .controller
            .prepare_index_pool(owner(), category, size, e18(3), "Index", "IDX", now)
            .unwrap();
        self.finish(pool, initializer, now);
        pool
    }

    /// Finalizes with exactly what the initializer asked for.
    pub fn finish(&mut self, pool: Address, initializer: Address, now: u64) {
        let state = self.sim.initializers.state(initializer).unwrap();
        self.controller
            .finish_prepared_index_pool(initializer, pool, &state.tokens, &state.desired_balances, now)
            .unwrap();
    }
}
