//! Integration tests for the rebalance scheduler and administrative passthroughs
//!
//! Tests cover:
//! - Three reweighs then a reindex, 14 days apart, repeating
//! - TooSoon / WrongCycle gates and racing duplicate calls
//! - All-or-nothing commit when the pool rejects an instruction
//! - Arithmetic faults halting a rebalance without committing anything
//! - Reindex minimum balances from the extrapolated pool value
//! - Owner-gated passthroughs

mod common;

use common::*;
use ethers::types::U256;
use index_controller_sdk::constants::WEIGHT_MULTIPLIER;
use index_controller_sdk::events::ControllerEvent;
use index_controller_sdk::fixed_point::{MathError, Uq112x112};
use index_controller_sdk::scheduler::{NextRebalance, PoolUpdateRecord};
use index_controller_sdk::simulation::PoolInstruction;
use index_controller_sdk::valuation::estimate_pool_value;
use index_controller_sdk::weighting::minimum_balance;
use index_controller_sdk::{ControllerError, ErrorClass, RebalanceKind};

fn finalized(f: &mut Fixture) -> (u64, ethers::types::Address) {
    let id = f.sorted_category(START);
    let pool = f.finalized_pool(id, 2, START);
    (id, pool)
}

#[test]
fn test_three_reweighs_then_reindex() {
    let mut f = fixture();
    let (id, pool) = finalized(&mut f);

    let mut kinds = Vec::new();
    for call in 1..=5u64 {
        let now = START + call * REWEIGH_DELAY;
        if call == 4 {
            // reindex reads the category ranking, which must be fresh
            f.controller.sort_category(id, now).unwrap();
        }
        let outcome = f.controller.rebalance_pool(pool, now).unwrap();
        assert_eq!(outcome.update_index, call);
        assert_eq!(
            f.controller.update_record(pool),
            Some(PoolUpdateRecord {
                update_index: call,
                last_update: now
            })
        );
        kinds.push(outcome.kind);
    }

    assert_eq!(
        kinds,
        vec![
            RebalanceKind::Reweigh,
            RebalanceKind::Reweigh,
            RebalanceKind::Reweigh,
            RebalanceKind::Reindex,
            RebalanceKind::Reweigh,
        ]
    );
}

#[test]
fn test_reweigh_uses_current_desired_tokens() {
    let mut f = fixture();
    let (_, pool) = finalized(&mut f);

    let outcome = f.controller.reweigh_pool(pool, START + REWEIGH_DELAY).unwrap();
    let tokens: Vec<_> = outcome.assignments.iter().map(|a| a.token).collect();
    assert_eq!(tokens, vec![token_a(), token_b()]);
    assert!(outcome.assignments.iter().all(|a| a.minimum_balance.is_none()));

    // sqrt weights 2/3 and 1/3, each floored
    let denorms: Vec<u128> = outcome.assignments.iter().map(|a| a.denorm).collect();
    assert_eq!(denorms, vec![16_666_666_666_666_666_666, 8_333_333_333_333_333_333]);
    assert!(denorms.iter().sum::<u128>() <= WEIGHT_MULTIPLIER);

    match f.sim.pools.instructions().last() {
        Some(PoolInstruction::Reweigh { tokens, denorms: sent, .. }) => {
            assert_eq!(tokens, &vec![token_a(), token_b()]);
            assert_eq!(sent, &denorms);
        }
        other => panic!("unexpected instruction {:?}", other),
    }
}

#[test]
fn test_rebalance_waits_for_delay() {
    let mut f = fixture();
    let (_, pool) = finalized(&mut f);

    assert_eq!(
        f.controller.next_rebalance(pool, START).unwrap(),
        NextRebalance {
            kind: RebalanceKind::Reweigh,
            update_index: 1,
            ready_at: START + REWEIGH_DELAY,
            ready: false,
        }
    );

    match f.controller.rebalance_pool(pool, START + REWEIGH_DELAY - 1) {
        Err(ControllerError::TooSoon { ready_at, .. }) => assert_eq!(ready_at, START + REWEIGH_DELAY),
        other => panic!("expected TooSoon, got {:?}", other),
    }
    assert_eq!(f.controller.update_record(pool).unwrap().update_index, 0);

    f.controller.rebalance_pool(pool, START + REWEIGH_DELAY).unwrap();
    // a racing duplicate in the same instant loses
    let err = f.controller.rebalance_pool(pool, START + REWEIGH_DELAY).unwrap_err();
    assert!(matches!(err, ControllerError::TooSoon { .. }));
    assert_eq!(err.class(), ErrorClass::Staleness);
}

#[test]
fn test_explicit_actions_check_the_slot() {
    let mut f = fixture();
    let (id, pool) = finalized(&mut f);
    let now = START + REWEIGH_DELAY;

    assert!(matches!(
        f.controller.reindex_pool(pool, now),
        Err(ControllerError::WrongCycle {
            index: 1,
            expected: "reweigh"
        })
    ));
    for call in 1..=3u64 {
        f.controller.reweigh_pool(pool, START + call * REWEIGH_DELAY).unwrap();
    }

    let fourth = START + 4 * REWEIGH_DELAY;
    f.controller.sort_category(id, fourth).unwrap();
    assert!(matches!(
        f.controller.reweigh_pool(pool, fourth),
        Err(ControllerError::WrongCycle {
            index: 4,
            expected: "reindex"
        })
    ));
    assert_eq!(
        f.controller.reindex_pool(pool, fourth).unwrap().kind,
        RebalanceKind::Reindex
    );
}

#[test]
fn test_reindex_needs_fresh_ranking() {
    let mut f = fixture();
    let (_, pool) = finalized(&mut f);
    for call in 1..=3u64 {
        f.controller.rebalance_pool(pool, START + call * REWEIGH_DELAY).unwrap();
    }

    let fourth = START + 4 * REWEIGH_DELAY;
    assert!(matches!(
        f.controller.rebalance_pool(pool, fourth),
        Err(ControllerError::CategoryNotReady(_))
    ));
    assert_eq!(f.controller.update_record(pool).unwrap().update_index, 3);
}

#[test]
fn test_reindex_replaces_tokens_with_minimum_balances() {
    let mut f = fixture();
    let (id, pool) = finalized(&mut f);
    for call in 1..=3u64 {
        f.controller.rebalance_pool(pool, START + call * REWEIGH_DELAY).unwrap();
    }

    // D outranks everything once added and re-sorted
    let fourth = START + 4 * REWEIGH_DELAY;
    f.controller.add_token(owner(), id, token_d()).unwrap();
    f.controller.sort_category(id, fourth).unwrap();
    f.controller.take_events();

    let value = estimate_pool_value(f.sim.pools.as_ref(), f.sim.oracle.as_ref(), pool).unwrap();
    let unit_price = Uq112x112::fraction(U256::one(), U256::one()).unwrap();
    let expected_minimum = minimum_balance(value, unit_price).unwrap();
    assert_eq!(expected_minimum, value / U256::from(100u64));

    let outcome = f.controller.rebalance_pool(pool, fourth).unwrap();
    assert_eq!(outcome.kind, RebalanceKind::Reindex);
    let tokens: Vec<_> = outcome.assignments.iter().map(|a| a.token).collect();
    assert_eq!(tokens, vec![token_d(), token_a()]);
    for assignment in &outcome.assignments {
        assert_eq!(assignment.minimum_balance, Some(expected_minimum));
    }

    let events = f.controller.take_events();
    match events.as_slice() {
        [ControllerEvent::PoolReindexed {
            update_index,
            tokens,
            minimum_balances,
            timestamp,
            ..
        }] => {
            assert_eq!(*update_index, 4);
            assert_eq!(tokens, &vec![token_d(), token_a()]);
            assert_eq!(minimum_balances, &vec![expected_minimum, expected_minimum]);
            assert_eq!(*timestamp, fourth);
        }
        other => panic!("unexpected events {:?}", other),
    }

    // B is no longer desired; the next reweigh covers A and D only
    let fifth = f.controller.rebalance_pool(pool, START + 5 * REWEIGH_DELAY).unwrap();
    let tokens: Vec<_> = fifth.assignments.iter().map(|a| a.token).collect();
    assert_eq!(tokens, vec![token_a(), token_d()]);
}

#[test]
fn test_failed_instruction_commits_nothing() {
    let mut f = fixture();
    let (_, pool) = finalized(&mut f);
    f.controller.take_events();
    let before = f.sim.pools.instructions().len();

    f.sim.pools.set_failing(true);
    let err = f.controller.rebalance_pool(pool, START + REWEIGH_DELAY).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Collaborator);
    assert_eq!(
        f.controller.update_record(pool),
        Some(PoolUpdateRecord {
            update_index: 0,
            last_update: START
        })
    );
    assert!(f.controller.take_events().is_empty());
    assert_eq!(f.sim.pools.instructions().len(), before);

    f.sim.pools.set_failing(false);
    let outcome = f.controller.rebalance_pool(pool, START + REWEIGH_DELAY).unwrap();
    assert_eq!(outcome.update_index, 1);
}

#[test]
fn test_rebalance_requires_finalized_pool() {
    let mut f = fixture();
    let id = f.sorted_category(START);
    let (pool, _) = f
        .controller
        .prepare_index_pool(owner(), id, 2, e18(3), "I", "I", START)
        .unwrap();

    assert!(matches!(
        f.controller.rebalance_pool(pool, START + REWEIGH_DELAY),
        Err(ControllerError::PoolNotFinalized(_))
    ));
    assert!(matches!(
        f.controller.rebalance_pool(addr(0x404), START + REWEIGH_DELAY),
        Err(ControllerError::PoolNotFound(_))
    ));
    assert!(f.controller.next_rebalance(pool, START).is_err());
}

#[test]
fn test_admin_passthroughs() {
    let mut f = fixture();
    let (_, pool) = finalized(&mut f);

    assert!(matches!(
        f.controller.set_swap_fee(stranger(), pool, U256::from(1u64)),
        Err(ControllerError::Unauthorized(_))
    ));
    assert!(matches!(
        f.controller.set_swap_fee(owner(), addr(0x404), U256::from(1u64)),
        Err(ControllerError::PoolNotFound(_))
    ));

    let fee = U256::exp10(15);
    f.controller.set_swap_fee(owner(), pool, fee).unwrap();
    f.controller.set_public_swap(owner(), pool, false).unwrap();
    let state = f.sim.pools.pool(pool).unwrap();
    assert_eq!(state.swap_fee, fee);
    assert!(!state.public_swap);

    // only tokens still below their minimum balance take a manual minimum
    assert!(matches!(
        f.controller.set_minimum_balance(owner(), pool, token_a(), U256::one()),
        Err(ControllerError::Collaborator(_))
    ));

    f.controller.force_unbind_token(owner(), pool, token_b()).unwrap();
    assert!(f.sim.pools.pool(pool).unwrap().records.iter().all(|(t, _)| *t != token_b()));

    let seller = f.controller.compute_seller_address(pool);
    assert!(matches!(
        f.controller.update_seller_premium(owner(), pool, 0),
        Err(ControllerError::InvalidPremium(0))
    ));
    f.controller.take_events();
    f.controller.update_seller_premium(owner(), pool, 5).unwrap();
    assert_eq!(f.sim.sellers.state(seller).unwrap().premium_percent, 5);
    assert_eq!(
        f.controller.take_events(),
        vec![ControllerEvent::SellerPremiumUpdated {
            token_seller: Some(seller),
            premium_percent: 5
        }]
    );

    let spent = f
        .controller
        .emergency_swap_tokens_for_exact_tokens(owner(), pool, token_a(), token_b(), e18(2), e18(1))
        .unwrap();
    assert_eq!(spent, e18(1) + e18(1) * U256::from(5u64) / U256::from(100u64));
    assert!(matches!(
        f.controller
            .emergency_swap_tokens_for_exact_tokens(stranger(), pool, token_a(), token_b(), e18(2), e18(1)),
        Err(ControllerError::Unauthorized(_))
    ));
}

/// Asserts a failed rebalance left no trace: same record, no events, no instruction.
fn assert_untouched(f: &mut Fixture, pool: ethers::types::Address, record: Option<PoolUpdateRecord>, instructions: usize) {
    assert_eq!(f.controller.update_record(pool), record);
    assert!(f.controller.take_events().is_empty());
    assert_eq!(f.sim.pools.instructions().len(), instructions);
}

#[test]
fn test_zero_market_cap_halts_reweigh() {
    let mut f = fixture();
    let (_, pool) = finalized(&mut f);
    let now = START + REWEIGH_DELAY;
    f.controller.take_events();
    let record = f.controller.update_record(pool);
    let before = f.sim.pools.instructions().len();

    f.sim.oracle.set_price(token_b(), Uq112x112::ZERO);
    let err = f.controller.rebalance_pool(pool, now).unwrap_err();
    assert!(matches!(err, ControllerError::InvalidMarketCap(t) if t == token_b()));
    assert_eq!(err.class(), ErrorClass::Arithmetic);
    assert_untouched(&mut f, pool, record, before);

    f.sim.oracle.set_price(token_b(), Uq112x112::ONE);
    f.sim.tokens.set_supply(token_a(), U256::zero());
    assert!(matches!(
        f.controller.rebalance_pool(pool, now),
        Err(ControllerError::InvalidMarketCap(t)) if t == token_a()
    ));
    assert_untouched(&mut f, pool, record, before);

    f.sim.tokens.set_supply(token_a(), e18(400));
    assert_eq!(f.controller.rebalance_pool(pool, now).unwrap().update_index, 1);
}

#[test]
fn test_extreme_price_halts_reindex() {
    let mut f = fixture();
    let (id, pool) = finalized(&mut f);
    for call in 1..=3u64 {
        f.controller.rebalance_pool(pool, START + call * REWEIGH_DELAY).unwrap();
    }

    // smallest representable price: D still has the largest cap, but its
    // reciprocal does not fit and no minimum balance can be computed
    let fourth = START + 4 * REWEIGH_DELAY;
    f.sim.oracle.set_price(token_d(), Uq112x112::from_raw(U256::one()).unwrap());
    f.sim.tokens.set_supply(token_d(), U256::one() << 200);
    f.controller.add_token(owner(), id, token_d()).unwrap();
    f.controller.sort_category(id, fourth).unwrap();
    assert_eq!(f.controller.get_top_category_tokens(id, 2, fourth).unwrap()[0], token_d());
    f.controller.take_events();
    let record = f.controller.update_record(pool);
    let before = f.sim.pools.instructions().len();

    let err = f.controller.rebalance_pool(pool, fourth).unwrap_err();
    assert!(matches!(err, ControllerError::Math(MathError::Overflow)));
    assert_eq!(err.class(), ErrorClass::Arithmetic);
    assert_untouched(&mut f, pool, record, before);
    assert_eq!(record.unwrap().update_index, 3);

    // a zero price is caught as a zero market cap before any balance is sized
    f.sim.oracle.set_price(token_d(), Uq112x112::ZERO);
    assert!(matches!(
        f.controller.rebalance_pool(pool, fourth),
        Err(ControllerError::InvalidMarketCap(t)) if t == token_d()
    ));
    assert_untouched(&mut f, pool, record, before);
}
