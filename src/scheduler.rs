//! # Rebalance Scheduler
//!
//! Each finalized pool carries an update record `(update_index, last_update)`.
//! A rebalance is allowed once `POOL_REWEIGH_DELAY` has elapsed since `last_update`.
//! The counter is bumped first and the new value picks the action:
//!
//! ```text
//! new_index % 4 == 0  → reindex   (membership from the category's top-N)
//! otherwise           → reweigh   (weights of the pool's current desired tokens)
//! ```
//!
//! so from a fresh pool the sequence is reweigh, reweigh, reweigh, reindex, and
//! repeat. The record only advances when the pool accepted the instruction.

use crate::constants::{POOL_REWEIGH_DELAY, REWEIGHS_BEFORE_REINDEX};
use crate::controller::IndexController;
use crate::error::{ControllerError, ControllerResult};
use crate::events::ControllerEvent;
use crate::metrics;
use crate::timing::{delay_elapsed, ready_at};
use crate::valuation::estimate_pool_value;
use crate::weighting::{compute_weights, denormalize_weights, minimum_balance, WeightAssignment};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceKind {
    Reindex,
    Reweigh,
}

impl RebalanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceKind::Reindex => "reindex",
            RebalanceKind::Reweigh => "reweigh",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolUpdateRecord {
    pub update_index: u64,
    pub last_update: u64,
}

/// Kind of the action that would take counter value `update_index`.
pub fn classify(update_index: u64) -> RebalanceKind {
    if update_index % (REWEIGHS_BEFORE_REINDEX + 1) == 0 {
        RebalanceKind::Reindex
    } else {
        RebalanceKind::Reweigh
    }
}

/// Checks the delay and slot for the next action and returns the counter value it
/// would commit. `wanted` of `None` accepts whichever slot is next.
pub fn plan(record: PoolUpdateRecord, wanted: Option<RebalanceKind>, now: u64) -> ControllerResult<u64> {
    if !delay_elapsed(record.last_update, now, POOL_REWEIGH_DELAY) {
        return Err(ControllerError::TooSoon {
            ready_at: ready_at(record.last_update, POOL_REWEIGH_DELAY),
            now,
        });
    }
    let next_index = record.update_index + 1;
    let slot = classify(next_index);
    if let Some(wanted) = wanted {
        if wanted != slot {
            return Err(ControllerError::WrongCycle {
                index: next_index,
                expected: slot.as_str(),
            });
        }
    }
    Ok(next_index)
}

/// Update records of finalized pools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSchedule {
    records: HashMap<Address, PoolUpdateRecord>,
}

impl UpdateSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, pool: Address) -> Option<PoolUpdateRecord> {
        self.records.get(&pool).copied()
    }

    pub(crate) fn start(&mut self, pool: Address, now: u64) {
        self.records.insert(
            pool,
            PoolUpdateRecord {
                update_index: 0,
                last_update: now,
            },
        );
    }

    pub(crate) fn commit(&mut self, pool: Address, update_index: u64, now: u64) {
        self.records.insert(
            pool,
            PoolUpdateRecord {
                update_index,
                last_update: now,
            },
        );
    }
}

/// What a successful rebalance instructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceOutcome {
    pub kind: RebalanceKind,
    pub update_index: u64,
    pub assignments: Vec<WeightAssignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRebalance {
    pub kind: RebalanceKind,
    pub update_index: u64,
    pub ready_at: u64,
    pub ready: bool,
}

impl IndexController {
    pub fn update_record(&self, pool: Address) -> Option<PoolUpdateRecord> {
        self.schedule.record(pool)
    }

    /// Next slot of a finalized pool, without mutating anything.
    pub fn next_rebalance(&self, pool: Address, now: u64) -> ControllerResult<NextRebalance> {
        let record = self.finalized_record(pool)?;
        let update_index = record.update_index + 1;
        Ok(NextRebalance {
            kind: classify(update_index),
            update_index,
            ready_at: ready_at(record.last_update, POOL_REWEIGH_DELAY),
            ready: delay_elapsed(record.last_update, now, POOL_REWEIGH_DELAY),
        })
    }

    /// Runs whichever action the pool's next slot calls for.
    pub fn rebalance_pool(&mut self, pool: Address, now: u64) -> ControllerResult<RebalanceOutcome> {
        let result = self.try_rebalance(pool, None, now);
        Self::observe("rebalance_pool", result)
    }

    /// Replaces the pool's desired tokens with the category's current top-N.
    pub fn reindex_pool(&mut self, pool: Address, now: u64) -> ControllerResult<RebalanceOutcome> {
        let result = self.try_rebalance(pool, Some(RebalanceKind::Reindex), now);
        Self::observe("reindex_pool", result)
    }

    /// Re-weights the pool's current desired tokens by market cap.
    pub fn reweigh_pool(&mut self, pool: Address, now: u64) -> ControllerResult<RebalanceOutcome> {
        let result = self.try_rebalance(pool, Some(RebalanceKind::Reweigh), now);
        Self::observe("reweigh_pool", result)
    }

    fn finalized_record(&self, pool: Address) -> ControllerResult<PoolUpdateRecord> {
        self.pools.require_finalized(pool)?;
        self.schedule
            .record(pool)
            .ok_or(ControllerError::PoolNotFinalized(pool))
    }

    fn try_rebalance(
        &mut self,
        pool: Address,
        wanted: Option<RebalanceKind>,
        now: u64,
    ) -> ControllerResult<RebalanceOutcome> {
        let record = self.finalized_record(pool)?;
        let update_index = plan(record, wanted, now)?;
        let kind = classify(update_index);

        let assignments = match kind {
            RebalanceKind::Reindex => self.issue_reindex(pool, update_index, now)?,
            RebalanceKind::Reweigh => self.issue_reweigh(pool, update_index, now)?,
        };

        self.schedule.commit(pool, update_index, now);
        metrics::increment_rebalance(kind.as_str());
        info!(
            "⚖️ {} #{} of pool {:?} ({} tokens)",
            kind.as_str(),
            update_index,
            pool,
            assignments.len()
        );
        Ok(RebalanceOutcome {
            kind,
            update_index,
            assignments,
        })
    }

    fn issue_reindex(&mut self, pool: Address, update_index: u64, now: u64) -> ControllerResult<Vec<WeightAssignment>> {
        let meta = *self.pools.require_finalized(pool)?;
        let tokens = self
            .registry
            .get_top_tokens(meta.category_id, meta.index_size, now)?;
        let prices = self
            .collaborators
            .oracle
            .compute_average_prices(&tokens)
            .map_err(ControllerError::collaborator)?;
        let caps = self.compute_average_market_caps(&tokens)?;
        let weights = compute_weights(&tokens, &caps)?;
        let denorms = denormalize_weights(&weights)?;

        let pool_value = estimate_pool_value(
            self.collaborators.pools.as_ref(),
            self.collaborators.oracle.as_ref(),
            pool,
        )?;
        let minimum_balances = prices
            .iter()
            .map(|price| minimum_balance(pool_value, *price))
            .collect::<Result<Vec<U256>, _>>()?;

        self.collaborators
            .pools
            .reindex_tokens(pool, &tokens, &denorms, &minimum_balances)
            .map_err(ControllerError::collaborator)?;

        self.events.push(ControllerEvent::PoolReindexed {
            pool,
            update_index,
            tokens: tokens.clone(),
            denorms: denorms.clone(),
            minimum_balances: minimum_balances.clone(),
            timestamp: now,
        });
        Ok(tokens
            .into_iter()
            .zip(denorms)
            .zip(minimum_balances)
            .map(|((token, denorm), minimum)| WeightAssignment {
                token,
                denorm,
                minimum_balance: Some(minimum),
            })
            .collect())
    }

    fn issue_reweigh(&mut self, pool: Address, update_index: u64, now: u64) -> ControllerResult<Vec<WeightAssignment>> {
        let tokens = self
            .collaborators
            .pools
            .get_current_desired_tokens(pool)
            .map_err(ControllerError::collaborator)?;
        let caps = self.compute_average_market_caps(&tokens)?;
        let weights = compute_weights(&tokens, &caps)?;
        let denorms = denormalize_weights(&weights)?;

        self.collaborators
            .pools
            .reweigh_tokens(pool, &tokens, &denorms)
            .map_err(ControllerError::collaborator)?;

        self.events.push(ControllerEvent::PoolReweighed {
            pool,
            update_index,
            tokens: tokens.clone(),
            denorms: denorms.clone(),
            timestamp: now,
        });
        Ok(tokens
            .into_iter()
            .zip(denorms)
            .map(|(token, denorm)| WeightAssignment {
                token,
                denorm,
                minimum_balance: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 24 * 60 * 60;

    #[test]
    fn test_classify_cycle() {
        let kinds: Vec<_> = (1..=8).map(classify).collect();
        assert_eq!(
            kinds,
            vec![
                RebalanceKind::Reweigh,
                RebalanceKind::Reweigh,
                RebalanceKind::Reweigh,
                RebalanceKind::Reindex,
                RebalanceKind::Reweigh,
                RebalanceKind::Reweigh,
                RebalanceKind::Reweigh,
                RebalanceKind::Reindex,
            ]
        );
    }

    #[test]
    fn test_plan_too_soon() {
        let record = PoolUpdateRecord {
            update_index: 0,
            last_update: 1_000,
        };
        match plan(record, None, 1_000 + 14 * DAY - 1) {
            Err(ControllerError::TooSoon { ready_at, .. }) => assert_eq!(ready_at, 1_000 + 14 * DAY),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(plan(record, None, 1_000 + 14 * DAY).unwrap(), 1);
    }

    #[test]
    fn test_plan_wrong_cycle() {
        let fresh = PoolUpdateRecord::default();
        let now = 14 * DAY;
        assert!(matches!(
            plan(fresh, Some(RebalanceKind::Reindex), now),
            Err(ControllerError::WrongCycle { index: 1, expected: "reweigh" })
        ));
        assert_eq!(plan(fresh, Some(RebalanceKind::Reweigh), now).unwrap(), 1);

        let third = PoolUpdateRecord {
            update_index: 3,
            last_update: 0,
        };
        assert!(matches!(
            plan(third, Some(RebalanceKind::Reweigh), now),
            Err(ControllerError::WrongCycle { index: 4, expected: "reindex" })
        ));
        assert_eq!(plan(third, Some(RebalanceKind::Reindex), now).unwrap(), 4);
    }

    #[test]
    fn test_delay_checked_before_slot() {
        let third = PoolUpdateRecord {
            update_index: 3,
            last_update: 100,
        };
        assert!(matches!(
            plan(third, Some(RebalanceKind::Reweigh), 101),
            Err(ControllerError::TooSoon { .. })
        ));
    }

    #[test]
    fn test_schedule_commit() {
        let mut schedule = UpdateSchedule::new();
        let pool = Address::from_low_u64_be(7);
        assert!(schedule.record(pool).is_none());
        schedule.start(pool, 50);
        assert_eq!(
            schedule.record(pool),
            Some(PoolUpdateRecord {
                update_index: 0,
                last_update: 50
            })
        );
        schedule.commit(pool, 1, 60);
        assert_eq!(schedule.record(pool).unwrap().update_index, 1);
    }
}
