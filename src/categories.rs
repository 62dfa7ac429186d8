//! # Category Registry
//!
//! Per-category token membership and a market-cap ranking with a staleness window.
//!
//! ## States
//!
//! ```text
//! Empty ──add──▶ Populated ──sort──▶ Sorted ──(1 day)──▶ Stale
//!                                      ▲  │                │
//!                                      │  └──add (backdate)┤
//!                                      └──────sort─────────┘
//! ```
//!
//! Adding a token to a category backdates its sort stamp, so a fresh sort is
//! required before top-N queries succeed again. Removing a token keeps the relative
//! order of the remaining members and does not invalidate the ranking.
//!
//! The registry is pure bookkeeping: market caps are supplied by the caller (the
//! controller computes them from the oracle).

use crate::constants::{MAX_CATEGORY_TOKENS, MAX_SORT_DELAY};
use crate::error::{ControllerError, ControllerResult};
use crate::timing;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryState {
    Empty,
    Populated,
    Sorted,
    Stale,
}

/// Where a token lives: its category and its position in that category's list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBinding {
    pub category_id: u64,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub metadata_hash: H256,
    /// Insertion order until sorted, rank order (highest cap first) after.
    tokens: Vec<Address>,
    last_sort_time: Option<u64>,
    sorted_once: bool,
}

impl Category {
    fn new(id: u64, metadata_hash: H256) -> Self {
        Self {
            id,
            metadata_hash,
            tokens: Vec::new(),
            last_sort_time: None,
            sorted_once: false,
        }
    }

    pub fn tokens(&self) -> &[Address] {
        &self.tokens
    }

    pub fn last_sort_time(&self) -> Option<u64> {
        self.last_sort_time
    }

    pub fn state(&self, now: u64) -> CategoryState {
        if self.tokens.is_empty() {
            return CategoryState::Empty;
        }
        match self.last_sort_time {
            Some(sorted_at) if timing::within_window(sorted_at, now, MAX_SORT_DELAY) => {
                CategoryState::Sorted
            }
            Some(_) => CategoryState::Stale,
            None if self.sorted_once => CategoryState::Stale,
            None => CategoryState::Populated,
        }
    }

    fn backdate_sort(&mut self) {
        self.last_sort_time = None;
    }
}

/// Owns every category and the token → category binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
    bindings: HashMap<Address, TokenBinding>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next category ID (IDs start at 1).
    pub fn create_category(&mut self, metadata_hash: H256) -> u64 {
        let id = self.categories.len() as u64 + 1;
        self.categories.push(Category::new(id, metadata_hash));
        info!("📁 Category {} created (metadata {:?})", id, metadata_hash);
        id
    }

    pub fn category_count(&self) -> u64 {
        self.categories.len() as u64
    }

    pub fn category(&self, category_id: u64) -> ControllerResult<&Category> {
        category_id
            .checked_sub(1)
            .and_then(|i| self.categories.get(i as usize))
            .ok_or(ControllerError::CategoryNotFound(category_id))
    }

    fn category_mut(&mut self, category_id: u64) -> ControllerResult<&mut Category> {
        category_id
            .checked_sub(1)
            .and_then(|i| self.categories.get_mut(i as usize))
            .ok_or(ControllerError::CategoryNotFound(category_id))
    }

    pub fn add_token(&mut self, category_id: u64, token: Address) -> ControllerResult<()> {
        self.add_tokens(category_id, &[token])
    }

    /// Adds every token or none of them.
    pub fn add_tokens(&mut self, category_id: u64, tokens: &[Address]) -> ControllerResult<()> {
        let current_len = self.category(category_id)?.tokens.len();

        let mut seen = HashSet::with_capacity(tokens.len());
        for token in tokens {
            if let Some(binding) = self.bindings.get(token) {
                return Err(ControllerError::AlreadyBound(*token, binding.category_id));
            }
            if !seen.insert(*token) {
                return Err(ControllerError::DuplicateToken(*token));
            }
        }
        if current_len + tokens.len() > MAX_CATEGORY_TOKENS {
            return Err(ControllerError::CategoryFull(category_id));
        }

        let category = self.category_mut(category_id)?;
        let mut new_bindings = Vec::with_capacity(tokens.len());
        for token in tokens {
            new_bindings.push((
                *token,
                TokenBinding {
                    category_id,
                    index: category.tokens.len(),
                },
            ));
            category.tokens.push(*token);
        }
        category.backdate_sort();
        self.bindings.extend(new_bindings);

        debug!("Added {} token(s) to category {}", tokens.len(), category_id);
        Ok(())
    }

    /// Removes a member and releases its binding.
    pub fn remove_token(&mut self, category_id: u64, token: Address) -> ControllerResult<()> {
        match self.bindings.get(&token) {
            Some(binding) if binding.category_id == category_id => {}
            _ => {
                // distinguish a bad ID from a non-member
                self.category(category_id)?;
                return Err(ControllerError::NotInCategory(token, category_id));
            }
        }

        let category = self.category_mut(category_id)?;
        category.tokens.retain(|t| *t != token);
        let remaining = category.tokens.clone();
        self.bindings.remove(&token);
        self.reindex_bindings(category_id, &remaining);

        debug!("Removed {:?} from category {}", token, category_id);
        Ok(())
    }

    /// Accepts `proposed_order` as the new ranking.
    ///
    /// `market_caps[i]` is the market cap of `proposed_order[i]`. The proposal must be a
    /// permutation of the current membership with non-increasing caps; equal caps may
    /// appear in either order.
    pub fn order_tokens_by_market_cap(
        &mut self,
        category_id: u64,
        proposed_order: &[Address],
        market_caps: &[U256],
        now: u64,
    ) -> ControllerResult<()> {
        self.validate_permutation(category_id, proposed_order)?;
        if proposed_order.len() != market_caps.len() {
            return Err(ControllerError::ArrayLengthMismatch(
                proposed_order.len(),
                market_caps.len(),
            ));
        }

        for (position, pair) in market_caps.windows(2).enumerate() {
            if pair[1] > pair[0] {
                return Err(ControllerError::OrderViolation {
                    token: proposed_order[position + 1],
                    position: position + 1,
                    market_cap: pair[1],
                    previous: pair[0],
                });
            }
        }

        let category = self.category_mut(category_id)?;
        category.tokens = proposed_order.to_vec();
        category.last_sort_time = Some(now);
        category.sorted_once = true;
        self.reindex_bindings(category_id, proposed_order);

        info!("📊 Category {} sorted by market cap at {}", category_id, now);
        Ok(())
    }

    /// Checks that `proposed_order` is a permutation of the category's members.
    pub fn validate_permutation(&self, category_id: u64, proposed_order: &[Address]) -> ControllerResult<()> {
        let member_count = self.category(category_id)?.tokens.len();
        let mut seen = HashSet::with_capacity(proposed_order.len());
        for token in proposed_order {
            if !self.is_token_in_category(category_id, *token) {
                return Err(ControllerError::NotInCategory(*token, category_id));
            }
            if !seen.insert(*token) {
                return Err(ControllerError::DuplicateToken(*token));
            }
        }
        if proposed_order.len() != member_count {
            return Err(ControllerError::ArrayLengthMismatch(
                proposed_order.len(),
                member_count,
            ));
        }
        Ok(())
    }

    /// The `count` highest-ranked tokens, highest first.
    pub fn get_top_tokens(&self, category_id: u64, count: usize, now: u64) -> ControllerResult<Vec<Address>> {
        let category = self.category(category_id)?;
        if category.state(now) != CategoryState::Sorted {
            return Err(ControllerError::CategoryNotReady(category_id));
        }
        if count > category.tokens.len() {
            return Err(ControllerError::InsufficientMembers {
                requested: count,
                available: category.tokens.len(),
            });
        }
        Ok(category.tokens[..count].to_vec())
    }

    pub fn category_tokens(&self, category_id: u64) -> ControllerResult<Vec<Address>> {
        Ok(self.category(category_id)?.tokens.clone())
    }

    pub fn category_state(&self, category_id: u64, now: u64) -> ControllerResult<CategoryState> {
        Ok(self.category(category_id)?.state(now))
    }

    pub fn last_sort_time(&self, category_id: u64) -> ControllerResult<Option<u64>> {
        Ok(self.category(category_id)?.last_sort_time)
    }

    pub fn is_token_in_category(&self, category_id: u64, token: Address) -> bool {
        self.bindings
            .get(&token)
            .map_or(false, |binding| binding.category_id == category_id)
    }

    pub fn token_binding(&self, token: Address) -> Option<TokenBinding> {
        self.bindings.get(&token).copied()
    }

    fn reindex_bindings(&mut self, category_id: u64, ordered: &[Address]) {
        for (index, token) in ordered.iter().enumerate() {
            self.bindings.insert(*token, TokenBinding { category_id, index });
        }
    }
}
