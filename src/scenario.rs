//! # Scenario Replay
//!
//! Drives an [`IndexController`] over [`Simulation`] collaborators from a JSON file.
//! Steps carry their own timestamp (`at`) so delay and staleness windows replay
//! exactly. A failing step is recorded in the report and the replay continues.
//!
//! ```json
//! {
//!   "name": "defi-top3",
//!   "tokens": [
//!     { "address": "0x…01", "price_numerator": "3", "price_denominator": "2", "total_supply": "1000000" }
//!   ],
//!   "steps": [
//!     { "at": 0, "action": "create_category", "metadata": "DeFi" },
//!     { "at": 0, "action": "add_tokens", "category": 1, "tokens": ["0x…01"] },
//!     { "at": 10, "action": "sort_category", "category": 1 }
//!   ]
//! }
//! ```
//!
//! Amounts are decimal strings (or `0x` hex), since JSON numbers cannot hold U256.

use crate::controller::{ControllerConfig, IndexController};
use crate::error::ControllerError;
use crate::events::ControllerEvent;
use crate::fixed_point::Uq112x112;
use crate::settings::Settings;
use crate::simulation::Simulation;
use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

/// Serde helpers for U256 amounts written as decimal strings, hex strings or small
/// JSON numbers.
pub mod amount {
    use ethers::types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    pub fn parse(text: &str) -> Result<U256, String> {
        let text = text.trim().replace('_', "");
        match text.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
            None => U256::from_dec_str(&text).map_err(|e| e.to_string()),
        }
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(U256::from(n)),
            Raw::Text(text) => parse(&text).map_err(de::Error::custom),
        }
    }
}

fn default_factory() -> Address {
    Address::from_low_u64_be(0xfac7)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenListing {
    pub address: Address,
    #[serde(with = "amount")]
    pub price_numerator: U256,
    #[serde(with = "amount")]
    pub price_denominator: U256,
    #[serde(with = "amount")]
    pub total_supply: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    /// Address the simulated pool factory deploys from.
    #[serde(default = "default_factory")]
    pub factory: Address,
    #[serde(default)]
    pub tokens: Vec<TokenListing>,
    pub steps: Vec<TimedStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedStep {
    pub at: u64,
    #[serde(flatten)]
    pub step: Step,
}

/// Pools are addressed by `(category, size)`, which is unique per controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    CreateCategory {
        metadata: String,
    },
    AddTokens {
        category: u64,
        tokens: Vec<Address>,
    },
    RemoveToken {
        category: u64,
        token: Address,
    },
    SetPrice {
        token: Address,
        #[serde(with = "amount")]
        numerator: U256,
        #[serde(with = "amount")]
        denominator: U256,
    },
    SetSupply {
        token: Address,
        #[serde(with = "amount")]
        supply: U256,
    },
    SortCategory {
        category: u64,
    },
    OrderTokens {
        category: u64,
        order: Vec<Address>,
    },
    PreparePool {
        category: u64,
        size: usize,
        #[serde(with = "amount")]
        initial_value: U256,
        name: String,
        symbol: String,
    },
    /// Finalizes with exactly the balances the initializer asked for.
    FinishPool {
        category: u64,
        size: usize,
    },
    Rebalance {
        category: u64,
        size: usize,
    },
    Reindex {
        category: u64,
        size: usize,
    },
    Reweigh {
        category: u64,
        size: usize,
    },
    SetPublicSwap {
        category: u64,
        size: usize,
        enabled: bool,
    },
    SetDefaultSellerPremium {
        premium: u8,
    },
    /// Makes the simulated pools reject (or accept again) every instruction.
    SetPoolFailing {
        failing: bool,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::CreateCategory { .. } => "create_category",
            Step::AddTokens { .. } => "add_tokens",
            Step::RemoveToken { .. } => "remove_token",
            Step::SetPrice { .. } => "set_price",
            Step::SetSupply { .. } => "set_supply",
            Step::SortCategory { .. } => "sort_category",
            Step::OrderTokens { .. } => "order_tokens",
            Step::PreparePool { .. } => "prepare_pool",
            Step::FinishPool { .. } => "finish_pool",
            Step::Rebalance { .. } => "rebalance",
            Step::Reindex { .. } => "reindex",
            Step::Reweigh { .. } => "reweigh",
            Step::SetPublicSwap { .. } => "set_public_swap",
            Step::SetDefaultSellerPremium { .. } => "set_default_seller_premium",
            Step::SetPoolFailing { .. } => "set_pool_failing",
        }
    }
}

impl Scenario {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub at: u64,
    pub action: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    pub scenario: String,
    pub succeeded: usize,
    pub failed: usize,
    pub steps: Vec<StepReport>,
    pub events: Vec<ControllerEvent>,
}

/// Failure of a single step: either the controller rejected it, or the scenario
/// itself is inconsistent (unknown pool, missing initializer state).
enum StepError {
    Controller(ControllerError),
    Scenario(anyhow::Error),
}

impl From<ControllerError> for StepError {
    fn from(err: ControllerError) -> Self {
        StepError::Controller(err)
    }
}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        StepError::Scenario(err)
    }
}

pub struct ScenarioRunner {
    controller: IndexController,
    simulation: Simulation,
}

impl ScenarioRunner {
    pub fn new(scenario: &Scenario, settings: &Settings) -> Result<Self> {
        let simulation = Simulation::new(scenario.factory, settings.proxy.manager, settings.proxy.init_code_hash);
        for listing in &scenario.tokens {
            simulation
                .list_token(
                    listing.address,
                    listing.price_numerator,
                    listing.price_denominator,
                    listing.total_supply,
                )
                .with_context(|| format!("listing token {:?}", listing.address))?;
        }
        let controller = IndexController::new(ControllerConfig::from_settings(settings), simulation.collaborators())
            .context("building controller")?;
        Ok(Self { controller, simulation })
    }

    pub fn controller(&self) -> &IndexController {
        &self.controller
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn run(&mut self, scenario: &Scenario) -> ReplayReport {
        let mut steps = Vec::with_capacity(scenario.steps.len());
        for (index, timed) in scenario.steps.iter().enumerate() {
            let outcome = self.apply(&timed.step, timed.at);
            let report = match outcome {
                Ok(detail) => StepReport {
                    index,
                    at: timed.at,
                    action: timed.step.name().to_string(),
                    ok: true,
                    error: None,
                    error_class: None,
                    detail,
                },
                Err(StepError::Controller(err)) => StepReport {
                    index,
                    at: timed.at,
                    action: timed.step.name().to_string(),
                    ok: false,
                    error: Some(err.to_string()),
                    error_class: Some(err.class().as_str().to_string()),
                    detail: None,
                },
                Err(StepError::Scenario(err)) => StepReport {
                    index,
                    at: timed.at,
                    action: timed.step.name().to_string(),
                    ok: false,
                    error: Some(format!("{:#}", err)),
                    error_class: Some("scenario".to_string()),
                    detail: None,
                },
            };
            debug!("step {} ({}) ok={}", index, report.action, report.ok);
            steps.push(report);
        }

        let succeeded = steps.iter().filter(|step| step.ok).count();
        let failed = steps.len() - succeeded;
        info!("📼 Replayed {} steps: {} ok, {} failed", steps.len(), succeeded, failed);
        ReplayReport {
            scenario: scenario.name.clone(),
            succeeded,
            failed,
            steps,
            events: self.controller.take_events(),
        }
    }

    fn pool_for(&self, category: u64, size: usize) -> Result<Address> {
        self.controller
            .pools()
            .find(category, size)
            .ok_or_else(|| anyhow!("no pool for category {} size {}", category, size))
    }

    fn apply(&mut self, step: &Step, now: u64) -> Result<Option<Value>, StepError> {
        let owner = self.controller.owner();
        match step {
            Step::CreateCategory { metadata } => {
                let hash = H256::from(keccak256(metadata.as_bytes()));
                let id = self.controller.create_category(owner, hash)?;
                Ok(Some(json!({ "category": id })))
            }
            Step::AddTokens { category, tokens } => {
                self.controller.add_tokens(owner, *category, tokens)?;
                Ok(None)
            }
            Step::RemoveToken { category, token } => {
                self.controller.remove_token(owner, *category, *token)?;
                Ok(None)
            }
            Step::SetPrice {
                token,
                numerator,
                denominator,
            } => {
                let price = Uq112x112::fraction(*numerator, *denominator).map_err(ControllerError::from)?;
                self.simulation.oracle.set_price(*token, price);
                Ok(None)
            }
            Step::SetSupply { token, supply } => {
                self.simulation.tokens.set_supply(*token, *supply);
                Ok(None)
            }
            Step::SortCategory { category } => {
                let order = self.controller.sort_category(*category, now)?;
                Ok(Some(json!({ "order": order })))
            }
            Step::OrderTokens { category, order } => {
                self.controller.order_tokens_by_market_cap(*category, order, now)?;
                Ok(None)
            }
            Step::PreparePool {
                category,
                size,
                initial_value,
                name,
                symbol,
            } => {
                let (pool, initializer) = self.controller.prepare_index_pool(
                    owner,
                    *category,
                    *size,
                    *initial_value,
                    name,
                    symbol,
                    now,
                )?;
                Ok(Some(json!({ "pool": pool, "initializer": initializer })))
            }
            Step::FinishPool { category, size } => {
                let pool = self.pool_for(*category, *size)?;
                let initializer = self.controller.compute_initializer_address(pool);
                let state = self
                    .simulation
                    .initializers
                    .state(initializer)
                    .ok_or_else(|| anyhow!("initializer {:?} was never initialized", initializer))?;
                self.controller.finish_prepared_index_pool(
                    initializer,
                    pool,
                    &state.tokens,
                    &state.desired_balances,
                    now,
                )?;
                let seller = self.controller.compute_seller_address(pool);
                Ok(Some(json!({ "pool": pool, "token_seller": seller })))
            }
            Step::Rebalance { category, size } => {
                let pool = self.pool_for(*category, *size)?;
                let outcome = self.controller.rebalance_pool(pool, now)?;
                Ok(Some(to_detail(&outcome)))
            }
            Step::Reindex { category, size } => {
                let pool = self.pool_for(*category, *size)?;
                let outcome = self.controller.reindex_pool(pool, now)?;
                Ok(Some(to_detail(&outcome)))
            }
            Step::Reweigh { category, size } => {
                let pool = self.pool_for(*category, *size)?;
                let outcome = self.controller.reweigh_pool(pool, now)?;
                Ok(Some(to_detail(&outcome)))
            }
            Step::SetPublicSwap {
                category,
                size,
                enabled,
            } => {
                let pool = self.pool_for(*category, *size)?;
                self.controller.set_public_swap(owner, pool, *enabled)?;
                Ok(None)
            }
            Step::SetDefaultSellerPremium { premium } => {
                self.controller.set_default_seller_premium(owner, *premium)?;
                Ok(None)
            }
            Step::SetPoolFailing { failing } => {
                self.simulation.pools.set_failing(*failing);
                Ok(None)
            }
        }
    }
}

fn to_detail<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Replays `scenario` against fresh simulated collaborators.
pub fn run_scenario(scenario: &Scenario, settings: &Settings) -> Result<ReplayReport> {
    let mut runner = ScenarioRunner::new(scenario, settings)?;
    Ok(runner.run(scenario))
}
