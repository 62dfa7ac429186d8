//! # Index Controller SDK
//!
//! A deterministic, replayable decision engine for market-cap-weighted index pools.
//! Given category membership, oracle market caps and pool state, it reproduces the
//! target weights and minimum balances an on-chain controller would issue, bit for bit.
//!
//! ## Overview
//!
//! - **Categories**: curated token sets ranked by verified market-cap order
//! - **Weighting**: square-root-of-market-cap weights in UQ112x112 fixed point
//! - **Lifecycle**: pool preparation through an initializer, then finalization
//! - **Scheduling**: reweigh three times, reindex on the fourth, 14 days apart
//!
//! ## Architecture
//!
//! [`IndexController`] is the single stateful service object. External services
//! (price oracle, pool factory, proxy manager, pools, initializers, token sellers) are
//! collaborator traits in [`interfaces`]; [`simulation`] provides in-memory versions
//! for replay and tests. All arithmetic lives in [`fixed_point`] and [`weighting`].
//!
//! Time is always passed in (`now`), never read from a clock.

// Arithmetic
/// UQ112x112 / UQ144x112 fixed-point numbers
pub mod fixed_point;
/// Market-cap square-root weighting and balance sizing
pub mod weighting;
/// Pool value extrapolation from a single reference token
pub mod valuation;
/// Window and delay predicates over injected timestamps
pub mod timing;
/// Compatibility constants
pub mod constants;

// Controller
/// Category membership and ranking
pub mod categories;
/// Pool preparation and finalization
pub mod lifecycle;
/// Reindex / reweigh cadence
pub mod scheduler;
/// The controller service object and administrative surface
pub mod controller;
/// Controller event log
pub mod events;
/// Error taxonomy
pub mod error;

// Collaborators
/// Collaborator traits (oracle, factory, proxies, pools, sellers)
pub mod interfaces;
/// Deterministic proxy address derivation
pub mod proxy;
/// In-memory collaborators
pub mod simulation;
/// JSON scenario replay
pub mod scenario;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;
/// Common types and conversions
pub mod types;

// Re-exports for convenience
pub use controller::{Collaborators, ControllerConfig, IndexController};
pub use error::{ControllerError, ControllerResult, ErrorClass};
pub use fixed_point::{MathError, Uq112x112, Uq144x112};
pub use scheduler::{RebalanceKind, RebalanceOutcome};
pub use settings::Settings;
