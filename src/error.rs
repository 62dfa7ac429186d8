//! # Controller Errors
//!
//! Every rejection is immediate and synchronous. No state is mutated and no
//! collaborator instruction is committed when an action returns an error.

use crate::fixed_point::MathError;
use ethers::types::{Address, U256};

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Error taxonomy used for metrics and operator tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad input; retry with corrected arguments.
    Precondition,
    /// A time or ordering gate; retry once the condition is met.
    Staleness,
    /// Misuse or an attempted spoof.
    Integrity,
    /// Fixed-point fault; the action is halted.
    Arithmetic,
    /// An external collaborator rejected the instruction.
    Collaborator,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Precondition => "precondition",
            ErrorClass::Staleness => "staleness",
            ErrorClass::Integrity => "integrity",
            ErrorClass::Arithmetic => "arithmetic",
            ErrorClass::Collaborator => "collaborator",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("invalid market cap for token {0:?}")]
    InvalidMarketCap(Address),

    #[error("category {0} does not exist")]
    CategoryNotFound(u64),
    #[error("token {0:?} is already bound to category {1}")]
    AlreadyBound(Address, u64),
    #[error("category {0} is full")]
    CategoryFull(u64),
    #[error("token {0:?} is not in category {1}")]
    NotInCategory(Address, u64),
    #[error("token {0:?} appears more than once")]
    DuplicateToken(Address),
    #[error("market cap of {token:?} at position {position} exceeds its predecessor ({market_cap} > {previous})")]
    OrderViolation {
        token: Address,
        position: usize,
        market_cap: U256,
        previous: U256,
    },
    #[error("category {0} has not been sorted recently")]
    CategoryNotReady(u64),
    #[error("requested {requested} tokens but category has {available}")]
    InsufficientMembers { requested: usize, available: usize },

    #[error("index size {0} out of range")]
    IndexSizeOutOfRange(usize),
    #[error("value {0} does not fit in 144 bits")]
    ValueOutOfRange(U256),
    #[error("pool {0:?} not found")]
    PoolNotFound(Address),
    #[error("pool {0:?} already exists")]
    PoolAlreadyExists(Address),
    #[error("pool {0:?} has not been finalized")]
    PoolNotFinalized(Address),
    #[error("pool {0:?} is already finalized")]
    AlreadyFinalized(Address),
    #[error("array length mismatch: {0} != {1}")]
    ArrayLengthMismatch(usize, usize),
    #[error("caller {caller:?} is not the initializer of pool {pool:?}")]
    NotInitializer { caller: Address, pool: Address },
    #[error("proxy deployed at {actual:?}, expected {expected:?}")]
    ProxyAddressMismatch { expected: Address, actual: Address },
    #[error("caller {0:?} is not the owner")]
    Unauthorized(Address),
    #[error("invalid seller premium {0}")]
    InvalidPremium(u8),
    #[error("pool {0:?} has no ready token to extrapolate value from")]
    NoReadyToken(Address),

    #[error("rebalance not permitted before {ready_at} (now {now})")]
    TooSoon { ready_at: u64, now: u64 },
    #[error("update {index} is a {expected} slot")]
    WrongCycle { index: u64, expected: &'static str },

    #[error("collaborator call failed: {0}")]
    Collaborator(#[source] anyhow::Error),
}

impl ControllerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ControllerError::Math(_) | ControllerError::InvalidMarketCap(_) => {
                ErrorClass::Arithmetic
            }
            ControllerError::CategoryNotReady(_)
            | ControllerError::TooSoon { .. }
            | ControllerError::WrongCycle { .. } => ErrorClass::Staleness,
            ControllerError::DuplicateToken(_)
            | ControllerError::NotInCategory(..)
            | ControllerError::NotInitializer { .. }
            | ControllerError::ProxyAddressMismatch { .. }
            | ControllerError::Unauthorized(_)
            | ControllerError::AlreadyBound(..)
            | ControllerError::OrderViolation { .. } => ErrorClass::Integrity,
            ControllerError::Collaborator(_) => ErrorClass::Collaborator,
            _ => ErrorClass::Precondition,
        }
    }

    /// Wraps a collaborator failure.
    pub fn collaborator(err: anyhow::Error) -> Self {
        ControllerError::Collaborator(err)
    }
}
