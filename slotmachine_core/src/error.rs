use crate::{
    ledger::LedgerError,
    types::{Address, Balance},
};

/// Every way a machine operation can be rejected. A rejected operation leaves
/// no state behind, with one exception: `InsufficientReserve` is raised after
/// the wager debit has been committed and that debit is not refunded.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    #[error("wager {provided} outside bounds [{min}, {max}]")]
    InvalidWager {
        provided: Balance,
        min: Balance,
        max: Balance,
    },
    #[error("caller seed must not be empty")]
    EmptySeed,
    #[error("allowance {available} below required wager {required}")]
    InsufficientAuthorization { required: Balance, available: Balance },
    #[error("reserve {available} cannot cover payout {required}")]
    InsufficientReserve { required: Balance, available: Balance },
    /// Reports the history length rather than the largest valid index, which
    /// has no value for an empty history.
    #[error("history index {provided} out of range (length {length})")]
    IndexOutOfRange { provided: u64, length: u64 },
    #[error("symbol id {provided} out of range (max {max_valid})")]
    InvalidSymbolId { provided: u8, max_valid: u8 },
    #[error("minimum wager {min} exceeds maximum wager {max}")]
    InvalidWagerBounds { min: Balance, max: Balance },
    #[error("zero address not allowed")]
    ZeroAddress,
    #[error("value must be non-zero")]
    ZeroValue,
    #[error("house edge {provided} bps exceeds {max} bps")]
    InvalidPercentage { provided: u32, max: u32 },
    #[error("game is paused")]
    Paused,
    #[error("{caller} is not the operator")]
    Unauthorized { caller: Address },
    #[error("arithmetic overflow")]
    Overflow,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, SlotError>;
