pub mod engine;
pub mod error;
pub mod grid;
pub mod history;
pub mod ledger;
pub mod paytable;
pub mod rng;
pub mod selector;
pub mod symbols;
pub mod types;

pub use crate::engine::{
    AggregateStats, GameConfig, GameConfigSnapshot, PlayerStats, Settlement, SlotMachine,
    MAX_HOUSE_EDGE_BPS,
};
pub use crate::error::{Result, SlotError};
pub use crate::grid::{generate_grid, verify_grid, Grid, GRID_CELLS, GRID_COLS, GRID_ROWS};
pub use crate::history::{HistoryBuffer, Outcome};
pub use crate::ledger::{InMemoryLedger, LedgerError, TokenLedger};
pub use crate::paytable::{compute_payout, evaluate, Evaluation, Line, LineWin, Payout, BASIS_POINTS, LINES};
pub use crate::rng::{
    cell_seeds, derive_hash_hex, CellSeed, EntropyInputs, EntropySource, FixedEntropy,
    ProvablyFairEntropy,
};
pub use crate::selector::select_symbol;
pub use crate::symbols::{SymbolConfig, SymbolId, SymbolTable, SYMBOL_COUNT};
pub use crate::types::{amount, Address, AddressParseError, Balance};
