use crate::{
    rng::CellSeed,
    symbols::{SymbolId, SymbolTable},
};

/// Picks a symbol by cumulative-weight bucketing over ascending ids.
///
/// When every weight is zero the table cannot be sampled; symbol 0 is returned
/// so a misconfigured table still yields a grid.
pub fn select_symbol(seed: &CellSeed, symbols: &SymbolTable) -> SymbolId {
    let total = symbols.total_weight();
    if total == 0 {
        return 0;
    }
    let target = seed.reduce(total);
    let mut cumulative = 0u64;
    for (id, symbol) in symbols.iter() {
        cumulative += symbol.weight as u64;
        if cumulative > target {
            return id;
        }
    }
    0
}
