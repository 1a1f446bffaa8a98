use crate::{
    rng::{cell_seeds, EntropyInputs},
    selector::select_symbol,
    symbols::{SymbolId, SymbolTable},
};
use serde::{Deserialize, Serialize};

pub const GRID_ROWS: usize = 3;
pub const GRID_COLS: usize = 3;
pub const GRID_CELLS: usize = GRID_ROWS * GRID_COLS;

/// Symbol ids, `rows x cols`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid(pub [[SymbolId; GRID_COLS]; GRID_ROWS]);

impl Grid {
    pub fn filled(symbol: SymbolId) -> Self {
        Self([[symbol; GRID_COLS]; GRID_ROWS])
    }

    pub fn get(&self, row: usize, col: usize) -> SymbolId {
        self.0[row][col]
    }

    pub fn rows(&self) -> &[[SymbolId; GRID_COLS]; GRID_ROWS] {
        &self.0
    }

    pub fn to_indices(&self) -> Vec<Vec<u8>> {
        self.0.iter().map(|row| row.to_vec()).collect()
    }
}

/// Draws every cell from its chained sub-seed against one symbol table snapshot.
pub fn generate_grid(inputs: &EntropyInputs<'_>, symbols: &SymbolTable) -> Grid {
    let seeds = cell_seeds(inputs);
    let mut grid = Grid::default();
    for (i, seed) in seeds.iter().enumerate() {
        grid.0[i / GRID_COLS][i % GRID_COLS] = select_symbol(seed, symbols);
    }
    grid
}

/// Recomputes the grid for `inputs` and compares it with a published one.
pub fn verify_grid(inputs: &EntropyInputs<'_>, symbols: &SymbolTable, expected: &Grid) -> bool {
    generate_grid(inputs, symbols) == *expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{symbols::SymbolConfig, types::Address};

    fn inputs(nonce: u64) -> EntropyInputs<'static> {
        EntropyInputs {
            unpredictable: [1u8; 32],
            timestamp: 1_700_000_000,
            caller: Address::from_low_u64(9),
            nonce,
            seed: "grid-test",
        }
    }

    #[test]
    fn test_grid_deterministic() {
        let symbols = SymbolTable::default();
        assert_eq!(
            generate_grid(&inputs(1), &symbols),
            generate_grid(&inputs(1), &symbols)
        );
    }

    #[test]
    fn cells_follow_row_major_seed_order() {
        let symbols = SymbolTable::default();
        let grid = generate_grid(&inputs(3), &symbols);
        let seeds = cell_seeds(&inputs(3));
        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                assert_eq!(
                    grid.get(row, col),
                    select_symbol(&seeds[row * GRID_COLS + col], &symbols)
                );
            }
        }
    }

    #[test]
    fn single_weighted_symbol_fills_grid() {
        let mut symbols = SymbolTable::default();
        for id in 0..6u8 {
            let weight = if id == 4 { 9 } else { 0 };
            symbols.set(id, SymbolConfig::new("s", weight, 1)).unwrap();
        }
        assert_eq!(generate_grid(&inputs(5), &symbols), Grid::filled(4));
    }

    #[test]
    fn verify_replays_published_grid() {
        let symbols = SymbolTable::default();
        let grid = generate_grid(&inputs(2), &symbols);
        assert!(verify_grid(&inputs(2), &symbols, &grid));
        let mut tampered = grid;
        tampered.0[1][1] = (tampered.0[1][1] + 1) % 6;
        assert!(!verify_grid(&inputs(2), &symbols, &tampered));
    }

    #[test]
    fn nonce_changes_grid() {
        let symbols = SymbolTable::default();
        let grids: Vec<Grid> = (1..=4).map(|n| generate_grid(&inputs(n), &symbols)).collect();
        assert!(grids.windows(2).any(|w| w[0] != w[1]));
    }
}
