use crate::{
    error::{Result, SlotError},
    grid::Grid,
    symbols::{SymbolId, SymbolTable},
    types::Balance,
};
use serde::{Deserialize, Serialize};

/// 10000 basis points = 100% = 1x.
pub const BASIS_POINTS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Line {
    Row(u8),
    Column(u8),
    MainDiagonal,
    AntiDiagonal,
}

impl Line {
    pub fn cells(self) -> [(usize, usize); 3] {
        match self {
            Line::Row(r) => {
                let r = r as usize;
                [(r, 0), (r, 1), (r, 2)]
            }
            Line::Column(c) => {
                let c = c as usize;
                [(0, c), (1, c), (2, c)]
            }
            Line::MainDiagonal => [(0, 0), (1, 1), (2, 2)],
            Line::AntiDiagonal => [(0, 2), (1, 1), (2, 0)],
        }
    }
}

/// The eight paylines in evaluation order.
pub const LINES: [Line; 8] = [
    Line::Row(0),
    Line::Row(1),
    Line::Row(2),
    Line::Column(0),
    Line::Column(1),
    Line::Column(2),
    Line::MainDiagonal,
    Line::AntiDiagonal,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineWin {
    pub line: Line,
    pub symbol: SymbolId,
    pub multiplier: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Sum of every winning line's multiplier, in basis points.
    pub multiplier_bps: u64,
    pub wins: Vec<LineWin>,
}

pub fn evaluate(grid: &Grid, symbols: &SymbolTable) -> Evaluation {
    evaluate_lines(grid, symbols, &LINES)
}

/// Every line whose three cells hold one symbol pays that symbol's multiplier;
/// wins stack without a cap.
pub fn evaluate_lines(grid: &Grid, symbols: &SymbolTable, lines: &[Line]) -> Evaluation {
    let mut out = Evaluation::default();
    for &line in lines {
        let [a, b, c] = line.cells().map(|(r, col)| grid.get(r, col));
        if a == b && b == c {
            let multiplier = symbols.payout_of(a);
            out.multiplier_bps += multiplier as u64;
            out.wins.push(LineWin {
                line,
                symbol: a,
                multiplier,
            });
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Payout {
    /// `wager * multiplier / 10000`
    pub raw: Balance,
    /// `raw * (10000 - edge) / 10000`, truncated at each step.
    pub net: Balance,
}

pub fn compute_payout(wager: Balance, multiplier_bps: u64, house_edge_bps: u32) -> Result<Payout> {
    let bps = BASIS_POINTS as Balance;
    let raw = wager
        .checked_mul(multiplier_bps as Balance)
        .ok_or(SlotError::Overflow)?
        / bps;
    if raw == 0 {
        return Ok(Payout::default());
    }
    let keep = bps
        .checked_sub(house_edge_bps as Balance)
        .ok_or(SlotError::Overflow)?;
    let net = raw.checked_mul(keep).ok_or(SlotError::Overflow)? / bps;
    Ok(Payout { raw, net })
}
