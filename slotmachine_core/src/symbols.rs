use crate::error::{Result, SlotError};
use serde::{Deserialize, Serialize};

pub type SymbolId = u8;

/// Number of symbol slots; fixed for the life of a machine.
pub const SYMBOL_COUNT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    /// Relative selection weight. Zero means the symbol never appears.
    pub weight: u32,
    /// Basis points of the wager paid for each line of three (10000 = 1x).
    pub payout_multiplier: u32,
}

impl SymbolConfig {
    pub fn new(name: impl Into<String>, weight: u32, payout_multiplier: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            payout_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable([SymbolConfig; SYMBOL_COUNT]);

impl SymbolTable {
    pub fn new(symbols: [SymbolConfig; SYMBOL_COUNT]) -> Self {
        Self(symbols)
    }

    pub fn default_six() -> Self {
        Self([
            SymbolConfig::new("Cherry", 30, 15_000),
            SymbolConfig::new("Lemon", 25, 20_000),
            SymbolConfig::new("Orange", 20, 30_000),
            SymbolConfig::new("Bell", 12, 60_000),
            SymbolConfig::new("Bar", 8, 120_000),
            SymbolConfig::new("Seven", 5, 300_000),
        ])
    }

    pub fn get(&self, id: SymbolId) -> Result<&SymbolConfig> {
        self.0.get(id as usize).ok_or(SlotError::InvalidSymbolId {
            provided: id,
            max_valid: (SYMBOL_COUNT - 1) as u8,
        })
    }

    /// Overwrites the slot for `id`; slots are never removed.
    pub fn set(&mut self, id: SymbolId, config: SymbolConfig) -> Result<()> {
        let slot = self.0.get_mut(id as usize).ok_or(SlotError::InvalidSymbolId {
            provided: id,
            max_valid: (SYMBOL_COUNT - 1) as u8,
        })?;
        *slot = config;
        Ok(())
    }

    /// Symbols in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &SymbolConfig)> {
        self.0.iter().enumerate().map(|(i, s)| (i as SymbolId, s))
    }

    pub fn total_weight(&self) -> u64 {
        self.0.iter().map(|s| s.weight as u64).sum()
    }

    pub fn payout_of(&self, id: SymbolId) -> u32 {
        self.0
            .get(id as usize)
            .map(|s| s.payout_multiplier)
            .unwrap_or(0)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::default_six()
    }
}
