use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    grid::{GRID_CELLS, GRID_COLS},
    types::Address,
};

// Seed mixing: H(unpredictable || time || caller || nonce || seed) gives the base
// digest, then each cell re-hashes the running digest with its (row, col).
// Cells chain off one another rather than branching from the base.

pub type HmacSha256 = Hmac<Sha256>;

pub fn derive_hash_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Host capability standing in for the block hash and block time.
pub trait EntropySource {
    /// A 32-byte value the caller cannot know before the play is accepted.
    fn unpredictable(&mut self) -> [u8; 32];

    /// Current unix time in seconds.
    fn now(&self) -> u64;
}

/// Provably-fair source: HMAC-SHA256 keyed by a secret server seed over a
/// strictly increasing sequence number. Publishing `server_seed_hash_hex`
/// before play and the seed after rotation lets anyone replay every grid.
#[derive(Debug, Clone)]
pub struct ProvablyFairEntropy {
    server_seed: String,
    sequence: u64,
}

impl ProvablyFairEntropy {
    pub fn new(server_seed: impl Into<String>, sequence: u64) -> Self {
        Self {
            server_seed: server_seed.into(),
            sequence,
        }
    }

    pub fn server_seed_hash_hex(&self) -> String {
        derive_hash_hex(self.server_seed.as_bytes())
    }

    /// Number of values handed out so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn hmac_bytes(&self, sequence: u64) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(self.server_seed.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(format!("play:{}", sequence).as_bytes());
        mac.finalize().into_bytes().into()
    }
}

impl EntropySource for ProvablyFairEntropy {
    fn unpredictable(&mut self) -> [u8; 32] {
        self.sequence += 1;
        self.hmac_bytes(self.sequence)
    }

    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Deterministic source for tests and replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedEntropy {
    pub value: [u8; 32],
    pub timestamp: u64,
}

impl FixedEntropy {
    pub fn new(value: [u8; 32], timestamp: u64) -> Self {
        Self { value, timestamp }
    }
}

impl EntropySource for FixedEntropy {
    fn unpredictable(&mut self) -> [u8; 32] {
        self.value
    }

    fn now(&self) -> u64 {
        self.timestamp
    }
}

/// Everything that feeds one play's grid.
#[derive(Debug, Clone, Copy)]
pub struct EntropyInputs<'a> {
    pub unpredictable: [u8; 32],
    pub timestamp: u64,
    pub caller: Address,
    pub nonce: u64,
    pub seed: &'a str,
}

/// A 256-bit big-endian unsigned sub-seed for one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellSeed(pub [u8; 32]);

impl CellSeed {
    /// The sub-seed modulo `modulus`, exact over all 256 bits.
    pub fn reduce(&self, modulus: u64) -> u64 {
        debug_assert!(modulus > 0);
        let m = modulus as u128;
        self.0
            .iter()
            .fold(0u128, |acc, byte| (acc * 256 + *byte as u128) % m) as u64
    }
}

pub fn base_digest(inputs: &EntropyInputs<'_>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(inputs.unpredictable);
    hasher.update(inputs.timestamp.to_be_bytes());
    hasher.update(inputs.caller.as_bytes());
    hasher.update(inputs.nonce.to_be_bytes());
    hasher.update(inputs.seed.as_bytes());
    hasher.finalize().into()
}

/// One sub-seed per cell in row-major order.
pub fn cell_seeds(inputs: &EntropyInputs<'_>) -> [CellSeed; GRID_CELLS] {
    let mut running = base_digest(inputs);
    let mut out = [CellSeed([0u8; 32]); GRID_CELLS];
    for (i, slot) in out.iter_mut().enumerate() {
        let (row, col) = ((i / GRID_COLS) as u8, (i % GRID_COLS) as u8);
        let mut hasher = Sha256::new();
        hasher.update(running);
        hasher.update([row, col]);
        running = hasher.finalize().into();
        *slot = CellSeed(running);
    }
    out
}
