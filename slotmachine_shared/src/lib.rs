use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotmachine_core::{amount, Address, Balance, LineWin, Outcome, Settlement, SlotError, SymbolId};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayRequest {
    pub player: Address,
    #[serde(with = "amount")]
    pub wager: Balance,
    pub seed: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlayResponse {
    pub server_seed_hash: String,
    pub player: Address,
    pub nonce: u64,
    #[serde(with = "amount")]
    pub wager: Balance,
    #[serde(with = "amount")]
    pub payout: Balance,
    pub grid: Vec<Vec<SymbolId>>,
    pub seed: String,
    pub multiplier_bps: u64,
    pub winning_lines: Vec<LineWin>,
}

impl PlayResponse {
    pub fn from_settlement(settlement: Settlement, server_seed_hash: String) -> Self {
        Self {
            server_seed_hash,
            player: settlement.player,
            nonce: settlement.nonce,
            wager: settlement.wager,
            payout: settlement.payout,
            grid: settlement.grid.to_indices(),
            seed: settlement.caller_seed,
            multiplier_bps: settlement.multiplier_bps,
            winning_lines: settlement.wins,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyResponse {
    pub server_seed_hash: String,
    pub sequence: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLengthResponse {
    pub length: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default)]
pub struct HistoryQuery {
    pub start: Option<u64>,
    pub count: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HistoryRangeResponse {
    pub start: u64,
    pub entries: Vec<Outcome>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetSymbolRequest {
    pub name: String,
    pub weight: u32,
    pub payout_multiplier: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetGameConfigRequest {
    #[serde(with = "amount")]
    pub min_wager: Balance,
    #[serde(with = "amount")]
    pub max_wager: Balance,
    pub house_edge_bps: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetTokenRequest {
    pub token: Address,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WithdrawRequest {
    /// Zero withdraws the whole reserve.
    #[serde(with = "amount")]
    pub amount: Balance,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WithdrawResponse {
    #[serde(with = "amount")]
    pub withdrawn: Balance,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetHistoryCapacityRequest {
    pub capacity: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApproveRequest {
    pub owner: Address,
    #[serde(with = "amount")]
    pub amount: Balance,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MintRequest {
    pub to: Address,
    #[serde(with = "amount")]
    pub amount: Balance,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BalanceResponse {
    pub holder: Address,
    pub token: Address,
    #[serde(with = "amount")]
    pub balance: Balance,
}

/// One row of the settlement audit log.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpinLogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub player: Address,
    #[serde(with = "amount")]
    pub wager: Balance,
    #[serde(with = "amount")]
    pub payout: Balance,
    pub nonce: i64,
    pub seed: String,
    pub server_seed_hash: String,
    pub grid: Vec<Vec<SymbolId>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error("unauthorized")]
    Unauthorized,
    #[error("internal server error")]
    Internal,
}
