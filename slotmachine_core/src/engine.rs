use crate::{
    error::{Result, SlotError},
    grid::{generate_grid, Grid},
    history::{HistoryBuffer, Outcome},
    ledger::TokenLedger,
    paytable::{compute_payout, evaluate, LineWin},
    rng::{EntropyInputs, EntropySource},
    symbols::{SymbolConfig, SymbolId, SymbolTable},
    types::{amount, Address, Balance},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Highest house edge the operator may configure (50%).
pub const MAX_HOUSE_EDGE_BPS: u32 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub token: Address,
    #[serde(with = "amount")]
    pub min_wager: Balance,
    #[serde(with = "amount")]
    pub max_wager: Balance,
    pub house_edge_bps: u32,
    /// Outcomes kept per player; 0 keeps everything.
    pub history_capacity: u32,
}

impl GameConfig {
    pub fn validate(&self) -> Result<()> {
        if self.token.is_zero() {
            return Err(SlotError::ZeroAddress);
        }
        validate_bounds(self.min_wager, self.max_wager, self.house_edge_bps)
    }
}

fn validate_bounds(min_wager: Balance, max_wager: Balance, house_edge_bps: u32) -> Result<()> {
    if min_wager == 0 || max_wager == 0 {
        return Err(SlotError::ZeroValue);
    }
    if min_wager > max_wager {
        return Err(SlotError::InvalidWagerBounds {
            min: min_wager,
            max: max_wager,
        });
    }
    if house_edge_bps > MAX_HOUSE_EDGE_BPS {
        return Err(SlotError::InvalidPercentage {
            provided: house_edge_bps,
            max: MAX_HOUSE_EDGE_BPS,
        });
    }
    Ok(())
}

/// Game configuration together with the house balance backing payouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfigSnapshot {
    #[serde(flatten)]
    pub config: GameConfig,
    #[serde(with = "amount")]
    pub reserve: Balance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub spins: u64,
    #[serde(with = "amount")]
    pub wagered: Balance,
    #[serde(with = "amount")]
    pub won: Balance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_spins: u64,
    #[serde(with = "amount")]
    pub total_wagered: Balance,
    #[serde(with = "amount")]
    pub total_paid_out: Balance,
}

#[derive(Debug, Clone, Default)]
pub struct PlayerAccount {
    pub stats: PlayerStats,
    pub nonce: u64,
    pub history: HistoryBuffer,
}

/// Record returned for every committed play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub player: Address,
    #[serde(with = "amount")]
    pub wager: Balance,
    #[serde(with = "amount")]
    pub payout: Balance,
    pub grid: Grid,
    pub caller_seed: String,
    pub nonce: u64,
    pub timestamp: u64,
    pub multiplier_bps: u64,
    pub wins: Vec<LineWin>,
}

/// Everything a play will write, computed before any ledger call so that
/// committing it cannot fail.
struct StagedPlay {
    nonce: u64,
    player_stats: PlayerStats,
    aggregate: AggregateStats,
    multiplier_bps: u64,
    wins: Vec<LineWin>,
    outcome: Outcome,
}

/// The slot machine: configuration, per-player accounts and aggregate stats,
/// settled against an injected ledger with entropy from an injected source.
///
/// Every `&mut self` operation is all-or-nothing from the caller's point of
/// view. The one exception is [`SlotError::InsufficientReserve`] from
/// [`SlotMachine::play`]: the wager debit has already landed on the ledger and
/// is kept by the house. Entropy drawn by a failed play stays consumed; the
/// source is never rewound, so no value is dealt twice.
pub struct SlotMachine<L, E> {
    house: Address,
    operator: Address,
    config: GameConfig,
    symbols: SymbolTable,
    paused: bool,
    players: HashMap<Address, PlayerAccount>,
    stats: AggregateStats,
    ledger: L,
    entropy: E,
}

impl<L: TokenLedger, E: EntropySource> SlotMachine<L, E> {
    pub fn new(
        house: Address,
        operator: Address,
        config: GameConfig,
        symbols: SymbolTable,
        ledger: L,
        entropy: E,
    ) -> Result<Self> {
        if house.is_zero() || operator.is_zero() {
            return Err(SlotError::ZeroAddress);
        }
        config.validate()?;
        Ok(Self {
            house,
            operator,
            config,
            symbols,
            paused: false,
            players: HashMap::new(),
            stats: AggregateStats::default(),
            ledger,
            entropy,
        })
    }

    pub fn play(&mut self, player: Address, wager: Balance, seed: &str) -> Result<Settlement> {
        if self.paused {
            return Err(SlotError::Paused);
        }
        if wager < self.config.min_wager || wager > self.config.max_wager {
            return Err(SlotError::InvalidWager {
                provided: wager,
                min: self.config.min_wager,
                max: self.config.max_wager,
            });
        }
        if seed.is_empty() {
            return Err(SlotError::EmptySeed);
        }
        let token = self.config.token;
        let allowance = self.ledger.allowance(&token, &player, &self.house);
        if allowance < wager {
            return Err(SlotError::InsufficientAuthorization {
                required: wager,
                available: allowance,
            });
        }

        let staged = self.stage(player, wager, seed)?;
        let payout = staged.outcome.payout_amount;

        self.ledger
            .transfer_from(&token, &self.house, &player, &self.house, wager)?;

        if payout > 0 {
            let available = self.ledger.balance_of(&token, &self.house);
            if available < payout {
                warn!(
                    %player,
                    wager,
                    payout,
                    available,
                    "reserve cannot cover payout; wager retained"
                );
                return Err(SlotError::InsufficientReserve {
                    required: payout,
                    available,
                });
            }
            if let Err(err) = self.ledger.transfer(&token, &self.house, &player, payout) {
                self.unwind_debit(&token, player, wager, allowance);
                return Err(err.into());
            }
        }

        Ok(self.commit(player, staged))
    }

    /// Reverses the wager debit after a failed credit: the wager goes back to
    /// the player and whatever allowance the debit consumed is restored.
    fn unwind_debit(&mut self, token: &Address, player: Address, wager: Balance, allowance: Balance) {
        if let Err(err) = self.ledger.transfer(token, &self.house, &player, wager) {
            error!(%player, wager, ?err, "refund after failed payout also failed");
            return;
        }
        let spent = allowance.saturating_sub(self.ledger.allowance(token, &player, &self.house));
        if spent > 0 {
            if let Err(err) = self.ledger.increase_allowance(token, &player, &self.house, spent) {
                error!(%player, spent, ?err, "could not restore allowance after refund");
            }
        }
    }

    fn stage(&mut self, player: Address, wager: Balance, seed: &str) -> Result<StagedPlay> {
        let (stats, nonce) = self
            .players
            .get(&player)
            .map(|a| (a.stats, a.nonce))
            .unwrap_or_default();
        let nonce = nonce.checked_add(1).ok_or(SlotError::Overflow)?;

        let inputs = EntropyInputs {
            unpredictable: self.entropy.unpredictable(),
            timestamp: self.entropy.now(),
            caller: player,
            nonce,
            seed,
        };
        let grid = generate_grid(&inputs, &self.symbols);
        let evaluation = evaluate(&grid, &self.symbols);
        let payout = compute_payout(wager, evaluation.multiplier_bps, self.config.house_edge_bps)?;
        debug!(%player, nonce, ?grid, multiplier = evaluation.multiplier_bps, "grid evaluated");

        let player_stats = PlayerStats {
            spins: stats.spins.checked_add(1).ok_or(SlotError::Overflow)?,
            wagered: stats.wagered.checked_add(wager).ok_or(SlotError::Overflow)?,
            won: stats.won.checked_add(payout.net).ok_or(SlotError::Overflow)?,
        };
        let aggregate = AggregateStats {
            total_spins: self.stats.total_spins.checked_add(1).ok_or(SlotError::Overflow)?,
            total_wagered: self
                .stats
                .total_wagered
                .checked_add(wager)
                .ok_or(SlotError::Overflow)?,
            total_paid_out: self
                .stats
                .total_paid_out
                .checked_add(payout.net)
                .ok_or(SlotError::Overflow)?,
        };
        Ok(StagedPlay {
            nonce,
            player_stats,
            aggregate,
            multiplier_bps: evaluation.multiplier_bps,
            wins: evaluation.wins,
            outcome: Outcome {
                timestamp: inputs.timestamp,
                wager_amount: wager,
                payout_amount: payout.net,
                grid,
                caller_seed: seed.to_owned(),
            },
        })
    }

    fn commit(&mut self, player: Address, staged: StagedPlay) -> Settlement {
        let capacity = self.config.history_capacity;
        let account = self.players.entry(player).or_default();
        account.nonce = staged.nonce;
        account.stats = staged.player_stats;
        account.history.append(staged.outcome.clone(), capacity);
        self.stats = staged.aggregate;

        let outcome = staged.outcome;
        info!(
            %player,
            wager = outcome.wager_amount,
            payout = outcome.payout_amount,
            lines = staged.wins.len(),
            nonce = staged.nonce,
            "play settled"
        );
        Settlement {
            player,
            wager: outcome.wager_amount,
            payout: outcome.payout_amount,
            grid: outcome.grid,
            caller_seed: outcome.caller_seed,
            nonce: staged.nonce,
            timestamp: outcome.timestamp,
            multiplier_bps: staged.multiplier_bps,
            wins: staged.wins,
        }
    }

    fn ensure_operator(&self, caller: &Address) -> Result<()> {
        if *caller != self.operator {
            warn!(%caller, "rejected administrative call");
            return Err(SlotError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    pub fn set_symbol_config(
        &mut self,
        caller: &Address,
        id: SymbolId,
        name: impl Into<String>,
        weight: u32,
        payout_multiplier: u32,
    ) -> Result<()> {
        self.ensure_operator(caller)?;
        let config = SymbolConfig::new(name, weight, payout_multiplier);
        let name = config.name.clone();
        self.symbols.set(id, config)?;
        info!(id, %name, weight, payout_multiplier, "symbol updated");
        Ok(())
    }

    pub fn set_game_config(
        &mut self,
        caller: &Address,
        min_wager: Balance,
        max_wager: Balance,
        house_edge_bps: u32,
    ) -> Result<()> {
        self.ensure_operator(caller)?;
        validate_bounds(min_wager, max_wager, house_edge_bps)?;
        self.config.min_wager = min_wager;
        self.config.max_wager = max_wager;
        self.config.house_edge_bps = house_edge_bps;
        info!(min_wager, max_wager, house_edge_bps, "game config updated");
        Ok(())
    }

    pub fn set_token(&mut self, caller: &Address, token: Address) -> Result<()> {
        self.ensure_operator(caller)?;
        if token.is_zero() {
            return Err(SlotError::ZeroAddress);
        }
        info!(old = %self.config.token, new = %token, "token updated");
        self.config.token = token;
        Ok(())
    }

    /// Sends reserve to the operator. An `amount` of 0 withdraws everything.
    /// Returns the amount moved.
    pub fn withdraw_reserve(&mut self, caller: &Address, amount: Balance) -> Result<Balance> {
        self.ensure_operator(caller)?;
        let token = self.config.token;
        let available = self.ledger.balance_of(&token, &self.house);
        let amount = if amount == 0 { available } else { amount };
        if amount == 0 {
            return Err(SlotError::ZeroValue);
        }
        if amount > available {
            return Err(SlotError::InsufficientReserve {
                required: amount,
                available,
            });
        }
        self.ledger
            .transfer(&token, &self.house, &self.operator, amount)?;
        info!(amount, operator = %self.operator, "reserve withdrawn");
        Ok(amount)
    }

    pub fn set_history_capacity(&mut self, caller: &Address, capacity: u32) -> Result<()> {
        self.ensure_operator(caller)?;
        self.config.history_capacity = capacity;
        info!(capacity, "history capacity updated");
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<()> {
        self.ensure_operator(caller)?;
        self.paused = true;
        info!("game paused");
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<()> {
        self.ensure_operator(caller)?;
        self.paused = false;
        info!("game unpaused");
        Ok(())
    }

    pub fn reserve(&self) -> Balance {
        self.ledger.balance_of(&self.config.token, &self.house)
    }

    pub fn game_config(&self) -> GameConfigSnapshot {
        GameConfigSnapshot {
            config: self.config.clone(),
            reserve: self.reserve(),
        }
    }
}

impl<L, E> SlotMachine<L, E> {
    /// Re-applies a settlement that was committed earlier, without touching
    /// the ledger or the entropy source. Used to rebuild player accounts and
    /// aggregate stats from a settlement log; replay in commit order.
    pub fn replay_settlement(&mut self, player: Address, nonce: u64, outcome: Outcome) -> Result<()> {
        let account = self.players.get(&player);
        let stats = account.map(|a| a.stats).unwrap_or_default();
        let player_stats = PlayerStats {
            spins: stats.spins.checked_add(1).ok_or(SlotError::Overflow)?,
            wagered: stats
                .wagered
                .checked_add(outcome.wager_amount)
                .ok_or(SlotError::Overflow)?,
            won: stats
                .won
                .checked_add(outcome.payout_amount)
                .ok_or(SlotError::Overflow)?,
        };
        let aggregate = AggregateStats {
            total_spins: self.stats.total_spins.checked_add(1).ok_or(SlotError::Overflow)?,
            total_wagered: self
                .stats
                .total_wagered
                .checked_add(outcome.wager_amount)
                .ok_or(SlotError::Overflow)?,
            total_paid_out: self
                .stats
                .total_paid_out
                .checked_add(outcome.payout_amount)
                .ok_or(SlotError::Overflow)?,
        };

        let capacity = self.config.history_capacity;
        let account = self.players.entry(player).or_default();
        account.nonce = account.nonce.max(nonce);
        account.stats = player_stats;
        account.history.append(outcome, capacity);
        self.stats = aggregate;
        Ok(())
    }

    pub fn house(&self) -> Address {
        self.house
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbol_config(&self, id: SymbolId) -> Result<&SymbolConfig> {
        self.symbols.get(id)
    }

    pub fn aggregate_stats(&self) -> AggregateStats {
        self.stats
    }

    pub fn player_stats(&self, player: &Address) -> PlayerStats {
        self.players
            .get(player)
            .map(|a| a.stats)
            .unwrap_or_default()
    }

    pub fn player_nonce(&self, player: &Address) -> u64 {
        self.players.get(player).map(|a| a.nonce).unwrap_or(0)
    }

    pub fn history_length(&self, player: &Address) -> u64 {
        self.players.get(player).map(|a| a.history.len()).unwrap_or(0)
    }

    pub fn history_entry(&self, player: &Address, index: u64) -> Result<Outcome> {
        match self.players.get(player) {
            Some(account) => account.history.get(index).cloned(),
            None => Err(SlotError::IndexOutOfRange {
                provided: index,
                length: 0,
            }),
        }
    }

    pub fn history_range(&self, player: &Address, start: u64, count: u64) -> Result<Vec<Outcome>> {
        match self.players.get(player) {
            Some(account) => account.history.range(start, count),
            None => Err(SlotError::IndexOutOfRange {
                provided: start,
                length: 0,
            }),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for hosts that simulate the token (minting,
    /// approvals). Never used by the machine's own operations.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn entropy(&self) -> &E {
        &self.entropy
    }
}
