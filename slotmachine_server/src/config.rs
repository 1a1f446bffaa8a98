use anyhow::Context;
use slotmachine_core::{Address, Balance, GameConfig};
use std::{fmt::Display, str::FromStr};

const TOKEN_UNIT: Balance = 1_000_000_000_000_000_000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub api_key: String,
    pub bind: String,
    pub operator: Address,
    pub house: Address,
    /// Minted to the house on startup so the simulated ledger can pay wins.
    pub initial_reserve: Balance,
    pub game: GameConfig,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let game = GameConfig {
            token: parse_or(&lookup, "TOKEN", Address::from_low_u64(0x70))?,
            min_wager: parse_or(&lookup, "MIN_WAGER", TOKEN_UNIT)?,
            max_wager: parse_or(&lookup, "MAX_WAGER", 100 * TOKEN_UNIT)?,
            house_edge_bps: parse_or(&lookup, "HOUSE_EDGE_BPS", 500)?,
            history_capacity: parse_or(&lookup, "HISTORY_CAPACITY", 50)?,
        };
        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://slotmachine.db".to_string()),
            api_key: lookup("API_KEY").unwrap_or_else(|| "dev-key".into()),
            bind: lookup("BIND").unwrap_or_else(|| "127.0.0.1:8080".to_string()),
            operator: parse_or(&lookup, "OPERATOR", Address::from_low_u64(0x01))?,
            house: parse_or(&lookup, "HOUSE", Address::from_low_u64(0x40))?,
            initial_reserve: parse_or(&lookup, "INITIAL_RESERVE", 10_000 * TOKEN_UNIT)?,
            game,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid {key}={raw}")),
        None => Ok(default),
    }
}
