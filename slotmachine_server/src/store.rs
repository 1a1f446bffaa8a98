use anyhow::Context;
use serde::{Deserialize, Serialize};
use slotmachine_core::{derive_hash_hex, Address, Grid, Outcome, Settlement};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredParams {
    pub server_seed: String,
    pub server_seed_hash: String,
    pub sequence: i64,
}

pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("bad database url {url}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn get_params(pool: &SqlitePool) -> anyhow::Result<StoredParams> {
    let row = sqlx::query_as::<_, StoredParams>(
        "SELECT server_seed, server_seed_hash, sequence FROM params WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;
    Ok(row)
}

async fn set_params(pool: &SqlitePool, p: &StoredParams) -> anyhow::Result<()> {
    sqlx::query("UPDATE params SET server_seed = ?, server_seed_hash = ?, sequence = ? WHERE id = 1")
        .bind(&p.server_seed)
        .bind(&p.server_seed_hash)
        .bind(p.sequence)
        .execute(pool)
        .await?;
    Ok(())
}

/// Never moves the stored sequence backwards, whatever order writes land in.
pub async fn set_sequence(pool: &SqlitePool, sequence: u64) -> anyhow::Result<()> {
    sqlx::query("UPDATE params SET sequence = MAX(sequence, ?) WHERE id = 1")
        .bind(sequence as i64)
        .execute(pool)
        .await?;
    Ok(())
}

/// Runs migrations and makes sure the stored commitment matches the seed.
pub async fn init_db(db: &SqlitePool) -> anyhow::Result<StoredParams> {
    sqlx::migrate!("./migrations").run(db).await?;
    let mut p = get_params(db).await?;
    let hash = derive_hash_hex(p.server_seed.as_bytes());
    if p.server_seed_hash != hash {
        p.server_seed_hash = hash;
        set_params(db, &p).await?;
    }
    Ok(p)
}

pub async fn record_spin(
    pool: &SqlitePool,
    settlement: &Settlement,
    server_seed_hash: &str,
    sequence: u64,
) -> anyhow::Result<i64> {
    let grid_json = serde_json::to_string(&settlement.grid.to_indices())?;
    let ts = chrono::Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT INTO spins (ts, timestamp, player, wager, payout, nonce, seed, server_seed_hash, sequence, multiplier_bps, grid_json) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(ts)
    .bind(settlement.timestamp as i64)
    .bind(settlement.player.to_string())
    .bind(settlement.wager.to_string())
    .bind(settlement.payout.to_string())
    .bind(settlement.nonce as i64)
    .bind(&settlement.caller_seed)
    .bind(server_seed_hash)
    .bind(sequence as i64)
    .bind(settlement.multiplier_bps as i64)
    .bind(grid_json)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// A logged settlement in the shape the engine replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedSettlement {
    pub player: Address,
    pub nonce: u64,
    pub outcome: Outcome,
}

#[derive(sqlx::FromRow)]
struct SpinRow {
    timestamp: i64,
    player: String,
    wager: String,
    payout: String,
    nonce: i64,
    seed: String,
    grid_json: String,
}

impl TryFrom<SpinRow> for LoggedSettlement {
    type Error = anyhow::Error;

    fn try_from(row: SpinRow) -> anyhow::Result<Self> {
        let grid: Grid = serde_json::from_str(&row.grid_json)
            .with_context(|| format!("bad grid {}", row.grid_json))?;
        Ok(Self {
            player: row.player.parse()?,
            nonce: u64::try_from(row.nonce)?,
            outcome: Outcome {
                timestamp: u64::try_from(row.timestamp)?,
                wager_amount: row
                    .wager
                    .parse()
                    .with_context(|| format!("bad wager {}", row.wager))?,
                payout_amount: row
                    .payout
                    .parse()
                    .with_context(|| format!("bad payout {}", row.payout))?,
                grid,
                caller_seed: row.seed,
            },
        })
    }
}

/// Every logged settlement, oldest first.
pub async fn load_settlements(pool: &SqlitePool) -> anyhow::Result<Vec<LoggedSettlement>> {
    let rows = sqlx::query_as::<_, SpinRow>(
        "SELECT timestamp, player, wager, payout, nonce, seed, grid_json FROM spins ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(LoggedSettlement::try_from).collect()
}
