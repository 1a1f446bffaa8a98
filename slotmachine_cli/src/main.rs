use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use slotmachine_core::{derive_hash_hex, Balance};
use slotmachine_shared::SpinLogEntry;
use sqlx::{sqlite::SqlitePoolOptions, sqlite::SqliteRow, Row, SqlitePool};

const SPIN_COLUMNS: &str = "id, ts, player, wager, payout, nonce, seed, server_seed_hash, grid_json";

#[derive(Parser)]
#[command(name = "slotmachine-cli", about = "Operator CLI for the slot machine server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database URL, default sqlite://slotmachine.db
    #[arg(long, value_parser, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rotate the server seed; the server picks it up on its next start
    RotateSeed { new_seed: String },
    /// View the last N settled spins
    ViewLogs {
        #[arg(default_value_t = 20)]
        n: i64,
    },
    /// Export settled spins to a CSV file
    ExportCsv { path: String },
    /// Totals over the whole settlement log
    Summary,
}

async fn get_pool(url: Option<String>) -> anyhow::Result<SqlitePool> {
    let url = url.unwrap_or_else(|| "sqlite://slotmachine.db".into());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .with_context(|| format!("cannot open {url}"))?;
    Ok(pool)
}

fn parse_amount(raw: &str) -> anyhow::Result<Balance> {
    raw.parse()
        .with_context(|| format!("bad amount {raw:?} in spins table"))
}

fn entry_from_row(row: &SqliteRow) -> anyhow::Result<SpinLogEntry> {
    let ts: String = row.try_get("ts")?;
    let player: String = row.try_get("player")?;
    let grid_json: String = row.try_get("grid_json")?;
    Ok(SpinLogEntry {
        id: row.try_get("id")?,
        ts: DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc),
        player: player.parse()?,
        wager: parse_amount(&row.try_get::<String, _>("wager")?)?,
        payout: parse_amount(&row.try_get::<String, _>("payout")?)?,
        nonce: row.try_get("nonce")?,
        seed: row.try_get("seed")?,
        server_seed_hash: row.try_get("server_seed_hash")?,
        grid: serde_json::from_str(&grid_json)?,
    })
}

fn format_grid(grid: &[Vec<u8>]) -> String {
    grid.iter()
        .map(|row| {
            row.iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    spins: u64,
    wagered: Balance,
    paid_out: Balance,
    winning_spins: u64,
}

impl Summary {
    fn add(&mut self, entry: &SpinLogEntry) -> anyhow::Result<()> {
        self.spins += 1;
        self.wagered = self
            .wagered
            .checked_add(entry.wager)
            .context("wager total overflowed")?;
        self.paid_out = self
            .paid_out
            .checked_add(entry.payout)
            .context("payout total overflowed")?;
        if entry.payout > 0 {
            self.winning_spins += 1;
        }
        Ok(())
    }

    /// Paid out over wagered, in basis points.
    fn return_bps(&self) -> Option<u128> {
        if self.wagered == 0 {
            return None;
        }
        self.paid_out.checked_mul(10_000).map(|p| p / self.wagered)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let pool = get_pool(cli.database_url).await?;

    match cli.command {
        Commands::RotateSeed { new_seed } => {
            anyhow::ensure!(!new_seed.is_empty(), "server seed must not be empty");
            let hash = derive_hash_hex(new_seed.as_bytes());
            sqlx::query(
                "UPDATE params SET server_seed = ?, server_seed_hash = ?, sequence = 0 WHERE id = 1",
            )
            .bind(new_seed)
            .bind(&hash)
            .execute(&pool)
            .await?;
            println!("Rotated server seed. New hash: {hash}");
            println!("Restart the server to start dealing from the new seed.");
        }
        Commands::ViewLogs { n } => {
            let rows = sqlx::query(&format!(
                "SELECT {SPIN_COLUMNS} FROM spins ORDER BY id DESC LIMIT ?"
            ))
            .bind(n)
            .fetch_all(&pool)
            .await?;
            for row in &rows {
                let e = entry_from_row(row)?;
                println!(
                    "#{:>6} {} player={} nonce={} wager={} payout={} grid={} seed={}",
                    e.id,
                    e.ts.to_rfc3339(),
                    e.player,
                    e.nonce,
                    e.wager,
                    e.payout,
                    format_grid(&e.grid),
                    e.seed
                );
            }
        }
        Commands::ExportCsv { path } => {
            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record([
                "id",
                "ts",
                "player",
                "nonce",
                "wager",
                "payout",
                "seed",
                "server_seed_hash",
                "grid",
            ])?;
            let rows = sqlx::query(&format!("SELECT {SPIN_COLUMNS} FROM spins ORDER BY id ASC"))
                .fetch_all(&pool)
                .await?;
            for row in &rows {
                let e = entry_from_row(row)?;
                wtr.write_record(&[
                    e.id.to_string(),
                    e.ts.to_rfc3339(),
                    e.player.to_string(),
                    e.nonce.to_string(),
                    e.wager.to_string(),
                    e.payout.to_string(),
                    e.seed,
                    e.server_seed_hash,
                    format_grid(&e.grid),
                ])?;
            }
            wtr.flush()?;
            println!("Exported {} rows to {}", rows.len(), path);
        }
        Commands::Summary => {
            let rows = sqlx::query(&format!("SELECT {SPIN_COLUMNS} FROM spins"))
                .fetch_all(&pool)
                .await?;
            let mut summary = Summary::default();
            for row in &rows {
                summary.add(&entry_from_row(row)?)?;
            }
            println!("spins:         {}", summary.spins);
            println!("winning spins: {}", summary.winning_spins);
            println!("wagered:       {}", summary.wagered);
            println!("paid out:      {}", summary.paid_out);
            match summary.return_bps() {
                Some(bps) => println!("return:        {}.{:02}%", bps / 100, bps % 100),
                None => println!("return:        n/a"),
            }
        }
    }

    Ok(())
}
