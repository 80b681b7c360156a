// Per-day-partitioned SQLite trade log. Grounded in the
// sqlx-backed persistence style used across the wider example pack
// (`PersistenceManager::save_order` — pooled connection, bound query,
// async save), adapted to runtime-checked `sqlx::query` (no compile-time
// `query!` macros, since no live database exists at build time) and a
// SQLite pool scoped to one trading day's file.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::errors::BacktestError;

#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub expiry: NaiveDate,
    pub right: String,
    pub strike: Decimal,
    pub spread_type: String,
    pub max_loss: Decimal,
    pub exit_pnl: Decimal,
    pub exit_reason: String,
    pub market_regime: String,
    pub json_data: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySummary {
    pub total: u32,
    pub winning: u32,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub worst: f64,
    pub best: f64,
    pub total_risk_deployed: f64,
}

/// One SQLite connection pool scoped to a single trading day's file,
/// `trades_YYYY-MM-DD.sqlite3` under `base_dir`.
pub struct TradeLogStore {
    pool: SqlitePool,
    day: NaiveDate,
}

impl TradeLogStore {
    pub async fn open_for_day(base_dir: &std::path::Path, day: NaiveDate) -> Result<Self, BacktestError> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| BacktestError::store(format!("creating trade-log dir: {e}")))?;
        let path = base_dir.join(format!("trades_{day}.sqlite3"));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .map_err(|e| BacktestError::store(format!("opening {}: {e}", path.display())))?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS trade_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                symbol TEXT NOT NULL,
                expiry TEXT NOT NULL,
                right TEXT NOT NULL,
                strike TEXT NOT NULL,
                spread_type TEXT NOT NULL,
                max_loss TEXT NOT NULL,
                exit_pnl TEXT NOT NULL,
                exit_reason TEXT NOT NULL,
                market_regime TEXT NOT NULL,
                json_data TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trade_logs_timestamp ON trade_logs (timestamp);
            CREATE INDEX IF NOT EXISTS idx_trade_logs_symbol ON trade_logs (symbol);
            CREATE INDEX IF NOT EXISTS idx_trade_logs_exit_pnl ON trade_logs (exit_pnl);
            CREATE INDEX IF NOT EXISTS idx_trade_logs_market_regime ON trade_logs (market_regime);
            ",
        )
        .execute(&pool)
        .await
        .map_err(|e| BacktestError::store(format!("creating schema: {e}")))?;

        Ok(Self { pool, day })
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Durable append: awaits the write, then returns — callers treat a
    /// returned `Ok` as an ack that the row is on disk. Retries once,
    /// synchronously, on failure before surfacing the error to the caller.
    pub async fn append(&self, record: &TradeRecord) -> Result<(), BacktestError> {
        match self.append_once(record).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!(target: "backtest", "trade log append failed, retrying once: {e}");
                self.append_once(record).await
            }
        }
    }

    async fn append_once(&self, record: &TradeRecord) -> Result<(), BacktestError> {
        let created_at = Utc::now().timestamp_millis();
        sqlx::query(
            r"
            INSERT INTO trade_logs (
                timestamp, symbol, expiry, right, strike, spread_type,
                max_loss, exit_pnl, exit_reason, market_regime, json_data, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(record.timestamp.timestamp_millis())
        .bind(&record.symbol)
        .bind(record.expiry.to_string())
        .bind(&record.right)
        .bind(record.strike.to_string())
        .bind(&record.spread_type)
        .bind(record.max_loss.to_string())
        .bind(record.exit_pnl.to_string())
        .bind(&record.exit_reason)
        .bind(&record.market_regime)
        .bind(&record.json_data)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| BacktestError::store(format!("appending trade log: {e}")))?;
        Ok(())
    }

    pub async fn trades_for_day(&self) -> Result<Vec<TradeRecord>, BacktestError> {
        let rows = sqlx::query("SELECT * FROM trade_logs ORDER BY timestamp ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BacktestError::store(format!("querying trades_for_day: {e}")))?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn losing_trades_for_day(&self, min_loss: Decimal) -> Result<Vec<TradeRecord>, BacktestError> {
        let rows = sqlx::query("SELECT * FROM trade_logs WHERE CAST(exit_pnl AS REAL) <= ? ORDER BY CAST(exit_pnl AS REAL) ASC")
            .bind(min_loss.to_string().parse::<f64>().unwrap_or(0.0))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BacktestError::store(format!("querying losing_trades_for_day: {e}")))?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn daily_summary(&self) -> Result<DailySummary, BacktestError> {
        let trades = self.trades_for_day().await?;
        let total = trades.len() as u32;
        if total == 0 {
            return Ok(DailySummary {
                total: 0,
                winning: 0,
                win_rate: 0.0,
                total_pnl: 0.0,
                avg_pnl: 0.0,
                worst: 0.0,
                best: 0.0,
                total_risk_deployed: 0.0,
            });
        }
        let pnls: Vec<f64> = trades.iter().map(|t| t.exit_pnl.to_string().parse().unwrap_or(0.0)).collect();
        let winning = pnls.iter().filter(|&&p| p > 0.0).count() as u32;
        let total_pnl: f64 = pnls.iter().sum();
        let total_risk_deployed: f64 =
            trades.iter().map(|t| t.max_loss.to_string().parse::<f64>().unwrap_or(0.0)).sum();
        Ok(DailySummary {
            total,
            winning,
            win_rate: winning as f64 / total as f64,
            total_pnl,
            avg_pnl: total_pnl / total as f64,
            worst: pnls.iter().cloned().fold(f64::INFINITY, f64::min),
            best: pnls.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            total_risk_deployed,
        })
    }
}

fn row_to_record(row: &SqliteRow) -> Result<TradeRecord, BacktestError> {
    let timestamp_ms: i64 = row.try_get("timestamp").map_err(to_store_err)?;
    let timestamp = DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| BacktestError::store("corrupt timestamp in trade_logs row"))?;
    let expiry_str: String = row.try_get("expiry").map_err(to_store_err)?;
    let expiry = NaiveDate::parse_from_str(&expiry_str, "%Y-%m-%d").map_err(|e| BacktestError::store(e.to_string()))?;
    let strike: String = row.try_get("strike").map_err(to_store_err)?;
    let max_loss: String = row.try_get("max_loss").map_err(to_store_err)?;
    let exit_pnl: String = row.try_get("exit_pnl").map_err(to_store_err)?;

    Ok(TradeRecord {
        timestamp,
        symbol: row.try_get("symbol").map_err(to_store_err)?,
        expiry,
        right: row.try_get("right").map_err(to_store_err)?,
        strike: strike.parse().map_err(|_| BacktestError::store("corrupt strike decimal"))?,
        spread_type: row.try_get("spread_type").map_err(to_store_err)?,
        max_loss: max_loss.parse().map_err(|_| BacktestError::store("corrupt max_loss decimal"))?,
        exit_pnl: exit_pnl.parse().map_err(|_| BacktestError::store("corrupt exit_pnl decimal"))?,
        exit_reason: row.try_get("exit_reason").map_err(to_store_err)?,
        market_regime: row.try_get("market_regime").map_err(to_store_err)?,
        json_data: row.try_get("json_data").map_err(to_store_err)?,
    })
}

fn to_store_err(e: sqlx::Error) -> BacktestError {
    BacktestError::store(format!("reading trade_logs row: {e}"))
}
