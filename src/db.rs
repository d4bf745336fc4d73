use eyre::{Result, WrapErr};
use rusqlite::{params, types::Type, Connection, Row};
use std::str::FromStr;

use crate::models::{NewBatch, PoolSnapshot, TotalsSnapshot};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS totals (
  id   INTEGER PRIMARY KEY AUTOINCREMENT,
  amp  TEXT NOT NULL, -- u128 wei stored as string
  usd  TEXT NOT NULL  -- Decimal stored as string
);

CREATE TABLE IF NOT EXISTS tvl (
  id        INTEGER PRIMARY KEY AUTOINCREMENT,
  name      TEXT NOT NULL,
  contract  TEXT NOT NULL,
  amp_total TEXT NOT NULL,
  usd       TEXT NOT NULL,
  batch_id  INTEGER NOT NULL REFERENCES totals(id)
);

CREATE INDEX IF NOT EXISTS idx_tvl_batch ON tvl(batch_id);
"#;

/// Connect to SQLite (with WAL mode for performance)
pub fn connect(path: &str) -> Result<Connection> {
    let conn = Connection::open(path).wrap_err_with(|| format!("opening database {path}"))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Run schema migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(INIT_SQL)?;
    Ok(())
}

/// Write one batch atomically and return its batch id.
pub fn save_batch(conn: &mut Connection, batch: &NewBatch) -> Result<i64> {
    insert_batch(conn, batch).wrap_err("Database error while saving TVL batch")
}

fn insert_batch(conn: &mut Connection, batch: &NewBatch) -> rusqlite::Result<i64> {
    // dropped without commit on any error → rollback
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO totals (amp, usd) VALUES (?1, ?2)",
        params![batch.amp_total.to_string(), batch.usd_total.to_string()],
    )?;
    let batch_id = tx.last_insert_rowid();

    {
        let mut stmt = tx.prepare(
            "INSERT INTO tvl (name, contract, amp_total, usd, batch_id) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for pool in &batch.pools {
            stmt.execute(params![
                pool.pool_name,
                pool.contract_address,
                pool.amp_amount.to_string(),
                pool.usd_value.to_string(),
                batch_id
            ])?;
        }
    }

    tx.commit()?;
    Ok(batch_id)
}

/// Most recent totals, newest first.
pub fn latest_totals(conn: &Connection, limit: u32) -> Result<Vec<TotalsSnapshot>> {
    let mut stmt = conn.prepare("SELECT id, amp, usd FROM totals ORDER BY id DESC LIMIT ?1")?;
    let rows = stmt.query_map([limit], |r| {
        Ok(TotalsSnapshot {
            batch_id: r.get(0)?,
            amp_total: parse_col(r, 1)?,
            usd_total: parse_col(r, 2)?,
        })
    })?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .wrap_err("Database error while reading totals")
}

/// Pool rows of two batches, oldest batch first.
pub fn pools_for_batches(conn: &Connection, current: i64, previous: i64) -> Result<Vec<PoolSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, contract, amp_total, usd, batch_id
         FROM tvl
         WHERE batch_id = ?1 OR batch_id = ?2
         ORDER BY batch_id ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![previous, current], |r| {
        Ok(PoolSnapshot {
            id: r.get(0)?,
            pool_name: r.get(1)?,
            contract_address: r.get(2)?,
            amp_amount: parse_col(r, 3)?,
            usd_value: parse_col(r, 4)?,
            batch_id: r.get(5)?,
        })
    })?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .wrap_err("Database error while reading TVL rows")
}

/// Numeric columns are stored as TEXT to keep full precision.
fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
