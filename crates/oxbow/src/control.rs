//! Durable batch-sequence control table
//!
//! Archive keys must stay unique across the lifetime of a table's backups,
//! not just within one run, so the last committed batch number per
//! (table, month) lives in a small control table in the target database.
//! The row is upserted inside the same transaction as the batch delete:
//! a sequence number is only ever burned together with its rows. A
//! resumed or repeated run continues from `last_batch + 1` instead of
//! reusing (and silently overwriting) earlier archive files.

use tokio_postgres::{Client, Transaction};

use crate::Result;
use crate::window::MonthWindow;

const CREATE_SQL: &str = "CREATE TABLE IF NOT EXISTS oxbow_archive_seq (
    table_name text NOT NULL,
    month text NOT NULL,
    last_batch bigint NOT NULL,
    updated_at timestamptz NOT NULL DEFAULT now(),
    PRIMARY KEY (table_name, month)
)";

const SELECT_SQL: &str =
    "SELECT last_batch FROM oxbow_archive_seq WHERE table_name = $1 AND month = $2";

const UPSERT_SQL: &str = "INSERT INTO oxbow_archive_seq (table_name, month, last_batch)
    VALUES ($1, $2, $3)
    ON CONFLICT (table_name, month)
    DO UPDATE SET last_batch = EXCLUDED.last_batch, updated_at = now()";

/// Create the control table if this database has never been archived from.
pub async fn ensure_control_table(client: &Client) -> Result<()> {
    client.execute(CREATE_SQL, &[]).await?;
    Ok(())
}

/// The highest batch number ever committed for (table, month); 0 if none.
pub async fn last_sequence(client: &Client, table: &str, window: &MonthWindow) -> Result<i64> {
    let row = client
        .query_opt(SELECT_SQL, &[&table, &window.label()])
        .await?;
    Ok(row.map(|r| r.get(0)).unwrap_or(0))
}

/// Record a burned sequence number inside the batch's delete transaction.
pub async fn record_sequence(
    tx: &Transaction<'_>,
    table: &str,
    window: &MonthWindow,
    seq: i64,
) -> Result<()> {
    tx.execute(UPSERT_SQL, &[&table, &window.label(), &seq])
        .await?;
    Ok(())
}
