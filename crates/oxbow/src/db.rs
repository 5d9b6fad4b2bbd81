//! PostgreSQL capability
//!
//! Everything the pipelines need from the database lives behind this
//! module: ordered column discovery from the catalog, the atomic
//! select-and-remove batch transaction, and the CSV COPY bulk load used
//! by restore. One connection, one transaction open at a time.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diagnostics::emit;
use diagnostics::{log_debug, log_error};
use futures::{SinkExt, pin_mut};
use tokio::io::AsyncReadExt;
use tokio_postgres::NoTls;
use tokio_postgres::types::Type;

use crate::codec::{Field, Row};
use crate::control;
use crate::window::MonthWindow;
use crate::{ArchiveError, Result};

/// A connected database session.
pub struct Database {
    client: tokio_postgres::Client,
}

/// Reject anything but plain identifiers before splicing into SQL.
///
/// Table and column names arrive from the CLI and from archive headers;
/// they are interpolated into statements (COPY and DELETE cannot take
/// them as parameters), so they must be bare `[A-Za-z_][A-Za-z0-9_]*`.
pub fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ArchiveError::InvalidIdentifier(name.to_string()))
    }
}

fn take_batch_sql(table: &str, ts_column: &str) -> String {
    format!(
        "DELETE FROM {table} WHERE ctid IN (
            SELECT ctid FROM {table}
            WHERE {ts} >= $1::date AND {ts} < $2::date
            ORDER BY {ts} ASC
            LIMIT $3
        ) RETURNING *",
        table = table,
        ts = ts_column
    )
}

fn decode_field(row: &tokio_postgres::Row, idx: usize) -> Result<Field> {
    let column = &row.columns()[idx];
    let ty = column.type_();
    let field = match ty {
        t if *t == Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Field::Bool),
        t if *t == Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|n| Field::Int(n.into())),
        t if *t == Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|n| Field::Int(n.into())),
        t if *t == Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Field::Int),
        t if *t == Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|x| Field::Float(x.into())),
        t if *t == Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Field::Float),
        t if *t == Type::TEXT || *t == Type::VARCHAR || *t == Type::BPCHAR || *t == Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.map(Field::Text)
        }
        t if *t == Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Field::Date),
        t if *t == Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Field::Timestamp),
        t if *t == Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Field::TimestampTz),
        t if *t == Type::UUID => row.try_get::<_, Option<uuid::Uuid>>(idx)?.map(Field::Uuid),
        t if *t == Type::JSON || *t == Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Field::Json),
        other => {
            return Err(ArchiveError::UnsupportedColumn {
                column: column.name().to_string(),
                ty: other.to_string(),
            });
        }
    };
    Ok(field.unwrap_or(Field::Null))
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    (0..row.columns().len())
        .map(|idx| decode_field(row, idx))
        .collect()
}

impl Database {
    /// Connect and drive the connection on a background task.
    pub async fn connect(url: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log_error!("database connection failed: {err}", err: e.to_string().as_str());
            }
        });
        Ok(Self { client })
    }

    /// Create the batch-sequence control table if needed.
    pub async fn ensure_control_table(&self) -> Result<()> {
        control::ensure_control_table(&self.client).await
    }

    /// The table's column names in catalog (ordinal) order.
    pub async fn columns(&self, table: &str) -> Result<Vec<String>> {
        check_identifier(table)?;
        let rows = self
            .client
            .query(
                "SELECT column_name FROM information_schema.columns
                 WHERE table_name = $1 ORDER BY ordinal_position",
                &[&table],
            )
            .await?;
        if rows.is_empty() {
            return Err(ArchiveError::UnknownTable(table.to_string()));
        }
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    /// Highest batch number ever committed for (table, month); 0 if none.
    pub async fn last_sequence(&self, table: &str, window: &MonthWindow) -> Result<i64> {
        control::last_sequence(&self.client, table, window).await
    }

    /// Atomically remove and return up to `limit` rows from the window.
    ///
    /// One transaction: the oldest rows whose timestamp falls in
    /// `[window.start, window.end)` are deleted and returned, and the
    /// control table is advanced to `seq`. The returned set is exactly
    /// the deleted set. An empty result means the window is exhausted
    /// (and nothing, including the control row, is written).
    pub async fn take_batch(
        &mut self,
        table: &str,
        ts_column: &str,
        window: &MonthWindow,
        seq: i64,
        limit: i64,
    ) -> Result<Vec<Row>> {
        check_identifier(table)?;
        check_identifier(ts_column)?;

        let sql = take_batch_sql(table, ts_column);
        log_debug!(
            "selecting batch {seq} of {table} for {month}",
            seq: seq,
            table: table,
            month: window.label()
        );

        let tx = self.client.transaction().await?;
        let pg_rows = tx
            .query(
                sql.as_str(),
                &[&window.start(), &window.end_exclusive(), &limit],
            )
            .await?;
        let rows = pg_rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;

        if rows.is_empty() {
            tx.rollback().await?;
            return Ok(rows);
        }

        control::record_sequence(&tx, table, window, seq).await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Stream a canonical CSV file into the table inside one transaction.
    ///
    /// Uses `COPY ... FROM STDIN` with the archive's column list; any
    /// failure rolls the whole load back, so no partial load is retained.
    pub async fn bulk_load(
        &mut self,
        table: &str,
        columns: &[String],
        file: &std::path::Path,
    ) -> Result<u64> {
        check_identifier(table)?;
        for column in columns {
            check_identifier(column)?;
        }

        let copy_sql = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT csv, HEADER true, DELIMITER ',')",
            table,
            columns.join(", ")
        );
        log_debug!("bulk load: {sql}", sql: copy_sql.clone());

        let tx = self.client.transaction().await?;
        let sink = tx.copy_in(copy_sql.as_str()).await?;
        pin_mut!(sink);

        let mut source = tokio::fs::File::open(file).await?;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink.as_mut()
                .send(Bytes::copy_from_slice(&buf[..n]))
                .await?;
        }
        let loaded = sink.finish().await?;
        tx.commit().await?;
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rules() {
        check_identifier("events").unwrap();
        check_identifier("_audit_log2").unwrap();
        check_identifier("CREATED_AT").unwrap();
        assert!(check_identifier("").is_err());
        assert!(check_identifier("1table").is_err());
        assert!(check_identifier("events; DROP TABLE x").is_err());
        assert!(check_identifier("a-b").is_err());
    }

    #[test]
    fn take_batch_sql_is_one_atomic_statement() {
        let sql = take_batch_sql("events", "created_at");
        assert!(sql.starts_with("DELETE FROM events"));
        assert!(sql.contains("created_at >= $1::date"));
        assert!(sql.contains("created_at < $2::date"));
        assert!(sql.contains("ORDER BY created_at ASC"));
        assert!(sql.contains("LIMIT $3"));
        assert!(sql.trim_end().ends_with("RETURNING *"));
    }
}
