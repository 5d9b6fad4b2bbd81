//! Restore pipeline
//!
//! Downloads one named archive file, decompresses it, re-normalizes every
//! record through the row codec into a canonical staging file, and streams
//! that file into the target table with a transactional CSV COPY. The
//! archive header must match the live table's column set before any load
//! begins; a drifted schema aborts rather than mis-mapping columns.
//! Staging files are temporaries and disappear on success and failure
//! alike.

use flate2::read::GzDecoder;
use std::io::Write;
use std::sync::Arc;

use diagnostics::emit;
use diagnostics::{log_debug, log_info, log_warn};
use object_store::ObjectStore;
use tempfile::NamedTempFile;

use crate::codec;
use crate::db::Database;
use crate::window::ArchiveKey;
use crate::{ArchiveError, Result};

/// One archive, downloaded and rewritten in canonical form.
pub struct NormalizedArchive {
    /// Column names from the archive header, as stored.
    pub columns: Vec<String>,
    /// Canonical CSV staging file (header included); removed on drop.
    pub file: NamedTempFile,
    /// Data records in the canonical file.
    pub records: u64,
    /// Malformed records dropped during normalization.
    pub skipped: u64,
}

#[derive(Debug)]
pub struct RestoreOutcome {
    pub rows_loaded: u64,
    pub records_skipped: u64,
}

/// Fetch an archive and rewrite it as a canonical load file.
pub async fn fetch_and_normalize(
    store: &Arc<dyn ObjectStore>,
    key: &ArchiveKey,
) -> Result<NormalizedArchive> {
    let compressed = store.get(&key.object_path()).await?.bytes().await?;
    log_debug!(
        "fetched {key}: {nbytes} bytes compressed",
        key: key.to_string(),
        nbytes: compressed.len()
    );

    let mut staging = NamedTempFile::new()?;
    let report = codec::normalize(GzDecoder::new(&compressed[..]), &mut staging)?;
    staging.flush()?;

    if report.skipped > 0 {
        log_warn!(
            "{key}: skipped {skipped} malformed record(s) of {total}",
            key: key.to_string(),
            skipped: report.skipped,
            total: report.skipped + report.records
        );
    }

    Ok(NormalizedArchive {
        columns: report.columns,
        file: staging,
        records: report.records,
        skipped: report.skipped,
    })
}

/// Fatal pre-check: the archive header's column set must equal the live
/// table's column set (case-insensitive; the header is uppercased).
pub fn check_schema(table: &str, archive_columns: &[String], table_columns: &[String]) -> Result<()> {
    let mut archive: Vec<String> = archive_columns.iter().map(|c| c.to_lowercase()).collect();
    let mut live: Vec<String> = table_columns.iter().map(|c| c.to_lowercase()).collect();
    archive.sort();
    live.sort();
    if archive != live {
        return Err(ArchiveError::SchemaMismatch {
            table: table.to_string(),
            archive_columns: archive_columns.join(", "),
            table_columns: table_columns.join(", "),
        });
    }
    Ok(())
}

/// Restore one archived batch file into its table.
pub async fn run_restore(
    db: &mut Database,
    store: &Arc<dyn ObjectStore>,
    key: &ArchiveKey,
    table: &str,
) -> Result<RestoreOutcome> {
    let archive = fetch_and_normalize(store, key).await?;
    if archive.records == 0 {
        return Err(ArchiveError::MalformedBatch(format!(
            "{} contains no loadable records",
            key
        )));
    }

    let live_columns = db.columns(table).await?;
    check_schema(table, &archive.columns, &live_columns)?;

    let loaded = db
        .bulk_load(table, &archive.columns, archive.file.path())
        .await?;
    log_info!(
        "restored {loaded} rows from {key} into {table}",
        loaded: loaded,
        key: key.to_string(),
        table: table
    );

    Ok(RestoreOutcome {
        rows_loaded: loaded,
        records_skipped: archive.skipped,
    })
}
