//! Month-windowed table archival for PostgreSQL
//!
//! Oxbow carves cold rows out of a table one calendar month at a time,
//! writes each batch as a gzip-compressed CSV file in object storage, and
//! deletes the batch from the table in the same selection transaction.
//! A named archive file can later be loaded back into the table through
//! the database's CSV COPY path.
//!
//! # Architecture
//!
//! - **codec**: converts row values to and from the flat archive format
//! - **window**: calendar-month partitions and deterministic archive keys
//! - **db**: the PostgreSQL capability (column discovery, batch
//!   select-and-remove, bulk load)
//! - **control**: durable per-(table, month) batch sequence numbers
//! - **writer**: batch serialization, compression, and upload
//! - **pipeline**: the backup run loop
//! - **restore**: download, re-normalization, and transactional load
//!
//! # Batch contract
//!
//! Every batch is archived-and-deleted as a unit: the rows returned by the
//! selection transaction are exactly the rows removed from the table. The
//! delete and the upload are *not* one cross-system transaction; a failed
//! upload after a committed delete aborts the whole run and is left for
//! the operator to reconcile.

pub mod codec;
pub mod config;
pub mod control;
pub mod db;
mod error;
pub mod pipeline;
pub mod restore;
pub mod store;
pub mod window;
pub mod writer;

pub use codec::{Field, Row};
pub use config::{RunConfig, load_config};
pub use db::Database;
pub use error::ArchiveError;
pub use pipeline::{BackupParams, BackupSummary, BatchSource, run_backup};
pub use restore::{RestoreOutcome, run_restore};
pub use store::build_object_store;
pub use window::{ArchiveKey, MonthWindow, windows_for_range};

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;
