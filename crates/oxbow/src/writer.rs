//! Archive writer
//!
//! Serializes a batch through the row codec, gzip-compresses the full
//! byte stream, and uploads it at the batch's deterministic key. The
//! serialized text must contain at least a header and one data record;
//! the selector never hands over an empty batch, so anything shorter
//! indicates a codec bug and the upload is refused.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::sync::Arc;

use diagnostics::emit;
use diagnostics::log_debug;
use object_store::{ObjectStore, PutPayload};

use crate::codec::{self, Row};
use crate::window::ArchiveKey;
use crate::{ArchiveError, Result};

/// Serialize, compress, and upload one batch. Returns compressed bytes.
pub async fn write_archive(
    store: &Arc<dyn ObjectStore>,
    key: &ArchiveKey,
    columns: &[String],
    rows: &[Row],
) -> Result<usize> {
    let text = codec::serialize_batch(columns, rows)?;

    let lines = text.iter().filter(|b| **b == b'\n').count();
    if lines < 2 {
        return Err(ArchiveError::MalformedBatch(format!(
            "refusing to upload {}: serialized batch has {} line(s), need header plus data",
            key, lines
        )));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&text)?;
    let compressed = encoder.finish()?;
    let size = compressed.len();

    store
        .put(&key.object_path(), PutPayload::from(compressed))
        .await?;
    log_debug!(
        "uploaded {key} ({size} bytes compressed, {lines} lines)",
        key: key.to_string(),
        size: size,
        lines: lines
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Field;
    use crate::window::MonthWindow;
    use chrono::NaiveDate;
    use flate2::read::GzDecoder;
    use object_store::memory::InMemory;
    use std::io::Read;

    fn key() -> ArchiveKey {
        let window = MonthWindow::of(NaiveDate::from_ymd_opt(2022, 3, 1).unwrap());
        ArchiveKey::new("events", window, 1)
    }

    #[tokio::test]
    async fn uploads_gzip_csv_at_key() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let columns = vec!["id".to_string(), "name".to_string()];
        let rows = vec![
            vec![Field::Int(1), Field::Text("alpha".to_string())],
            vec![Field::Int(2), Field::Null],
        ];

        let size = write_archive(&store, &key(), &columns, &rows).await.unwrap();
        assert!(size > 0);

        let stored = store
            .get(&key().object_path())
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        let mut text = String::new();
        GzDecoder::new(&stored[..]).read_to_string(&mut text).unwrap();
        assert_eq!(text, "\"ID\",\"NAME\"\n\"1\",\"alpha\"\n\"2\",\"\"\n");
    }

    #[tokio::test]
    async fn refuses_empty_batch() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let columns = vec!["id".to_string()];

        let err = write_archive(&store, &key(), &columns, &[]).await.unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedBatch(_)));
        // Nothing may reach storage on the failure path.
        assert!(store.get(&key().object_path()).await.is_err());
    }
}
