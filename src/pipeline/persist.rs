//! Writes raw payloads and processed tables through the storage gateway.

use bytes::Bytes;
use chrono::Utc;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::debug;

use crate::emit;
use crate::error::{
    EncodeSnafu, LocalCopySnafu, PersistError, RawEncodeSnafu, UploadSnafu,
};
use crate::metrics::events::ArtifactWritten;
use crate::model::RawPayload;
use crate::storage::{BlobMetadata, StorageGatewayRef};
use crate::table::{self, Artifact, TableRow};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Key layout and upload of everything a run persists.
pub struct ArtifactWriter {
    storage: StorageGatewayRef,
    namespace: String,
    local_dir: Option<PathBuf>,
}

impl ArtifactWriter {
    pub fn new(storage: StorageGatewayRef, namespace: &str, local_dir: Option<PathBuf>) -> Self {
        Self {
            storage,
            namespace: namespace.to_string(),
            local_dir,
        }
    }

    /// `<ns>/raw/<id>/full.json`
    pub fn raw_key(&self, id: i64) -> String {
        format!("{}/raw/{}/full.json", self.namespace, id)
    }

    /// `<ns>/processed/<name>.csv`
    pub fn processed_key(&self, artifact: Artifact) -> String {
        format!("{}/processed/{}", self.namespace, artifact.file_name())
    }

    /// Store a raw payload as pretty JSON tagged with its source.
    pub async fn store_raw(&self, payload: &RawPayload, source: &str) -> Result<String, PersistError> {
        let id = payload.requested_id;
        let body = serde_json::to_vec_pretty(&payload.body).context(RawEncodeSnafu { id })?;

        let mut metadata = BlobMetadata::new();
        metadata.insert("source".to_string(), source.to_string());
        metadata.insert("uploaded_at".to_string(), Utc::now().to_rfc3339());

        let key = self.raw_key(id);
        self.storage
            .put(&key, Bytes::from(body), JSON_CONTENT_TYPE, &metadata)
            .await
            .context(UploadSnafu { key: &key })?;
        Ok(key)
    }

    /// Encode and store one processed table, plus its local copy when
    /// configured. Returns the encoded size.
    pub async fn write_table<T: TableRow>(
        &self,
        artifact: Artifact,
        rows: &[T],
    ) -> Result<usize, PersistError> {
        let result = self.try_write_table(artifact, rows).await;
        emit!(ArtifactWritten {
            artifact: artifact.file_name(),
            rows: rows.len(),
            bytes: *result.as_ref().unwrap_or(&0),
            success: result.is_ok(),
        });
        result
    }

    async fn try_write_table<T: TableRow>(
        &self,
        artifact: Artifact,
        rows: &[T],
    ) -> Result<usize, PersistError> {
        let name = artifact.file_name();
        let encoded = Bytes::from(table::encode(name, rows).context(EncodeSnafu { artifact: name })?);
        let size = encoded.len();

        let key = self.processed_key(artifact);
        self.storage
            .put(&key, encoded.clone(), CSV_CONTENT_TYPE, &BlobMetadata::new())
            .await
            .context(UploadSnafu { key: &key })?;
        debug!("Stored {} ({} rows, {} bytes)", key, rows.len(), size);

        if let Some(dir) = &self.local_dir {
            let path = dir.join(name);
            tokio::fs::create_dir_all(dir)
                .await
                .context(LocalCopySnafu { path: dir.clone() })?;
            tokio::fs::write(&path, &encoded)
                .await
                .context(LocalCopySnafu { path: &path })?;
        }

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoiRecord;
    use crate::storage::StorageGateway;
    use serde_json::json;
    use std::sync::Arc;

    async fn writer(local_dir: Option<PathBuf>) -> (StorageGatewayRef, ArtifactWriter) {
        let storage: StorageGatewayRef = Arc::new(StorageGateway::for_url("memory://").await.unwrap());
        (storage.clone(), ArtifactWriter::new(storage, "anime-impact", local_dir))
    }

    #[tokio::test]
    async fn test_raw_payload_is_pretty_json() {
        let (storage, writer) = writer(None).await;
        let payload = RawPayload::new(1, json!({"data": {"mal_id": 1, "title": "Cowboy Bebop"}}));

        let key = writer.store_raw(&payload, "jikan_api").await.unwrap();
        assert_eq!(key, "anime-impact/raw/1/full.json");

        let stored = storage.get(&key).await.unwrap();
        let text = String::from_utf8(stored.to_vec()).unwrap();
        assert!(text.contains("\n  \"data\""));
        let back: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, payload.body);
    }

    #[tokio::test]
    async fn test_table_and_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("processed");
        let (storage, writer) = writer(Some(local.clone())).await;

        let size = writer
            .write_table::<RoiRecord>(Artifact::LicensingRoi, &[])
            .await
            .unwrap();

        let stored = storage
            .get("anime-impact/processed/licensing_roi.csv")
            .await
            .unwrap();
        assert_eq!(stored.len(), size);
        assert_eq!(std::fs::read(local.join("licensing_roi.csv")).unwrap(), stored.to_vec());
    }
}
