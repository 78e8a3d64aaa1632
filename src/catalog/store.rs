use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{MetabrokerError, Result};
use crate::types::{CatalogDocument, CatalogRecord};

/// Storage trait for persisting the catalog cache document
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Load the cached document, if one has been saved.
    async fn load(&self) -> Result<Option<CatalogDocument>>;

    /// Replace the cached document. Readers must never observe a partial
    /// document.
    async fn save(&self, document: &CatalogDocument) -> Result<()>;

    /// Drop the cached document.
    async fn clear(&self) -> Result<()>;

    /// Whether saved documents survive a process restart.
    fn is_persistent(&self) -> bool;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}

/// File-backed store holding one JSON document, replaced atomically via a
/// temp file and rename.
pub struct FileCatalogStore {
    path: PathBuf,
}

impl FileCatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "catalog".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn modified_at(&self) -> Result<DateTime<Utc>> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

#[async_trait]
impl CatalogStore for FileCatalogStore {
    async fn load(&self) -> Result<Option<CatalogDocument>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if let Ok(document) = serde_json::from_str::<CatalogDocument>(&content) {
            debug!(
                path = %self.path.display(),
                objects = document.total_objects,
                "loaded catalog document"
            );
            return Ok(Some(document));
        }
        // Older cache files held a bare record array; date those from the
        // file's modification time.
        let records: Vec<CatalogRecord> = serde_json::from_str(&content).map_err(|_| {
            MetabrokerError::ParseError(format!(
                "unrecognized cache file layout: {}",
                self.path.display()
            ))
        })?;
        let modified = self.modified_at()?;
        info!(path = %self.path.display(), "read legacy cache file, dating it from mtime");
        Ok(Some(CatalogDocument {
            last_updated: modified,
            download_date: modified.date_naive(),
            total_objects: records.len(),
            data: records,
        }))
    }

    async fn save(&self, document: &CatalogDocument) -> Result<()> {
        let serialized = serde_json::to_string(document)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, serialized.as_bytes()).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(
            path = %self.path.display(),
            objects = document.total_objects,
            "saved catalog document"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn backend(&self) -> &'static str {
        "file"
    }
}

/// In-memory store for environments without a writable filesystem.
#[derive(Default)]
pub struct InMemoryCatalogStore {
    document: Mutex<Option<CatalogDocument>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn load(&self) -> Result<Option<CatalogDocument>> {
        Ok(self.document.lock().unwrap().clone())
    }

    async fn save(&self, document: &CatalogDocument) -> Result<()> {
        *self.document.lock().unwrap() = Some(document.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.document.lock().unwrap() = None;
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fallback;

    fn sample_document() -> CatalogDocument {
        let data = fallback::offline_catalog();
        CatalogDocument {
            last_updated: Utc::now(),
            download_date: Utc::now().date_naive(),
            total_objects: data.len(),
            data,
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCatalogStore::new(dir.path().join("tns_cache.json"));

        assert!(store.load().await.unwrap().is_none());

        let document = sample_document();
        store.save(&document).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.total_objects, document.total_objects);
        assert_eq!(loaded.download_date, document.download_date);
        assert_eq!(loaded.data[0].name, "2011fe");

        // The temp file used for the atomic swap must not linger.
        assert!(!dir.path().join("tns_cache.json.tmp").exists());
    }

    #[tokio::test]
    async fn legacy_array_files_are_dated_from_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tns_cache.json");
        let records = fallback::offline_catalog();
        std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();

        let store = FileCatalogStore::new(&path);
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.total_objects, 3);
        assert_eq!(loaded.download_date, Utc::now().date_naive());
    }

    #[tokio::test]
    async fn unreadable_cache_files_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tns_cache.json");
        std::fs::write(&path, "{\"what\": \"is this\"}").unwrap();

        let store = FileCatalogStore::new(&path);
        assert!(store.load().await.is_err());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCatalogStore::new(dir.path().join("tns_cache.json"));
        store.clear().await.unwrap();
        store.save(&sample_document()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_does_not_claim_persistence() {
        let store = InMemoryCatalogStore::new();
        assert!(!store.is_persistent());
        store.save(&sample_document()).await.unwrap();
        assert_eq!(store.load().await.unwrap().unwrap().total_objects, 3);
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
