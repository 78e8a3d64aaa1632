pub mod csv;
pub mod fallback;
pub mod store;

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, info, instrument, warn};

use crate::config::{CacheBackend, Config};
use crate::constants;
use crate::error::{MetabrokerError, Result};
use crate::observability::metrics;
use crate::types::{
    CacheInfo, CacheProvenance, CatalogDocument, CatalogRecord, RefreshSummary, TnsCredentials,
};

use self::store::{CatalogStore, FileCatalogStore, InMemoryCatalogStore};

/// Where refreshes download the catalog archive from. Separated from the
/// cache so tests can inject canned archives.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_archive(&self, credentials: Option<&TnsCredentials>) -> Result<Vec<u8>>;
}

/// Downloads the zipped public-objects export from TNS.
pub struct TnsArchiveSource {
    client: reqwest::Client,
    url: String,
}

impl TnsArchiveSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl CatalogSource for TnsArchiveSource {
    async fn fetch_archive(&self, credentials: Option<&TnsCredentials>) -> Result<Vec<u8>> {
        let user_agent = credentials
            .map(TnsCredentials::user_agent)
            .unwrap_or_else(|| constants::TNS_DEFAULT_USER_AGENT.to_string());
        let response = self
            .client
            .post(&self.url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "*/*")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(|e| MetabrokerError::UpstreamUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| MetabrokerError::UpstreamUnavailable(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| MetabrokerError::UpstreamUnavailable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// TNS catalog cache with memory-first reads, pluggable persistence and
/// single-flight refreshes.
pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn CatalogStore>,
    snapshot: RwLock<Option<Arc<CatalogDocument>>>,
    completed_refreshes: AtomicU64,
    refresh_gate: tokio::sync::Mutex<Option<RefreshSummary>>,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>, store: Arc<dyn CatalogStore>) -> Self {
        Self {
            source,
            store,
            snapshot: RwLock::new(None),
            completed_refreshes: AtomicU64::new(0),
            refresh_gate: tokio::sync::Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let source = TnsArchiveSource::new(
            config.upstream.url.clone(),
            Duration::from_secs(config.upstream.timeout_seconds),
        )?;
        let store: Arc<dyn CatalogStore> = match config.cache.backend {
            CacheBackend::File => Arc::new(FileCatalogStore::new(&config.cache.path)),
            CacheBackend::Memory => Arc::new(InMemoryCatalogStore::new()),
        };
        info!(backend = store.backend(), "catalog store selected");
        Ok(Self::new(Arc::new(source), store))
    }

    /// Freshness report without touching the upstream.
    pub async fn get_cache_info(&self) -> Result<CacheInfo> {
        if let Some(document) = self.current_snapshot() {
            return Ok(describe(&document, CacheProvenance::Memory));
        }
        match self.store.load().await? {
            Some(document) => {
                let document = self.install_snapshot(document);
                Ok(describe(&document, CacheProvenance::File))
            }
            None => Ok(CacheInfo::missing()),
        }
    }

    /// Download, parse and store a fresh catalog.
    ///
    /// Refreshes are single-flight: callers that arrive while one is running
    /// wait for it and share its result instead of starting a second
    /// download. A failure is seen only by the callers that waited on that
    /// attempt; the next caller starts its own.
    pub async fn refresh(&self, credentials: Option<&TnsCredentials>) -> Result<RefreshSummary> {
        let seen = self.completed_refreshes.load(Ordering::Acquire);
        let mut gate = self.refresh_gate.lock().await;
        if self.completed_refreshes.load(Ordering::Acquire) > seen {
            if let Some(summary) = gate.as_ref() {
                debug!("reusing refresh that completed while this caller waited");
                return Ok(RefreshSummary {
                    reused: true,
                    ..summary.clone()
                });
            }
        }
        let summary = self.perform_refresh(credentials).await?;
        *gate = Some(summary.clone());
        self.completed_refreshes.fetch_add(1, Ordering::Release);
        Ok(summary)
    }

    /// Current cache contents: memory first, then the store, then the
    /// bounded offline dataset when no persistent storage exists at all.
    pub async fn get_all(&self) -> Result<Vec<CatalogRecord>> {
        if let Some(document) = self.current_snapshot() {
            return Ok(document.data.clone());
        }
        if let Some(document) = self.store.load().await? {
            return Ok(self.install_snapshot(document).data.clone());
        }
        if !self.store.is_persistent() {
            warn!("no persistent catalog storage; serving bounded offline dataset");
            metrics::catalog::fallback_served();
            return Ok(fallback::offline_catalog());
        }
        Err(MetabrokerError::NoDataAvailable(
            "no cached TNS data; run a refresh to download the catalog".to_string(),
        ))
    }

    /// Drop both the memory snapshot and the stored document.
    pub async fn invalidate(&self) -> Result<()> {
        *self.snapshot.write().unwrap() = None;
        self.store.clear().await?;
        info!("catalog cache invalidated");
        Ok(())
    }

    #[instrument(skip(self, credentials))]
    async fn perform_refresh(
        &self,
        credentials: Option<&TnsCredentials>,
    ) -> Result<RefreshSummary> {
        let started = Instant::now();
        info!(credentialed = credentials.is_some(), "refreshing TNS catalog");
        let result = self.download_and_store(credentials).await;
        metrics::catalog::refresh_duration(started.elapsed().as_secs_f64());
        match &result {
            Ok(summary) => {
                metrics::catalog::refresh_success(summary.count);
                info!(
                    objects = summary.count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "catalog refresh complete"
                );
            }
            Err(e) => {
                metrics::catalog::refresh_error();
                warn!(error = %e, "catalog refresh failed; existing cache left in place");
            }
        }
        result
    }

    async fn download_and_store(
        &self,
        credentials: Option<&TnsCredentials>,
    ) -> Result<RefreshSummary> {
        let archive = self.source.fetch_archive(credentials).await?;
        debug!(bytes = archive.len(), "downloaded catalog archive");
        let csv_text = extract_csv(&archive)?;
        let records = csv::parse_catalog_csv(&csv_text)?;
        if records.is_empty() {
            return Err(MetabrokerError::ParseError(
                "no valid records parsed from catalog CSV".to_string(),
            ));
        }
        let now = Utc::now();
        let document = CatalogDocument {
            last_updated: now,
            download_date: now.date_naive(),
            total_objects: records.len(),
            data: records,
        };
        self.store.save(&document).await?;
        let count = document.total_objects;
        let download_date = document.download_date;
        self.install_snapshot(document);
        Ok(RefreshSummary {
            count,
            timestamp: now,
            download_date,
            reused: false,
        })
    }

    fn current_snapshot(&self) -> Option<Arc<CatalogDocument>> {
        self.snapshot.read().unwrap().clone()
    }

    fn install_snapshot(&self, document: CatalogDocument) -> Arc<CatalogDocument> {
        let document = Arc::new(document);
        *self.snapshot.write().unwrap() = Some(document.clone());
        document
    }
}

/// Whether a caller holding credentials should kick off a refresh now.
pub fn refresh_warranted(info: &CacheInfo, has_credentials: bool) -> bool {
    has_credentials && (!info.exists || !info.is_current)
}

fn describe(document: &CatalogDocument, source: CacheProvenance) -> CacheInfo {
    let today = Utc::now().date_naive();
    let age_days = (today - document.download_date).num_days();
    CacheInfo {
        exists: true,
        is_current: age_days == 0,
        age_days: Some(age_days),
        total_objects: Some(document.total_objects),
        download_date: Some(document.download_date),
        last_updated: Some(document.last_updated),
        source: Some(source),
    }
}

/// Pull the first CSV entry out of the zipped export, entirely in memory.
fn extract_csv(archive: &[u8]) -> Result<String> {
    let cursor = std::io::Cursor::new(archive);
    let mut zip = zip::ZipArchive::new(cursor)
        .map_err(|e| MetabrokerError::MalformedArchive(e.to_string()))?;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| MetabrokerError::MalformedArchive(e.to_string()))?;
        if !entry.name().to_lowercase().ends_with(".csv") {
            continue;
        }
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| MetabrokerError::MalformedArchive(e.to_string()))?;
        return Ok(content);
    }
    Err(MetabrokerError::MalformedArchive(
        "no CSV file found in the downloaded archive".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn zip_with(name: &str, content: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer.start_file(name, options).unwrap();
        std::io::Write::write_all(&mut writer, content.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extract_csv_finds_the_csv_entry() {
        let archive = zip_with("tns_public_objects.csv", "banner\nheader\n");
        assert_eq!(extract_csv(&archive).unwrap(), "banner\nheader\n");
    }

    #[test]
    fn archive_without_csv_is_malformed() {
        let archive = zip_with("readme.txt", "nothing here");
        let err = extract_csv(&archive).unwrap_err();
        assert!(matches!(err, MetabrokerError::MalformedArchive(_)));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let err = extract_csv(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, MetabrokerError::MalformedArchive(_)));
    }

    #[test]
    fn freshness_is_derived_from_download_date() {
        let today = Utc::now().date_naive();
        let mut document = CatalogDocument {
            last_updated: Utc::now(),
            download_date: today,
            total_objects: 1,
            data: fallback::offline_catalog(),
        };
        let info = describe(&document, CacheProvenance::Memory);
        assert!(info.is_current);
        assert_eq!(info.age_days, Some(0));

        document.download_date = today - ChronoDuration::days(3);
        let info = describe(&document, CacheProvenance::File);
        assert!(!info.is_current);
        assert_eq!(info.age_days, Some(3));
        assert!(info.exists);
    }

    #[test]
    fn refresh_warranted_requires_credentials_and_staleness() {
        let mut info = CacheInfo::missing();
        assert!(refresh_warranted(&info, true));
        assert!(!refresh_warranted(&info, false));

        info.exists = true;
        info.is_current = true;
        assert!(!refresh_warranted(&info, true));

        info.is_current = false;
        assert!(refresh_warranted(&info, true));
    }
}
