//! All-or-nothing persistence of finished audits.
//!
//! Finalizing uploads every screenshot, then writes one record. If any
//! upload or the insert fails, objects already written are removed and no
//! record exists.

use crate::audits::{self, AuditRecord};
use crate::error::{DatabaseError, Result};
use crate::objects::{FsObjectStore, ObjectStore};
use crate::Database;
use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use vantage_core::{AuditId, Screenshot, StorageConfig, StoredScreenshot};

const SCREENSHOT_CONTENT_TYPE: &str = "image/jpeg";

/// A finished report ready to persist.
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    /// Primary URL that was audited
    pub url: String,
    /// Report object (expert results keyed by label)
    pub report: JsonValue,
    /// Screenshots with base64 bytes, in acquisition order
    pub screenshots: Vec<Screenshot>,
}

/// Outcome of a successful finalize.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedAudit {
    /// Id of the new record
    pub audit_id: AuditId,
    /// Public URL of the first desktop screenshot
    pub screenshot_url: Option<String>,
    /// Report as stored, with `screenshots` holding public URLs
    pub report: JsonValue,
}

/// Durable store used once per audit and for later retrieval.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a finished audit. Either everything is stored or nothing is.
    async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizedAudit>;

    /// Look up a stored audit.
    async fn fetch(&self, audit_id: &str) -> Result<Option<AuditRecord>>;
}

/// Object key for the `index`-th screenshot of an audit.
#[must_use]
pub fn screenshot_key(audit_id: &AuditId, index: usize, screenshot: &Screenshot) -> String {
    format!(
        "public/{}/{}-{}.jpeg",
        audit_id.as_str(),
        index,
        screenshot.device().as_str()
    )
}

/// `SQLite` records plus an [`ObjectStore`] for screenshots.
#[derive(Clone)]
pub struct SqliteAuditStore {
    db: Database,
    objects: Arc<dyn ObjectStore>,
}

impl SqliteAuditStore {
    /// Combine an opened database with an object store.
    #[must_use]
    pub fn new(db: Database, objects: Arc<dyn ObjectStore>) -> Self {
        Self { db, objects }
    }

    /// Open the configured database, migrate it and store screenshots on disk.
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let db = Database::open(&config.database_path).await?;
        db.run_migrations().await?;
        let objects = FsObjectStore::new(&config.objects_dir, config.public_base_url.clone());
        Ok(Self::new(db, Arc::new(objects)))
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn upload_all(
        &self,
        audit_id: &AuditId,
        screenshots: &[Screenshot],
    ) -> Result<(Vec<StoredScreenshot>, Vec<String>)> {
        let mut pending = Vec::with_capacity(screenshots.len());
        for (index, screenshot) in screenshots.iter().enumerate() {
            if screenshot.data.is_empty() {
                tracing::debug!(index, "screenshot has no image data, not uploaded");
                continue;
            }
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(screenshot.data.as_bytes())
                .map_err(|e| DatabaseError::Decode(format!("screenshot {index}: {e}")))?;
            pending.push((screenshot, screenshot_key(audit_id, index, screenshot), bytes));
        }

        let results = join_all(pending.iter().map(|(screenshot, key, bytes)| async move {
            self.objects
                .put(key, bytes, SCREENSHOT_CONTENT_TYPE)
                .await
                .map(|url| StoredScreenshot {
                    path: screenshot.path.clone(),
                    is_mobile: screenshot.is_mobile,
                    url,
                })
        }))
        .await;

        let mut stored = Vec::with_capacity(results.len());
        let mut keys = Vec::with_capacity(results.len());
        let mut failure = None;
        for (result, (_, key, _)) in results.into_iter().zip(&pending) {
            match result {
                Ok(screenshot) => {
                    stored.push(screenshot);
                    keys.push(key.clone());
                }
                Err(e) => {
                    tracing::error!("Screenshot upload failed for {}: {}", key, e);
                    failure.get_or_insert(e);
                }
            }
        }

        if let Some(e) = failure {
            self.remove_objects(&keys).await;
            return Err(e);
        }
        Ok((stored, keys))
    }

    async fn remove_objects(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.objects.remove(key).await {
                tracing::warn!("Failed to remove orphaned object {}: {}", key, e);
            }
        }
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn finalize(&self, request: FinalizeRequest) -> Result<FinalizedAudit> {
        let JsonValue::Object(mut report) = request.report else {
            return Err(DatabaseError::InvalidInput(
                "report must be a JSON object".to_string(),
            ));
        };

        let audit_id = AuditId::generate();
        let (stored, keys) = self.upload_all(&audit_id, &request.screenshots).await?;

        let screenshot_url = stored
            .iter()
            .find(|s| !s.is_mobile)
            .map(|s| s.url.clone());

        let screenshots = match serde_json::to_value(&stored) {
            Ok(value) => value,
            Err(e) => {
                self.remove_objects(&keys).await;
                return Err(e.into());
            }
        };
        report.insert("screenshots".to_string(), screenshots);

        let record = AuditRecord {
            id: audit_id.as_str().to_string(),
            url: request.url,
            report_data: JsonValue::Object(report),
            screenshot_url: screenshot_url.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = audits::insert_audit(self.db.pool(), &record).await {
            tracing::error!("Audit insert failed for {}: {}", record.id, e);
            self.remove_objects(&keys).await;
            return Err(e);
        }

        tracing::info!(
            audit_id = %record.id,
            screenshots = stored.len(),
            "Audit finalized"
        );

        Ok(FinalizedAudit {
            audit_id,
            screenshot_url,
            report: record.report_data,
        })
    }

    async fn fetch(&self, audit_id: &str) -> Result<Option<AuditRecord>> {
        audits::get_audit(self.db.pool(), audit_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Accepts `fail_after` uploads, then rejects the rest.
    struct FlakyStore {
        inner: FsObjectStore,
        fail_after: usize,
        puts: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String> {
            let n = self.puts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n >= self.fail_after {
                return Err(DatabaseError::ObjectStore {
                    key: key.to_string(),
                    message: "bucket unavailable".to_string(),
                });
            }
            self.inner.put(key, bytes, content_type).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    async fn memory_db() -> Database {
        let db = Database::open(":memory:").await.expect("open database");
        db.run_migrations().await.expect("migrate");
        db
    }

    fn shot(path: &str, is_mobile: bool) -> Screenshot {
        Screenshot {
            path: path.to_string(),
            data: "/9j/4A==".to_string(),
            is_mobile,
        }
    }

    fn request() -> FinalizeRequest {
        FinalizeRequest {
            url: "https://example.com".to_string(),
            report: json!({"UX Audit expert": {"Score": 8}}),
            screenshots: vec![shot("/", false), shot("/", true), shot("/pricing", false)],
        }
    }

    fn files_under(dir: &std::path::Path) -> usize {
        fn walk(dir: &std::path::Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .flatten()
                        .map(|e| {
                            let path = e.path();
                            if path.is_dir() {
                                walk(&path)
                            } else {
                                1
                            }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        walk(dir)
    }

    #[tokio::test]
    async fn test_finalize_uploads_and_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteAuditStore::new(
            memory_db().await,
            Arc::new(FsObjectStore::new(dir.path(), "http://cdn")),
        );

        let finalized = store.finalize(request()).await.expect("finalize");
        let id = finalized.audit_id.as_str();

        assert_eq!(
            finalized.screenshot_url.as_deref(),
            Some(format!("http://cdn/public/{id}/0-desktop.jpeg").as_str())
        );
        assert!(dir.path().join(format!("public/{id}/1-mobile.jpeg")).exists());
        assert!(dir.path().join(format!("public/{id}/2-desktop.jpeg")).exists());

        let record = store.fetch(id).await.expect("fetch").expect("record");
        assert_eq!(record.url, "https://example.com");
        assert_eq!(record.report_data["UX Audit expert"]["Score"], 8);
        let screenshots = record.report_data["screenshots"]
            .as_array()
            .expect("screenshots array");
        assert_eq!(screenshots.len(), 3);
        assert_eq!(screenshots[1]["isMobile"], true);
        assert!(screenshots[0].get("data").is_none());
    }

    #[tokio::test]
    async fn test_mobile_only_has_no_primary_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteAuditStore::new(
            memory_db().await,
            Arc::new(FsObjectStore::new(dir.path(), "http://cdn")),
        );

        let mut request = request();
        request.screenshots = vec![shot("/", true)];
        let finalized = store.finalize(request).await.expect("finalize");

        assert_eq!(finalized.screenshot_url, None);
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = memory_db().await;
        let store = SqliteAuditStore::new(
            db.clone(),
            Arc::new(FlakyStore {
                inner: FsObjectStore::new(dir.path(), "http://cdn"),
                fail_after: 2,
                puts: std::sync::atomic::AtomicUsize::new(0),
            }),
        );

        let err = store.finalize(request()).await.expect_err("upload fails");

        assert!(matches!(err, DatabaseError::ObjectStore { .. }));
        assert_eq!(files_under(dir.path()), 0);
        assert_eq!(audits::count_audits(db.pool()).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn test_failed_insert_removes_uploads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = memory_db().await;
        let store = SqliteAuditStore::new(
            db.clone(),
            Arc::new(FsObjectStore::new(dir.path(), "http://cdn")),
        );
        db.close().await;

        let err = store.finalize(request()).await.expect_err("insert fails");

        assert!(matches!(err, DatabaseError::Sqlx(_)));
        assert_eq!(files_under(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_invalid_base64_rejected_before_upload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteAuditStore::new(
            memory_db().await,
            Arc::new(FsObjectStore::new(dir.path(), "http://cdn")),
        );

        let mut request = request();
        request.screenshots[1].data = "not base64!".to_string();
        let err = store.finalize(request).await.expect_err("decode fails");

        assert!(matches!(err, DatabaseError::Decode(_)));
        assert_eq!(files_under(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_non_object_report_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteAuditStore::new(
            memory_db().await,
            Arc::new(FsObjectStore::new(dir.path(), "http://cdn")),
        );

        let mut request = request();
        request.report = json!([1, 2, 3]);
        assert!(matches!(
            store.finalize(request).await,
            Err(DatabaseError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_from_config_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StorageConfig {
            database_path: dir.path().join("vantage.db"),
            objects_dir: dir.path().join("objects"),
            public_base_url: "http://localhost:3000/screenshots".to_string(),
        };

        let store = SqliteAuditStore::from_config(&config).await.expect("store");
        let finalized = store.finalize(request()).await.expect("finalize");

        assert!(store
            .fetch(finalized.audit_id.as_str())
            .await
            .expect("fetch")
            .is_some());
        assert_eq!(files_under(&config.objects_dir), 3);
    }
}
