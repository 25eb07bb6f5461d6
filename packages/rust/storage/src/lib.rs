//! libSQL storage layer (local file mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding harvested track
//! links and the outcome of every publish run.
//!
//! **Access rules:**
//! - `harvest` / `publish` / `run`: read-write via [`Storage::open`]
//! - `stats`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chatlist_shared::{BatchStatus, ChatlistError, Result, StoredLink};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ChatlistError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ChatlistError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ChatlistError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Track links
    // -----------------------------------------------------------------------

    /// Insert a harvested link unless its message is already stored.
    ///
    /// Returns `true` when a new row was written, `false` when the
    /// `message_id` already existed and the insert was ignored.
    pub async fn insert_link(&self, link: &StoredLink) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "INSERT INTO track_links (message_id, link, posted_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id) DO NOTHING",
                params![
                    link.message_id,
                    link.link.as_str(),
                    link.posted_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Number of stored links.
    pub async fn count_links(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM track_links", params![])
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| ChatlistError::Storage(e.to_string()))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(ChatlistError::Storage(e.to_string())),
        }
    }

    /// Every stored link URL, in no particular order.
    pub async fn link_urls(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query("SELECT link FROM track_links", params![])
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?
        {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| ChatlistError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    /// Full rows, newest message first.
    pub async fn list_links(&self, limit: u32) -> Result<Vec<StoredLink>> {
        let mut rows = self
            .conn
            .query(
                "SELECT message_id, link, posted_at FROM track_links
                 ORDER BY posted_at DESC, message_id DESC
                 LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?
        {
            results.push(StoredLink {
                message_id: row
                    .get::<i64>(0)
                    .map_err(|e| ChatlistError::Storage(e.to_string()))?,
                link: row
                    .get::<String>(1)
                    .map_err(|e| ChatlistError::Storage(e.to_string()))?,
                posted_at: parse_timestamp(
                    &row.get::<String>(2)
                        .map_err(|e| ChatlistError::Storage(e.to_string()))?,
                )?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Publish runs
    // -----------------------------------------------------------------------

    /// Record a new publish run for a freshly created playlist. Returns the run ID.
    pub async fn insert_publish_run(&self, playlist_id: &str, playlist_name: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO publish_runs (id, playlist_id, playlist_name, started_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), playlist_id, playlist_name, now.as_str()],
            )
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Close a publish run with its summary stats.
    pub async fn finish_publish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE publish_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Publish runs, most recent first.
    pub async fn list_publish_runs(&self) -> Result<Vec<PublishRunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, playlist_id, playlist_name, started_at, finished_at, stats_json
                 FROM publish_runs ORDER BY id DESC",
                params![],
            )
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?
        {
            results.push(PublishRunRecord {
                id: row
                    .get::<String>(0)
                    .map_err(|e| ChatlistError::Storage(e.to_string()))?,
                playlist_id: row
                    .get::<String>(1)
                    .map_err(|e| ChatlistError::Storage(e.to_string()))?,
                playlist_name: row
                    .get::<String>(2)
                    .map_err(|e| ChatlistError::Storage(e.to_string()))?,
                started_at: row
                    .get::<String>(3)
                    .map_err(|e| ChatlistError::Storage(e.to_string()))?,
                finished_at: row.get::<String>(4).ok(),
                stats_json: row.get::<String>(5).ok(),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Publish batches
    // -----------------------------------------------------------------------

    /// Persist the outcome of one append batch.
    pub async fn record_batch(&self, batch: &PublishBatchRecord) -> Result<()> {
        self.check_writable()?;
        let track_ids = serde_json::to_string(&batch.track_ids)
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO publish_batches
                   (run_id, batch_index, first_track, last_track, track_count,
                    status, attempts, last_error, track_ids, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    batch.run_id.as_str(),
                    batch.batch_index,
                    batch.first_track,
                    batch.last_track,
                    batch.track_count,
                    batch.status.as_str(),
                    batch.attempts,
                    batch.last_error.as_deref(),
                    track_ids,
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All batches of a run, in batch order.
    pub async fn list_batches(&self, run_id: &str) -> Result<Vec<PublishBatchRecord>> {
        self.query_batches(
            "SELECT run_id, batch_index, first_track, last_track, track_count,
                    status, attempts, last_error, track_ids
             FROM publish_batches WHERE run_id = ?1 ORDER BY batch_index",
            params![run_id],
        )
        .await
    }

    /// Every abandoned batch across all runs, oldest run first.
    pub async fn list_failed_batches(&self) -> Result<Vec<PublishBatchRecord>> {
        self.query_batches(
            "SELECT run_id, batch_index, first_track, last_track, track_count,
                    status, attempts, last_error, track_ids
             FROM publish_batches WHERE status = 'failed'
             ORDER BY run_id, batch_index",
            params![],
        )
        .await
    }

    async fn query_batches(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<PublishBatchRecord>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ChatlistError::Storage(e.to_string()))?
        {
            results.push(row_to_batch(&row)?);
        }
        Ok(results)
    }
}

/// A row of `publish_runs`.
#[derive(Debug, Clone)]
pub struct PublishRunRecord {
    pub id: String,
    pub playlist_id: String,
    pub playlist_name: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

/// A row of `publish_batches`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishBatchRecord {
    /// Owning publish run.
    pub run_id: String,
    /// Zero-based batch number within the run.
    pub batch_index: u32,
    /// 1-based position of the first track of the batch.
    pub first_track: u32,
    /// 1-based position of the last track of the batch (inclusive).
    pub last_track: u32,
    pub track_count: u32,
    pub status: BatchStatus,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Error from the final failed attempt.
    pub last_error: Option<String>,
    /// Bare track ids of the batch, so failed batches can be replayed.
    pub track_ids: Vec<String>,
}

/// Convert a database row to a [`PublishBatchRecord`].
fn row_to_batch(row: &libsql::Row) -> Result<PublishBatchRecord> {
    let status: String = row
        .get(5)
        .map_err(|e| ChatlistError::Storage(e.to_string()))?;
    let track_ids: String = row
        .get(8)
        .map_err(|e| ChatlistError::Storage(e.to_string()))?;

    Ok(PublishBatchRecord {
        run_id: row
            .get::<String>(0)
            .map_err(|e| ChatlistError::Storage(e.to_string()))?,
        batch_index: row
            .get::<u32>(1)
            .map_err(|e| ChatlistError::Storage(e.to_string()))?,
        first_track: row
            .get::<u32>(2)
            .map_err(|e| ChatlistError::Storage(e.to_string()))?,
        last_track: row
            .get::<u32>(3)
            .map_err(|e| ChatlistError::Storage(e.to_string()))?,
        track_count: row
            .get::<u32>(4)
            .map_err(|e| ChatlistError::Storage(e.to_string()))?,
        status: status
            .parse::<BatchStatus>()
            .map_err(ChatlistError::Storage)?,
        attempts: row
            .get::<u32>(6)
            .map_err(|e| ChatlistError::Storage(e.to_string()))?,
        last_error: row.get::<String>(7).ok(),
        track_ids: serde_json::from_str(&track_ids)
            .map_err(|e| ChatlistError::Storage(format!("invalid track_ids: {e}")))?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ChatlistError::Storage(format!("invalid date: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("chatlist_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn link(message_id: i64, url: &str) -> StoredLink {
        StoredLink {
            message_id,
            link: url.into(),
            posted_at: DateTime::from_timestamp(1_700_000_000 + message_id, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("chatlist_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn insert_link_ignores_known_message() {
        let storage = test_storage().await;

        let first = link(10, "https://open.spotify.com/track/aaaaaaaaaaaaaaaaaaaaaa");
        assert!(storage.insert_link(&first).await.expect("insert"));

        // Same message id, different link: the original row stays
        let second = link(10, "https://open.spotify.com/track/bbbbbbbbbbbbbbbbbbbbbb");
        assert!(!storage.insert_link(&second).await.expect("insert again"));

        assert_eq!(storage.count_links().await.unwrap(), 1);
        let rows = storage.list_links(10).await.unwrap();
        assert_eq!(rows, vec![first]);
    }

    #[tokio::test]
    async fn link_urls_returns_every_row() {
        let storage = test_storage().await;
        for id in 1..=3 {
            storage
                .insert_link(&link(id, &format!("https://open.spotify.com/track/{id}")))
                .await
                .unwrap();
        }

        let mut urls = storage.link_urls().await.expect("read links");
        urls.sort();
        assert_eq!(urls.len(), 3);
        assert_eq!(urls[0], "https://open.spotify.com/track/1");

        let newest = storage.list_links(1).await.unwrap();
        assert_eq!(newest[0].message_id, 3);
    }

    #[tokio::test]
    async fn unreadable_link_row_fails_the_read() {
        let storage = test_storage().await;
        storage
            .insert_link(&link(1, "https://open.spotify.com/track/ok"))
            .await
            .unwrap();
        // A blob in the TEXT column cannot be read back as a string
        storage
            .conn
            .execute(
                "INSERT INTO track_links (message_id, link, posted_at) VALUES (2, X'00FF', '2023-11-14T22:13:20+00:00')",
                params![],
            )
            .await
            .unwrap();

        let result = storage.link_urls().await;
        assert!(matches!(result, Err(ChatlistError::Storage(_))));
    }

    #[tokio::test]
    async fn empty_table_counts_zero() {
        let storage = test_storage().await;
        assert_eq!(storage.count_links().await.unwrap(), 0);
        assert!(storage.link_urls().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_run_and_batches() {
        let storage = test_storage().await;
        let run_id = storage
            .insert_publish_run("pl123", "Wiggly O2 Legacy")
            .await
            .expect("insert run");

        let added = PublishBatchRecord {
            run_id: run_id.clone(),
            batch_index: 0,
            first_track: 1,
            last_track: 2,
            track_count: 2,
            status: BatchStatus::Added,
            attempts: 1,
            last_error: None,
            track_ids: vec!["a".into(), "b".into()],
        };
        let failed = PublishBatchRecord {
            batch_index: 1,
            first_track: 3,
            last_track: 3,
            track_count: 1,
            status: BatchStatus::Failed,
            attempts: 3,
            last_error: Some("api error (HTTP 502): bad gateway".into()),
            track_ids: vec!["c".into()],
            ..added.clone()
        };
        storage.record_batch(&added).await.expect("record added");
        storage.record_batch(&failed).await.expect("record failed");
        storage
            .finish_publish_run(&run_id, r#"{"tracks_added": 2}"#)
            .await
            .expect("finish run");

        let batches = storage.list_batches(&run_id).await.unwrap();
        assert_eq!(batches, vec![added, failed.clone()]);

        let failures = storage.list_failed_batches().await.unwrap();
        assert_eq!(failures, vec![failed]);

        let runs = storage.list_publish_runs().await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].playlist_id, "pl123");
        assert!(runs[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("chatlist_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_link(&link(1, "https://open.spotify.com/track/x"))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.count_links().await.unwrap(), 1);
        let result = ro.insert_link(&link(2, "https://open.spotify.com/track/y")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
