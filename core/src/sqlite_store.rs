/// SQLite-backed implementation of the content, job queue and index queue
/// stores.
///
/// Content items are kept as JSON documents next to an explicit version
/// column, which is what optimistic concurrency checks against.
use crate::content::{ContainerRef, ContentItem};
use crate::errors::{StoreError, StoreResult};
use crate::index_queue::{EntityType, IndexQueueEntry};
use crate::job_queue::{JobQueueEntry, JobStatus};
use crate::traits::{ContentStore, IndexQueueStore, JobQueueStore};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// SQLite store for content items and both queues.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`.
    pub async fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> StoreResult<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let connect_options = SqliteConnectOptions::from_str(db_path.to_string_lossy().as_ref())
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to parse database path: {}", e))
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size.max(1))
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to create database pool: {}", e))
            })?;

        Ok(Self { pool })
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> StoreResult<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;

        // A second connection would open a second, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to open in-memory database: {}", e))
            })?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    pub async fn initialize(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_items (
                id TEXT PRIMARY KEY NOT NULL,
                kind TEXT NOT NULL,
                container TEXT NOT NULL,
                current_state TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL,
                created_at INTEGER,
                updated_at INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::DatabaseError(format!("Failed to create content_items table: {}", e))
        })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_state ON content_items(current_state, container)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to create index: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_queue (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                target_type TEXT NOT NULL,
                target_id TEXT NOT NULL,
                action_id TEXT NOT NULL,
                parameters TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL,
                execution_time INTEGER NOT NULL,
                added INTEGER NOT NULL,
                started INTEGER,
                finished INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::DatabaseError(format!("Failed to create job_queue table: {}", e))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_queue (
                id TEXT PRIMARY KEY NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                operation TEXT NOT NULL,
                added INTEGER NOT NULL,
                UNIQUE(entity_type, entity_id, operation)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::DatabaseError(format!("Failed to create index_queue table: {}", e))
        })?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn create(&self, item: &ContentItem) -> StoreResult<ContentItem> {
        let mut stored = item.clone();
        let id = Uuid::new_v4();
        stored.id = Some(id);
        stored.version = 0;

        sqlx::query(
            r#"
            INSERT INTO content_items
            (id, kind, container, current_state, version, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(stored.kind_name())
        .bind(stored.container().to_string())
        .bind(&stored.current_state)
        .bind(stored.version)
        .bind(to_json(&stored)?)
        .bind(stored.created.map(|t| t.timestamp_millis()))
        .bind(stored.updated.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to create content item: {}", e)))?;

        Ok(stored)
    }

    async fn update(&self, item: &ContentItem) -> StoreResult<ContentItem> {
        let id = item
            .id
            .ok_or_else(|| StoreError::NotFound("content item has no id".to_string()))?;

        let mut stored = item.clone();
        stored.version = item.version + 1;

        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET container = ?, current_state = ?, version = ?, data = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(stored.container().to_string())
        .bind(&stored.current_state)
        .bind(stored.version)
        .bind(to_json(&stored)?)
        .bind(stored.updated.map(|t| t.timestamp_millis()))
        .bind(id.to_string())
        .bind(item.version)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to update content item: {}", e)))?;

        if result.rows_affected() == 0 {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT version FROM content_items WHERE id = ?")
                    .bind(id.to_string())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| {
                        StoreError::DatabaseError(format!("Failed to read version: {}", e))
                    })?;
            return Err(match found {
                Some(found) => StoreError::VersionConflict {
                    id: id.to_string(),
                    expected: item.version,
                    found,
                },
                None => StoreError::NotFound(format!("content item {}", id)),
            });
        }

        Ok(stored)
    }

    async fn delete(&self, id: &Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM content_items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to delete content item: {}", e))
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("content item {}", id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &Uuid) -> StoreResult<ContentItem> {
        let row = sqlx::query("SELECT id, version, data FROM content_items WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to load content item: {}", e)))?
            .ok_or_else(|| StoreError::NotFound(format!("content item {}", id)))?;

        content_from_row(&row)
    }

    async fn find_by_state(
        &self,
        container: Option<&ContainerRef>,
        state: &str,
    ) -> StoreResult<Vec<ContentItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, version, data FROM content_items
            WHERE current_state = ? AND (? IS NULL OR container = ?)
            ORDER BY created_at
            "#,
        )
        .bind(state)
        .bind(container.map(|c| c.to_string()))
        .bind(container.map(|c| c.to_string()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to query content items: {}", e)))?;

        rows.iter().map(content_from_row).collect()
    }
}

#[async_trait]
impl JobQueueStore for SqliteStore {
    async fn insert(&self, entry: &JobQueueEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO job_queue
            (id, name, target_type, target_id, action_id, parameters, status,
             execution_time, added, started, finished)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.name)
        .bind(&entry.target_type)
        .bind(entry.target_id.to_string())
        .bind(&entry.action_id)
        .bind(to_json(&entry.parameters)?)
        .bind(entry.status.as_str())
        .bind(entry.execution_time.timestamp_millis())
        .bind(entry.added.timestamp_millis())
        .bind(entry.started.map(|t| t.timestamp_millis()))
        .bind(entry.finished.map(|t| t.timestamp_millis()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to insert job: {}", e)))?;

        Ok(())
    }

    async fn list_by_execution_time(&self) -> StoreResult<Vec<JobQueueEntry>> {
        let rows = sqlx::query("SELECT * FROM job_queue ORDER BY execution_time, added")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to list jobs: {}", e)))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn find_by_id(&self, id: &Uuid) -> StoreResult<JobQueueEntry> {
        let row = sqlx::query("SELECT * FROM job_queue WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to load job: {}", e)))?
            .ok_or_else(|| StoreError::NotFound(format!("job {}", id)))?;

        job_from_row(&row)
    }

    async fn update(&self, entry: &JobQueueEntry) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE job_queue
            SET name = ?, parameters = ?, status = ?, execution_time = ?, started = ?, finished = ?
            WHERE id = ?
            "#,
        )
        .bind(&entry.name)
        .bind(to_json(&entry.parameters)?)
        .bind(entry.status.as_str())
        .bind(entry.execution_time.timestamp_millis())
        .bind(entry.started.map(|t| t.timestamp_millis()))
        .bind(entry.finished.map(|t| t.timestamp_millis()))
        .bind(entry.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to update job: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("job {}", entry.id)));
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        id: &Uuid,
        from: &[JobStatus],
        to: JobStatus,
        started: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }

        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE job_queue SET status = ?, started = COALESCE(?, started) \
             WHERE id = ? AND status IN ({})",
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(started.map(|t| t.timestamp_millis()))
            .bind(id.to_string());
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to transition job: {}", e)))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: &Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM job_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to delete job: {}", e)))?;
        Ok(())
    }

    async fn delete_completed(&self) -> StoreResult<usize> {
        let result = sqlx::query("DELETE FROM job_queue WHERE status = ?")
            .bind(JobStatus::Completed.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to delete completed jobs: {}", e))
            })?;
        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl IndexQueueStore for SqliteStore {
    async fn insert_if_absent(&self, entry: IndexQueueEntry) -> StoreResult<IndexQueueEntry> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            StoreError::DatabaseError(format!("Failed to begin transaction: {}", e))
        })?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO index_queue (id, entity_type, entity_id, operation, added)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id.to_string())
        .bind(entry.operation.as_str())
        .bind(entry.added.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to queue index entry: {}", e)))?;

        // A new entry makes the opposite pending operation obsolete
        if result.rows_affected() > 0 {
            sqlx::query(
                r#"
                DELETE FROM index_queue
                WHERE entity_type = ? AND entity_id = ? AND operation != ?
                "#,
            )
            .bind(entry.entity_type.as_str())
            .bind(entry.entity_id.to_string())
            .bind(entry.operation.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to drop superseded index entry: {}", e))
            })?;
        }

        let row = sqlx::query(
            r#"
            SELECT id, entity_type, entity_id, operation, added FROM index_queue
            WHERE entity_type = ? AND entity_id = ? AND operation = ?
            "#,
        )
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id.to_string())
        .bind(entry.operation.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to load index entry: {}", e)))?;

        tx.commit().await.map_err(|e| {
            StoreError::DatabaseError(format!("Failed to commit index entry: {}", e))
        })?;

        index_entry_from_row(&row)
    }

    async fn list(&self) -> StoreResult<Vec<IndexQueueEntry>> {
        let rows = sqlx::query(
            "SELECT id, entity_type, entity_id, operation, added FROM index_queue ORDER BY added DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to list index queue: {}", e)))?;

        rows.iter().map(index_entry_from_row).collect()
    }

    async fn remove(&self, id: &Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM index_queue WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to remove index entry: {}", e))
            })?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Row conversion
// ============================================================================

fn to_json<T: serde::Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::SerializationError(format!("column {}: {}", name, e)))
}

fn parse_uuid(value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| StoreError::SerializationError(format!("invalid id {}: {}", value, e)))
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::SerializationError(format!("invalid timestamp {}", ms)))
}

fn content_from_row(row: &SqliteRow) -> StoreResult<ContentItem> {
    let data: String = column(row, "data")?;
    let mut item: ContentItem = serde_json::from_str(&data)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;
    let id: String = column(row, "id")?;
    item.id = Some(parse_uuid(&id)?);
    item.version = column(row, "version")?;
    Ok(item)
}

fn job_from_row(row: &SqliteRow) -> StoreResult<JobQueueEntry> {
    let id: String = column(row, "id")?;
    let target_id: String = column(row, "target_id")?;
    let parameters: String = column(row, "parameters")?;
    let status: String = column(row, "status")?;
    let started: Option<i64> = column(row, "started")?;
    let finished: Option<i64> = column(row, "finished")?;

    Ok(JobQueueEntry {
        id: parse_uuid(&id)?,
        name: column(row, "name")?,
        target_type: column(row, "target_type")?,
        target_id: parse_uuid(&target_id)?,
        action_id: column(row, "action_id")?,
        parameters: serde_json::from_str(&parameters)
            .map_err(|e| StoreError::SerializationError(e.to_string()))?,
        status: JobStatus::from_str(&status).map_err(StoreError::SerializationError)?,
        execution_time: from_millis(column(row, "execution_time")?)?,
        added: from_millis(column(row, "added")?)?,
        started: started.map(from_millis).transpose()?,
        finished: finished.map(from_millis).transpose()?,
    })
}

fn index_entry_from_row(row: &SqliteRow) -> StoreResult<IndexQueueEntry> {
    let id: String = column(row, "id")?;
    let entity_type: String = column(row, "entity_type")?;
    let entity_id: String = column(row, "entity_id")?;
    let operation: String = column(row, "operation")?;

    Ok(IndexQueueEntry {
        id: parse_uuid(&id)?,
        entity_type: EntityType::from_str(&entity_type).map_err(StoreError::SerializationError)?,
        entity_id: parse_uuid(&entity_id)?,
        operation: operation.parse().map_err(StoreError::SerializationError)?,
        added: from_millis(column(row, "added")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_queue::IndexOperation;

    async fn create_test_store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.initialize().await.unwrap();
        store
    }

    fn job(status: JobStatus) -> JobQueueEntry {
        let now = Utc.timestamp_millis_opt(Utc::now().timestamp_millis()).unwrap();
        JobQueueEntry {
            id: Uuid::new_v4(),
            name: "publish".to_string(),
            target_type: "article".to_string(),
            target_id: Uuid::new_v4(),
            action_id: "publish".to_string(),
            parameters: [("initiator".to_string(), vec!["ann".to_string()])]
                .into_iter()
                .collect(),
            status,
            execution_time: now,
            added: now,
            started: None,
            finished: None,
        }
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = create_test_store().await;
        store.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_content_round_trip_and_version_check() {
        let store = create_test_store().await;
        let mut item = ContentItem::article("daily", "Title", "Body text");
        item.current_state = Some("draft".to_string());
        let created = store.create(&item).await.unwrap();
        let id = created.id.unwrap();

        let loaded = ContentStore::find_by_id(&store, &id).await.unwrap();
        assert_eq!(loaded, created);

        let mut edited = loaded.clone();
        edited.title = "Edited".to_string();
        let updated = ContentStore::update(&store, &edited).await.unwrap();
        assert_eq!(updated.version, 1);

        let err = ContentStore::update(&store, &loaded).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_find_by_state() {
        let store = create_test_store().await;
        let mut a = ContentItem::article("daily", "A", "");
        a.current_state = Some("draft".to_string());
        let mut b = ContentItem::media("photos", "B");
        b.current_state = Some("draft".to_string());
        store.create(&a).await.unwrap();
        store.create(&b).await.unwrap();

        assert_eq!(store.find_by_state(None, "draft").await.unwrap().len(), 2);
        let photos = ContainerRef::Catalogue("photos".to_string());
        let found = store.find_by_state(Some(&photos), "draft").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "B");
        assert!(store.find_by_state(None, "review").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = create_test_store().await;
        let mut item = ContentItem::article("daily", "A", "");
        item.id = Some(Uuid::new_v4());
        assert!(matches!(
            ContentStore::update(&store, &item).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_job_round_trip() {
        let store = create_test_store().await;
        let entry = job(JobStatus::Waiting);
        store.insert(&entry).await.unwrap();
        let loaded = JobQueueStore::find_by_id(&store, &entry.id).await.unwrap();
        assert_eq!(loaded, entry);
    }

    #[tokio::test]
    async fn test_transition_status_cas() {
        let store = create_test_store().await;
        let entry = job(JobStatus::Failed);
        store.insert(&entry).await.unwrap();

        let started = entry.added;
        assert!(store
            .transition_status(
                &entry.id,
                &[JobStatus::Ready, JobStatus::Failed],
                JobStatus::Execution,
                Some(started)
            )
            .await
            .unwrap());
        assert!(!store
            .transition_status(
                &entry.id,
                &[JobStatus::Ready, JobStatus::Failed],
                JobStatus::Execution,
                Some(started)
            )
            .await
            .unwrap());

        let loaded = JobQueueStore::find_by_id(&store, &entry.id).await.unwrap();
        assert_eq!(loaded.status, JobStatus::Execution);
        assert_eq!(loaded.started, Some(started));
    }

    #[tokio::test]
    async fn test_delete_completed() {
        let store = create_test_store().await;
        store.insert(&job(JobStatus::Completed)).await.unwrap();
        store.insert(&job(JobStatus::Completed)).await.unwrap();
        store.insert(&job(JobStatus::FailedCompleted)).await.unwrap();

        assert_eq!(store.delete_completed().await.unwrap(), 2);
        let remaining = store.list_by_execution_time().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].status, JobStatus::FailedCompleted);
    }

    #[tokio::test]
    async fn test_index_queue_coalesces() {
        let store = create_test_store().await;
        let id = Uuid::new_v4();
        let first = store
            .insert_if_absent(IndexQueueEntry::new(EntityType::Article, id, IndexOperation::Update))
            .await
            .unwrap();
        let second = store
            .insert_if_absent(IndexQueueEntry::new(EntityType::Article, id, IndexOperation::Update))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list().await.unwrap().len(), 1);

        assert!(store.remove(&first.id).await.unwrap());
        assert!(!store.remove(&first.id).await.unwrap());
    }
}
