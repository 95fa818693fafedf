//! Durable replay queue, independent from the record store.
//!
//! A FIFO multiset keyed by its own operation id: an add and a remove for
//! the same title coexist and replay in enqueue order, preserving the
//! user's intent ordering. The record store can drop a record while its
//! operations are still queued - the queue is what survives a removal.

use crate::db::Pool;
use crate::error::Result;
use reel_engine::{OperationKind, SyncOperation, VectorClock};
use sqlx::{Row, Sqlite};

/// A stored queue row from the database.
#[derive(Debug)]
struct StoredOperation {
    op_id: String,
    kind: String,
    vector_clock: String,
    device_id: String,
    timestamp: i64,
    retry_count: i64,
    last_error: Option<String>,
    next_retry_at: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for StoredOperation {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredOperation {
            op_id: row.try_get("op_id")?,
            kind: row.try_get("kind")?,
            vector_clock: row.try_get("vector_clock")?,
            device_id: row.try_get("device_id")?,
            timestamp: row.try_get("timestamp")?,
            retry_count: row.try_get("retry_count")?,
            last_error: row.try_get("last_error")?,
            next_retry_at: row.try_get("next_retry_at")?,
        })
    }
}

impl StoredOperation {
    /// Decode a database row back into an operation. The kind column is a
    /// tagged union and is decoded explicitly, never passed through raw.
    fn to_operation(&self) -> Result<SyncOperation> {
        let kind: OperationKind = serde_json::from_str(&self.kind)?;
        let clock: VectorClock = serde_json::from_str(&self.vector_clock)?;

        Ok(SyncOperation {
            id: self.op_id.clone(),
            kind,
            vector_clock: clock,
            device_id: self.device_id.clone(),
            timestamp: self.timestamp as u64,
            retry_count: self.retry_count as u32,
            last_error: self.last_error.clone(),
            next_retry_at: self.next_retry_at.map(|t| t as u64),
        })
    }
}

/// Durable, ordered store of pending remote-replay intents.
#[derive(Debug, Clone)]
pub struct OperationQueue {
    pool: Pool,
}

impl OperationQueue {
    /// Create a queue over an opened pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Append an operation. The retry budget always starts at zero,
    /// whatever the caller put in the value.
    pub async fn enqueue(&self, op: &SyncOperation) -> Result<()> {
        let kind = serde_json::to_string(&op.kind)?;
        let clock = serde_json::to_string(&op.vector_clock)?;

        sqlx::query(
            r#"
            INSERT INTO sync_queue (
                op_id, kind, vector_clock, device_id, timestamp,
                retry_count, last_error, next_retry_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, NULL)
            "#,
        )
        .bind(&op.id)
        .bind(&kind)
        .bind(&clock)
        .bind(&op.device_id)
        .bind(op.timestamp as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All pending operations in enqueue order.
    pub async fn dequeue_all(&self) -> Result<Vec<SyncOperation>> {
        let rows = sqlx::query_as::<Sqlite, StoredOperation>(
            r#"
            SELECT op_id, kind, vector_clock, device_id, timestamp,
                   retry_count, last_error, next_retry_at
            FROM sync_queue
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(StoredOperation::to_operation).collect()
    }

    /// Delete an operation (successful replay or dead-letter drop).
    pub async fn remove(&self, op_id: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM sync_queue WHERE op_id = ?1"#)
            .bind(op_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Rewrite an operation's retry metadata in place. The payload and
    /// clock snapshot are immutable once enqueued.
    pub async fn update(&self, op: &SyncOperation) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_queue
            SET retry_count = ?2, last_error = ?3, next_retry_at = ?4
            WHERE op_id = ?1
            "#,
        )
        .bind(&op.id)
        .bind(op.retry_count as i64)
        .bind(&op.last_error)
        .bind(op.next_retry_at.map(|t| t as i64))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of pending operations.
    pub async fn len(&self) -> Result<u64> {
        let row = sqlx::query(r#"SELECT COUNT(*) AS n FROM sync_queue"#)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u64)
    }

    /// True when nothing is pending.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use reel_engine::WatchlistItem;

    fn op(id: &str, item_id: &str) -> SyncOperation {
        let item = WatchlistItem::new(
            item_id,
            "user-1",
            "Dune",
            "https://img/dune.jpg",
            2021,
            1000,
            VectorClock::new().increment("device-a"),
            "device-a",
        );
        SyncOperation::new(
            id,
            OperationKind::Add { item },
            VectorClock::new().increment("device-a"),
            "device-a",
            1000,
        )
    }

    #[tokio::test]
    async fn enqueue_preserves_fifo_order() {
        let queue = OperationQueue::new(test_pool().await);
        queue.enqueue(&op("op-1", "42")).await.unwrap();
        queue.enqueue(&op("op-2", "42")).await.unwrap();
        queue.enqueue(&op("op-3", "7")).await.unwrap();

        let pending = queue.dequeue_all().await.unwrap();
        let ids: Vec<_> = pending.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["op-1", "op-2", "op-3"]);
    }

    #[tokio::test]
    async fn same_key_operations_coexist() {
        let queue = OperationQueue::new(test_pool().await);
        queue.enqueue(&op("op-1", "42")).await.unwrap();

        let remove = SyncOperation::new(
            "op-2",
            OperationKind::Remove {
                user_id: "user-1".into(),
                item_id: "42".into(),
            },
            VectorClock::new().increment("device-a").increment("device-a"),
            "device-a",
            2000,
        );
        queue.enqueue(&remove).await.unwrap();

        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn enqueue_resets_retry_fields() {
        let queue = OperationQueue::new(test_pool().await);
        let mut poisoned = op("op-1", "42");
        poisoned.record_failure("previous life", 9999);

        queue.enqueue(&poisoned).await.unwrap();

        let pending = queue.dequeue_all().await.unwrap();
        assert_eq!(pending[0].retry_count, 0);
        assert_eq!(pending[0].last_error, None);
        assert_eq!(pending[0].next_retry_at, None);
    }

    #[tokio::test]
    async fn update_rewrites_retry_metadata_in_place() {
        let queue = OperationQueue::new(test_pool().await);
        queue.enqueue(&op("op-1", "42")).await.unwrap();

        let mut stored = queue.dequeue_all().await.unwrap().remove(0);
        stored.record_failure("503 from remote", 10_000);
        queue.update(&stored).await.unwrap();

        let reread = queue.dequeue_all().await.unwrap().remove(0);
        assert_eq!(reread.retry_count, 1);
        assert_eq!(reread.last_error.as_deref(), Some("503 from remote"));
        assert_eq!(reread.next_retry_at, Some(12_000));
        // Payload and clock snapshot survive untouched.
        assert_eq!(reread.kind, stored.kind);
        assert_eq!(reread.vector_clock, stored.vector_clock);
    }

    #[tokio::test]
    async fn remove_deletes_by_id() {
        let queue = OperationQueue::new(test_pool().await);
        queue.enqueue(&op("op-1", "42")).await.unwrap();
        queue.enqueue(&op("op-2", "43")).await.unwrap();

        queue.remove("op-1").await.unwrap();

        let pending = queue.dequeue_all().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "op-2");
    }

    #[tokio::test]
    async fn roundtrip_preserves_tagged_kind() {
        let queue = OperationQueue::new(test_pool().await);
        queue.enqueue(&op("op-1", "42")).await.unwrap();

        let pending = queue.dequeue_all().await.unwrap();
        match &pending[0].kind {
            OperationKind::Add { item } => assert_eq!(item.item_id, "42"),
            other => panic!("expected ADD, got {other:?}"),
        }
    }
}
