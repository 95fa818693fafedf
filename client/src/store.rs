//! Durable record store for confirmed watchlist entries.
//!
//! Keyed storage only: `put` fully replaces the prior version of a
//! composite key and `delete` is a hard delete. Version merging happens
//! one layer up, in the session controller, via the engine's resolver.

use crate::db::Pool;
use crate::error::Result;
use reel_engine::{VectorClock, WatchlistItem};
use sqlx::{Row, Sqlite};

/// A stored watchlist row from the database.
#[derive(Debug)]
struct StoredItem {
    user_id: String,
    item_id: String,
    title: String,
    poster_url: String,
    release_year: i64,
    rating: Option<f64>,
    added_at: i64,
    updated_at: i64,
    device_id: String,
    vector_clock: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for StoredItem {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredItem {
            user_id: row.try_get("user_id")?,
            item_id: row.try_get("item_id")?,
            title: row.try_get("title")?,
            poster_url: row.try_get("poster_url")?,
            release_year: row.try_get("release_year")?,
            rating: row.try_get("rating")?,
            added_at: row.try_get("added_at")?,
            updated_at: row.try_get("updated_at")?,
            device_id: row.try_get("device_id")?,
            vector_clock: row.try_get("vector_clock")?,
        })
    }
}

impl StoredItem {
    /// Convert a database row back into an engine record.
    fn to_item(&self) -> Result<WatchlistItem> {
        let clock: VectorClock = serde_json::from_str(&self.vector_clock)?;
        Ok(WatchlistItem {
            item_id: self.item_id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            poster_url: self.poster_url.clone(),
            release_year: self.release_year as u16,
            rating: self.rating.map(|r| r as f32),
            added_at: self.added_at as u64,
            updated_at: self.updated_at as u64,
            vector_clock: clock,
            device_id: self.device_id.clone(),
        })
    }
}

/// Durable, per-user keyed storage for watchlist records.
///
/// Shared by every open view of the same user; nothing here locks. Per-key
/// atomicity comes from single-statement SQLite writes, and the
/// conflict-resolution algebra tolerates concurrent writers.
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: Pool,
}

impl RecordStore {
    /// Create a store over an opened pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// All records for a user, in stable (added_at, item_id) order.
    pub async fn get(&self, user_id: &str) -> Result<Vec<WatchlistItem>> {
        let rows = sqlx::query_as::<Sqlite, StoredItem>(
            r#"
            SELECT user_id, item_id, title, poster_url, release_year,
                   rating, added_at, updated_at, device_id, vector_clock
            FROM watchlist_records
            WHERE user_id = ?1
            ORDER BY added_at ASC, item_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(StoredItem::to_item).collect()
    }

    /// A single record by composite key.
    pub async fn get_one(&self, user_id: &str, item_id: &str) -> Result<Option<WatchlistItem>> {
        let row = sqlx::query_as::<Sqlite, StoredItem>(
            r#"
            SELECT user_id, item_id, title, poster_url, release_year,
                   rating, added_at, updated_at, device_id, vector_clock
            FROM watchlist_records
            WHERE user_id = ?1 AND item_id = ?2
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.to_item()).transpose()
    }

    /// Upsert by composite key, fully replacing the prior version.
    pub async fn put(&self, item: &WatchlistItem) -> Result<()> {
        let clock = serde_json::to_string(&item.vector_clock)?;

        sqlx::query(
            r#"
            INSERT INTO watchlist_records (
                user_id, item_id, title, poster_url, release_year,
                rating, added_at, updated_at, device_id, vector_clock
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (user_id, item_id) DO UPDATE SET
                title = excluded.title,
                poster_url = excluded.poster_url,
                release_year = excluded.release_year,
                rating = excluded.rating,
                added_at = excluded.added_at,
                updated_at = excluded.updated_at,
                device_id = excluded.device_id,
                vector_clock = excluded.vector_clock
            "#,
        )
        .bind(&item.user_id)
        .bind(&item.item_id)
        .bind(&item.title)
        .bind(&item.poster_url)
        .bind(item.release_year as i64)
        .bind(item.rating.map(|r| r as f64))
        .bind(item.added_at as i64)
        .bind(item.updated_at as i64)
        .bind(&item.device_id)
        .bind(&clock)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Hard delete by composite key. Deleting a missing key is a no-op.
    pub async fn delete(&self, user_id: &str, item_id: &str) -> Result<()> {
        sqlx::query(r#"DELETE FROM watchlist_records WHERE user_id = ?1 AND item_id = ?2"#)
            .bind(user_id)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn item(user: &str, id: &str, title: &str) -> WatchlistItem {
        WatchlistItem::new(
            id,
            user,
            title,
            "https://img/poster.jpg",
            2021,
            1000,
            VectorClock::new().increment("device-a"),
            "device-a",
        )
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let store = RecordStore::new(test_pool().await);
        let record = item("user-1", "42", "Dune").with_rating(4.5);

        store.put(&record).await.unwrap();

        let fetched = store.get_one("user-1", "42").await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn put_replaces_whole_version() {
        let store = RecordStore::new(test_pool().await);
        let original = item("user-1", "42", "Dune").with_rating(3.0);
        store.put(&original).await.unwrap();

        let mut replacement = item("user-1", "42", "Dune (Director's Cut)");
        replacement.touch(
            2000,
            original.vector_clock.increment("device-a"),
            "device-a",
        );
        store.put(&replacement).await.unwrap();

        let fetched = store.get_one("user-1", "42").await.unwrap().unwrap();
        assert_eq!(fetched.title, "Dune (Director's Cut)");
        // Full replacement: the old rating does not bleed through.
        assert_eq!(fetched.rating, None);
        assert_eq!(fetched.vector_clock.get("device-a"), 2);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_user() {
        let store = RecordStore::new(test_pool().await);
        store.put(&item("user-1", "42", "Dune")).await.unwrap();
        store.put(&item("user-2", "42", "Dune")).await.unwrap();

        store.delete("user-1", "42").await.unwrap();

        assert!(store.get_one("user-1", "42").await.unwrap().is_none());
        assert!(store.get_one("user-2", "42").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn get_orders_by_added_at() {
        let store = RecordStore::new(test_pool().await);
        let mut late = item("user-1", "1", "Later");
        late.added_at = 5000;
        store.put(&late).await.unwrap();
        store.put(&item("user-1", "2", "Earlier")).await.unwrap();

        let listed = store.get("user-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "Earlier");
        assert_eq!(listed[1].title, "Later");
    }

    #[tokio::test]
    async fn delete_missing_key_is_noop() {
        let store = RecordStore::new(test_pool().await);
        store.delete("user-1", "nope").await.unwrap();
    }
}
