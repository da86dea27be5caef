//! Optional SQLite-backed durable history adapter, behind the
//! `durable-sqlite` feature (§4.6 "durable stream backend").
//!
//! Grounded on the reference gateway's `SqliteChannelStore`: a plain
//! `sqlx::SqlitePool`, one `FromRow` struct per table, `ON CONFLICT` upserts
//! where relevant, and a `#[doc(hidden)] init()` for in-memory test
//! databases (schema is otherwise owned by `sqlx migrate`).

use arqonbus_protocol::Envelope;
use sqlx::{Row, SqlitePool};

use crate::entry::{HistoryEntry, HistoryKey};
use crate::error::{Error, Result};

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `history_entries` table. Retained for tests against
    /// `sqlite::memory:`; production schema is managed by `sqlx migrate`.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS history_entries (
                tenant_id       TEXT    NOT NULL,
                room            TEXT    NOT NULL,
                channel         TEXT    NOT NULL,
                sequence_number INTEGER NOT NULL,
                stored_at       INTEGER NOT NULL,
                envelope_json   TEXT    NOT NULL,
                PRIMARY KEY (tenant_id, room, channel, sequence_number)
            )"#,
        )
        .execute(pool)
        .await
        .map_err(|e| Error::Durable(e.to_string()))?;
        Ok(())
    }

    pub async fn append(&self, key: &HistoryKey, envelope: &Envelope) -> Result<u64> {
        let envelope_json = serde_json::to_string(envelope).map_err(|e| Error::Durable(e.to_string()))?;
        let stored_at = arqonbus_common::time::now_ms() as i64;

        let mut tx = self.pool.begin().await.map_err(|e| Error::Durable(e.to_string()))?;
        let next_seq: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM history_entries
             WHERE tenant_id = ? AND room = ? AND channel = ?",
        )
        .bind(&key.tenant_id)
        .bind(&key.room)
        .bind(&key.channel)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Durable(e.to_string()))?
        .get(0);

        sqlx::query(
            r#"INSERT INTO history_entries
               (tenant_id, room, channel, sequence_number, stored_at, envelope_json)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&key.tenant_id)
        .bind(&key.room)
        .bind(&key.channel)
        .bind(next_seq)
        .bind(stored_at)
        .bind(&envelope_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Durable(e.to_string()))?;

        tx.commit().await.map_err(|e| Error::Durable(e.to_string()))?;
        Ok(next_seq as u64)
    }

    pub async fn get(
        &self,
        key: &HistoryKey,
        since: Option<u64>,
        until: Option<u64>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"SELECT sequence_number, stored_at, envelope_json FROM history_entries
               WHERE tenant_id = ? AND room = ? AND channel = ?
                 AND sequence_number > ? AND sequence_number <= ?
               ORDER BY sequence_number ASC
               LIMIT ?"#,
        )
        .bind(&key.tenant_id)
        .bind(&key.room)
        .bind(&key.channel)
        .bind(since.unwrap_or(0) as i64)
        .bind(until.unwrap_or(i64::MAX as u64) as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Durable(e.to_string()))?;

        rows_to_entries(rows)
    }

    pub async fn replay(
        &self,
        key: &HistoryKey,
        from_ts: u64,
        to_ts: u64,
        strict_sequence: bool,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"SELECT sequence_number, stored_at, envelope_json FROM history_entries
               WHERE tenant_id = ? AND room = ? AND channel = ?
                 AND stored_at >= ? AND stored_at <= ?
               ORDER BY sequence_number ASC
               LIMIT ?"#,
        )
        .bind(&key.tenant_id)
        .bind(&key.room)
        .bind(&key.channel)
        .bind(from_ts as i64)
        .bind(to_ts as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Durable(e.to_string()))?;

        let entries = rows_to_entries(rows)?;
        if strict_sequence {
            for pair in entries.windows(2) {
                if pair[1].sequence_number != pair[0].sequence_number + 1 {
                    return Err(Error::SequenceGap {
                        key: key.to_string(),
                        expected: pair[0].sequence_number + 1,
                        actual: pair[1].sequence_number,
                    });
                }
            }
        }
        Ok(entries)
    }
}

fn rows_to_entries(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<HistoryEntry>> {
    rows.into_iter()
        .map(|row| {
            let sequence_number: i64 = row.get("sequence_number");
            let stored_at: i64 = row.get("stored_at");
            let envelope_json: String = row.get("envelope_json");
            let envelope: Envelope =
                serde_json::from_str(&envelope_json).map_err(|e| Error::Durable(e.to_string()))?;
            Ok(HistoryEntry {
                envelope,
                stored_at: stored_at as u64,
                sequence_number: sequence_number as u64,
                storage_metadata: Some(serde_json::json!({ "backend": "sqlite" })),
            })
        })
        .collect()
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use arqonbus_protocol::EnvelopeType;

    use super::*;

    fn envelope(id: &str) -> Envelope {
        Envelope {
            id: id.into(),
            r#type: EnvelopeType::Message,
            version: "1".into(),
            timestamp: 0,
            from_client: "alice".into(),
            to_client: None,
            room: Some("ops".into()),
            channel: Some("events".into()),
            command: None,
            args: None,
            payload: Some(serde_json::json!({"n": id})),
            metadata: None,
            correlation_id: None,
            tenant_id: Some("t1".into()),
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        SqliteHistoryStore::init(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn append_assigns_monotonic_sequence() {
        let pool = test_pool().await;
        let store = SqliteHistoryStore::new(pool);
        let key = HistoryKey::new("t1", "ops", "events");
        let s1 = store.append(&key, &envelope("m1")).await.unwrap();
        let s2 = store.append(&key, &envelope("m2")).await.unwrap();
        assert!(s2 > s1);
    }

    #[tokio::test]
    async fn get_returns_ascending_order() {
        let pool = test_pool().await;
        let store = SqliteHistoryStore::new(pool);
        let key = HistoryKey::new("t1", "ops", "events");
        for i in 0..3 {
            store.append(&key, &envelope(&format!("m{i}"))).await.unwrap();
        }
        let entries = store.get(&key, None, None, 10).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].sequence_number < entries[1].sequence_number);
    }

    #[tokio::test]
    async fn tenants_are_isolated() {
        let pool = test_pool().await;
        let store = SqliteHistoryStore::new(pool);
        store
            .append(&HistoryKey::new("t1", "ops", "events"), &envelope("m1"))
            .await
            .unwrap();
        let other = store.get(&HistoryKey::new("t2", "ops", "events"), None, None, 10).await.unwrap();
        assert!(other.is_empty());
    }
}
