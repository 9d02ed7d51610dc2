//! SQLite-backed durable storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{BackendError, BackendResult, MemoryBackend};
use crate::types::{Message, Role};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    user_id        TEXT    NOT NULL,
    seq            INTEGER NOT NULL,
    message_id     TEXT    NOT NULL,
    role           TEXT    NOT NULL,
    content        TEXT    NOT NULL,
    token_estimate INTEGER NOT NULL,
    created_at     TEXT    NOT NULL,
    PRIMARY KEY (user_id, seq)
)";

/// Relational conversation store on a shared SQLite pool
///
/// The pool is acquired once at process start and reused across requests;
/// closing it on shutdown releases the connection.
#[derive(Debug)]
pub struct DurableBackend {
    pool: SqlitePool,
}

impl DurableBackend {
    /// Connect to the store and create the schema if needed.
    ///
    /// A failure here is a connectivity error; callers fall back to
    /// transient storage.
    pub async fn connect(url: &str) -> BackendResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| BackendError::Connectivity(e.to_string()))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(map_sqlx_err)?;

        debug!(url, "connected to durable conversation store");
        Ok(Self { pool })
    }

    /// Close the pool, releasing the connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MemoryBackend for DurableBackend {
    async fn load(&self, user_id: &str) -> BackendResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT message_id, role, content, token_estimate, created_at \
             FROM messages WHERE user_id = ?1 ORDER BY seq",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            messages.push(decode_row(&row)?);
        }
        Ok(messages)
    }

    async fn append(&self, user_id: &str, message: &Message) -> BackendResult<()> {
        // MAX over zero rows is NULL, so the first message gets seq 0
        sqlx::query(
            "INSERT INTO messages (user_id, seq, message_id, role, content, token_estimate, created_at) \
             SELECT ?1, COALESCE(MAX(seq) + 1, 0), ?2, ?3, ?4, ?5, ?6 \
             FROM messages WHERE user_id = ?1",
        )
        .bind(user_id)
        .bind(message.id.to_string())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(i64::from(message.token_estimate))
        .bind(message.timestamp)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn replace(&self, user_id: &str, messages: &[Message]) -> BackendResult<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        sqlx::query("DELETE FROM messages WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        for (seq, message) in messages.iter().enumerate() {
            sqlx::query(
                "INSERT INTO messages (user_id, seq, message_id, role, content, token_estimate, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(user_id)
            .bind(seq as i64)
            .bind(message.id.to_string())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(i64::from(message.token_estimate))
            .bind(message.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> BackendResult<()> {
        sqlx::query("DELETE FROM messages WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn flush(&self) -> BackendResult<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> BackendResult<Message> {
    let message_id: String = row.try_get("message_id").map_err(map_sqlx_err)?;
    let role: String = row.try_get("role").map_err(map_sqlx_err)?;
    let content: String = row.try_get("content").map_err(map_sqlx_err)?;
    let token_estimate: i64 = row.try_get("token_estimate").map_err(map_sqlx_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx_err)?;

    let id = Uuid::parse_str(&message_id)
        .map_err(|e| BackendError::Corrupt(format!("bad message id {message_id}: {e}")))?;
    let role = Role::parse(&role)
        .ok_or_else(|| BackendError::Corrupt(format!("unknown role {role}")))?;

    Ok(Message {
        id,
        role,
        content,
        token_estimate: token_estimate.clamp(0, i64::from(u32::MAX)) as u32,
        timestamp: created_at,
    })
}

fn map_sqlx_err(e: sqlx::Error) -> BackendError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            BackendError::Connectivity(e.to_string())
        }
        other => BackendError::Query(other.to_string()),
    }
}
