use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::error;

use crate::errors::AppError;
use crate::models::{ChatMessage, GameSession, MessageRole, SessionSummary};

/// Durable home of game sessions, keyed by session id.
///
/// `put` stores the whole session. Concurrent writers to the same id are not
/// coordinated here: the last write wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<GameSession>, AppError>;
    async fn put(&self, session: &GameSession) -> Result<(), AppError>;
    /// Returns whether a session was removed.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<SessionSummary>, AppError>;
}

// ── PostgreSQL ────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    owner_id: String,
    title: String,
    current_artifact: String,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        let rows = sqlx::query(
            "SELECT id, role, content, created_at
             FROM chat_messages
             WHERE session_id = $1
             ORDER BY seq ASC, created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to fetch messages for session {session_id}: {e}");
            AppError::db_query(format!("Failed to fetch messages for session {session_id}"), e)
        })?;

        rows.into_iter()
            .map(|row: sqlx::postgres::PgRow| {
                use sqlx::Row;
                let role_str: String = row
                    .try_get("role")
                    .map_err(|e| AppError::db_query("Failed to read role", e))?;
                let role = MessageRole::try_from(role_str)
                    .map_err(|e| AppError::Unexpected(format!("Unknown message role: {e}")))?;
                Ok(ChatMessage {
                    id: row.try_get("id").map_err(|e| AppError::db_query("Failed to read id", e))?,
                    role,
                    content: row
                        .try_get("content")
                        .map_err(|e| AppError::db_query("Failed to read content", e))?,
                    created_at: row
                        .try_get("created_at")
                        .map_err(|e| AppError::db_query("Failed to read created_at", e))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn get(&self, id: &str) -> Result<Option<GameSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            "SELECT id, owner_id, title, current_artifact, created_at, last_modified
             FROM game_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to find session {id}: {e}");
            AppError::db_query(format!("Failed to find session {id}"), e)
        })?;

        let Some(row) = row else {
            return Ok(None);
        };
        let messages = self.find_messages(id).await?;
        Ok(Some(GameSession {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            current_artifact: row.current_artifact,
            messages,
            created_at: row.created_at,
            last_modified: row.last_modified,
        }))
    }

    async fn put(&self, session: &GameSession) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to open transaction for session {}: {e}", session.id);
            AppError::db_query("Failed to open transaction", e)
        })?;

        sqlx::query(
            "INSERT INTO game_sessions (id, owner_id, title, current_artifact, created_at, last_modified)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE
             SET title = EXCLUDED.title,
                 current_artifact = EXCLUDED.current_artifact,
                 last_modified = EXCLUDED.last_modified",
        )
        .bind(&session.id)
        .bind(&session.owner_id)
        .bind(&session.title)
        .bind(&session.current_artifact)
        .bind(session.created_at)
        .bind(session.last_modified)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to save session {}: {e}", session.id);
            AppError::db_query("Failed to save session", e)
        })?;

        // Messages are immutable, so rows that already exist are left alone.
        for (seq, message) in session.messages.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chat_messages (id, session_id, seq, role, content, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(&message.id)
            .bind(&session.id)
            .bind(seq as i64)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to save message {}: {e}", message.id);
                AppError::db_query("Failed to save message", e)
            })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit session {}: {e}", session.id);
            AppError::db_query("Failed to commit session", e)
        })
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM game_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete session {id}: {e}");
                AppError::db_query("Failed to delete session", e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<SessionSummary>, AppError> {
        sqlx::query_as::<_, SessionSummary>(
            "SELECT s.id, s.title, COUNT(m.id) AS message_count, s.created_at, s.last_modified
             FROM game_sessions s
             LEFT JOIN chat_messages m ON m.session_id = s.id
             WHERE s.owner_id = $1
             GROUP BY s.id
             ORDER BY s.last_modified DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list sessions for {owner_id}: {e}");
            AppError::db_query("Failed to list sessions", e)
        })
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, GameSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &str) -> Result<Option<GameSession>, AppError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn put(&self, session: &GameSession) -> Result<(), AppError> {
        self.sessions.write().await.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<SessionSummary>, AppError> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.is_owned_by(owner_id))
            .map(SessionSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(summaries)
    }
}
