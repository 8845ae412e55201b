use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::error;

use crate::errors::AppError;
use crate::models::{AnalyticsEvent, Game, GameQuery, GameType};

/// Saved games library.
#[async_trait]
pub trait GameStore: Send + Sync {
    async fn save(&self, game: &Game) -> Result<Game, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Game>, AppError>;
    /// One page of matching games, newest first, plus the total match count.
    async fn list(&self, query: &GameQuery) -> Result<(Vec<Game>, i64), AppError>;
    /// Overwrites the editable fields (title, description, code, visibility, `updated_at`).
    async fn update(&self, game: &Game) -> Result<(), AppError>;
    async fn increment_views(&self, id: &str) -> Result<(), AppError>;
    async fn delete(&self, id: &str) -> Result<bool, AppError>;
    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), AppError>;
}

// ── PostgreSQL ────────────────────────────────────────────────────────────────

const GAME_COLUMNS: &str = "id, owner_id, title, description, prompt, game_type, game_code, \
                            is_public, views, created_at, updated_at";

const GAME_FILTER: &str = "($1::TEXT IS NULL OR owner_id = $1)
                           AND (NOT $2 OR is_public)
                           AND ($3::TEXT IS NULL OR game_type = $3)";

fn game_from_row(row: PgRow) -> Result<Game, AppError> {
    use sqlx::Row;
    let read = |column: &str, e: sqlx::Error| AppError::db_query(format!("Failed to read {column}"), e);

    let game_type: String = row.try_get("game_type").map_err(|e| read("game_type", e))?;
    let game_type = GameType::try_from(game_type)
        .map_err(|e| AppError::Unexpected(format!("Unknown game type: {e}")))?;

    Ok(Game {
        id: row.try_get("id").map_err(|e| read("id", e))?,
        owner_id: row.try_get("owner_id").map_err(|e| read("owner_id", e))?,
        title: row.try_get("title").map_err(|e| read("title", e))?,
        description: row.try_get("description").map_err(|e| read("description", e))?,
        prompt: row.try_get("prompt").map_err(|e| read("prompt", e))?,
        game_type,
        game_code: row.try_get("game_code").map_err(|e| read("game_code", e))?,
        is_public: row.try_get("is_public").map_err(|e| read("is_public", e))?,
        views: row.try_get("views").map_err(|e| read("views", e))?,
        created_at: row.try_get("created_at").map_err(|e| read("created_at", e))?,
        updated_at: row.try_get("updated_at").map_err(|e| read("updated_at", e))?,
    })
}

#[derive(Clone)]
pub struct PgGameStore {
    pool: PgPool,
}

impl PgGameStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn save(&self, game: &Game) -> Result<Game, AppError> {
        sqlx::query(
            "INSERT INTO games (id, owner_id, title, description, prompt, game_type, game_code,
                                is_public, views, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&game.id)
        .bind(&game.owner_id)
        .bind(&game.title)
        .bind(&game.description)
        .bind(&game.prompt)
        .bind(game.game_type.as_str())
        .bind(&game.game_code)
        .bind(game.is_public)
        .bind(game.views)
        .bind(game.created_at)
        .bind(game.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to save game {}: {e}", game.id);
            AppError::db_query("Failed to save game", e)
        })?;
        Ok(game.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Game>, AppError> {
        let row = sqlx::query(&format!("SELECT {GAME_COLUMNS} FROM games WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to find game {id}: {e}");
                AppError::db_query(format!("Failed to find game {id}"), e)
            })?;
        row.map(game_from_row).transpose()
    }

    async fn list(&self, query: &GameQuery) -> Result<(Vec<Game>, i64), AppError> {
        let game_type = query.game_type.map(|t| t.as_str());

        let rows = sqlx::query(&format!(
            "SELECT {GAME_COLUMNS} FROM games WHERE {GAME_FILTER}
             ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        ))
        .bind(&query.owner_id)
        .bind(query.public_only)
        .bind(game_type)
        .bind(i64::from(query.limit))
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list games: {e}");
            AppError::db_query("Failed to list games", e)
        })?;

        let (total,): (i64,) =
            sqlx::query_as(&format!("SELECT COUNT(*) FROM games WHERE {GAME_FILTER}"))
                .bind(&query.owner_id)
                .bind(query.public_only)
                .bind(game_type)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to count games: {e}");
                    AppError::db_query("Failed to count games", e)
                })?;

        let games = rows.into_iter().map(game_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((games, total))
    }

    async fn update(&self, game: &Game) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE games
             SET title = $2, description = $3, game_code = $4, is_public = $5, updated_at = $6
             WHERE id = $1",
        )
        .bind(&game.id)
        .bind(&game.title)
        .bind(&game.description)
        .bind(&game.game_code)
        .bind(game.is_public)
        .bind(game.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update game {}: {e}", game.id);
            AppError::db_query("Failed to update game", e)
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("game", &game.id));
        }
        Ok(())
    }

    async fn increment_views(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE games SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to count view for game {id}: {e}");
                AppError::db_query("Failed to update game views", e)
            })?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM games WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to delete game {id}: {e}");
                AppError::db_query("Failed to delete game", e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO analytics_events (id, user_id, game_id, event_type, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&event.id)
        .bind(&event.user_id)
        .bind(&event.game_id)
        .bind(event.event_type.as_str())
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to record {} for game {}: {e}", event.event_type.as_str(), event.game_id);
            AppError::db_query("Failed to record analytics event", e)
        })?;
        Ok(())
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryGameStore {
    games: RwLock<HashMap<String, Game>>,
    events: RwLock<Vec<AnalyticsEvent>>,
}

impl InMemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn save(&self, game: &Game) -> Result<Game, AppError> {
        self.games.write().await.insert(game.id.clone(), game.clone());
        Ok(game.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Game>, AppError> {
        Ok(self.games.read().await.get(id).cloned())
    }

    async fn list(&self, query: &GameQuery) -> Result<(Vec<Game>, i64), AppError> {
        let games = self.games.read().await;
        let mut matching: Vec<Game> = games.values().filter(|g| query.matches(g)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update(&self, game: &Game) -> Result<(), AppError> {
        match self.games.write().await.get_mut(&game.id) {
            Some(stored) => {
                *stored = game.clone();
                Ok(())
            }
            None => Err(AppError::not_found("game", &game.id)),
        }
    }

    async fn increment_views(&self, id: &str) -> Result<(), AppError> {
        if let Some(game) = self.games.write().await.get_mut(id) {
            game.views += 1;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let removed = self.games.write().await.remove(id).is_some();
        if removed {
            self.events.write().await.retain(|event| event.game_id != id);
        }
        Ok(removed)
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<(), AppError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}
