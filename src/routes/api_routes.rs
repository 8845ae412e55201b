use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::errors::AppError;
use crate::models::{
    CreateGameRequest, Game, GamePage, GeneratedGame, GenerateGameRequest, ListGamesParams,
    SessionSummary, SessionView, TurnOutcome, TurnRequest, UpdateGameRequest, UpdateSessionRequest,
};
use crate::routes::identity::CallerId;
use crate::service::game_service::GameService;
use crate::service::session_controller::SessionController;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionController,
    pub games: GameService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", get(list_sessions_handler))
        .route(
            "/api/sessions/{id}",
            get(get_session_handler).put(update_session_handler).delete(delete_session_handler),
        )
        .route("/api/sessions/{id}/turns", post(turn_handler))
        .route("/api/generate-game", post(generate_game_handler))
        .route("/api/games", get(list_games_handler).post(create_game_handler))
        .route(
            "/api/games/{id}",
            get(get_game_handler).put(update_game_handler).delete(delete_game_handler),
        )
        .with_state(state)
}

// ── Sessions ──────────────────────────────────────────────────────────────────

/// GET `/api/sessions`: the caller's sessions, most recently modified first
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    caller: CallerId,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    Ok(Json(state.sessions.list_sessions(caller.as_str()).await?))
}

/// GET `/api/sessions/{id}`: load the session, creating it on first access
pub async fn get_session_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get_or_create(caller.as_str(), &id).await?;
    let turn_state = state.sessions.turn_state(&id);
    Ok(Json(SessionView { session, turn_state }))
}

/// PUT `/api/sessions/{id}`: rename and/or replace the artifact by hand
pub async fn update_session_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.update_session(caller.as_str(), &id, request).await?;
    let turn_state = state.sessions.turn_state(&id);
    Ok(Json(SessionView { session, turn_state }))
}

/// DELETE `/api/sessions/{id}`
pub async fn delete_session_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.sessions.delete_session(caller.as_str(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/api/sessions/{id}/turns`: run one chat turn.
///
/// A model failure still answers 200 with `failed: true`; the apology is the reply.
pub async fn turn_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<String>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    Ok(Json(state.sessions.run_turn(caller.as_str(), &id, request).await?))
}

// ── Games ─────────────────────────────────────────────────────────────────────

/// POST `/api/generate-game`: one-shot generation, nothing is persisted
pub async fn generate_game_handler(
    State(state): State<AppState>,
    _caller: CallerId,
    Json(request): Json<GenerateGameRequest>,
) -> Result<Json<GeneratedGame>, AppError> {
    Ok(Json(state.games.generate(request).await?))
}

/// GET `/api/games?page=&limit=&public=&game_type=`
pub async fn list_games_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Query(params): Query<ListGamesParams>,
) -> Result<Json<GamePage>, AppError> {
    Ok(Json(state.games.list_games(caller.as_str(), params).await?))
}

/// POST `/api/games`
pub async fn create_game_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Json(request): Json<CreateGameRequest>,
) -> Result<(StatusCode, Json<Game>), AppError> {
    let game = state.games.create_game(caller.as_str(), request).await?;
    Ok((StatusCode::CREATED, Json(game)))
}

/// GET `/api/games/{id}`: counts as a view
pub async fn get_game_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<String>,
) -> Result<Json<Game>, AppError> {
    Ok(Json(state.games.get_game(caller.as_str(), &id).await?))
}

/// PUT `/api/games/{id}`: owner-only edit; blank fields are left unchanged
pub async fn update_game_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<String>,
    Json(request): Json<UpdateGameRequest>,
) -> Result<Json<Game>, AppError> {
    Ok(Json(state.games.update_game(caller.as_str(), &id, request).await?))
}

/// DELETE `/api/games/{id}`
pub async fn delete_game_handler(
    State(state): State<AppState>,
    caller: CallerId,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.games.delete_game(caller.as_str(), &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::Notify;
    use tower::ServiceExt;

    use super::*;
    use crate::agent::testing::{GatedGateway, ScriptedGateway};
    use crate::agent::ModelGateway;
    use crate::db::game_repository::InMemoryGameStore;
    use crate::db::session_repository::InMemorySessionStore;
    use crate::models::TurnState;
    use crate::routes::identity::CALLER_HEADER;

    fn state(gateway: Arc<dyn ModelGateway>) -> AppState {
        AppState {
            sessions: SessionController::new(Arc::new(InMemorySessionStore::new()), gateway.clone()),
            games: GameService::new(Arc::new(InMemoryGameStore::new()), gateway),
        }
    }

    fn post_turn(session_id: &str, caller: Option<&str>, instruction: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/api/sessions/{session_id}/turns"))
            .header("content-type", "application/json");
        if let Some(caller) = caller {
            builder = builder.header(CALLER_HEADER, caller);
        }
        builder.body(Body::from(json!({ "instruction": instruction }).to_string())).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn failed_turn_is_still_ok() {
        let gateway = Arc::new(ScriptedGateway::replying([Err("model offline".to_string())]));
        let app = router(state(gateway));

        let response = app.oneshot(post_turn("game-1", Some("alice"), "make pong")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["failed"], true);
        assert_eq!(body["artifact_updated"], false);
        assert!(body["reply"]["content"].as_str().unwrap().contains("model offline"));
    }

    #[tokio::test]
    async fn missing_caller_is_unauthorized() {
        let gateway = Arc::new(ScriptedGateway::default());
        let app = router(state(gateway.clone()));

        let response = app.oneshot(post_turn("game-1", None, "make pong")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_json(response).await["error"].is_string());
        assert_eq!(gateway.prompt_count(), 0);
    }

    #[tokio::test]
    async fn busy_session_is_a_conflict() {
        let release = Arc::new(Notify::new());
        let gateway = Arc::new(GatedGateway { release: release.clone(), reply: "thinking".to_string() });
        let state = state(gateway);
        let app = router(state.clone());

        let first = tokio::spawn(app.clone().oneshot(post_turn("game-1", Some("alice"), "make pong")));
        let mut waited = 0;
        while state.sessions.turn_state("game-1") != TurnState::AwaitingModel {
            assert!(waited < 200, "first turn never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
            waited += 1;
        }

        let response = app.oneshot(post_turn("game-1", Some("alice"), "make tetris")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_json(response).await["error"].is_string());

        release.notify_one();
        assert_eq!(first.await.unwrap().unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn games_can_be_updated_by_their_owner() {
        let app = router(state(Arc::new(ScriptedGateway::default())));
        let create = Request::builder()
            .method("POST")
            .uri("/api/games")
            .header("content-type", "application/json")
            .header(CALLER_HEADER, "alice")
            .body(Body::from(
                json!({ "title": "Pong", "game_code": "<!DOCTYPE html><html></html>" }).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(create).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let update = |caller: &str| {
            Request::builder()
                .method("PUT")
                .uri(format!("/api/games/{id}"))
                .header("content-type", "application/json")
                .header(CALLER_HEADER, caller)
                .body(Body::from(json!({ "title": "Pong II", "is_public": true }).to_string()))
                .unwrap()
        };

        let response = app.clone().oneshot(update("bob")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.oneshot(update("alice")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["title"], "Pong II");
        assert_eq!(body["is_public"], true);
    }
}
