use std::sync::Arc;

use tracing::info;

use crate::agent::ModelGateway;
use crate::db::game_repository::GameStore;
use crate::errors::AppError;
use crate::extract::strip_fences;
use crate::models::{
    AnalyticsEvent, CreateGameRequest, Game, GamePage, GameQuery, GeneratedGame,
    GenerateGameRequest, ListGamesParams, Pagination, UpdateGameRequest,
};
use crate::prompt;

const MAX_PROMPT_LENGTH: usize = 8000;
const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 50;

#[derive(Clone)]
pub struct GameService {
    store: Arc<dyn GameStore>,
    gateway: Arc<dyn ModelGateway>,
}

impl GameService {
    pub fn new(store: Arc<dyn GameStore>, gateway: Arc<dyn ModelGateway>) -> Self {
        Self { store, gateway }
    }

    /// One-shot generation of a complete game from a description.
    pub async fn generate(&self, request: GenerateGameRequest) -> Result<GeneratedGame, AppError> {
        let description = request.prompt.trim();
        if description.is_empty() {
            return Err(AppError::empty_field("prompt"));
        }
        let length = description.chars().count();
        if length > MAX_PROMPT_LENGTH {
            return Err(AppError::FieldTooLong {
                field_name: "prompt".to_string(),
                max_length: MAX_PROMPT_LENGTH,
                actual_length: length,
            });
        }

        let game_type = request.game_type.unwrap_or_default();
        let text = self
            .gateway
            .generate(&prompt::build_generation(description, game_type))
            .await?;

        Ok(GeneratedGame { game_code: strip_fences(&text), game_type })
    }

    pub async fn create_game(&self, caller: &str, request: CreateGameRequest) -> Result<Game, AppError> {
        if request.title.trim().is_empty() {
            return Err(AppError::empty_field("title"));
        }
        if request.game_code.trim().is_empty() {
            return Err(AppError::empty_field("game_code"));
        }
        let game = self.store.save(&Game::new(caller.to_string(), request)).await?;
        info!("Saved game {} for {caller}", game.id);
        Ok(game)
    }

    /// Lists the caller's own games, or every public game when `params.public` is set.
    pub async fn list_games(&self, caller: &str, params: ListGamesParams) -> Result<GamePage, AppError> {
        let query = GameQuery {
            owner_id: (!params.public).then(|| caller.to_string()),
            public_only: params.public,
            game_type: params.game_type,
            page: params.page.unwrap_or(1).max(1),
            limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        };
        let (games, total) = self.store.list(&query).await?;
        let limit = i64::from(query.limit);
        Ok(GamePage {
            games,
            pagination: Pagination {
                page: query.page,
                limit: query.limit,
                total,
                pages: (total + limit - 1) / limit,
            },
        })
    }

    /// Fetches a game the caller may see, counts the view and records a play.
    pub async fn get_game(&self, caller: &str, id: &str) -> Result<Game, AppError> {
        let mut game = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("game", id))?;
        if !game.is_visible_to(caller) {
            return Err(AppError::access_denied("game", id));
        }
        self.store.increment_views(id).await?;
        self.store.record_event(&AnalyticsEvent::game_played(caller, id)).await?;
        game.views += 1;
        Ok(game)
    }

    /// Owner-only edit of title, description, code and visibility.
    pub async fn update_game(
        &self,
        caller: &str,
        id: &str,
        request: UpdateGameRequest,
    ) -> Result<Game, AppError> {
        let mut game = self.find_owned(caller, id).await?;
        game.apply(request);
        self.store.update(&game).await?;
        info!("Updated game {id}");
        Ok(game)
    }

    pub async fn delete_game(&self, caller: &str, id: &str) -> Result<(), AppError> {
        self.find_owned(caller, id).await?;
        self.store.delete(id).await?;
        info!("Deleted game {id}");
        Ok(())
    }

    async fn find_owned(&self, caller: &str, id: &str) -> Result<Game, AppError> {
        let game = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("game", id))?;
        if game.owner_id != caller {
            return Err(AppError::access_denied("game", id));
        }
        Ok(game)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::ScriptedGateway;
    use crate::db::game_repository::InMemoryGameStore;
    use crate::models::{AnalyticsEventType, GameType};

    fn service(gateway: ScriptedGateway) -> (GameService, Arc<ScriptedGateway>) {
        let gateway = Arc::new(gateway);
        (GameService::new(Arc::new(InMemoryGameStore::new()), gateway.clone()), gateway)
    }

    fn create(title: &str, public: bool) -> CreateGameRequest {
        CreateGameRequest {
            title: title.to_string(),
            description: None,
            game_code: "<!DOCTYPE html><html></html>".to_string(),
            game_type: None,
            is_public: public,
        }
    }

    #[tokio::test]
    async fn generate_strips_fences_and_uses_type_prompt() {
        let (service, gateway) = service(ScriptedGateway::replying([Ok(
            "```html\n<!DOCTYPE html><html></html>\n```".to_string(),
        )]));
        let generated = service
            .generate(GenerateGameRequest {
                prompt: "a space shooter".to_string(),
                game_type: Some(GameType::ThreeD),
            })
            .await
            .unwrap();

        assert_eq!(generated.game_code, "<!DOCTYPE html><html></html>");
        assert_eq!(generated.game_type, GameType::ThreeD);
        assert!(gateway.prompts.lock().unwrap()[0].contains("Three.js"));
    }

    #[tokio::test]
    async fn generate_surfaces_gateway_failure() {
        let (service, _) = service(ScriptedGateway::replying([Err("quota exceeded".to_string())]));
        let err = service
            .generate(GenerateGameRequest { prompt: "pong".to_string(), game_type: None })
            .await
            .unwrap_err();
        assert!(err.is_generation_failure());
    }

    #[tokio::test]
    async fn generate_requires_a_prompt() {
        let (service, gateway) = service(ScriptedGateway::default());
        let err = service
            .generate(GenerateGameRequest { prompt: " ".to_string(), game_type: None })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(gateway.prompt_count(), 0);
    }

    #[tokio::test]
    async fn private_games_are_owner_only() {
        let (service, _) = service(ScriptedGateway::default());
        let game = service.create_game("alice", create("Secret", false)).await.unwrap();
        assert_eq!(game.prompt, "Secret");
        assert_eq!(game.game_type, GameType::TwoD);

        let err = service.get_game("bob", &game.id).await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied { .. }));

        let fetched = service.get_game("alice", &game.id).await.unwrap();
        assert_eq!(fetched.views, 1);
        assert_eq!(service.get_game("alice", &game.id).await.unwrap().views, 2);
    }

    #[tokio::test]
    async fn listing_paginates_own_or_public_games() {
        let (service, _) = service(ScriptedGateway::default());
        for i in 0..3 {
            service.create_game("alice", create(&format!("a{i}"), i == 0)).await.unwrap();
        }
        service.create_game("bob", create("b0", true)).await.unwrap();

        let own = service
            .list_games("alice", ListGamesParams { limit: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(own.games.len(), 2);
        assert_eq!(own.pagination.total, 3);
        assert_eq!(own.pagination.pages, 2);

        let public = service
            .list_games("alice", ListGamesParams { public: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(public.pagination.total, 2);
        assert!(public.games.iter().all(|g| g.is_public));
    }

    #[tokio::test]
    async fn only_owner_deletes() {
        let (service, _) = service(ScriptedGateway::default());
        let game = service.create_game("alice", create("Mine", true)).await.unwrap();

        assert!(service.delete_game("bob", &game.id).await.is_err());
        service.delete_game("alice", &game.id).await.unwrap();
        assert!(service.get_game("alice", &game.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn viewing_a_game_records_a_play() {
        let store = Arc::new(InMemoryGameStore::new());
        let service = GameService::new(store.clone(), Arc::new(ScriptedGateway::default()));
        let game = service.create_game("alice", create("Arcade", true)).await.unwrap();

        service.get_game("bob", &game.id).await.unwrap();

        let events = store.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_id, "bob");
        assert_eq!(events[0].game_id, game.id);
        assert_eq!(events[0].event_type, AnalyticsEventType::GamePlayed);

        // A denied fetch is not a play.
        let private = service.create_game("alice", create("Draft", false)).await.unwrap();
        assert!(service.get_game("bob", &private.id).await.is_err());
        assert_eq!(store.events().await.len(), 1);
    }

    #[tokio::test]
    async fn only_owner_updates() {
        let (service, _) = service(ScriptedGateway::default());
        let game = service.create_game("alice", create("Draft", false)).await.unwrap();
        let update = UpdateGameRequest {
            title: Some("Final".to_string()),
            game_code: Some("<!DOCTYPE html><html><body>v2</body></html>".to_string()),
            is_public: Some(true),
            ..Default::default()
        };

        let err = service.update_game("bob", &game.id, update.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::AccessDenied { .. }));
        let err = service.update_game("alice", "missing", update.clone()).await.unwrap_err();
        assert!(err.is_not_found());

        let updated = service.update_game("alice", &game.id, update).await.unwrap();
        assert_eq!(updated.title, "Final");
        assert!(updated.is_public);
        assert!(updated.updated_at >= game.updated_at);

        // Now public, so others can see the new version.
        let seen = service.get_game("bob", &game.id).await.unwrap();
        assert_eq!(seen.game_code, "<!DOCTYPE html><html><body>v2</body></html>");
    }

    #[tokio::test]
    async fn create_requires_title_and_code() {
        let (service, _) = service(ScriptedGateway::default());
        let mut request = create("", false);
        assert!(service.create_game("alice", request.clone()).await.is_err());
        request.title = "Ok".to_string();
        request.game_code = String::new();
        assert!(service.create_game("alice", request).await.is_err());
    }
}
