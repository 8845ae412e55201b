use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of messages a freshly created session starts with.
pub const SEED_MESSAGE_COUNT: usize = 2;

const WELCOME_MESSAGE: &str = "Welcome to the game builder! Your game preview is ready.";
const GREETING_MESSAGE: &str = "Hi! I've set up a starter game for you. Ask me to change colors, \
                                add features, or build something completely different. \
                                What would you like to make?";

/// Document shown in the preview before the first turn replaces it.
pub const PLACEHOLDER_ARTIFACT: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>New Game</title>
    <style>
        body {
            margin: 0;
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            background: #1a1a2e;
            color: #fff;
            font-family: 'Courier New', monospace;
        }
        .frame {
            padding: 32px;
            text-align: center;
            border: 2px solid #8b5cf6;
            border-radius: 10px;
        }
        .icon { font-size: 48px; }
    </style>
</head>
<body>
    <div class="frame">
        <div class="icon">🎮</div>
        <h1>Welcome!</h1>
        <p>Your game will appear here.</p>
    </div>
</body>
</html>"#;

// ── Chat transcript ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }

    /// Speaker label used when a transcript is flattened into prompt text.
    pub fn label(&self) -> &'static str {
        match self {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
            MessageRole::System => "System",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

// ── Game session ──────────────────────────────────────────────────────────────

/// A chat transcript paired with the one artifact it evolves.
///
/// Messages are append-only; every mutation goes through the methods below so
/// `last_modified` and message ordering stay consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub current_artifact: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl GameSession {
    /// Builds the lazily-created session: placeholder artifact plus the two seed messages.
    pub fn seeded(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let id = id.into();
        let now = Utc::now();
        let mut messages = Vec::with_capacity(SEED_MESSAGE_COUNT);
        messages.push(ChatMessage::new(MessageRole::System, WELCOME_MESSAGE));
        messages.push(ChatMessage::new(MessageRole::Assistant, GREETING_MESSAGE));
        Self {
            title: default_title(&id),
            id,
            owner_id: owner_id.into(),
            current_artifact: PLACEHOLDER_ARTIFACT.to_string(),
            messages,
            created_at: now,
            last_modified: now,
        }
    }

    /// Appends a message, clamping its timestamp so the transcript never goes
    /// back in time.
    pub fn append_message(&mut self, role: MessageRole, content: impl Into<String>) -> &ChatMessage {
        let mut message = ChatMessage::new(role, content);
        if let Some(last) = self.messages.last() {
            if message.created_at < last.created_at {
                message.created_at = last.created_at;
            }
        }
        self.touch(message.created_at);
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn replace_artifact(&mut self, artifact: String) {
        self.current_artifact = artifact;
        self.touch(Utc::now());
    }

    pub fn rename(&mut self, title: String) {
        self.title = title;
        self.touch(Utc::now());
    }

    pub fn is_owned_by(&self, caller: &str) -> bool {
        self.owner_id == caller
    }

    pub fn has_placeholder_artifact(&self) -> bool {
        self.current_artifact.trim().is_empty() || self.current_artifact == PLACEHOLDER_ARTIFACT
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_modified = self.last_modified.max(at);
    }
}

/// `"Game <suffix>"`, where the suffix is the second `-`-separated segment of the id
/// (`game-123-abc` gives `Game 123`). Ids without one use the whole id.
fn default_title(id: &str) -> String {
    let suffix = id.split('-').nth(1).filter(|segment| !segment.is_empty()).unwrap_or(id);
    format!("Game {suffix}")
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl From<&GameSession> for SessionSummary {
    fn from(s: &GameSession) -> Self {
        Self {
            id: s.id.clone(),
            title: s.title.clone(),
            message_count: s.messages.len() as i64,
            created_at: s.created_at,
            last_modified: s.last_modified,
        }
    }
}

// ── Turns ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Ask for one complete document and nothing else.
    Create,
    /// Ask for a short rationale followed by the complete updated document.
    Iterate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    AwaitingModel,
    Updating,
    Failed,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub instruction: String,
    #[serde(default)]
    pub mode: Option<GenerationMode>,
}

#[derive(Debug, Serialize)]
pub struct TurnOutcome {
    pub session: GameSession,
    pub reply: ChatMessage,
    pub artifact_updated: bool,
    pub failed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub current_artifact: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: GameSession,
    pub turn_state: TurnState,
}

// ── Games ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameType {
    #[default]
    #[serde(rename = "2d")]
    TwoD,
    #[serde(rename = "advanced-2d")]
    AdvancedTwoD,
    #[serde(rename = "3d")]
    ThreeD,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::TwoD => "2d",
            GameType::AdvancedTwoD => "advanced-2d",
            GameType::ThreeD => "3d",
        }
    }
}

impl TryFrom<String> for GameType {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "2d" => Ok(GameType::TwoD),
            "advanced-2d" => Ok(GameType::AdvancedTwoD),
            "3d" => Ok(GameType::ThreeD),
            other => Err(format!("Unknown game type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub prompt: String,
    pub game_type: GameType,
    pub game_code: String,
    pub is_public: bool,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Game {
    pub fn new(owner_id: String, request: CreateGameRequest) -> Self {
        let now = Utc::now();
        let prompt = request.description.clone().unwrap_or_else(|| request.title.clone());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id,
            title: request.title,
            description: request.description,
            prompt,
            game_type: request.game_type.unwrap_or_default(),
            game_code: request.game_code,
            is_public: request.is_public,
            views: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_visible_to(&self, caller: &str) -> bool {
        self.is_public || self.owner_id == caller
    }

    /// Applies the non-blank fields of `update` and bumps `updated_at`.
    pub fn apply(&mut self, update: UpdateGameRequest) {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        if let Some(title) = present(update.title) {
            self.title = title;
        }
        if let Some(description) = present(update.description) {
            self.description = Some(description);
        }
        if let Some(game_code) = present(update.game_code) {
            self.game_code = game_code;
        }
        if let Some(is_public) = update.is_public {
            self.is_public = is_public;
        }
        self.updated_at = self.updated_at.max(Utc::now());
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGameRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub game_code: String,
    #[serde(default)]
    pub game_type: Option<GameType>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGameRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub game_code: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsEventType {
    GamePlayed,
}

impl AnalyticsEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsEventType::GamePlayed => "GAME_PLAYED",
        }
    }
}

/// Usage record kept alongside the games library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub id: String,
    pub user_id: String,
    pub game_id: String,
    pub event_type: AnalyticsEventType,
    pub created_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn game_played(user_id: &str, game_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            game_id: game_id.to_string(),
            event_type: AnalyticsEventType::GamePlayed,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListGamesParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub public: bool,
    pub game_type: Option<GameType>,
}

/// Resolved listing filter handed to a game store.
#[derive(Debug, Clone, PartialEq)]
pub struct GameQuery {
    pub owner_id: Option<String>,
    pub public_only: bool,
    pub game_type: Option<GameType>,
    pub page: u32,
    pub limit: u32,
}

impl GameQuery {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }

    pub fn matches(&self, game: &Game) -> bool {
        self.owner_id.as_ref().is_none_or(|o| &game.owner_id == o)
            && (!self.public_only || game.is_public)
            && self.game_type.is_none_or(|t| game.game_type == t)
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize)]
pub struct GamePage {
    pub games: Vec<Game>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct GenerateGameRequest {
    pub prompt: String,
    #[serde(default)]
    pub game_type: Option<GameType>,
}

#[derive(Debug, Serialize)]
pub struct GeneratedGame {
    pub game_code: String,
    pub game_type: GameType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_session_has_placeholder_and_two_messages() {
        let session = GameSession::seeded("game-1700000000", "user-1");
        assert_eq!(session.title, "Game 1700000000");
        assert_eq!(session.messages.len(), SEED_MESSAGE_COUNT);
        assert_eq!(session.messages[0].role, MessageRole::System);
        assert_eq!(session.messages[1].role, MessageRole::Assistant);
        assert!(session.has_placeholder_artifact());
        assert!(session.current_artifact.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn title_falls_back_to_whole_id() {
        let session = GameSession::seeded("abc", "user-1");
        assert_eq!(session.title, "Game abc");
        assert_eq!(GameSession::seeded("game-", "user-1").title, "Game game-");
    }

    #[test]
    fn title_uses_only_the_second_id_segment() {
        let session = GameSession::seeded("game-123-abc", "user-1");
        assert_eq!(session.title, "Game 123");
    }

    #[test]
    fn appended_messages_never_go_back_in_time() {
        let mut session = GameSession::seeded("game-1", "user-1");
        let future = Utc::now() + chrono::Duration::hours(1);
        session.messages[1].created_at = future;

        let appended = session.append_message(MessageRole::User, "hello").clone();
        assert!(appended.created_at >= future);
        assert!(session.last_modified >= future);
        assert_eq!(session.messages.last(), Some(&appended));
    }

    #[test]
    fn role_round_trips_through_storage_text() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(MessageRole::try_from(role.as_str().to_string()), Ok(role));
        }
        assert!(MessageRole::try_from("robot".to_string()).is_err());
    }

    #[test]
    fn game_type_uses_wire_names() {
        let parsed: GameType = serde_json::from_str("\"advanced-2d\"").unwrap();
        assert_eq!(parsed, GameType::AdvancedTwoD);
        assert_eq!(GameType::try_from("3D".to_string()), Ok(GameType::ThreeD));
    }

    #[test]
    fn game_update_ignores_blank_fields() {
        let mut game = Game::new(
            "alice".to_string(),
            CreateGameRequest {
                title: "Pong".to_string(),
                description: Some("paddles".to_string()),
                game_code: "<html></html>".to_string(),
                game_type: None,
                is_public: false,
            },
        );
        let before = game.updated_at;

        game.apply(UpdateGameRequest {
            title: Some("  ".to_string()),
            description: Some("two paddles".to_string()),
            game_code: None,
            is_public: Some(true),
        });

        assert_eq!(game.title, "Pong");
        assert_eq!(game.description.as_deref(), Some("two paddles"));
        assert_eq!(game.game_code, "<html></html>");
        assert!(game.is_public);
        assert!(game.updated_at >= before);
    }

    #[test]
    fn play_event_uses_wire_name() {
        let event = AnalyticsEvent::game_played("alice", "g-1");
        assert_eq!(event.event_type.as_str(), "GAME_PLAYED");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "GAME_PLAYED");
    }

    #[test]
    fn game_query_offset_starts_at_zero() {
        let query = GameQuery { owner_id: None, public_only: true, game_type: None, page: 3, limit: 10 };
        assert_eq!(query.offset(), 20);
    }
}
