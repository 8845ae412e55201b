use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::agent::ModelGateway;
use crate::db::session_repository::SessionStore;
use crate::errors::AppError;
use crate::extract::extract;
use crate::models::{
    GameSession, GenerationMode, MessageRole, SessionSummary, TurnOutcome, TurnRequest,
    TurnState, UpdateSessionRequest,
};
use crate::prompt;

pub const MAX_INSTRUCTION_LENGTH: usize = 8000;
const MAX_SESSION_ID_LENGTH: usize = 128;

type TurnTable = Arc<Mutex<HashMap<String, TurnState>>>;

/// Marks a session busy for as long as it is alive.
struct TurnGuard {
    turns: TurnTable,
    session_id: String,
}

impl TurnGuard {
    fn set(&self, state: TurnState) {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.session_id.clone(), state);
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_id);
    }
}

/// Runs chat turns against game sessions.
///
/// At most one mutation is in flight per session; a second request for a busy
/// session is rejected with [`AppError::TurnInProgress`] rather than queued.
#[derive(Clone)]
pub struct SessionController {
    store: Arc<dyn SessionStore>,
    gateway: Arc<dyn ModelGateway>,
    turns: TurnTable,
}

impl SessionController {
    pub fn new(store: Arc<dyn SessionStore>, gateway: Arc<dyn ModelGateway>) -> Self {
        Self { store, gateway, turns: TurnTable::default() }
    }

    pub fn turn_state(&self, session_id: &str) -> TurnState {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .copied()
            .unwrap_or(TurnState::Idle)
    }

    pub async fn list_sessions(&self, caller: &str) -> Result<Vec<SessionSummary>, AppError> {
        self.store.list_for_owner(caller).await
    }

    /// Loads the session, creating and persisting a seeded one on first access.
    pub async fn get_or_create(&self, caller: &str, session_id: &str) -> Result<GameSession, AppError> {
        validate_session_id(session_id)?;
        match self.store.get(session_id).await? {
            Some(session) if session.is_owned_by(caller) => Ok(session),
            Some(_) => Err(AppError::access_denied("session", session_id)),
            None => {
                let session = GameSession::seeded(session_id, caller);
                self.store.put(&session).await?;
                info!("Created session {session_id} for {caller}");
                Ok(session)
            }
        }
    }

    pub async fn update_session(
        &self,
        caller: &str,
        session_id: &str,
        request: UpdateSessionRequest,
    ) -> Result<GameSession, AppError> {
        let _guard = self.begin(session_id, TurnState::Updating)?;
        let mut session = self.load_owned(caller, session_id).await?;

        if let Some(title) = request.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(AppError::empty_field("title"));
            }
            session.rename(title.to_string());
        }
        if let Some(artifact) = request.current_artifact {
            if !artifact.trim().is_empty() {
                session.replace_artifact(artifact);
            }
        }

        self.store.put(&session).await?;
        Ok(session)
    }

    pub async fn delete_session(&self, caller: &str, session_id: &str) -> Result<(), AppError> {
        let _guard = self.begin(session_id, TurnState::Updating)?;
        self.load_owned(caller, session_id).await?;
        self.store.delete(session_id).await?;
        info!("Deleted session {session_id}");
        Ok(())
    }

    /// Runs one turn: record the instruction, ask the model, apply whatever
    /// artifact comes back, and always answer with an assistant message.
    ///
    /// A model failure is not an `Err`: it produces an apology message and an
    /// outcome with `failed: true`, leaving the artifact untouched.
    pub async fn run_turn(
        &self,
        caller: &str,
        session_id: &str,
        request: TurnRequest,
    ) -> Result<TurnOutcome, AppError> {
        let instruction = validate_instruction(&request.instruction)?;
        let guard = self.begin(session_id, TurnState::AwaitingModel)?;
        let mut session = self.get_or_create(caller, session_id).await?;

        let history = prompt::recent_history(&session.messages).to_vec();
        session.append_message(MessageRole::User, instruction);

        let mode = request.mode.unwrap_or(if session.has_placeholder_artifact() {
            GenerationMode::Create
        } else {
            GenerationMode::Iterate
        });
        let request_text = prompt::build(&session.current_artifact, instruction, &history, mode);

        let (artifact_updated, failed) = match self.gateway.generate(&request_text).await {
            Ok(text) => {
                guard.set(TurnState::Updating);
                let artifact = extract(&text);
                let updated = artifact.is_some();
                if let Some(artifact) = artifact {
                    session.replace_artifact(artifact);
                } else {
                    info!("Turn on session {session_id} produced no artifact; keeping the current one");
                }
                session.append_message(MessageRole::Assistant, text);
                (updated, false)
            }
            Err(e) => {
                guard.set(TurnState::Failed);
                warn!("Turn on session {session_id} failed: {e}");
                session.append_message(MessageRole::Assistant, failure_reply(&e));
                (false, true)
            }
        };

        self.store.put(&session).await?;
        drop(guard);

        let reply = session
            .messages
            .last()
            .cloned()
            .ok_or_else(|| AppError::Unexpected("turn produced no reply".to_string()))?;
        Ok(TurnOutcome { session, reply, artifact_updated, failed })
    }

    fn begin(&self, session_id: &str, state: TurnState) -> Result<TurnGuard, AppError> {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        if turns.contains_key(session_id) {
            return Err(AppError::TurnInProgress { session_id: session_id.to_string() });
        }
        turns.insert(session_id.to_string(), state);
        Ok(TurnGuard { turns: Arc::clone(&self.turns), session_id: session_id.to_string() })
    }

    async fn load_owned(&self, caller: &str, session_id: &str) -> Result<GameSession, AppError> {
        let session = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| AppError::not_found("session", session_id))?;
        if !session.is_owned_by(caller) {
            return Err(AppError::access_denied("session", session_id));
        }
        Ok(session)
    }
}

fn validate_instruction(instruction: &str) -> Result<&str, AppError> {
    let trimmed = instruction.trim();
    if trimmed.is_empty() {
        return Err(AppError::empty_field("instruction"));
    }
    let length = trimmed.chars().count();
    if length > MAX_INSTRUCTION_LENGTH {
        return Err(AppError::FieldTooLong {
            field_name: "instruction".to_string(),
            max_length: MAX_INSTRUCTION_LENGTH,
            actual_length: length,
        });
    }
    Ok(trimmed)
}

fn validate_session_id(session_id: &str) -> Result<(), AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::empty_field("session_id"));
    }
    if session_id.len() > MAX_SESSION_ID_LENGTH {
        return Err(AppError::FieldTooLong {
            field_name: "session_id".to_string(),
            max_length: MAX_SESSION_ID_LENGTH,
            actual_length: session_id.len(),
        });
    }
    Ok(())
}

fn failure_reply(error: &AppError) -> String {
    let detail = match error {
        AppError::GenerationFailed { message } => message.as_str(),
        _ => "an unexpected error occurred",
    };
    format!(
        "Sorry, I ran into a problem while working on your game ({detail}). \
         Your current game is unchanged. Please try again."
    )
}
