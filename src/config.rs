use crate::errors::AppError;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    Ollama,
    Gemini,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub model: String,
    pub ollama_base_url: String,
    /// Loaded once at startup; only required by hosted providers.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// `None` keeps sessions and games in process memory.
    pub database_url: Option<String>,
    pub model: ModelConfig,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests never touch the process env.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match var("MODEL_PROVIDER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("ollama") => ModelProvider::Ollama,
            Some("gemini") => ModelProvider::Gemini,
            Some(other) => {
                return Err(AppError::Config(format!("unknown MODEL_PROVIDER '{other}'")));
            }
        };

        let api_key = var("GEMINI_API_KEY");
        if provider == ModelProvider::Gemini && api_key.is_none() {
            return Err(AppError::Config(
                "GEMINI_API_KEY must be set when MODEL_PROVIDER=gemini".to_string(),
            ));
        }

        let model = var("MODEL_NAME").unwrap_or_else(|| {
            match provider {
                ModelProvider::Ollama => DEFAULT_OLLAMA_MODEL,
                ModelProvider::Gemini => DEFAULT_GEMINI_MODEL,
            }
            .to_string()
        });

        let port = match var("PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| AppError::Config(format!("PORT '{p}' is not a valid port")))?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            database_url: var("DATABASE_URL"),
            model: ModelConfig {
                provider,
                model,
                ollama_base_url: var("OLLAMA_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
                api_key,
            },
            port,
        })
    }
}
