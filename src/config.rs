use std::time::Duration;

use crate::error::AppError;

/// Default generation model. Matches the hosted service's fast tier.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for the remote generation service.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    /// Timeout for establishing the streaming request.
    pub connect_timeout: Duration,
    /// Maximum silence between chunks before the stream is failed.
    pub idle_timeout: Duration,
    /// Enables web-search grounding on every request.
    pub web_search: bool,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            web_search: true,
        }
    }

    /// Load from the environment. A `.env` file is honored when present.
    /// Fails with `InvalidState` when `GEMINI_API_KEY` is missing or empty.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::InvalidState("GEMINI_API_KEY is not set".into()))?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }
}
