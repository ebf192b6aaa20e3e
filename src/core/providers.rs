use std::error::Error;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::chat_stream::{
    MockStreamClient, ModelStreamClient, OpenAiStreamClient, MOCK_MODEL,
};
use crate::core::config::defaults::DEFAULT_BASE_URL;
use crate::core::config::Config;
use crate::utils::url::validate_base_url;

const BASE_URL_ENV: &str = "OPENAI_BASE_URL";
const QUICK_FIXES: &[&str] = &[
    "export OPENAI_API_KEY=sk-...    # Use environment variable (defaults to OpenAI API)",
    "astrid -m mock                  # Try the offline mock model",
    "astrid config show              # Check which variable api_key_env names",
];

/// Everything needed to talk to the model provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSession {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl ProviderSession {
    pub fn is_mock(&self) -> bool {
        self.model == MOCK_MODEL
    }
}

#[derive(Debug)]
pub struct ProviderResolutionError {
    message: String,
    quick_fixes: &'static [&'static str],
    exit_code: i32,
}

impl ProviderResolutionError {
    pub fn missing_api_key(env_name: &str) -> Self {
        Self::new(
            format!(
                "❌ No API key found: the {env_name} environment variable is not set\n\nPlease either:\n1. Set environment variables:\n   export {env_name}=\"your-api-key-here\"\n   export {BASE_URL_ENV}=\"{DEFAULT_BASE_URL}\"  # Optional\n2. Use the offline mock model with '-m mock'"
            ),
            QUICK_FIXES,
            2,
        )
    }

    pub fn invalid_base_url(reason: impl fmt::Display) -> Self {
        Self::new(
            format!("❌ {reason}"),
            &[
                "astrid --base-url https://api.openai.com/v1    # Point at an OpenAI-compatible endpoint",
            ],
            2,
        )
    }

    pub fn client_build_failed(reason: impl fmt::Display) -> Self {
        Self::new(format!("Failed to build HTTP client: {reason}"), &[], 1)
    }

    fn new(
        message: impl Into<String>,
        quick_fixes: &'static [&'static str],
        exit_code: i32,
    ) -> Self {
        Self {
            message: message.into(),
            quick_fixes,
            exit_code,
        }
    }

    pub fn quick_fixes(&self) -> &'static [&'static str] {
        self.quick_fixes
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for ProviderResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ProviderResolutionError {}

pub fn resolve_session(config: &Config) -> Result<ProviderSession, ProviderResolutionError> {
    resolve_session_with(config, |name| std::env::var(name).ok())
}

/// Resolves the session using `lookup` for environment variables.
pub fn resolve_session_with<F>(
    config: &Config,
    lookup: F,
) -> Result<ProviderSession, ProviderResolutionError>
where
    F: Fn(&str) -> Option<String>,
{
    let model = config.model().to_string();
    let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    let base_url = non_empty(BASE_URL_ENV)
        .or_else(|| config.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let base_url =
        validate_base_url(&base_url).map_err(ProviderResolutionError::invalid_base_url)?;

    let api_key = non_empty(config.api_key_env());
    if api_key.is_none() && model != MOCK_MODEL {
        return Err(ProviderResolutionError::missing_api_key(
            config.api_key_env(),
        ));
    }

    debug!(model = %model, base_url = %base_url, "Resolved provider session");
    Ok(ProviderSession {
        model,
        base_url,
        api_key,
    })
}

pub fn build_stream_client(
    session: &ProviderSession,
    config: &Config,
) -> Result<Arc<dyn ModelStreamClient>, ProviderResolutionError> {
    if session.is_mock() {
        return Ok(Arc::new(MockStreamClient::default()));
    }

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(30))
        .read_timeout(config.request_timeout())
        .build()
        .map_err(ProviderResolutionError::client_build_failed)?;

    Ok(Arc::new(OpenAiStreamClient::new(
        client,
        session.base_url.clone(),
        session.api_key.clone().unwrap_or_default(),
        session.model.clone(),
    )))
}
