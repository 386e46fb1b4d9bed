//! Provider settings resolution and `.env` loading.
//!
//! Providers and models are injected through constructors; the functions here
//! are the explicit environment fallbacks. Precedence: explicit argument >
//! process environment > built-in default.

use std::path::Path;

use crate::error::RuntimeError;

/// Loads a project `.env` into the process environment. Existing variables
/// win; a missing file is not an error.
pub fn load_env() {
    let _ = dotenv::dotenv();
}

/// Loads `.env` from a specific directory instead of the current one.
pub fn load_env_from(dir: impl AsRef<Path>) {
    let _ = dotenv::from_path(dir.as_ref().join(".env"));
}

/// Resolved provider settings for one model binding.
///
/// Built from a provider-prefixed model string such as `"openai/gpt-4o-mini"`
/// or `"anthropic/claude-3"`. A bare model name resolves to the `openai`
/// provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Provider key, lowercase (e.g. `openai`).
    pub provider: String,
    /// Bare model name with the provider prefix stripped.
    pub model: String,
    /// API key; `None` means the endpoint must accept unauthenticated calls.
    pub api_key: Option<String>,
    /// Base URL including the version segment (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
}

/// Splits `"provider/model"` into its parts; bare names default to `openai`.
pub fn split_model(model: &str) -> (String, String) {
    match model.split_once('/') {
        Some((provider, name)) if !provider.is_empty() && !name.is_empty() => {
            (provider.to_lowercase(), name.to_string())
        }
        _ => ("openai".to_string(), model.to_string()),
    }
}

/// Resolves provider settings for a model string.
///
/// API key: `<PROVIDER>_API_KEY` (e.g. `OPENAI_API_KEY`). Base URL:
/// `OPENAI_BASE_URL` / `OPENAI_API_BASE` for openai, `<PROVIDER>_BASE_URL`
/// otherwise; `/v1` is appended when the override lacks it.
pub fn resolve_model(model: &str) -> ProviderSettings {
    let (provider, model) = split_model(model);
    let upper = provider.to_uppercase();
    let api_key = std::env::var(format!("{}_API_KEY", upper)).ok();

    let base_override = if provider == "openai" {
        std::env::var("OPENAI_BASE_URL")
            .or_else(|_| std::env::var("OPENAI_API_BASE"))
            .ok()
    } else {
        std::env::var(format!("{}_BASE_URL", upper)).ok()
    };
    let base_url = match base_override {
        Some(base) => normalize_base_url(&base),
        None => "https://api.openai.com/v1".to_string(),
    };

    ProviderSettings {
        provider,
        model,
        api_key,
        base_url,
    }
}

/// Default model for the hierarchical manager: `OPENAI_MODEL_NAME` or `gpt-4o`.
pub fn default_manager_model() -> String {
    std::env::var("OPENAI_MODEL_NAME").unwrap_or_else(|_| "gpt-4o".to_string())
}

/// Fails fast when a provider requires an API key and none resolved.
pub fn require_api_key(settings: &ProviderSettings) -> Result<String, RuntimeError> {
    settings.api_key.clone().ok_or_else(|| {
        RuntimeError::Config(format!(
            "missing API key for provider {} (set {}_API_KEY)",
            settings.provider,
            settings.provider.to_uppercase()
        ))
    })
}

/// Trims a trailing slash and appends `/v1` unless the URL already ends with it.
fn normalize_base_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/v1") {
        base.to_string()
    } else {
        format!("{}/v1", base)
    }
}
