//! Environment-driven runtime configuration.
//!
//! The API key is read once from the process environment when a
//! [`TernConfig`] is constructed and held for agent builds. It is never
//! logged and never appears in `Debug` output or error strings.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Layered configuration for Tern.
///
/// Resolution order for API keys: explicit `set_api_key` > environment.
#[derive(Clone, Default)]
pub struct TernConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
}

impl fmt::Debug for TernConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .api_keys
            .read()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("TernConfig")
            .field("api_keys", &format_args!("<redacted: {}>", keys.join(", ")))
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

impl TernConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (`TERN_API_KEY`, `OPENAI_API_KEY`).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let config = Self::new();

        for env_var in ["TERN_API_KEY", "OPENAI_API_KEY"] {
            if let Ok(key) = std::env::var(env_var) {
                config.set_api_key("openai", key);
                break;
            }
        }

        if let Ok(url) = std::env::var("TERN_BASE_URL") {
            config.set_base_url("openai", url);
        }

        config
    }

    pub fn set_api_key(&self, provider: &str, key: String) {
        self.api_keys
            .write()
            .unwrap()
            .insert(provider.to_string(), key);
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.read().ok()?.get(provider).cloned()
    }

    pub fn set_base_url(&self, provider: &str, url: String) {
        self.base_urls
            .write()
            .unwrap()
            .insert(provider.to_string(), url);
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls.read().unwrap().get(provider).cloned()
    }

    /// Check if a provider has credentials configured.
    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }
}
