//! Client configuration.
//!
//! Everything the engine would otherwise read from ambient state (backend
//! address, credentials, the signed-in user, where to keep local data) is
//! carried by a [`ClientConfig`] handed to the collaborators that need it.

use crate::persist::{FileStore, UserKey, MAX_PLAYED_STORIES};
use crate::typewriter::DEFAULT_TYPING_INTERVAL;
use fabula_api::StoryApi;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ENV_API_URL: &str = "FABULA_API_URL";
pub const ENV_TOKEN: &str = "FABULA_TOKEN";
pub const ENV_USER: &str = "FABULA_USER";
pub const ENV_DATA_DIR: &str = "FABULA_DATA_DIR";
pub const ENV_TYPING_MS: &str = "FABULA_TYPING_MS";

const DEFAULT_DATA_DIR: &str = ".fabula";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}")]
    InvalidValue { var: &'static str, value: String },
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL. Without one, only bundled stories are available.
    pub api_url: Option<String>,

    /// Bearer token for authenticated endpoints.
    pub token: Option<String>,

    /// Signed-in user identifier. `None` plays as guest.
    pub user: Option<String>,

    /// Directory for locally saved playthroughs.
    pub data_dir: PathBuf,

    /// Delay between revealed characters.
    pub typing_interval: Duration,

    /// Timeout for each backend request.
    pub request_timeout: Duration,

    /// Most recent playthroughs kept per user.
    pub history_cap: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            token: None,
            user: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            typing_interval: DEFAULT_TYPING_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            history_cap: MAX_PLAYED_STORIES,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `FABULA_*` variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let non_empty = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        config.api_url = non_empty(ENV_API_URL);
        config.token = non_empty(ENV_TOKEN);
        config.user = non_empty(ENV_USER);
        if let Some(dir) = non_empty(ENV_DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(ms) = non_empty(ENV_TYPING_MS) {
            let ms: u64 = ms.trim().parse().map_err(|_| ConfigError::InvalidValue {
                var: ENV_TYPING_MS,
                value: ms.clone(),
            })?;
            config.typing_interval = Duration::from_millis(ms);
        }
        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_typing_interval(mut self, interval: Duration) -> Self {
        self.typing_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_history_cap(mut self, cap: usize) -> Self {
        self.history_cap = cap;
        self
    }

    /// Backend client, when a base URL is configured.
    pub fn api(&self) -> Option<StoryApi> {
        let url = self.api_url.as_ref()?;
        let api = StoryApi::new(url.as_str()).with_timeout(self.request_timeout);
        Some(match &self.token {
            Some(token) => api.with_token(token.as_str()),
            None => api,
        })
    }

    pub fn user_key(&self) -> UserKey {
        self.user
            .as_deref()
            .map(UserKey::new)
            .unwrap_or_else(UserKey::guest)
    }

    /// File-backed store under the data directory.
    pub fn store(&self) -> FileStore {
        FileStore::new(&self.data_dir).with_capacity(self.history_cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new();
        assert_eq!(config.typing_interval, Duration::from_millis(18));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.history_cap, 50);
        assert!(config.api().is_none());
        assert_eq!(config.user_key(), UserKey::guest());
    }

    #[test]
    fn test_from_env_values() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://stories.example.com/"),
            (ENV_TOKEN, "secret"),
            (ENV_USER, "ana@example.com"),
            (ENV_DATA_DIR, "/tmp/fabula"),
            (ENV_TYPING_MS, "5"),
        ]))
        .unwrap();

        assert_eq!(config.typing_interval, Duration::from_millis(5));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/fabula"));
        assert_eq!(config.user_key().as_str(), "ana_example_com");
        assert_eq!(config.api().unwrap().base_url(), "https://stories.example.com");
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = ClientConfig::from_lookup(lookup(&[(ENV_API_URL, "  "), (ENV_USER, "")])).unwrap();
        assert!(config.api_url.is_none());
        assert!(config.user.is_none());
    }

    #[test]
    fn test_bad_typing_interval() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_TYPING_MS, "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == ENV_TYPING_MS));
    }
}
