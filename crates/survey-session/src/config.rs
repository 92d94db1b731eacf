use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

pub const DEBOUNCE_ENV: &str = "SURVEY_SAVE_DEBOUNCE_MS";

const DEFAULT_DEBOUNCE_MS: u64 = 1500;

/// Tunables of a session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Coalescing window for debounced saves.
    pub save_debounce_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl SessionConfig {
    /// Parses a JSON config object; blank input yields the defaults.
    pub fn parse(config_json: &str) -> Result<Self, SessionError> {
        if config_json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(config_json).map_err(SessionError::ConfigParse)
    }

    /// Defaults overridden by `SURVEY_SAVE_DEBOUNCE_MS` when it is set.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::default().with_env_lookup(|name| std::env::var(name).ok())
    }

    fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SessionError> {
        if let Some(raw) = lookup(DEBOUNCE_ENV) {
            self.save_debounce_ms = raw.trim().parse().map_err(|_| SessionError::ConfigEnv {
                name: DEBOUNCE_ENV,
                value: raw.clone(),
            })?;
        }
        Ok(self)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}
