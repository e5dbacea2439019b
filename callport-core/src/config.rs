use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings of a [`crate::root::Root`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RootConfig {
    /// Base path stripped from request paths before they are matched.
    pub webpath: String,
    /// Include the error chain of server faults in their `debuginfo`.
    pub debug: bool,
    /// Query parameter that forces a protocol by name.
    pub protocol_param: String,
    /// Wrap results in a `result` member.
    pub nest_result: bool,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            webpath: String::new(),
            debug: false,
            protocol_param: "_protocol".to_string(),
            nest_result: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

impl RootConfig {
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn with_webpath(mut self, webpath: impl Into<String>) -> Self {
        self.webpath = webpath.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = RootConfig::from_json(r#"{"webpath": "/api", "debug": true}"#).unwrap();

        assert_eq!(config.webpath, "/api");
        assert!(config.debug);
        assert_eq!(config.protocol_param, "_protocol");
        assert!(config.nest_result);
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(matches!(
            RootConfig::from_json(r#"{"debug": "sometimes"}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_files_are_reported() {
        assert!(matches!(
            RootConfig::load("/nonexistent/callport.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
