//! Process-wide configuration.
//!
//! Built once at start-up and handed to the [`VerificationMachine`] by
//! reference; there is no global configuration state.
//!
//! [`VerificationMachine`]: crate::machine::VerificationMachine

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::challenge::ChallengeTemplate;
use crate::error::{ConfigError, Result};

/// Default capacity for the verification event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration of the verification flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Challenge wording agreed with the external verifier.
    pub template: ChallengeTemplate,
    /// Copy the signature to the clipboard as soon as it is produced.
    pub auto_copy: bool,
    /// Capacity of the verification event broadcast channel.
    pub event_capacity: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            template: ChallengeTemplate::default(),
            auto_copy: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl VerifyConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading verify config");
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Set the challenge template.
    #[must_use]
    pub fn with_template(mut self, template: ChallengeTemplate) -> Self {
        self.template = template;
        self
    }

    /// Enable or disable automatic clipboard copy.
    #[must_use]
    pub const fn with_auto_copy(mut self, auto_copy: bool) -> Self {
        self.auto_copy = auto_copy;
        self
    }

    /// Check the configuration for values the flow cannot work with.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.template.validate()?;
        if self.event_capacity == 0 {
            return Err(ConfigError::invalid("event_capacity must be greater than 0"));
        }
        Ok(())
    }
}
