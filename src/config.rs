//! Configuration types for the call engine.

use serde::{Deserialize, Serialize};

/// Top-level configuration for a call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Dialogue backend connection settings.
    pub backend: BackendConfig,
    /// Voice parameters applied to every synthesized utterance.
    pub voice: VoiceConfig,
    /// Fixed delays driving turn advancement and silence recovery.
    pub timing: TimingConfig,
}

/// Dialogue backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the dialogue backend.
    pub base_url: String,
    /// Route for session bootstrap.
    pub session_path: String,
    /// Route for turn exchange.
    pub respond_path: String,
    /// Request timeout in milliseconds (`None` = wait indefinitely).
    pub request_timeout_ms: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_owned(),
            session_path: "/api/agent/session".to_owned(),
            respond_path: "/api/agent/respond".to_owned(),
            request_timeout_ms: None,
        }
    }
}

/// Voice parameters attached to every synthesized utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// BCP-47 language tag for synthesis and recognition.
    pub lang: String,
    /// Playback rate multiplier.
    pub rate: f32,
    /// Pitch multiplier.
    pub pitch: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            lang: "en-US".to_owned(),
            rate: 1.01,
            pitch: 1.05,
        }
    }
}

/// Fixed delays used by the turn-taking loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Delay in ms between enqueuing agent speech and arming the listener.
    ///
    /// Deliberately decoupled from playback completion: capture may open
    /// while the agent is still speaking (barge-in).
    pub listen_arm_delay_ms: u64,
    /// Delay in ms before retrying capture after a silent attempt.
    pub silence_retry_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            listen_arm_delay_ms: 400,
            silence_retry_delay_ms: 500,
        }
    }
}

impl CallConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::CallError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CallError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
