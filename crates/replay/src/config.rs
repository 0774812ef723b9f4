//! Replay configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Coordinate lookup timing
    pub resolver: ResolverConfig,

    /// Playback pacing
    pub playback: PlaybackConfig,

    /// Audit session behaviour
    pub session: SessionConfig,

    /// Remote evaluator
    pub evaluator: EvaluatorConfig,
}

/// Coordinate resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Delay before the lookup request is sent a second time
    pub retry_after_ms: u64,

    /// Deadline after which synthetic coordinates are used
    pub deadline_ms: u64,

    /// Lower bound of the fallback region, in pixels on both axes
    pub fallback_origin: f64,

    /// Width and height of the fallback region, in pixels
    pub fallback_span: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            retry_after_ms: 300,
            deadline_ms: 1000,
            fallback_origin: 50.0,
            fallback_span: 200.0,
        }
    }
}

impl ResolverConfig {
    pub fn retry_after(&self) -> Duration {
        Duration::from_millis(self.retry_after_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// Playback pacing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pause between moving the cursor and acting
    pub reaction_delay_ms: u64,

    /// How long the click indicator stays on
    pub click_hold_ms: u64,

    /// Interval between revealed characters while typing
    pub keystroke_interval_ms: u64,

    /// How long the typing indicator stays on after the text is sent
    pub type_hold_ms: u64,

    /// Pause after each step
    pub step_gap_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            reaction_delay_ms: 800,
            click_hold_ms: 500,
            keystroke_interval_ms: 30,
            type_hold_ms: 600,
            step_gap_ms: 1000,
        }
    }
}

impl PlaybackConfig {
    pub fn reaction_delay(&self) -> Duration {
        Duration::from_millis(self.reaction_delay_ms)
    }

    pub fn click_hold(&self) -> Duration {
        Duration::from_millis(self.click_hold_ms)
    }

    pub fn keystroke_interval(&self) -> Duration {
        Duration::from_millis(self.keystroke_interval_ms)
    }

    pub fn type_hold(&self) -> Duration {
        Duration::from_millis(self.type_hold_ms)
    }

    pub fn step_gap(&self) -> Duration {
        Duration::from_millis(self.step_gap_ms)
    }
}

/// Audit session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Wait between receiving the audit result and starting playback,
    /// so the rendered document can finish its load-time layout
    pub settle_delay_ms: u64,

    /// URL the prototype is served at, forwarded to the evaluator
    pub url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1000,
            url: "about:srcdoc".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Remote evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Base URL of the evaluator service (None = use recorded fixtures)
    pub endpoint: Option<String>,

    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 120,
        }
    }
}

impl ReplayConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
