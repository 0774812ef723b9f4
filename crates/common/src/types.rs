//! Core audit types for Prototrace

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Kind of simulated interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    #[serde(rename = "CLICK", alias = "click", alias = "Click")]
    Click,
    #[serde(rename = "TYPE", alias = "type", alias = "Type")]
    Type,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Click => write!(f, "CLICK"),
            StepKind::Type => write!(f, "TYPE"),
        }
    }
}

/// One simulated user action in an interaction script.
///
/// Field names on the wire follow the evaluator's response schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionStep {
    #[serde(rename = "type")]
    pub kind: StepKind,

    /// Short label of the element being exercised
    #[serde(rename = "action")]
    pub action_label: String,

    /// Why the evaluator wants this step run
    #[serde(rename = "logic", default)]
    pub rationale: String,

    /// Selector or free-text hint the hosted document resolves to an element
    #[serde(rename = "targetSelector")]
    pub target_descriptor: String,

    /// Text to enter for `Type` steps
    #[serde(rename = "text", default, skip_serializing_if = "Option::is_none")]
    pub typed_text: Option<String>,

    #[serde(rename = "status", default)]
    pub success_criterion: String,
}

impl InteractionStep {
    pub fn click(action_label: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: StepKind::Click,
            action_label: action_label.into(),
            rationale: String::new(),
            target_descriptor: target.into(),
            typed_text: None,
            success_criterion: String::new(),
        }
    }

    pub fn type_text(
        action_label: impl Into<String>,
        target: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: StepKind::Type,
            action_label: action_label.into(),
            rationale: String::new(),
            target_descriptor: target.into(),
            typed_text: Some(text.into()),
            success_criterion: String::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    /// Text to type, empty for clicks or when the evaluator omitted it
    pub fn text(&self) -> &str {
        self.typed_text.as_deref().unwrap_or_default()
    }
}

/// Audit layer a checkpoint belongs to.
///
/// Layers outside the known four are kept verbatim as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CheckpointCategory {
    Accessibility,
    Functional,
    Structural,
    UiUx,
    Other(String),
}

impl CheckpointCategory {
    pub fn as_str(&self) -> &str {
        match self {
            CheckpointCategory::Accessibility => "Accessibility",
            CheckpointCategory::Functional => "Functional",
            CheckpointCategory::Structural => "Structural",
            CheckpointCategory::UiUx => "UI/UX",
            CheckpointCategory::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, CheckpointCategory::Other(_))
    }
}

impl FromStr for CheckpointCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let category = match s.trim().to_lowercase().as_str() {
            "accessibility" => CheckpointCategory::Accessibility,
            "functional" => CheckpointCategory::Functional,
            "structural" => CheckpointCategory::Structural,
            "ui/ux" | "uiux" | "ux" => CheckpointCategory::UiUx,
            _ => CheckpointCategory::Other(s.trim().to_string()),
        };
        Ok(category)
    }
}

impl From<String> for CheckpointCategory {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(category) => category,
            Err(never) => match never {},
        }
    }
}

impl From<CheckpointCategory> for String {
    fn from(category: CheckpointCategory) -> Self {
        match category {
            CheckpointCategory::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CheckpointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub category: CheckpointCategory,
    pub label: String,
    pub status: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Checkpoint {
    /// One-line description handed to the evaluator when asking for fixes
    pub fn summary(&self) -> String {
        format!("[{}] {}: {}", self.category, self.label, self.status)
    }
}

/// What the external evaluator returns for one audit request.
///
/// Both sequences are required; a body missing either one is not an
/// `AuditResult` at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub checkpoints: Vec<Checkpoint>,

    #[serde(rename = "testSequence", alias = "interactionScript")]
    pub interaction_script: Vec<InteractionStep>,
}

impl AuditResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty() && self.interaction_script.is_empty()
    }

    /// Parse from a JSON body
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse from a YAML document (recorded fixtures)
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: serde_json::Value = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::InvalidMessage("audit result is not an object".to_string()))?;
        if !object.contains_key("checkpoints") {
            return Err(Error::IncompleteAudit("checkpoints"));
        }
        if !object.contains_key("testSequence") && !object.contains_key("interactionScript") {
            return Err(Error::IncompleteAudit("testSequence"));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Pixel position inside the hosted document's viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
}

impl Coords {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rendered size of the hosted document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Express a pixel position as a percentage of this viewport.
    ///
    /// Returns `None` for a viewport that has not been laid out yet.
    pub fn to_percent(&self, coords: Coords) -> Option<CursorPosition> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(CursorPosition {
            x: coords.x / f64::from(self.width) * 100.0,
            y: coords.y / f64::from(self.height) * 100.0,
        })
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

/// Overlay cursor position in percent of the viewport
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl Default for CursorPosition {
    fn default() -> Self {
        Self { x: 50.0, y: 50.0 }
    }
}
