//! Recorded audit fixtures
//!
//! A fixture captures one evaluator exchange together with enough of the
//! hosted document (element positions, viewport) to replay it offline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use prototrace_common::{Coords, Viewport};

use crate::boundary::ScriptedDocument;
use crate::error::{ReplayError, ReplayResult};
use crate::evaluator::RecordedEvaluator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    /// Name shown in reports
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// URL the prototype was served at
    #[serde(default)]
    pub url: Option<String>,

    /// Prototype markup
    #[serde(default)]
    pub document: String,

    #[serde(default)]
    pub viewport: Viewport,

    /// Element centres the document reports, keyed by descriptor
    #[serde(default)]
    pub elements: HashMap<String, Coords>,

    /// The document never answers coordinate lookups
    #[serde(default)]
    pub unresponsive: bool,

    /// Recorded evaluator audit body
    pub audit: serde_json::Value,

    /// Recorded remediation reply, if any
    #[serde(default)]
    pub remediated: Option<String>,
}

impl Fixture {
    /// Parse a fixture from YAML string
    pub fn from_yaml(yaml: &str) -> ReplayResult<Self> {
        serde_yaml::from_str(yaml).map_err(ReplayError::from)
    }

    /// Parse a fixture from a YAML or JSON file
    pub fn from_file(path: &Path) -> ReplayResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path.extension().map(|ext| ext == "json").unwrap_or(false);
        if is_json {
            serde_json::from_str(&content).map_err(ReplayError::from)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn evaluator(&self) -> ReplayResult<RecordedEvaluator> {
        let body = match &self.audit {
            serde_json::Value::String(raw) => raw.clone(),
            other => serde_json::to_string(other)?,
        };
        let evaluator = RecordedEvaluator::new(body);
        Ok(match &self.remediated {
            Some(reply) => evaluator.with_remediation(reply.clone()),
            None => evaluator,
        })
    }

    pub fn document_agent(&self) -> ScriptedDocument {
        let agent = ScriptedDocument::new(self.viewport).with_elements(self.elements.clone());
        if self.unresponsive {
            agent.silent()
        } else {
            agent
        }
    }

    pub fn validate(&self) -> ReplayResult<()> {
        if self.name.trim().is_empty() {
            return Err(ReplayError::Fixture("fixture has no name".to_string()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ReplayError::Fixture(format!(
                "{}: viewport must be non-empty",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Evaluator;

    const SIGNUP: &str = r##"
name: signup-form
description: Newsletter signup prototype
viewport:
  width: 1000
  height: 500
document: "<form><input id='email'><button id='submit'>Join</button></form>"
elements:
  "#email": { x: 500, y: 200 }
  "#submit": { x: 500, y: 260 }
audit:
  checkpoints:
    - category: Accessibility
      label: Input labels
      status: email input has no label
      passed: false
  testSequence:
    - type: TYPE
      action: Email
      logic: form coverage
      targetSelector: "#email"
      text: qa@example.com
      status: accepted
remediated: |
  ```html
  <form><label for='email'>Email</label></form>
  ```
"##;

    #[tokio::test]
    async fn test_parse_fixture() {
        let fixture = Fixture::from_yaml(SIGNUP).unwrap();
        fixture.validate().unwrap();
        assert_eq!(fixture.name, "signup-form");
        assert_eq!(fixture.viewport, Viewport::new(1000, 500));
        assert_eq!(fixture.elements["#submit"], Coords::new(500.0, 260.0));

        let evaluator = fixture.evaluator().unwrap();
        let result = evaluator.evaluate(&fixture.document, "about:srcdoc").await.unwrap();
        assert_eq!(result.checkpoints.len(), 1);
        assert_eq!(result.interaction_script.len(), 1);

        let fixed = evaluator.remediate(&fixture.document, &[]).await.unwrap();
        assert_eq!(fixed, "<form><label for='email'>Email</label></form>");
    }

    #[test]
    fn test_validate_rejects_empty_viewport() {
        let yaml = "name: x\nviewport: {width: 0, height: 10}\naudit: {}\n";
        let fixture = Fixture::from_yaml(yaml).unwrap();
        assert!(fixture.validate().is_err());
    }
}
