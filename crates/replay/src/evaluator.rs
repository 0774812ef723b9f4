//! External evaluator interface and adapters
//!
//! The evaluator produces the audit (findings plus an interaction script)
//! and remediated markup. It is a slow, fallible, external collaborator;
//! the session only ever talks to it through [`Evaluator`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use prototrace_common::AuditResult;

use crate::config::EvaluatorConfig;
use crate::error::{ReplayError, ReplayResult};

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Audit `document`, served at `url`
    async fn evaluate(&self, document: &str, url: &str) -> ReplayResult<AuditResult>;

    /// Produce a corrected document addressing `findings`
    async fn remediate(&self, document: &str, findings: &[String]) -> ReplayResult<String>;
}

/// Decode an evaluator audit body. Anything unusable becomes the empty
/// result rather than an error.
pub fn parse_audit_response(text: &str) -> AuditResult {
    let body = fenced_block(text).unwrap_or_else(|| text.trim());
    if body.is_empty() {
        return AuditResult::empty();
    }
    match AuditResult::from_json(body) {
        Ok(result) => result,
        Err(e) => {
            warn!("Discarding malformed audit response: {}", e);
            AuditResult::empty()
        }
    }
}

static HTML_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```html\n?(.*?)\n?```").expect("valid fence pattern"));
static ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[a-zA-Z]*\n?(.*?)\n?```").expect("valid fence pattern"));

fn fenced_block(text: &str) -> Option<&str> {
    HTML_FENCE
        .captures(text)
        .or_else(|| ANY_FENCE.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Pull the document out of a remediation reply: the first fenced block
/// (preferring one tagged `html`), else the whole reply
pub fn extract_document(text: &str) -> String {
    fenced_block(text).unwrap_or_else(|| text.trim()).to_string()
}

#[derive(Serialize)]
struct EvaluateRequest<'a> {
    document: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
struct RemediateRequest<'a> {
    document: &'a str,
    findings: &'a [String],
}

/// Evaluator reached over HTTP.
///
/// `POST {endpoint}/evaluate` and `POST {endpoint}/remediate` with JSON
/// bodies; responses are raw model text.
pub struct HttpEvaluator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEvaluator {
    pub fn new(config: &EvaluatorConfig) -> ReplayResult<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ReplayError::EvaluatorNotConfigured("no endpoint set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> ReplayResult<String> {
        let url = format!("{}/{}", self.endpoint, path);
        debug!("POST {}", url);
        let resp = self.client.post(&url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ReplayError::EvaluatorStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl Evaluator for HttpEvaluator {
    async fn evaluate(&self, document: &str, url: &str) -> ReplayResult<AuditResult> {
        let text = self.post("evaluate", &EvaluateRequest { document, url }).await?;
        Ok(parse_audit_response(&text))
    }

    async fn remediate(&self, document: &str, findings: &[String]) -> ReplayResult<String> {
        let text = self
            .post("remediate", &RemediateRequest { document, findings })
            .await?;
        let fixed = extract_document(&text);
        if fixed.is_empty() {
            return Err(ReplayError::Evaluator("remediation returned no document".to_string()));
        }
        Ok(fixed)
    }
}

/// Evaluator backed by recorded responses.
///
/// Replays a captured audit body and remediation reply, optionally after a
/// delay, and remembers what it was asked.
pub struct RecordedEvaluator {
    audit: Option<String>,
    remediated: Option<String>,
    latency: Duration,
    audits: Mutex<Vec<String>>,
    remediations: Mutex<Vec<Vec<String>>>,
}

impl RecordedEvaluator {
    /// Serve `audit` (raw evaluator body) for every evaluation
    pub fn new(audit: impl Into<String>) -> Self {
        Self {
            audit: Some(audit.into()),
            remediated: None,
            latency: Duration::ZERO,
            audits: Mutex::new(Vec::new()),
            remediations: Mutex::new(Vec::new()),
        }
    }

    pub fn from_result(result: &AuditResult) -> ReplayResult<Self> {
        Ok(Self::new(serde_json::to_string(result)?))
    }

    /// Every call fails
    pub fn unavailable() -> Self {
        Self {
            audit: None,
            ..Self::new(String::new())
        }
    }

    pub fn with_remediation(mut self, document: impl Into<String>) -> Self {
        self.remediated = Some(document.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Documents submitted for evaluation
    pub fn audits(&self) -> Vec<String> {
        self.audits.lock().clone()
    }

    /// Finding lists submitted for remediation
    pub fn remediations(&self) -> Vec<Vec<String>> {
        self.remediations.lock().clone()
    }
}

#[async_trait]
impl Evaluator for RecordedEvaluator {
    async fn evaluate(&self, document: &str, _url: &str) -> ReplayResult<AuditResult> {
        self.audits.lock().push(document.to_string());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let body = self
            .audit
            .as_deref()
            .ok_or_else(|| ReplayError::Evaluator("no recorded audit".to_string()))?;
        Ok(parse_audit_response(body))
    }

    async fn remediate(&self, _document: &str, findings: &[String]) -> ReplayResult<String> {
        self.remediations.lock().push(findings.to_vec());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let reply = self
            .remediated
            .as_deref()
            .ok_or_else(|| ReplayError::Evaluator("no recorded remediation".to_string()))?;
        Ok(extract_document(reply))
    }
}
