//! Audit session controller
//!
//! Owns the prototype document, the findings, and the playback engine for
//! one hosted document. Runs audit cycles and bulk remediation against the
//! external evaluator.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use prototrace_common::{Checkpoint, InteractionStep};

use crate::boundary::Boundary;
use crate::checkpoints::CheckpointStore;
use crate::config::ReplayConfig;
use crate::correlation::{BoundaryListener, CorrelationTable};
use crate::dispatcher::ActionDispatcher;
use crate::error::{ReplayError, ReplayResult};
use crate::evaluator::Evaluator;
use crate::playback::{PlaybackEngine, PlaybackView};
use crate::resolver::CoordinateResolver;

/// How an audit request ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Evaluator answered; playback started if `steps > 0`
    Completed { checkpoints: usize, steps: usize },
    /// Evaluator failed; nothing stored, nothing played
    Failed { reason: String },
}

/// How a remediation request ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemediationOutcome {
    /// No failed findings; document untouched
    NothingToFix,
    /// Document replaced with the evaluator's fix
    Remediated { findings: usize },
    /// Evaluator failed; document untouched
    Unchanged { reason: String },
}

#[derive(Debug, Default)]
struct SessionState {
    document: String,
    checkpoints: CheckpointStore,
    script: Vec<InteractionStep>,
    auditing: bool,
    fixing: bool,
    stale: bool,
}

#[derive(Debug, Clone, Copy)]
enum Activity {
    Auditing,
    Fixing,
}

/// Clears its activity flag when the request finishes or is dropped
struct ActivityGuard {
    state: Arc<Mutex<SessionState>>,
    activity: Activity,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        match self.activity {
            Activity::Auditing => state.auditing = false,
            Activity::Fixing => state.fixing = false,
        }
    }
}

/// Serializable view of the whole session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub auditing: bool,
    pub fixing: bool,
    pub stale: bool,
    pub playback: PlaybackView,
    pub script: Vec<InteractionStep>,
    pub checkpoints: Vec<Checkpoint>,
    pub selected: Option<Checkpoint>,
    pub compliance_percent: Option<u8>,
}

pub struct AuditSession {
    evaluator: Arc<dyn Evaluator>,
    boundary: Arc<dyn Boundary>,
    config: ReplayConfig,
    engine: PlaybackEngine,
    table: CorrelationTable,
    listener: Mutex<Option<BoundaryListener>>,
    state: Arc<Mutex<SessionState>>,
}

impl AuditSession {
    pub fn new(
        evaluator: Arc<dyn Evaluator>,
        boundary: Arc<dyn Boundary>,
        document: impl Into<String>,
        config: ReplayConfig,
    ) -> Self {
        let table = CorrelationTable::new();
        let resolver = CoordinateResolver::new(boundary.clone(), table.clone(), config.resolver.clone());
        let dispatcher = ActionDispatcher::new(boundary.clone());
        let engine = PlaybackEngine::new(resolver, dispatcher, config.playback.clone());

        Self {
            evaluator,
            boundary,
            config,
            engine,
            table,
            listener: Mutex::new(None),
            state: Arc::new(Mutex::new(SessionState {
                document: document.into(),
                ..Default::default()
            })),
        }
    }

    fn begin(&self, activity: Activity) -> ReplayResult<ActivityGuard> {
        let mut state = self.state.lock();
        // Audits and fixes exclude each other as well as themselves.
        if state.auditing {
            return Err(ReplayError::AuditInProgress);
        }
        if state.fixing {
            return Err(ReplayError::RemediationInProgress);
        }
        match activity {
            Activity::Auditing => state.auditing = true,
            Activity::Fixing => state.fixing = true,
        }
        Ok(ActivityGuard {
            state: self.state.clone(),
            activity,
        })
    }

    /// Replace the boundary subscription; the old one's pending lookups
    /// are discarded with it
    fn renew_listener(&self) {
        let mut listener = self.listener.lock();
        drop(listener.take());
        *listener = Some(BoundaryListener::spawn(self.boundary.subscribe(), self.table.clone()));
    }

    /// Run one audit cycle against the current document.
    ///
    /// Evaluator failures are logged and reported through the outcome;
    /// only an overlapping audit or fix is an error.
    pub async fn run_audit(&self) -> ReplayResult<AuditOutcome> {
        let _guard = self.begin(Activity::Auditing)?;

        self.engine.reset();
        self.renew_listener();
        let document = {
            let mut state = self.state.lock();
            state.checkpoints.clear();
            state.script.clear();
            state.document.clone()
        };

        info!("Requesting audit ({} bytes)", document.len());
        let result = match self.evaluator.evaluate(&document, &self.config.session.url).await {
            Ok(result) => result,
            Err(e) => {
                error!("Audit failed: {}", e);
                return Ok(AuditOutcome::Failed { reason: e.to_string() });
            }
        };

        let checkpoints = result.checkpoints.len();
        let steps = result.interaction_script.len();
        {
            let mut state = self.state.lock();
            state.checkpoints.replace(result.checkpoints);
            state.script = result.interaction_script.clone();
            state.stale = false;
        }
        info!("Audit returned {} checkpoint(s), {} step(s)", checkpoints, steps);

        if steps > 0 {
            sleep(self.config.session.settle_delay()).await;
            self.engine.start(result.interaction_script);
        }

        Ok(AuditOutcome::Completed { checkpoints, steps })
    }

    /// Ask the evaluator to fix every failed finding and adopt its
    /// document. Failures leave the document as it was.
    pub async fn remediate(&self) -> ReplayResult<RemediationOutcome> {
        let findings = self.state.lock().checkpoints.failed_summaries();
        if findings.is_empty() {
            return Ok(RemediationOutcome::NothingToFix);
        }
        if self.engine.is_active() {
            return Err(ReplayError::PlaybackActive);
        }
        let _guard = self.begin(Activity::Fixing)?;

        let document = self.state.lock().document.clone();
        info!("Requesting fixes for {} finding(s)", findings.len());
        match self.evaluator.remediate(&document, &findings).await {
            Ok(fixed) if fixed.trim().is_empty() => {
                warn!("Fix attempt returned an empty document; keeping the current one");
                Ok(RemediationOutcome::Unchanged {
                    reason: "remediation returned no document".to_string(),
                })
            }
            Ok(fixed) => {
                let mut state = self.state.lock();
                state.document = fixed;
                state.stale = true;
                info!("Document remediated; re-run the audit to verify");
                Ok(RemediationOutcome::Remediated { findings: findings.len() })
            }
            Err(e) => {
                warn!("Fix attempt failed: {}", e);
                Ok(RemediationOutcome::Unchanged { reason: e.to_string() })
            }
        }
    }

    pub fn document(&self) -> String {
        self.state.lock().document.clone()
    }

    /// Swap in a new document between audit runs
    pub fn set_document(&self, document: impl Into<String>) -> ReplayResult<()> {
        let mut state = self.state.lock();
        if state.auditing {
            return Err(ReplayError::AuditInProgress);
        }
        if state.fixing {
            return Err(ReplayError::RemediationInProgress);
        }
        if self.engine.is_active() {
            return Err(ReplayError::PlaybackActive);
        }
        state.document = document.into();
        state.stale = true;
        Ok(())
    }

    pub fn playback(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn script(&self) -> Vec<InteractionStep> {
        self.state.lock().script.clone()
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        self.state.lock().checkpoints.clone()
    }

    pub fn select(&self, index: usize) -> bool {
        self.state.lock().checkpoints.select(index)
    }

    pub fn clear_selection(&self) {
        self.state.lock().checkpoints.clear_selection();
    }

    pub fn selected(&self) -> Option<Checkpoint> {
        self.state.lock().checkpoints.selected().cloned()
    }

    pub fn is_auditing(&self) -> bool {
        self.state.lock().auditing
    }

    pub fn is_fixing(&self) -> bool {
        self.state.lock().fixing
    }

    /// Document changed since the findings were produced
    pub fn is_stale(&self) -> bool {
        self.state.lock().stale
    }

    /// A new audit may be started
    pub fn can_audit(&self) -> bool {
        !self.is_auditing()
    }

    /// Remediation is worth offering
    pub fn can_remediate(&self) -> bool {
        let state = self.state.lock();
        state.checkpoints.has_failures() && !state.fixing && !state.auditing && !self.engine.is_active()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        SessionSnapshot {
            auditing: state.auditing,
            fixing: state.fixing,
            stale: state.stale,
            playback: self.engine.view(),
            script: state.script.clone(),
            checkpoints: state.checkpoints.checkpoints().to_vec(),
            selected: state.checkpoints.selected().cloned(),
            compliance_percent: state.checkpoints.compliance_percent(),
        }
    }

    /// Stop playback and drop the boundary subscription
    pub fn close(&self) {
        self.engine.reset();
        drop(self.listener.lock().take());
    }
}

impl Drop for AuditSession {
    fn drop(&mut self) {
        self.close();
    }
}
