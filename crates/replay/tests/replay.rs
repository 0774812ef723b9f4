//! End-to-end replay scenarios on a paused clock

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use prototrace_common::{Coords, InteractionStep, OutboundMessage, Viewport};
use prototrace_replay::boundary::{self, Boundary, DocumentHandle};
use prototrace_replay::config::{PlaybackConfig, ResolverConfig};
use prototrace_replay::dispatcher::ActionDispatcher;
use prototrace_replay::{
    AuditOutcome, AuditSession, BoundaryListener, CoordinateResolver, CorrelationTable, Fixture,
    PlaybackEngine, PlaybackEvent, RecordedEvaluator, RemediationOutcome, ReplayConfig, Resolution,
    ScriptedDocument, StepIndex, StepStatus,
};

const VIEWPORT: Viewport = Viewport { width: 1000, height: 500 };

const SIGNUP: &str = r##"{
    "checkpoints": [
        {"category": "Accessibility", "label": "Input labels", "status": "email has no label", "passed": false},
        {"category": "Functional", "label": "Submit", "status": "submits", "passed": true}
    ],
    "testSequence": [
        {"type": "TYPE", "action": "Enter email", "logic": "", "targetSelector": "#email", "text": "ab", "status": "accepted"},
        {"type": "CLICK", "action": "Subscribe", "logic": "", "targetSelector": "#submit", "status": "submitted"}
    ]
}"##;

fn drain(events: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn signup_document() -> ScriptedDocument {
    ScriptedDocument::new(VIEWPORT)
        .with_element("#email", Coords::new(500.0, 200.0))
        .with_element("#submit", Coords::new(500.0, 300.0))
}

fn session(evaluator: Arc<RecordedEvaluator>, document: ScriptedDocument) -> (AuditSession, DocumentHandle) {
    let (boundary, port) = boundary::channel(VIEWPORT);
    let handle = document.spawn(port);
    let session = AuditSession::new(evaluator, Arc::new(boundary), "<form></form>", ReplayConfig::default());
    (session, handle)
}

fn engine(document: ScriptedDocument) -> (PlaybackEngine, BoundaryListener, DocumentHandle) {
    let (boundary, port) = boundary::channel(VIEWPORT);
    let handle = document.spawn(port);
    let boundary: Arc<dyn Boundary> = Arc::new(boundary);
    let table = CorrelationTable::new();
    let listener = BoundaryListener::spawn(boundary.subscribe(), table.clone());
    let resolver = CoordinateResolver::new(boundary.clone(), table, ResolverConfig::default());
    let engine = PlaybackEngine::new(resolver, ActionDispatcher::new(boundary), PlaybackConfig::default());
    (engine, listener, handle)
}

#[tokio::test(start_paused = true)]
async fn steps_activate_in_order_then_finish() {
    let (session, handle) = session(Arc::new(RecordedEvaluator::new(SIGNUP)), signup_document());
    let mut events = session.playback().subscribe();

    let outcome = session.run_audit().await.unwrap();
    assert_eq!(outcome, AuditOutcome::Completed { checkpoints: 2, steps: 2 });
    session.playback().wait_idle().await;

    let events = drain(&mut events);
    let started: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            PlaybackEvent::StepStarted { index } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![0, 1]);
    assert_eq!(events.first(), Some(&PlaybackEvent::Started { steps: 2 }));
    assert_eq!(events.last(), Some(&PlaybackEvent::Finished { steps: 2 }));

    let revealed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            PlaybackEvent::TypingProgress { revealed, .. } => Some(revealed.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(revealed, vec!["", "a", "ab"]);

    let view = session.playback().view();
    assert!(!view.active);
    assert_eq!(view.step, StepIndex::Finished(2));
    assert_eq!(view.step_status(1), StepStatus::Complete);

    assert_eq!(
        handle.commands(),
        vec![
            OutboundMessage::Type {
                target_selector: "#email".to_string(),
                text: "ab".to_string(),
            },
            OutboundMessage::Click {
                target_selector: "#submit".to_string(),
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn cursor_tracks_reported_positions() {
    let (session, _handle) = session(Arc::new(RecordedEvaluator::new(SIGNUP)), signup_document());
    let mut events = session.playback().subscribe();

    session.run_audit().await.unwrap();
    session.playback().wait_idle().await;

    let moves: Vec<(f64, f64, bool)> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            PlaybackEvent::CursorMoved { position, fallback, .. } => Some((position.x, position.y, fallback)),
            _ => None,
        })
        .collect();
    assert_eq!(moves, vec![(50.0, 40.0, false), (50.0, 60.0, false)]);
}

#[tokio::test(start_paused = true)]
async fn silent_document_degrades_to_fallback_timing() {
    let (engine, _listener, handle) = engine(ScriptedDocument::new(VIEWPORT).silent());

    let started = Instant::now();
    assert!(engine.start(vec![InteractionStep::click("Submit", "#submit")]));
    engine.wait_idle().await;

    // deadline + reaction + click hold + step gap
    let elapsed = started.elapsed();
    assert_eq!(elapsed, Duration::from_millis(3300));
    assert!(elapsed <= Duration::from_millis(3600));

    assert_eq!(engine.current_step(), StepIndex::Finished(1));
    assert_eq!(engine.current_step().as_isize(), 1);
    assert_eq!(handle.lookups(), 2);
    assert_eq!(
        handle.commands(),
        vec![OutboundMessage::Click {
            target_selector: "#submit".to_string(),
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn empty_audit_starts_no_playback() {
    let evaluator = Arc::new(RecordedEvaluator::new(r#"{"checkpoints": [], "testSequence": []}"#));
    let (session, handle) = session(evaluator, signup_document());

    let outcome = session.run_audit().await.unwrap();
    assert_eq!(outcome, AuditOutcome::Completed { checkpoints: 0, steps: 0 });
    assert!(!session.playback().is_active());
    assert_eq!(session.playback().current_step(), StepIndex::NotStarted);
    assert_eq!(session.checkpoints().compliance_percent(), None);
    assert!(!session.can_remediate());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(handle.received().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_audit_is_treated_as_empty() {
    let evaluator = Arc::new(RecordedEvaluator::new("I could not evaluate this page."));
    let (session, _handle) = session(evaluator, signup_document());

    let outcome = session.run_audit().await.unwrap();
    assert_eq!(outcome, AuditOutcome::Completed { checkpoints: 0, steps: 0 });
    assert!(session.checkpoints().is_empty());
}

#[tokio::test(start_paused = true)]
async fn remediation_sends_only_failed_findings() {
    let evaluator = Arc::new(RecordedEvaluator::new(SIGNUP).with_remediation("```html\n<form><label>Email</label></form>\n```"));
    let (session, _handle) = session(evaluator.clone(), signup_document());

    session.run_audit().await.unwrap();
    session.playback().wait_idle().await;
    assert!(session.can_remediate());

    let outcome = session.remediate().await.unwrap();
    assert_eq!(outcome, RemediationOutcome::Remediated { findings: 1 });
    assert_eq!(
        evaluator.remediations(),
        vec![vec!["[Accessibility] Input labels: email has no label".to_string()]]
    );
    assert_eq!(session.document(), "<form><label>Email</label></form>");
}

#[tokio::test(start_paused = true)]
async fn nothing_to_fix_leaves_document_untouched() {
    let passing = r##"{
        "checkpoints": [{"category": "Functional", "label": "Submit", "status": "ok", "passed": true}],
        "testSequence": []
    }"##;
    let evaluator = Arc::new(RecordedEvaluator::new(passing).with_remediation("<p>rewritten</p>"));
    let (session, _handle) = session(evaluator.clone(), signup_document());

    session.run_audit().await.unwrap();
    let before = session.document();

    let outcome = session.remediate().await.unwrap();
    assert_eq!(outcome, RemediationOutcome::NothingToFix);
    assert_eq!(session.document().as_bytes(), before.as_bytes());
    assert!(evaluator.remediations().is_empty());
    assert!(!session.is_stale());
}

#[tokio::test(start_paused = true)]
async fn new_audit_resets_previous_run() {
    let evaluator = Arc::new(RecordedEvaluator::new(SIGNUP).with_latency(Duration::from_millis(500)));
    let document = signup_document().with_latency(Duration::from_millis(400));
    let (session, handle) = session(evaluator.clone(), document);
    let mut events = session.playback().subscribe();

    session.run_audit().await.unwrap();
    assert!(session.playback().is_active());
    assert!(session.select(0));

    // First lookup of the first run is still waiting on its reply.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.lookups(), 1);

    let probe = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(session.is_auditing());
        assert!(session.checkpoints().is_empty());
        assert!(session.script().is_empty());
        assert!(session.selected().is_none());
        assert!(!session.playback().is_active());
        assert_eq!(session.playback().current_step(), StepIndex::NotStarted);
    };
    let (outcome, ()) = tokio::join!(session.run_audit(), probe);
    assert_eq!(outcome.unwrap(), AuditOutcome::Completed { checkpoints: 2, steps: 2 });
    session.playback().wait_idle().await;

    let events = drain(&mut events);
    assert!(events.contains(&PlaybackEvent::Cancelled));
    let second_run: Vec<PlaybackEvent> = events
        .into_iter()
        .skip_while(|e| *e != PlaybackEvent::Cancelled)
        .collect();
    let started: Vec<usize> = second_run
        .iter()
        .filter_map(|e| match e {
            PlaybackEvent::StepStarted { index } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![0, 1]);
    // The stale reply from the first run never moved the cursor off-script.
    let fallbacks = second_run
        .iter()
        .filter(|e| matches!(e, PlaybackEvent::CursorMoved { fallback: true, .. }))
        .count();
    assert_eq!(fallbacks, 0);
    assert_eq!(evaluator.audits().len(), 2);
    assert_eq!(handle.commands().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn interleaved_lookups_resolve_independently() {
    let (boundary, mut port) = boundary::channel(VIEWPORT);
    let boundary: Arc<dyn Boundary> = Arc::new(boundary);
    let table = CorrelationTable::new();
    let _listener = BoundaryListener::spawn(boundary.subscribe(), table.clone());
    let resolver = CoordinateResolver::new(boundary, table.clone(), ResolverConfig::default());

    let serve = async {
        let mut pending = Vec::new();
        while pending.len() < 2 {
            if let Some(OutboundMessage::GetCoords { target_selector, action_id }) = port.recv().await {
                pending.push((target_selector, action_id));
            }
        }
        port.reply(json!({"type": "COORDS_RESPONSE", "actionId": "not-a-real-id", "coords": {"x": 1, "y": 1}}));
        for (selector, action_id) in pending.iter().rev() {
            let x = if selector == "#a" { 100.0 } else { 200.0 };
            port.reply(json!({"type": "COORDS_RESPONSE", "actionId": action_id, "coords": {"x": x, "y": x}}));
        }
    };

    let (a, b, ()) = tokio::join!(resolver.resolve("#a"), resolver.resolve("#b"), serve);
    assert_eq!(a, Resolution::Reported(Coords::new(100.0, 100.0)));
    assert_eq!(b, Resolution::Reported(Coords::new(200.0, 200.0)));
    assert!(table.is_empty());
}

#[tokio::test(start_paused = true)]
async fn recorded_fixture_replays_end_to_end() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/signup.yaml");
    let fixture = Fixture::from_file(&path).unwrap();
    fixture.validate().unwrap();

    let (boundary, port) = boundary::channel(fixture.viewport);
    let handle = fixture.document_agent().spawn(port);
    let session = AuditSession::new(
        Arc::new(fixture.evaluator().unwrap()),
        Arc::new(boundary),
        fixture.document.clone(),
        ReplayConfig::default(),
    );

    let outcome = session.run_audit().await.unwrap();
    assert_eq!(outcome, AuditOutcome::Completed { checkpoints: 4, steps: 2 });
    session.playback().wait_idle().await;
    assert_eq!(session.checkpoints().compliance_percent(), Some(50));
    assert_eq!(handle.commands().len(), 2);

    let outcome = session.remediate().await.unwrap();
    assert_eq!(outcome, RemediationOutcome::Remediated { findings: 2 });
    assert!(session.document().contains("<label for=\"email\">Email</label>"));
    assert!(!session.document().contains("```"));
}
