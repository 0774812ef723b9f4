//! Prototrace CLI
//!
//! Replays a recorded audit against a scripted stand-in for the hosted
//! prototype and writes an audit report.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use prototrace_common::OutboundMessage;
use prototrace_replay::boundary;
use prototrace_replay::{
    AuditOutcome, AuditSession, CheckpointView, Evaluator, Fixture, HttpEvaluator, PlaybackEvent,
    RemediationOutcome, ReplayConfig, SessionSnapshot,
};

#[derive(Parser)]
#[command(name = "prototrace")]
#[command(about = "Prototrace - interaction replay and audit checkpoints for UI prototypes")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one audit cycle from a recorded fixture
    Replay(ReplayArgs),

    /// Write the default configuration
    InitConfig {
        /// Destination file
        #[arg(default_value = "prototrace.toml")]
        path: PathBuf,
    },
}

#[derive(Args)]
struct ReplayArgs {
    /// Fixture file (YAML or JSON)
    #[arg(short, long)]
    fixture: PathBuf,

    /// Prototype markup to audit instead of the fixture's document
    #[arg(long)]
    document: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "prototrace.toml")]
    config: PathBuf,

    /// Evaluator base URL (overrides config; recorded responses otherwise)
    #[arg(long, env = "PROTOTRACE_EVALUATOR")]
    endpoint: Option<String>,

    /// Request fixes for failed checkpoints after playback
    #[arg(long)]
    fix: bool,

    /// Report directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,
}

#[derive(Serialize)]
struct AuditReport {
    fixture: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    audit: AuditOutcome,
    remediation: Option<RemediationOutcome>,
    session: SessionSnapshot,
    commands: Vec<OutboundMessage>,
    document: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Replay(args) => replay(args).await,
        Commands::InitConfig { path } => {
            ReplayConfig::default().save(&path)?;
            println!("✅ Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

async fn replay(args: ReplayArgs) -> anyhow::Result<()> {
    info!("Prototrace v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ReplayConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(endpoint) = args.endpoint {
        config.evaluator.endpoint = Some(endpoint);
    }

    let fixture = Fixture::from_file(&args.fixture)
        .with_context(|| format!("loading fixture {}", args.fixture.display()))?;
    fixture.validate()?;
    if let Some(url) = &fixture.url {
        config.session.url = url.clone();
    }

    let document = match &args.document {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading document {}", path.display()))?,
        None => fixture.document.clone(),
    };

    let evaluator: Arc<dyn Evaluator> = if config.evaluator.endpoint.is_some() {
        info!("Using remote evaluator");
        Arc::new(HttpEvaluator::new(&config.evaluator)?)
    } else {
        info!("Using recorded responses from {}", fixture.name);
        Arc::new(fixture.evaluator()?)
    };

    let (boundary, port) = boundary::channel(fixture.viewport);
    let document_handle = fixture.document_agent().spawn(port);
    let session = AuditSession::new(evaluator, Arc::new(boundary), document, config);

    let mut events = session.playback().subscribe();
    let progress = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            log_event(&event);
        }
    });

    let started_at = Utc::now();
    let audit = session.run_audit().await?;
    session.playback().wait_idle().await;

    let checkpoints = session.checkpoints();
    match checkpoints.view() {
        CheckpointView::Empty => println!("No checkpoints reported."),
        CheckpointView::List(list) => {
            for checkpoint in list {
                let mark = if checkpoint.passed { "✅" } else { "❌" };
                println!("{} {}", mark, checkpoint.summary());
            }
        }
        CheckpointView::Detail(checkpoint) => println!("{}", checkpoint.summary()),
    }
    if let Some(percent) = checkpoints.compliance_percent() {
        println!("Compliance: {}%", percent);
    }

    let remediation = if args.fix {
        let outcome = session.remediate().await?;
        match &outcome {
            RemediationOutcome::NothingToFix => println!("ℹ️  Nothing to fix"),
            RemediationOutcome::Remediated { findings } => {
                println!("✅ Remediated {} finding(s); re-run the audit to verify", findings)
            }
            RemediationOutcome::Unchanged { reason } => println!("⚠️  Fix attempt failed: {}", reason),
        }
        Some(outcome)
    } else {
        None
    };

    let report = AuditReport {
        fixture: fixture.name.clone(),
        started_at,
        finished_at: Utc::now(),
        audit,
        remediation,
        session: session.snapshot(),
        commands: document_handle.commands(),
        document: session.document(),
    };

    std::fs::create_dir_all(&args.output)?;
    let path = args.output.join("audit-report.json");
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    info!("Report written to {}", path.display());

    session.close();
    progress.abort();
    Ok(())
}

fn log_event(event: &PlaybackEvent) {
    match event {
        PlaybackEvent::Started { steps } => info!("Replaying {} step(s)", steps),
        PlaybackEvent::StepStarted { index } => info!("Step {}", index + 1),
        PlaybackEvent::CursorMoved { index, position, fallback } => {
            if *fallback {
                info!("Step {}: target not reported, using synthetic position", index + 1);
            }
            debug!("cursor at {:.1}%, {:.1}%", position.x, position.y);
        }
        PlaybackEvent::ClickStarted { index } => debug!("step {}: click", index + 1),
        PlaybackEvent::ClickEnded { .. } => {}
        PlaybackEvent::TypingProgress { revealed, .. } => debug!("typed {:?}", revealed),
        PlaybackEvent::TypingEnded { index } => debug!("step {}: typing done", index + 1),
        PlaybackEvent::Finished { steps } => info!("Playback finished after {} step(s)", steps),
        PlaybackEvent::Cancelled => info!("Playback cancelled"),
    }
}
