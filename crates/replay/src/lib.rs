//! Prototrace Replay Engine
//!
//! Drives simulated user interactions against an untrusted, sandboxed
//! prototype document and tracks the audit checkpoints an external
//! evaluator produced for it:
//! - Exchanges structured messages across an isolation boundary
//! - Correlates fire-and-forget coordinate lookups with their replies
//! - Replays interaction scripts with paced cursor and typing animation
//! - Stores findings and drives bulk remediation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AuditSession                           │
//! │    ├── run_audit() -> AuditOutcome                          │
//! │    ├── remediate() -> RemediationOutcome                    │
//! │    └── CheckpointStore (findings, selection, compliance)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PlaybackEngine                                             │
//! │    ├── CoordinateResolver ── GET_COORDS / COORDS_RESPONSE   │
//! │    │     └── CorrelationTable (actionId -> pending lookup)  │
//! │    └── ActionDispatcher ──── CLICK / TYPE                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Boundary (post / subscribe / viewport)                     │
//! │    └── hosted document (untrusted, may never answer)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod boundary;
pub mod checkpoints;
pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod fixture;
pub mod playback;
pub mod resolver;
pub mod session;

pub use boundary::{Boundary, ChannelBoundary, DocumentPort, ScriptedDocument};
pub use checkpoints::{CheckpointStore, CheckpointView};
pub use config::ReplayConfig;
pub use correlation::{BoundaryListener, CorrelationTable};
pub use error::{ReplayError, ReplayResult};
pub use evaluator::{Evaluator, HttpEvaluator, RecordedEvaluator};
pub use fixture::Fixture;
pub use playback::{PlaybackEngine, PlaybackEvent, PlaybackView, StepIndex, StepStatus};
pub use resolver::{CoordinateResolver, Resolution};
pub use session::{AuditOutcome, AuditSession, RemediationOutcome, SessionSnapshot};
