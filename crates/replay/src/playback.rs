//! Playback engine
//!
//! Replays an interaction script one step at a time, the way a person
//! would: find the element, move the cursor there, pause, act, pause.
//!
//! ```text
//!            start(script)                   last step done
//!   Idle ─────────────────────▶ Running ─────────────────────▶ Idle(Finished)
//!    ▲                             │
//!    └──────── reset() ────────────┘
//!
//!   per step i:
//!     step = At(i) → resolve target → cursor → reaction delay
//!       CLICK: clicking → dispatch → hold → !clicking
//!       TYPE:  typing → reveal text char by char → dispatch → hold → !typing
//!     → step gap
//! ```
//!
//! All pacing goes through `tokio::time`, so tests drive the engine on a
//! paused clock.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use prototrace_common::{CursorPosition, InteractionStep, StepKind};

use crate::config::PlaybackConfig;
use crate::dispatcher::ActionDispatcher;
use crate::resolver::CoordinateResolver;

/// Position of the engine within its script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum StepIndex {
    /// Nothing started since the last reset
    #[default]
    NotStarted,
    /// Step is live
    At(usize),
    /// Every step ran; carries the script length
    Finished(usize),
}

impl StepIndex {
    /// Numeric form: -1 before start, the live index, or the script
    /// length once finished
    pub fn as_isize(&self) -> isize {
        match self {
            StepIndex::NotStarted => -1,
            StepIndex::At(i) | StepIndex::Finished(i) => *i as isize,
        }
    }
}

/// Observable playback state
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlaybackView {
    pub active: bool,
    pub step: StepIndex,
    pub cursor: CursorPosition,
    pub clicking: bool,
    pub typing: bool,
    pub typed_text: String,
}

/// Display state of one step in the interaction log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Live,
    Complete,
    Pending,
    Hidden,
}

impl PlaybackView {
    pub fn step_status(&self, index: usize) -> StepStatus {
        let current = self.step.as_isize();
        let index = index as isize;
        if index == current && self.active {
            StepStatus::Live
        } else if index < current || (index == current && !self.active) {
            StepStatus::Complete
        } else if self.active {
            StepStatus::Pending
        } else {
            StepStatus::Hidden
        }
    }
}

/// Progress notifications, delivered in order to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started { steps: usize },
    StepStarted { index: usize },
    CursorMoved { index: usize, position: CursorPosition, fallback: bool },
    ClickStarted { index: usize },
    ClickEnded { index: usize },
    TypingProgress { index: usize, revealed: String },
    TypingEnded { index: usize },
    Finished { steps: usize },
    Cancelled,
}

/// Progressive reveal of typed text: the empty prefix, then one more
/// character each step, ending with the full text. Consumed once.
pub struct TypingReveal {
    text: String,
    end: Option<usize>,
}

impl TypingReveal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end: Some(0),
        }
    }
}

impl Iterator for TypingReveal {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let end = self.end?;
        let prefix = self.text[..end].to_string();
        self.end = self.text[end..]
            .chars()
            .next()
            .map(|c| end + c.len_utf8());
        Some(prefix)
    }
}

struct EngineInner {
    resolver: CoordinateResolver,
    dispatcher: ActionDispatcher,
    config: PlaybackConfig,
    view: watch::Sender<PlaybackView>,
    script: Mutex<Arc<[InteractionStep]>>,
    observers: Mutex<Vec<mpsc::UnboundedSender<PlaybackEvent>>>,
    generation: AtomicU64,
}

impl EngineInner {
    /// Apply `f` to the view unless the run was superseded.
    ///
    /// The generation is checked under the view's write lock, so a
    /// concurrent `reset` either lands first and the write is skipped, or
    /// lands after and overwrites it.
    fn update(&self, generation: u64, f: impl FnOnce(&mut PlaybackView)) -> Option<()> {
        let mut applied = false;
        self.view.send_if_modified(|view| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            f(view);
            applied = true;
            true
        });
        applied.then_some(())
    }

    fn emit(&self, event: PlaybackEvent) {
        self.observers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn play(&self, generation: u64, script: Arc<[InteractionStep]>) -> Option<()> {
        info!("Playback started: {} step(s)", script.len());

        for (index, step) in script.iter().enumerate() {
            self.update(generation, |v| v.step = StepIndex::At(index))?;
            self.emit(PlaybackEvent::StepStarted { index });
            debug!("step {}: {} {}", index + 1, step.kind, step.action_label);

            self.run_step(generation, index, step).await?;
            sleep(self.config.step_gap()).await;
        }

        let steps = script.len();
        self.update(generation, |v| {
            v.active = false;
            v.step = StepIndex::Finished(steps);
        })?;
        self.emit(PlaybackEvent::Finished { steps });
        info!("Playback finished");
        Some(())
    }

    async fn run_step(&self, generation: u64, index: usize, step: &InteractionStep) -> Option<()> {
        let resolution = self.resolver.resolve(&step.target_descriptor).await;
        if let Some(position) = self.resolver.viewport().to_percent(resolution.coords()) {
            self.update(generation, |v| v.cursor = position)?;
            self.emit(PlaybackEvent::CursorMoved {
                index,
                position,
                fallback: resolution.is_fallback(),
            });
        }

        sleep(self.config.reaction_delay()).await;

        match step.kind {
            StepKind::Click => {
                self.update(generation, |v| v.clicking = true)?;
                self.emit(PlaybackEvent::ClickStarted { index });
                self.dispatcher.dispatch_click(&step.target_descriptor);
                sleep(self.config.click_hold()).await;
                self.update(generation, |v| v.clicking = false)?;
                self.emit(PlaybackEvent::ClickEnded { index });
            }
            StepKind::Type => {
                self.update(generation, |v| v.typing = true)?;
                for revealed in TypingReveal::new(step.text()) {
                    self.update(generation, |v| v.typed_text = revealed.clone())?;
                    self.emit(PlaybackEvent::TypingProgress { index, revealed });
                    sleep(self.config.keystroke_interval()).await;
                }
                self.dispatcher.dispatch_type(&step.target_descriptor, step.text());
                sleep(self.config.type_hold()).await;
                self.update(generation, |v| {
                    v.typing = false;
                    v.typed_text.clear();
                })?;
                self.emit(PlaybackEvent::TypingEnded { index });
            }
        }
        Some(())
    }
}

/// Sequential, cancellable replay of interaction scripts
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
    run: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    pub fn new(
        resolver: CoordinateResolver,
        dispatcher: ActionDispatcher,
        config: PlaybackConfig,
    ) -> Self {
        let (view, _) = watch::channel(PlaybackView::default());
        Self {
            inner: Arc::new(EngineInner {
                resolver,
                dispatcher,
                config,
                view,
                script: Mutex::new(Arc::from(Vec::new())),
                observers: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
            }),
            run: Mutex::new(None),
        }
    }

    /// Begin replaying `script`, cancelling any run in progress.
    ///
    /// Returns false (and changes nothing) for an empty script.
    pub fn start(&self, script: Vec<InteractionStep>) -> bool {
        if script.is_empty() {
            return false;
        }
        self.reset();

        let script: Arc<[InteractionStep]> = Arc::from(script);
        let steps = script.len();
        let generation = self.inner.generation.load(Ordering::SeqCst);
        *self.inner.script.lock() = script.clone();
        self.inner.view.send_modify(|v| v.active = true);
        self.inner.emit(PlaybackEvent::Started { steps });

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            if inner.play(generation, script).await.is_none() {
                debug!("superseded playback run exited");
            }
        });
        *self.run.lock() = Some(task);
        true
    }

    /// Force the engine back to idle, discarding any in-flight step
    pub fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.run.lock().take() {
            if !task.is_finished() {
                task.abort();
                info!("Playback cancelled");
                self.inner.emit(PlaybackEvent::Cancelled);
            }
        }
        *self.inner.script.lock() = Arc::from(Vec::new());
        self.inner.view.send_replace(PlaybackView::default());
    }

    pub fn view(&self) -> PlaybackView {
        self.inner.view.borrow().clone()
    }

    /// Receiver that observes every view change
    pub fn watch(&self) -> watch::Receiver<PlaybackView> {
        self.inner.view.subscribe()
    }

    /// Ordered stream of progress events from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.observers.lock().push(tx);
        rx
    }

    pub fn is_active(&self) -> bool {
        self.inner.view.borrow().active
    }

    pub fn current_step(&self) -> StepIndex {
        self.inner.view.borrow().step
    }

    /// Steps of the current (or last finished) run
    pub fn script(&self) -> Arc<[InteractionStep]> {
        self.inner.script.lock().clone()
    }

    pub fn step_status(&self, index: usize) -> StepStatus {
        self.inner.view.borrow().step_status(index)
    }

    /// Resolve once the engine is idle
    pub async fn wait_idle(&self) {
        let mut rx = self.watch();
        // The sender lives in `inner`, which outlives this borrow.
        let _ = rx.wait_for(|v| !v.active).await;
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        if let Some(task) = self.run.lock().take() {
            task.abort();
        }
    }
}
