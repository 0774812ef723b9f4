//! Isolation boundary between the controller and the hosted document
//!
//! The hosted prototype is untrusted. Everything that crosses the boundary
//! is a structured message: commands go out through [`Boundary::post`],
//! replies come back as raw JSON on listener subscriptions. Nothing here
//! waits for an acknowledgment.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use prototrace_common::{Coords, OutboundMessage, Viewport};

use crate::error::{ReplayError, ReplayResult};

/// Raw inbound messages for one listener
pub type Inbound = mpsc::UnboundedReceiver<serde_json::Value>;

/// Controller side of the isolation boundary
pub trait Boundary: Send + Sync {
    /// Post a command to the hosted document
    fn post(&self, message: &OutboundMessage) -> ReplayResult<()>;

    /// Register a listener for messages posted back by the document.
    /// Dropping the receiver removes the listener.
    fn subscribe(&self) -> Inbound;

    /// Current rendered size of the hosted document
    fn viewport(&self) -> Viewport;
}

struct Shared {
    listeners: Mutex<Vec<mpsc::UnboundedSender<serde_json::Value>>>,
    viewport: Mutex<Viewport>,
}

/// Build an in-process boundary pair
pub fn channel(viewport: Viewport) -> (ChannelBoundary, DocumentPort) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        listeners: Mutex::new(Vec::new()),
        viewport: Mutex::new(viewport),
    });
    (
        ChannelBoundary {
            outbound: tx,
            shared: shared.clone(),
        },
        DocumentPort {
            outbound: rx,
            replier: Replier { shared },
        },
    )
}

/// Controller end of an in-process boundary
#[derive(Clone)]
pub struct ChannelBoundary {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    shared: Arc<Shared>,
}

impl Boundary for ChannelBoundary {
    fn post(&self, message: &OutboundMessage) -> ReplayResult<()> {
        trace!("boundary <- {:?}", message);
        self.outbound
            .send(message.clone())
            .map_err(|_| ReplayError::BoundaryClosed)
    }

    fn subscribe(&self) -> Inbound {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.listeners.lock().push(tx);
        rx
    }

    fn viewport(&self) -> Viewport {
        *self.shared.viewport.lock()
    }
}

/// Document end of an in-process boundary
pub struct DocumentPort {
    outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    replier: Replier,
}

impl DocumentPort {
    /// Next command from the controller, `None` once the controller is gone
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.outbound.recv().await
    }

    pub fn replier(&self) -> Replier {
        self.replier.clone()
    }

    pub fn reply(&self, raw: serde_json::Value) -> usize {
        self.replier.reply(raw)
    }
}

/// Posts messages from the document back to every live listener
#[derive(Clone)]
pub struct Replier {
    shared: Arc<Shared>,
}

impl Replier {
    /// Deliver to all listeners; returns how many received it
    pub fn reply(&self, raw: serde_json::Value) -> usize {
        let mut listeners = self.shared.listeners.lock();
        listeners.retain(|tx| tx.send(raw.clone()).is_ok());
        listeners.len()
    }

    /// Simulate the hosted document being re-laid out
    pub fn resize(&self, viewport: Viewport) {
        *self.shared.viewport.lock() = viewport;
    }

    pub fn listener_count(&self) -> usize {
        let mut listeners = self.shared.listeners.lock();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }
}

/// Stand-in for the hosted prototype's in-document agent.
///
/// Answers coordinate lookups from a fixed element map and records the
/// commands it receives. Descriptors it does not know resolve to the
/// centre of the document body.
#[derive(Debug, Clone)]
pub struct ScriptedDocument {
    elements: HashMap<String, Coords>,
    body_center: Coords,
    latency: Duration,
    ready_after: Duration,
    silent: bool,
}

impl ScriptedDocument {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            elements: HashMap::new(),
            body_center: Coords::new(
                f64::from(viewport.width) / 2.0,
                f64::from(viewport.height) / 2.0,
            ),
            latency: Duration::ZERO,
            ready_after: Duration::ZERO,
            silent: false,
        }
    }

    pub fn with_element(mut self, descriptor: impl Into<String>, coords: Coords) -> Self {
        self.elements.insert(descriptor.into(), coords);
        self
    }

    pub fn with_elements(mut self, elements: HashMap<String, Coords>) -> Self {
        self.elements.extend(elements);
        self
    }

    /// Delay every coordinate reply
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Drop every message received before the listener is installed
    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.ready_after = delay;
        self
    }

    /// Never answer coordinate lookups
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    fn locate(&self, descriptor: &str) -> Coords {
        self.elements.get(descriptor).copied().unwrap_or(self.body_center)
    }

    /// Start serving the document end of a boundary
    pub fn spawn(self, mut port: DocumentPort) -> DocumentHandle {
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = received.clone();

        let task = tokio::spawn(async move {
            let loaded_at = Instant::now();
            while let Some(message) = port.recv().await {
                if loaded_at.elapsed() < self.ready_after {
                    trace!("document not ready, dropping {}", message.kind());
                    continue;
                }
                log.lock().push(message.clone());

                let OutboundMessage::GetCoords { target_selector, action_id } = message else {
                    continue;
                };
                if self.silent {
                    continue;
                }

                let coords = self.locate(&target_selector);
                let reply = serde_json::json!({
                    "type": "COORDS_RESPONSE",
                    "actionId": action_id,
                    "coords": { "x": coords.x, "y": coords.y },
                });
                if self.latency.is_zero() {
                    port.reply(reply);
                } else {
                    let replier = port.replier();
                    let latency = self.latency;
                    tokio::spawn(async move {
                        tokio::time::sleep(latency).await;
                        replier.reply(reply);
                    });
                }
            }
            debug!("scripted document stopped: controller hung up");
        });

        DocumentHandle { received, task }
    }
}

/// Running [`ScriptedDocument`]
pub struct DocumentHandle {
    received: Arc<Mutex<Vec<OutboundMessage>>>,
    task: JoinHandle<()>,
}

impl DocumentHandle {
    /// Every message the document accepted, in arrival order
    pub fn received(&self) -> Vec<OutboundMessage> {
        self.received.lock().clone()
    }

    pub fn lookups(&self) -> usize {
        self.received
            .lock()
            .iter()
            .filter(|m| matches!(m, OutboundMessage::GetCoords { .. }))
            .count()
    }

    /// CLICK and TYPE commands only
    pub fn commands(&self) -> Vec<OutboundMessage> {
        self.received
            .lock()
            .iter()
            .filter(|m| !matches!(m, OutboundMessage::GetCoords { .. }))
            .cloned()
            .collect()
    }
}

impl Drop for DocumentHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
