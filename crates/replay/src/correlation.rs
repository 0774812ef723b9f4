//! Correlation of coordinate lookups with their asynchronous replies
//!
//! Every lookup registers a pending entry keyed by a fresh [`ActionId`].
//! The entry leaves the table exactly once: when the listener settles it
//! with a matching reply, when the lookup expires it at its deadline, or
//! when the lookup is dropped mid-flight. Whoever removes the entry owns
//! the resolution; everyone else is a no-op.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use prototrace_common::{ActionId, Coords, InboundMessage};

use crate::boundary::Inbound;

/// Pending lookups, shared between the resolver and the boundary listener
#[derive(Clone, Default)]
pub struct CorrelationTable {
    pending: Arc<Mutex<HashMap<ActionId, oneshot::Sender<Coords>>>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending entry for `id`
    pub fn register(&self, id: ActionId) -> PendingLookup {
        let (tx, rx) = oneshot::channel();
        let previous = self.pending.lock().insert(id.clone(), tx);
        if previous.is_some() {
            warn!("correlation id {} was still pending; replacing", id);
        }
        PendingLookup {
            id,
            table: self.clone(),
            rx,
            state: LookupState::Waiting,
        }
    }

    /// Hand a reply to the matching pending lookup.
    ///
    /// Returns false for unknown, expired, or already settled ids.
    pub fn settle(&self, id: &ActionId, coords: Coords) -> bool {
        let Some(tx) = self.pending.lock().remove(id) else {
            return false;
        };
        tx.send(coords).is_ok()
    }

    fn forget(&self, id: &ActionId) -> bool {
        self.pending.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &ActionId) -> bool {
        self.pending.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Drop every pending entry; waiting lookups observe a closed channel
    pub fn clear(&self) {
        let drained = std::mem::take(&mut *self.pending.lock());
        if !drained.is_empty() {
            debug!("discarding {} pending lookup(s)", drained.len());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookupState {
    Waiting,
    Settled,
    Closed,
}

/// One registered lookup. Removes its entry from the table on drop if it
/// never settled.
pub struct PendingLookup {
    id: ActionId,
    table: CorrelationTable,
    rx: oneshot::Receiver<Coords>,
    state: LookupState,
}

impl PendingLookup {
    pub fn id(&self) -> &ActionId {
        &self.id
    }

    /// Wait for the matching reply. `None` means the table was torn down.
    pub async fn reply(&mut self) -> Option<Coords> {
        if self.state != LookupState::Waiting {
            return None;
        }
        match (&mut self.rx).await {
            Ok(coords) => {
                self.state = LookupState::Settled;
                Some(coords)
            }
            Err(_) => {
                self.state = LookupState::Closed;
                None
            }
        }
    }

    /// Give up waiting. If a reply won the race and is already buffered,
    /// it is returned instead; otherwise the entry is removed and any
    /// later reply for this id becomes stale.
    pub fn expire(&mut self) -> Option<Coords> {
        if self.state != LookupState::Waiting {
            return None;
        }
        if self.table.forget(&self.id) {
            self.state = LookupState::Closed;
            return None;
        }
        match self.rx.try_recv() {
            Ok(coords) => {
                self.state = LookupState::Settled;
                Some(coords)
            }
            Err(_) => {
                self.state = LookupState::Closed;
                None
            }
        }
    }
}

impl Drop for PendingLookup {
    fn drop(&mut self) {
        if self.state == LookupState::Waiting && self.table.forget(&self.id) {
            trace!("lookup {} abandoned", self.id);
        }
    }
}

/// Listener subscription that routes `COORDS_RESPONSE` messages into a
/// correlation table. Tearing it down unsubscribes and clears the table.
pub struct BoundaryListener {
    table: CorrelationTable,
    task: JoinHandle<()>,
}

impl BoundaryListener {
    pub fn spawn(mut inbound: Inbound, table: CorrelationTable) -> Self {
        let routes = table.clone();
        let task = tokio::spawn(async move {
            while let Some(raw) = inbound.recv().await {
                match InboundMessage::decode(&raw) {
                    Ok(InboundMessage::CoordsResponse { action_id, coords }) => {
                        if routes.settle(&action_id, coords) {
                            trace!("lookup {} settled at ({}, {})", action_id, coords.x, coords.y);
                        } else {
                            debug!("ignoring stale reply for {}", action_id);
                        }
                    }
                    Err(e) => trace!("dropping boundary message: {}", e),
                }
            }
        });
        Self { table, task }
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }
}

impl Drop for BoundaryListener {
    fn drop(&mut self) {
        self.task.abort();
        self.table.clear();
    }
}
