//! Coordinate resolution across the isolation boundary

use rand::Rng;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

use prototrace_common::{ActionId, Coords, OutboundMessage, Viewport};

use crate::boundary::Boundary;
use crate::config::ResolverConfig;
use crate::correlation::CorrelationTable;

/// Outcome of one coordinate lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// The document reported the element position
    Reported(Coords),
    /// No matching reply before the deadline; synthetic position
    Fallback(Coords),
}

impl Resolution {
    pub fn coords(&self) -> Coords {
        match self {
            Resolution::Reported(c) | Resolution::Fallback(c) => *c,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback(_))
    }
}

/// Looks up element positions inside the hosted document.
///
/// Lookups always produce a position: an unresponsive or hostile document
/// only costs the deadline.
#[derive(Clone)]
pub struct CoordinateResolver {
    boundary: Arc<dyn Boundary>,
    table: CorrelationTable,
    config: ResolverConfig,
}

impl CoordinateResolver {
    pub fn new(boundary: Arc<dyn Boundary>, table: CorrelationTable, config: ResolverConfig) -> Self {
        Self { boundary, table, config }
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    pub fn viewport(&self) -> Viewport {
        self.boundary.viewport()
    }

    /// Resolve `descriptor` to a pixel position in the document viewport
    pub async fn resolve(&self, descriptor: &str) -> Resolution {
        let mut pending = self.table.register(ActionId::generate());
        let request = OutboundMessage::GetCoords {
            target_selector: descriptor.to_string(),
            action_id: pending.id().clone(),
        };

        // The document may not have installed its listener yet, so the
        // request goes out once more after a short delay.
        self.send(&request);
        let retry = sleep(self.config.retry_after());
        let deadline = sleep(self.config.deadline());
        tokio::pin!(retry);
        tokio::pin!(deadline);
        let mut retried = false;

        loop {
            tokio::select! {
                biased;

                reply = pending.reply() => match reply {
                    Some(coords) => {
                        debug!("resolved '{}' to ({}, {})", descriptor, coords.x, coords.y);
                        return Resolution::Reported(coords);
                    }
                    None => {
                        debug!("listener gone while resolving '{}'", descriptor);
                        break;
                    }
                },
                _ = &mut retry, if !retried => {
                    retried = true;
                    self.send(&request);
                }
                _ = &mut deadline => break,
            }
        }

        if let Some(coords) = pending.expire() {
            return Resolution::Reported(coords);
        }

        let coords = self.fallback();
        warn!(
            "no position for '{}' within {:?}; using ({:.0}, {:.0})",
            descriptor,
            self.config.deadline(),
            coords.x,
            coords.y
        );
        Resolution::Fallback(coords)
    }

    fn send(&self, request: &OutboundMessage) {
        if let Err(e) = self.boundary.post(request) {
            debug!("lookup request not delivered: {}", e);
        }
    }

    fn fallback(&self) -> Coords {
        let mut rng = rand::thread_rng();
        let origin = self.config.fallback_origin;
        let span = self.config.fallback_span;
        Coords::new(
            origin + rng.gen::<f64>() * span,
            origin + rng.gen::<f64>() * span,
        )
    }
}
