//! One-way interaction commands

use std::sync::Arc;
use tracing::{debug, warn};

use prototrace_common::OutboundMessage;

use crate::boundary::Boundary;

/// Posts CLICK and TYPE commands to the hosted document.
///
/// Fire-and-forget: nothing is awaited and delivery failures are only
/// logged.
#[derive(Clone)]
pub struct ActionDispatcher {
    boundary: Arc<dyn Boundary>,
}

impl ActionDispatcher {
    pub fn new(boundary: Arc<dyn Boundary>) -> Self {
        Self { boundary }
    }

    pub fn dispatch_click(&self, descriptor: &str) {
        self.post(OutboundMessage::Click {
            target_selector: descriptor.to_string(),
        });
    }

    pub fn dispatch_type(&self, descriptor: &str, text: &str) {
        self.post(OutboundMessage::Type {
            target_selector: descriptor.to_string(),
            text: text.to_string(),
        });
    }

    fn post(&self, message: OutboundMessage) {
        match self.boundary.post(&message) {
            Ok(()) => debug!("dispatched {}", message.kind()),
            Err(e) => warn!("{} not delivered: {}", message.kind(), e),
        }
    }
}
