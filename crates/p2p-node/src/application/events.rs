//! User-facing event sinks.
//!
//! The dispatcher forwards every [`P2pEvent`] together with a snapshot of the
//! session to all registered sinks.  Sinks are called synchronously on the
//! dispatcher task and must not block; a sink that needs to do async work
//! spawns it.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use p2p_core::{P2pEvent, SessionContext};
use tracing::info;

/// Receives user-facing pairing events.
pub trait P2pEventSink: Send + Sync {
    fn on_event(&self, event: P2pEvent, ctx: &SessionContext);
}

/// Fan-out over any number of sinks, in registration order.
#[derive(Default)]
pub struct EventSinks {
    sinks: RwLock<Vec<Arc<dyn P2pEventSink>>>,
}

impl EventSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, sink: Arc<dyn P2pEventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    pub fn emit(&self, event: P2pEvent, ctx: &SessionContext) {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        for sink in sinks.iter() {
            sink.on_event(event, ctx);
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Logs each event at `info`.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl P2pEventSink for LoggingSink {
    fn on_event(&self, event: P2pEvent, ctx: &SessionContext) {
        match event {
            P2pEvent::DeviceFound => {
                info!("Event: {event} ({}, {} so far)", ctx.peer_address, ctx.peer_count)
            }
            P2pEvent::GroupStarted | P2pEvent::Connected => {
                info!("Event: {event} (role {})", ctx.role)
            }
            _ => info!("Event: {event}"),
        }
    }
}

/// Records every event it receives, with the session state at that moment.
///
/// Used by tests to assert on the exact event sequence.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<(P2pEvent, SessionContext)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded event kinds, in order.
    pub fn kinds(&self) -> Vec<P2pEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(event, _)| *event)
            .collect()
    }

    pub fn contains(&self, event: P2pEvent) -> bool {
        self.kinds().contains(&event)
    }
}

impl P2pEventSink for RecordingSink {
    fn on_event(&self, event: P2pEvent, ctx: &SessionContext) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event, ctx.clone()));
    }
}
