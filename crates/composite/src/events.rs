//! Load lifecycle events and observers.
//!
//! Every fetch the loader issues produces a `Started` event followed by
//! exactly one `Loaded` or `Failed`. `Superseded` marks a selection that
//! completed after a newer request for the same group or part and was
//! therefore not applied.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Structured load event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadEvent {
    Started {
        part: String,
        locator: String,
    },
    Loaded {
        part: String,
        elapsed_ms: u64,
    },
    Failed {
        part: String,
        name: String,
        cause: String,
    },
    Superseded {
        part: String,
        /// Exclusive group, or the part itself for independent toggles
        key: String,
    },
}

impl LoadEvent {
    pub fn part(&self) -> &str {
        match self {
            Self::Started { part, .. }
            | Self::Loaded { part, .. }
            | Self::Failed { part, .. }
            | Self::Superseded { part, .. } => part,
        }
    }
}

/// Receives load events.
pub trait LoadObserver: Send + Sync + 'static {
    fn on_event(&self, event: &LoadEvent);
}

/// Default observer: forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn on_event(&self, event: &LoadEvent) {
        match event {
            LoadEvent::Started { part, locator } => {
                debug!(part = %part, locator = %locator, "Loading part");
            }
            LoadEvent::Loaded { part, elapsed_ms } => {
                info!(part = %part, elapsed_ms, "Part loaded");
            }
            LoadEvent::Failed { part, name, cause } => {
                warn!(part = %part, "Failed to load {}: {}", name, cause);
            }
            LoadEvent::Superseded { part, key } => {
                debug!(part = %part, key = %key, "Selection superseded, visibility left unchanged");
            }
        }
    }
}

/// Observer that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    events: Mutex<Vec<LoadEvent>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LoadEvent> {
        self.events.lock().clone()
    }

    /// Events concerning `part`
    pub fn events_for(&self, part: &str) -> Vec<LoadEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.part() == part)
            .cloned()
            .collect()
    }

    pub fn failures(&self) -> Vec<LoadEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, LoadEvent::Failed { .. }))
            .cloned()
            .collect()
    }
}

impl LoadObserver for MemoryObserver {
    fn on_event(&self, event: &LoadEvent) {
        self.events.lock().push(event.clone());
    }
}
