//! Event tracing for debugging mtwm.
//!
//! Provides a ring buffer of recent events and state transitions.
//! External tools can query the event log via IPC to understand what happened.

use std::collections::VecDeque;
use std::time::Instant;

use crate::ipc::EventLogEntry;
use crate::state::StateTransition;

/// Maximum number of events to keep in the trace buffer
const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Event tracer with ring buffer storage
pub struct EventTracer {
    entries: VecDeque<EventLogEntry>,
    max_entries: usize,
    sequence: u64,
    start_time: Instant,
}

impl EventTracer {
    /// Create a new event tracer with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// Create a new event tracer with specified capacity
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
            sequence: 0,
            start_time: Instant::now(),
        }
    }

    /// Get the current timestamp in milliseconds since tracer start
    fn timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Trace a dispatched protocol event
    pub fn trace_event(&mut self, event_type: &str, window: Option<u32>, details: &str) {
        self.add_entry(event_type.to_string(), window, details.to_string());
    }

    /// Trace a state transition
    pub fn trace_transition(&mut self, transition: &StateTransition) {
        let (event_type, window, details) = match transition {
            StateTransition::ClientManaged { window, monitor } => {
                ("client_managed", Some(*window), format!("monitor={}", monitor))
            }
            StateTransition::ClientUnmanaged { window, reason } => {
                let reason_str =
                    serde_json::to_string(reason).unwrap_or_else(|_| "unknown".to_string());
                ("client_unmanaged", Some(*window), reason_str)
            }
            StateTransition::FocusChanged { from, to } => {
                ("focus_changed", *to, format!("from={:?}", from))
            }
            StateTransition::FullscreenChanged { window, state } => {
                ("fullscreen_changed", Some(*window), format!("{:?}", state))
            }
            StateTransition::VisibilityChanged { window, state } => {
                ("visibility_changed", Some(*window), format!("{:?}", state))
            }
            StateTransition::ClientMoved { window, from, to } => {
                ("client_moved", Some(*window), format!("from={} to={}", from, to))
            }
            StateTransition::LayoutChanged { monitor, layout } => {
                ("layout_changed", None, format!("monitor={} layout={}", monitor, layout))
            }
            StateTransition::MonitorsChanged {
                created,
                removed,
                migrated,
            } => (
                "monitors_changed",
                None,
                format!("created={} removed={} migrated={}", created, removed, migrated),
            ),
        };
        self.add_entry(event_type.to_string(), window, details);
    }

    /// Trace an IPC command
    pub fn trace_ipc(&mut self, command: &str, result: &str) {
        self.add_entry(
            "ipc_command".to_string(),
            None,
            format!("cmd={} result={}", command, result),
        );
    }

    /// Add an entry to the trace buffer
    fn add_entry(&mut self, event_type: String, window: Option<u32>, details: String) {
        // Remove oldest entry if at capacity
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }

        self.sequence += 1;
        self.entries.push_back(EventLogEntry {
            sequence: self.sequence,
            timestamp_ms: self.timestamp(),
            event_type,
            window,
            details,
        });
    }

    /// Get the last N entries
    pub fn get_last(&self, n: usize) -> Vec<EventLogEntry> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(start).cloned().collect()
    }

    /// Get all entries
    pub fn get_all(&self) -> Vec<EventLogEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for EventTracer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FullscreenState, UnmanageReason};

    #[test]
    fn test_trace_event() {
        let mut tracer = EventTracer::new();
        tracer.trace_event("map_request", Some(12345), "");

        let entries = tracer.get_all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "map_request");
        assert_eq!(entries[0].window, Some(12345));
    }

    #[test]
    fn test_ring_buffer_overflow() {
        let mut tracer = EventTracer::with_capacity(3);

        tracer.trace_event("event1", None, "");
        tracer.trace_event("event2", None, "");
        tracer.trace_event("event3", None, "");
        tracer.trace_event("event4", None, "");

        let entries = tracer.get_all();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].event_type, "event2");
        assert_eq!(entries[2].event_type, "event4");
        assert_eq!(entries[2].sequence, 4);
    }

    #[test]
    fn test_get_last() {
        let mut tracer = EventTracer::new();

        for i in 0..10 {
            tracer.trace_event(&format!("event{}", i), None, "");
        }

        let last_3 = tracer.get_last(3);
        assert_eq!(last_3.len(), 3);
        assert_eq!(last_3[0].event_type, "event7");
        assert_eq!(last_3[2].event_type, "event9");
        assert_eq!(tracer.get_last(50).len(), 10);
    }

    #[test]
    fn test_transitions() {
        let mut tracer = EventTracer::new();
        tracer.trace_transition(&StateTransition::ClientUnmanaged {
            window: 7,
            reason: UnmanageReason::ClientDestroyed,
        });
        tracer.trace_transition(&StateTransition::FullscreenChanged {
            window: 7,
            state: FullscreenState::Fullscreen,
        });
        tracer.trace_transition(&StateTransition::MonitorsChanged {
            created: 0,
            removed: 1,
            migrated: 2,
        });

        let entries = tracer.get_all();
        assert_eq!(entries[0].event_type, "client_unmanaged");
        assert!(entries[0].details.contains("client_destroyed"));
        assert_eq!(entries[1].details, "Fullscreen");
        assert_eq!(entries[2].window, None);
        assert!(entries[2].details.contains("migrated=2"));
    }
}
