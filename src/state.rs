//! State machine types and validation for mtwm.
//!
//! This module formalizes the state machines in the window manager:
//! - Client visibility
//! - Fullscreen
//!
//! The violation types describe invariants that should always hold; the
//! registry's validator reports them.

use serde::{Deserialize, Serialize};

/// Client visibility
///
/// ```text
///                MapRequest / scan
///                    │
///                    ▼
///               ┌─────────┐   HideWindow    ┌─────────┐
///               │ Visible │ ───────────────►│ Hidden  │
///               └────┬────┘◄─────────────── └────┬────┘
///                    │       ShowAll / teardown  │
///                    │                           │ DestroyNotify
///                    │ UnmapNotify / Destroy     │
///                    ▼                           ▼
///              ┌─────────────────────────────────────┐
///              │              Unmanaged              │
///              └─────────────────────────────────────┘
/// ```
///
/// An UnmapNotify for a Hidden client is the echo of our own unmap and does
/// not unmanage it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Visible,
    Hidden,
}

/// Fullscreen state machine
///
/// ```text
///  ┌────────┐  _NET_WM_STATE add / toggle   ┌────────────┐
///  │ Normal │ ─────────────────────────────►│ Fullscreen │
///  └────────┘◄───────────────────────────── └────────────┘
///              _NET_WM_STATE remove / toggle
///              (geometry restored by re-arranging the monitor)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullscreenState {
    Normal,
    Fullscreen,
}

/// Operation carried by a `_NET_WM_STATE` client message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    Remove,
    Add,
    Toggle,
}

impl StateAction {
    /// Decode the EWMH action code (0 = remove, 1 = add, 2 = toggle)
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(StateAction::Remove),
            1 => Some(StateAction::Add),
            2 => Some(StateAction::Toggle),
            _ => None,
        }
    }

    /// Resolve the target state given the current one
    pub fn apply(self, current: FullscreenState) -> FullscreenState {
        match (self, current) {
            (StateAction::Remove, _) => FullscreenState::Normal,
            (StateAction::Add, _) => FullscreenState::Fullscreen,
            (StateAction::Toggle, FullscreenState::Normal) => FullscreenState::Fullscreen,
            (StateAction::Toggle, FullscreenState::Fullscreen) => FullscreenState::Normal,
        }
    }
}

/// State violations that can be detected
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateViolation {
    pub kind: ViolationKind,
    pub description: String,
}

/// Types of state violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Client listed by no monitor
    OrphanedClient,
    /// Client listed by more than one monitor, or twice by one
    DuplicateClient,
    /// Client's monitor back-reference disagrees with the list holding it
    StaleMonitorReference,
    /// Monitor's selected client is not in its client list
    SelectionOutsideMonitor,
    /// Focused client is missing or not the selected client of the selected monitor
    InvalidFocus,
    /// No monitors exist
    NoMonitors,
    /// Two clients share a window handle
    DuplicateWindow,
}

/// State transition events that can be traced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transition", rename_all = "snake_case")]
pub enum StateTransition {
    /// Client was added to a monitor
    ClientManaged { window: u32, monitor: usize },
    /// Client was removed from management
    ClientUnmanaged {
        window: u32,
        reason: UnmanageReason,
    },
    /// Focus changed to a different window
    FocusChanged { from: Option<u32>, to: Option<u32> },
    /// Fullscreen state flipped
    FullscreenChanged {
        window: u32,
        state: FullscreenState,
    },
    /// Client visibility flipped by user action
    VisibilityChanged { window: u32, state: WindowState },
    /// Client moved between monitors
    ClientMoved { window: u32, from: usize, to: usize },
    /// A monitor switched layouts
    LayoutChanged { monitor: usize, layout: String },
    /// Physical topology was re-synchronized
    MonitorsChanged {
        created: usize,
        removed: usize,
        migrated: usize,
    },
}

/// Reason a window was unmanaged
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmanageReason {
    /// Client destroyed the window
    ClientDestroyed,
    /// Client unmapped (withdrew) the window
    ClientUnmapped,
}
