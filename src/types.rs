//! Shared types used across multiple modules.
//!
//! This module contains common data structures to avoid circular dependencies
//! between the registry, layout and ipc modules.

use serde::{Deserialize, Serialize};

/// A rectangle representing geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x
            && px < self.x + self.width as i32
            && py >= self.y
            && py < self.y + self.height as i32
    }

    /// Shrink width and height by a border drawn on each side.
    ///
    /// X11 draws the border outside the window, so the origin stays put and
    /// the outer box of the result is exactly `self`.
    pub fn inset(&self, border: u32) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width.saturating_sub(border * 2),
            height: self.height.saturating_sub(border * 2),
        }
    }
}

/// Serializable rectangle for IPC snapshots
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RectSnapshot {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl From<Rect> for RectSnapshot {
    fn from(r: Rect) -> Self {
        Self {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

/// Snapshot of one monitor for IPC serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RectSnapshot>,
    pub layout: String,
    pub master_count: usize,
    /// Window ids in stacking order, master slot first
    pub clients: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<u32>,
    pub is_selected: bool,
}

/// Snapshot of one managed window for IPC serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSnapshot {
    pub id: u32,
    pub title: String,
    pub monitor: usize,
    pub stack_index: usize,
    pub geometry: RectSnapshot,
    pub is_focused: bool,
    pub is_visible: bool,
    pub is_fullscreen: bool,
    pub is_transient: bool,
}
