//! IPC interface for programmatic control of mtwm.
//!
//! Provides a Unix socket server that accepts JSON commands and returns JSON responses.
//! This enables scripts and external tools to:
//! - Query monitors, clients and focus
//! - Execute actions (focus, move between monitors, change layout)
//! - Validate state invariants
//! - Read the event trace

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::StateViolation;
use crate::types::{ClientSnapshot, MonitorSnapshot};

/// Get the socket path for this display
pub fn socket_path() -> PathBuf {
    let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string());
    let sanitized = display.replace([':', '.'], "_");
    PathBuf::from(format!("/tmp/mtwm{}.sock", sanitized))
}

/// Commands that can be sent to the WM via IPC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum IpcCommand {
    // Queries
    /// Get full WM state snapshot
    GetState,
    /// Get every monitor with its client stack
    GetMonitors,
    /// Get list of all managed windows
    GetWindows,
    /// Get currently focused window
    GetFocused,
    /// Validate state invariants
    ValidateState,
    /// Get recent event log
    GetEventLog {
        #[serde(default)]
        count: Option<usize>,
    },

    // Actions
    /// Focus a specific window
    FocusWindow { window: u32 },
    /// Focus the next client in global order
    FocusNext,
    /// Focus the previous client in global order
    FocusPrev,
    /// Select the neighbouring monitor
    FocusMonitor { forward: bool },
    /// Move the focused client to the neighbouring monitor
    SendToMonitor { forward: bool },
    /// Select a layout by index on the selected monitor
    SetLayout { index: usize },
    /// Set the master count of the selected monitor
    SetMasterCount { count: usize },
    /// Toggle fullscreen on a window (default: focused)
    ToggleFullscreen {
        #[serde(default)]
        window: Option<u32>,
    },
    /// Close the focused window
    CloseWindow,

    // Control
    /// Quit the window manager
    Quit,
}

impl IpcCommand {
    /// Short name for tracing
    pub fn name(&self) -> &'static str {
        match self {
            IpcCommand::GetState => "get_state",
            IpcCommand::GetMonitors => "get_monitors",
            IpcCommand::GetWindows => "get_windows",
            IpcCommand::GetFocused => "get_focused",
            IpcCommand::ValidateState => "validate_state",
            IpcCommand::GetEventLog { .. } => "get_event_log",
            IpcCommand::FocusWindow { .. } => "focus_window",
            IpcCommand::FocusNext => "focus_next",
            IpcCommand::FocusPrev => "focus_prev",
            IpcCommand::FocusMonitor { .. } => "focus_monitor",
            IpcCommand::SendToMonitor { .. } => "send_to_monitor",
            IpcCommand::SetLayout { .. } => "set_layout",
            IpcCommand::SetMasterCount { .. } => "set_master_count",
            IpcCommand::ToggleFullscreen { .. } => "toggle_fullscreen",
            IpcCommand::CloseWindow => "close_window",
            IpcCommand::Quit => "quit",
        }
    }
}

/// Responses from the WM
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Operation succeeded with no data
    Ok,
    /// Full state snapshot
    State { data: WmStateSnapshot },
    /// Monitor list
    Monitors { data: Vec<MonitorSnapshot> },
    /// List of windows
    Windows { data: Vec<ClientSnapshot> },
    /// Focused window
    Focused { window: Option<u32> },
    /// Validation result
    Validation {
        valid: bool,
        violations: Vec<StateViolation>,
    },
    /// Event log
    EventLog { entries: Vec<EventLogEntry> },
    /// Error response
    Error { code: String, message: String },
}

impl IpcResponse {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        IpcResponse::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Snapshot of the full WM state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmStateSnapshot {
    pub focused_window: Option<u32>,
    pub selected_monitor: usize,
    pub client_count: usize,
    pub monitors: Vec<MonitorSnapshot>,
    pub clients: Vec<ClientSnapshot>,
}

/// Entry in the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub event_type: String,
    pub window: Option<u32>,
    pub details: String,
}

/// IPC server that listens on a Unix socket
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Create a new IPC server bound to the socket path
    pub fn bind() -> std::io::Result<Self> {
        let path = socket_path();

        // Remove existing socket if present
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;

        // Set non-blocking mode for polling
        listener.set_nonblocking(true)?;

        log::info!("IPC server listening on {:?}", path);

        Ok(Self {
            listener,
            socket_path: path,
        })
    }

    /// Poll for incoming commands (non-blocking)
    /// Returns None if no command is pending
    pub fn poll(&self) -> Option<(IpcCommand, IpcClient)> {
        match self.listener.accept() {
            Ok((stream, _)) => {
                stream
                    .set_read_timeout(Some(Duration::from_millis(100)))
                    .ok();
                stream
                    .set_write_timeout(Some(Duration::from_millis(100)))
                    .ok();

                let mut reader = BufReader::new(stream.try_clone().ok()?);
                let mut line = String::new();

                match reader.read_line(&mut line) {
                    Ok(0) => None, // EOF
                    Ok(_) => match serde_json::from_str::<IpcCommand>(&line) {
                        Ok(cmd) => {
                            log::debug!("IPC command received: {:?}", cmd);
                            Some((cmd, IpcClient { stream }))
                        }
                        Err(e) => {
                            log::warn!("Invalid IPC command: {}", e);
                            let mut client = IpcClient { stream };
                            let _ = client.respond(IpcResponse::error(
                                "parse_error",
                                format!("Failed to parse command: {}", e),
                            ));
                            None
                        }
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
                    Err(e) => {
                        log::warn!("IPC read error: {}", e);
                        None
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(e) => {
                log::warn!("IPC accept error: {}", e);
                None
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        // Clean up socket file
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Handle for responding to an IPC client
pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    /// Send a response to the client
    pub fn respond(&mut self, response: IpcResponse) -> std::io::Result<()> {
        let json = serde_json::to_string(&response)?;
        writeln!(self.stream, "{}", json)?;
        self.stream.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let cmd = IpcCommand::GetState;
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("get_state"));

        let cmd = IpcCommand::FocusWindow { window: 12345 };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("focus_window"));
        assert!(json.contains("12345"));

        let cmd = IpcCommand::SendToMonitor { forward: true };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("send_to_monitor"));
        assert!(json.contains("true"));
    }

    #[test]
    fn test_response_serialization() {
        let resp = IpcResponse::Ok;
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("ok"));

        let resp = IpcResponse::error("test", "test error");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("test error"));
    }

    #[test]
    fn test_command_deserialization() {
        let json = r#"{"command": "get_monitors"}"#;
        let cmd: IpcCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, IpcCommand::GetMonitors));

        let json = r#"{"command": "set_layout", "index": 1}"#;
        let cmd: IpcCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, IpcCommand::SetLayout { index: 1 }));

        let json = r#"{"command": "toggle_fullscreen"}"#;
        let cmd: IpcCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, IpcCommand::ToggleFullscreen { window: None }));

        let json = r#"{"command": "get_event_log", "count": 5}"#;
        let cmd: IpcCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.name(), "get_event_log");
        assert!(matches!(cmd, IpcCommand::GetEventLog { count: Some(5) }));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let json = r#"{"command": "split", "direction": "vertical"}"#;
        assert!(serde_json::from_str::<IpcCommand>(json).is_err());
    }
}
