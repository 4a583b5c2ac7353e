//! IPC command handling for the window manager.
//!
//! Contains the handler for all IPC commands from mtwmctl and other clients.

use crate::gateway::Gateway;
use crate::ipc::{IpcCommand, IpcResponse, WmStateSnapshot};
use crate::layout::Layout;
use crate::types::{ClientSnapshot, MonitorSnapshot};
use crate::Wm;

/// Map an action result onto a response, tagging failures with `code`
fn action_response(result: anyhow::Result<()>, code: &str) -> IpcResponse {
    match result {
        Ok(()) => IpcResponse::Ok,
        Err(e) => IpcResponse::error(code, format!("{:#}", e)),
    }
}

impl<G: Gateway> Wm<G> {
    /// Handle an IPC command and return a response
    pub fn handle_ipc(&mut self, cmd: IpcCommand) -> IpcResponse {
        log::debug!("Handling IPC command: {:?}", cmd);

        // Capture command name for tracing
        let cmd_name = cmd.name();

        let response = match cmd {
            IpcCommand::GetState => IpcResponse::State {
                data: self.snapshot_state(),
            },
            IpcCommand::GetMonitors => IpcResponse::Monitors {
                data: self.monitor_snapshots(),
            },
            IpcCommand::GetWindows => IpcResponse::Windows {
                data: self.client_snapshots(),
            },
            IpcCommand::GetFocused => IpcResponse::Focused {
                window: self.focused_window(),
            },
            IpcCommand::ValidateState => {
                let violations = self.registry.validate();
                IpcResponse::Validation {
                    valid: violations.is_empty(),
                    violations,
                }
            }
            IpcCommand::GetEventLog { count } => {
                let entries = match count {
                    Some(n) => self.tracer.get_last(n),
                    None => self.tracer.get_all(),
                };
                IpcResponse::EventLog { entries }
            }
            IpcCommand::FocusWindow { window } => match self.focus_window(window) {
                Ok(true) => IpcResponse::Ok,
                Ok(false) => IpcResponse::error(
                    "window_not_found",
                    format!("Window 0x{:x} is not managed", window),
                ),
                Err(e) => IpcResponse::error("focus_failed", format!("{:#}", e)),
            },
            IpcCommand::FocusNext => action_response(self.focus_step(true), "focus_failed"),
            IpcCommand::FocusPrev => action_response(self.focus_step(false), "focus_failed"),
            IpcCommand::FocusMonitor { forward } => {
                action_response(self.focus_monitor(forward), "focus_monitor_failed")
            }
            IpcCommand::SendToMonitor { forward } => {
                action_response(self.send_to_monitor(forward), "send_to_monitor_failed")
            }
            IpcCommand::SetLayout { index } => {
                if index >= self.config.layouts.len() {
                    IpcResponse::error(
                        "invalid_layout",
                        format!(
                            "Layout index {} out of range ({} configured)",
                            index,
                            self.config.layouts.len()
                        ),
                    )
                } else {
                    action_response(self.set_layout(index), "layout_failed")
                }
            }
            IpcCommand::SetMasterCount { count } => {
                action_response(self.set_master_count(count), "layout_failed")
            }
            IpcCommand::ToggleFullscreen { window } => {
                let target = window.or_else(|| self.focused_window());
                match target {
                    Some(w) if self.registry.find_client_by_window(w).is_some() => action_response(
                        self.toggle_fullscreen(Some(w)),
                        "toggle_fullscreen_failed",
                    ),
                    Some(w) => IpcResponse::error(
                        "window_not_found",
                        format!("Window 0x{:x} is not managed", w),
                    ),
                    None => IpcResponse::error(
                        "no_window",
                        "No window specified and no focused window",
                    ),
                }
            }
            IpcCommand::CloseWindow => match self.focused_window() {
                Some(w) => action_response(self.close_window(w), "close_failed"),
                None => IpcResponse::error("no_window", "No focused window"),
            },
            IpcCommand::Quit => {
                log::info!("Quit requested via IPC");
                self.running = false;
                IpcResponse::Ok
            }
        };

        // Trace the IPC interaction
        let result_status = match &response {
            IpcResponse::Ok => "ok",
            IpcResponse::Error { .. } => "error",
            _ => "success",
        };
        self.tracer.trace_ipc(cmd_name, result_status);

        response
    }

    /// Create a snapshot of the current WM state for IPC
    fn snapshot_state(&mut self) -> WmStateSnapshot {
        let selected = self.registry.selected_monitor();
        WmStateSnapshot {
            focused_window: self.focused_window(),
            selected_monitor: self.registry.monitor_index(selected).unwrap_or(0),
            client_count: self.registry.client_count(),
            monitors: self.monitor_snapshots(),
            clients: self.client_snapshots(),
        }
    }

    fn monitor_snapshots(&self) -> Vec<MonitorSnapshot> {
        let selected = self.registry.selected_monitor();
        self.registry
            .monitor_ids()
            .iter()
            .enumerate()
            .filter_map(|(index, &id)| {
                let monitor = self.registry.monitor(id)?;
                let window_of = |c| self.registry.client(c).map(|c| c.window);
                let layout = self
                    .config
                    .layouts
                    .get(monitor.layout_index)
                    .copied()
                    .unwrap_or(Layout::Tile);
                Some(MonitorSnapshot {
                    index,
                    region: monitor.region.map(Into::into),
                    layout: layout.name().to_string(),
                    master_count: monitor.master_count,
                    clients: monitor.clients().iter().filter_map(|&c| window_of(c)).collect(),
                    selected: monitor.selected().and_then(window_of),
                    is_selected: id == selected,
                })
            })
            .collect()
    }

    /// Get information about all managed windows
    fn client_snapshots(&mut self) -> Vec<ClientSnapshot> {
        let focused = self.registry.focused();
        let mut snapshots = Vec::new();
        for (monitor_index, &monitor_id) in self.registry.monitor_ids().iter().enumerate() {
            let Some(monitor) = self.registry.monitor(monitor_id) else {
                continue;
            };
            for (stack_index, &id) in monitor.clients().iter().enumerate() {
                let Some(client) = self.registry.client(id) else {
                    continue;
                };
                snapshots.push(ClientSnapshot {
                    id: client.window,
                    title: String::new(),
                    monitor: monitor_index,
                    stack_index,
                    geometry: client.geometry.into(),
                    is_focused: focused == Some(id),
                    is_visible: client.is_visible,
                    is_fullscreen: client.is_fullscreen,
                    is_transient: client.is_transient,
                });
            }
        }
        for snapshot in &mut snapshots {
            snapshot.title = self.gateway.window_title(snapshot.id);
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use crate::ipc::{IpcCommand, IpcResponse};
    use crate::testing::*;

    #[test]
    fn test_get_state_snapshot() {
        let mut wm = single_head();
        wm.manage(0xa).unwrap();
        wm.manage(0xb).unwrap();

        let IpcResponse::State { data } = wm.handle_ipc(IpcCommand::GetState) else {
            panic!("expected state response");
        };
        assert_eq!(data.focused_window, Some(0xb));
        assert_eq!(data.selected_monitor, 0);
        assert_eq!(data.client_count, 2);
        assert_eq!(data.monitors.len(), 1);
        assert_eq!(data.monitors[0].clients, vec![0xb, 0xa]);
        assert_eq!(data.monitors[0].layout, "tile");
        assert_eq!(data.clients[0].title, "window-b");
        assert!(data.clients[0].is_focused);
        assert_eq!(data.clients[1].stack_index, 1);
        assert_eq!(data.clients[1].geometry.x, 960);
    }

    #[test]
    fn test_focus_window_command() {
        let mut wm = single_head();
        wm.manage(0xa).unwrap();
        wm.manage(0xb).unwrap();

        let resp = wm.handle_ipc(IpcCommand::FocusWindow { window: 0xa });
        assert!(matches!(resp, IpcResponse::Ok));
        assert_eq!(wm.focused(), Some(0xa));

        let resp = wm.handle_ipc(IpcCommand::FocusWindow { window: 0x99 });
        assert!(matches!(resp, IpcResponse::Error { ref code, .. } if code == "window_not_found"));
    }

    #[test]
    fn test_set_layout_validates_index() {
        let mut wm = single_head();
        let resp = wm.handle_ipc(IpcCommand::SetLayout { index: 5 });
        assert!(matches!(resp, IpcResponse::Error { ref code, .. } if code == "invalid_layout"));

        let resp = wm.handle_ipc(IpcCommand::SetLayout { index: 1 });
        assert!(matches!(resp, IpcResponse::Ok));
        let IpcResponse::Monitors { data } = wm.handle_ipc(IpcCommand::GetMonitors) else {
            panic!("expected monitors response");
        };
        assert_eq!(data[0].layout, "monocle");
    }

    #[test]
    fn test_fullscreen_and_close_need_a_window() {
        let mut wm = single_head();
        let resp = wm.handle_ipc(IpcCommand::ToggleFullscreen { window: None });
        assert!(matches!(resp, IpcResponse::Error { ref code, .. } if code == "no_window"));
        let resp = wm.handle_ipc(IpcCommand::CloseWindow);
        assert!(matches!(resp, IpcResponse::Error { ref code, .. } if code == "no_window"));
        let resp = wm.handle_ipc(IpcCommand::ToggleFullscreen { window: Some(0x5) });
        assert!(matches!(resp, IpcResponse::Error { ref code, .. } if code == "window_not_found"));
    }

    #[test]
    fn test_validate_and_event_log() {
        let mut wm = single_head();
        wm.manage(0xa).unwrap();

        let resp = wm.handle_ipc(IpcCommand::ValidateState);
        assert!(matches!(resp, IpcResponse::Validation { valid: true, .. }));

        let IpcResponse::EventLog { entries } =
            wm.handle_ipc(IpcCommand::GetEventLog { count: Some(2) })
        else {
            panic!("expected event log response");
        };
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.event_type.starts_with("ipc")));
    }

    #[test]
    fn test_quit_stops_event_loop() {
        let mut wm = single_head();
        let resp = wm.handle_ipc(IpcCommand::Quit);
        assert!(matches!(resp, IpcResponse::Ok));
        wm.run().unwrap();
    }
}
