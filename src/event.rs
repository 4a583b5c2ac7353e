//! Event dispatch.
//!
//! The gateway translates raw protocol events into [`WmEvent`]; this module
//! routes each one to its handler. Handlers for events about windows we do
//! not manage are no-ops.

use anyhow::Result;
use x11rb::protocol::xproto::{ConfigureWindowAux, ModMask, Window};

use crate::gateway::{Gateway, GatewayError, IgnoreGone};
use crate::layout::ResizeCommand;
use crate::state::{StateAction, UnmanageReason};
use crate::Wm;

/// A client's request to change its own geometry
#[derive(Debug, Clone)]
pub struct ConfigureRequest {
    pub window: Window,
    pub aux: ConfigureWindowAux,
}

/// Events the core reacts to
#[derive(Debug)]
pub enum WmEvent {
    MapRequest {
        window: Window,
    },
    /// A managed window was unmapped (reported on root)
    UnmapNotify {
        window: Window,
    },
    DestroyNotify {
        window: Window,
    },
    ConfigureRequest(ConfigureRequest),
    /// Pointer crossed into a window
    Enter {
        window: Window,
        root_x: i32,
        root_y: i32,
        /// Crossing mode is Normal (not a grab/ungrab)
        normal: bool,
        /// Pointer came from a child window
        inferior: bool,
        /// Sent by a client through SendEvent
        synthetic: bool,
    },
    Motion {
        window: Window,
        root_x: i32,
        root_y: i32,
    },
    FocusIn {
        window: Window,
    },
    KeyPress {
        keysym: u32,
        state: u16,
    },
    KeyboardMappingChanged,
    /// `_NET_WM_STATE` fullscreen add/remove/toggle
    FullscreenRequest {
        window: Window,
        action: StateAction,
    },
    /// `_NET_ACTIVE_WINDOW`
    ActivateRequest {
        window: Window,
    },
    /// `_NET_CLOSE_WINDOW`
    CloseRequest {
        window: Window,
    },
    /// Screen configuration changed
    TopologyChanged,
    /// Asynchronous error reply from the server
    ProtocolError(GatewayError),
    /// Known event kind the core deliberately does nothing with
    Ignored(&'static str),
    /// Event kind with no handler at all
    Unhandled(String),
}

impl WmEvent {
    /// Name used in the event trace
    pub fn kind(&self) -> &str {
        match self {
            WmEvent::MapRequest { .. } => "MapRequest",
            WmEvent::UnmapNotify { .. } => "UnmapNotify",
            WmEvent::DestroyNotify { .. } => "DestroyNotify",
            WmEvent::ConfigureRequest(_) => "ConfigureRequest",
            WmEvent::Enter { .. } => "EnterNotify",
            WmEvent::Motion { .. } => "MotionNotify",
            WmEvent::FocusIn { .. } => "FocusIn",
            WmEvent::KeyPress { .. } => "KeyPress",
            WmEvent::KeyboardMappingChanged => "MappingNotify",
            WmEvent::FullscreenRequest { .. } => "FullscreenRequest",
            WmEvent::ActivateRequest { .. } => "ActivateRequest",
            WmEvent::CloseRequest { .. } => "CloseRequest",
            WmEvent::TopologyChanged => "TopologyChanged",
            WmEvent::ProtocolError(_) => "Error",
            WmEvent::Ignored(kind) => kind,
            WmEvent::Unhandled(kind) => kind,
        }
    }

    /// The window the event is about, if any
    pub fn window(&self) -> Option<Window> {
        match self {
            WmEvent::MapRequest { window }
            | WmEvent::UnmapNotify { window }
            | WmEvent::DestroyNotify { window }
            | WmEvent::Enter { window, .. }
            | WmEvent::Motion { window, .. }
            | WmEvent::FocusIn { window }
            | WmEvent::FullscreenRequest { window, .. }
            | WmEvent::ActivateRequest { window }
            | WmEvent::CloseRequest { window } => Some(*window),
            WmEvent::ConfigureRequest(request) => Some(request.window),
            _ => None,
        }
    }
}

impl<G: Gateway> Wm<G> {
    /// Route one event to its handler
    pub fn handle_event(&mut self, event: WmEvent) -> Result<()> {
        // Motion is far too chatty for the trace buffer
        if !matches!(event, WmEvent::Motion { .. } | WmEvent::Ignored(_)) {
            self.tracer.trace_event(event.kind(), event.window(), "");
        }

        match event {
            WmEvent::MapRequest { window } => {
                log::debug!("MapRequest for window 0x{:x}", window);
                self.manage(window)?;
            }

            WmEvent::UnmapNotify { window } => {
                log::debug!("UnmapNotify for window 0x{:x}", window);
                // Our own unmap of a hidden client echoes back here
                let hidden = self
                    .registry
                    .find_client_by_window(window)
                    .and_then(|id| self.registry.client(id))
                    .is_some_and(|c| !c.is_visible);
                if !hidden {
                    self.unmanage(window, UnmanageReason::ClientUnmapped)?;
                }
            }

            WmEvent::DestroyNotify { window } => {
                log::debug!("DestroyNotify for window 0x{:x}", window);
                self.unmanage(window, UnmanageReason::ClientDestroyed)?;
            }

            WmEvent::ConfigureRequest(request) => self.handle_configure_request(request)?,

            WmEvent::Enter {
                window,
                root_x,
                root_y,
                normal,
                inferior,
                synthetic,
            } => {
                let root = self.gateway.root();
                if (!normal || inferior || synthetic) && window != root {
                    return Ok(());
                }
                match self.registry.find_client_by_window(window) {
                    Some(id) if self.registry.focused() != Some(id) => {
                        log::debug!("EnterNotify for window 0x{:x}", window);
                        self.focus(Some(id))?;
                    }
                    Some(_) => {}
                    None => self.focus_under_pointer(root_x, root_y)?,
                }
            }

            WmEvent::Motion {
                window,
                root_x,
                root_y,
            } => {
                if window == self.gateway.root() {
                    self.focus_under_pointer(root_x, root_y)?;
                }
            }

            WmEvent::FocusIn { window } => {
                // Some clients grab focus on their own; take it back
                if let Some(focused) = self.focused_window() {
                    if focused != window {
                        log::debug!("Reasserting focus on 0x{:x}", focused);
                        self.gateway.set_input_focus(Some(focused)).ignore_gone()?;
                    }
                }
            }

            WmEvent::KeyPress { keysym, state } => self.handle_key_press(keysym, state)?,

            WmEvent::KeyboardMappingChanged => {
                log::info!("Keyboard mapping changed, regrabbing keys");
                self.grab_keys()?;
            }

            WmEvent::FullscreenRequest { window, action } => {
                self.set_fullscreen(window, action)?;
            }

            WmEvent::ActivateRequest { window } => {
                self.focus_window(window)?;
            }

            WmEvent::CloseRequest { window } => {
                self.close_window(window)?;
            }

            WmEvent::TopologyChanged => {
                log::debug!("Screen configuration changed");
                self.update_geometry()?;
            }

            WmEvent::ProtocolError(GatewayError::WindowGone(window)) => {
                log::debug!("Asynchronous error for vanished window 0x{:x}", window);
            }

            WmEvent::ProtocolError(e) => {
                log::warn!("X11 error: {}", e);
            }

            WmEvent::Ignored(kind) => {
                log::trace!("Ignoring {}", kind);
            }

            WmEvent::Unhandled(kind) => {
                log::warn!("Unhandled event: {}", kind);
            }
        }

        Ok(())
    }

    fn handle_configure_request(&mut self, request: ConfigureRequest) -> Result<()> {
        let window = request.window;
        let Some(id) = self.registry.find_client_by_window(window) else {
            // Unmanaged window - allow the configure
            self.gateway.configure_passthrough(&request).ignore_gone()?;
            return Ok(());
        };
        let Some(client) = self.registry.client(id) else {
            return Ok(());
        };
        let monitor = client.monitor;
        log::debug!("ConfigureRequest for managed window 0x{:x}", window);

        if client.is_fullscreen {
            if let Some(region) = self.registry.monitor(monitor).and_then(|m| m.region) {
                self.apply_resize(ResizeCommand {
                    window,
                    cell: region,
                    border_width: 0,
                })?;
            }
            return Ok(());
        }

        if client.is_transient {
            // Floating: honor the request and remember where it went
            let aux = &request.aux;
            if let Some(client) = self.registry.client_mut(id) {
                let geometry = &mut client.geometry;
                geometry.x = aux.x.unwrap_or(geometry.x);
                geometry.y = aux.y.unwrap_or(geometry.y);
                geometry.width = aux.width.unwrap_or(geometry.width);
                geometry.height = aux.height.unwrap_or(geometry.height);
            }
            self.gateway.configure_passthrough(&request).ignore_gone()?;
            return Ok(());
        }

        // Honor the request, then let the layout put the window back
        self.gateway.configure_passthrough(&request).ignore_gone()?;
        self.arrange(monitor)
    }

    fn handle_key_press(&mut self, keysym: u32, state: u16) -> Result<()> {
        // Mask out NumLock, CapsLock and pointer buttons for comparison
        let clean_state = state & 0xff & !(u16::from(ModMask::M2) | u16::from(ModMask::LOCK));
        log::debug!(
            "KeyPress: keysym=0x{:x}, state=0x{:x}, clean_state=0x{:x}",
            keysym,
            state,
            clean_state
        );

        let matched_action = self
            .keybindings
            .iter()
            .find(|(_, binding)| binding.keysym == keysym && binding.modifiers == clean_state)
            .map(|(action, _)| action.clone());

        if let Some(action) = matched_action {
            self.execute_action(action)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::mock::{Request, ROOT};
    use crate::testing::*;
    use crate::types::Rect;

    fn enter(window: Window, root_x: i32, root_y: i32) -> WmEvent {
        WmEvent::Enter {
            window,
            root_x,
            root_y,
            normal: true,
            inferior: false,
            synthetic: false,
        }
    }

    fn configure_request(window: Window) -> WmEvent {
        WmEvent::ConfigureRequest(ConfigureRequest {
            window,
            aux: ConfigureWindowAux::new().x(5).y(5).width(100).height(100),
        })
    }

    #[test]
    fn test_map_and_destroy() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.inject(WmEvent::MapRequest { window: 0xb });
        assert_eq!(wm.stack(0), vec![0xb, 0xa]);
        assert!(wm.gateway().contains(&Request::Map(0xa)));

        wm.inject(WmEvent::DestroyNotify { window: 0xb });
        assert_eq!(wm.stack(0), vec![0xa]);
        assert_eq!(wm.focused(), Some(0xa));

        // Unmanaged windows are no-ops
        wm.inject(WmEvent::DestroyNotify { window: 0xdead });
        wm.inject(WmEvent::UnmapNotify { window: 0xdead });
        assert_eq!(wm.stack(0), vec![0xa]);
    }

    #[test]
    fn test_unmap_of_visible_client_unmanages() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.inject(WmEvent::UnmapNotify { window: 0xa });
        assert!(wm.stack(0).is_empty());
        assert_eq!(wm.focused(), None);
    }

    #[test]
    fn test_configure_request_unmanaged_passes_through() {
        let mut wm = single_head();
        wm.gateway().clear();
        wm.inject(configure_request(0x50));
        assert_eq!(wm.gateway().requests, vec![Request::Passthrough(0x50)]);
    }

    #[test]
    fn test_configure_request_tiled_is_restored() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.gateway().clear();
        wm.inject(configure_request(0xa));

        let gw = wm.gateway();
        assert_eq!(gw.requests[0], Request::Passthrough(0xa));
        assert_eq!(gw.last_configure(0xa), Some((Rect::new(0, 0, 1916, 1076), 2)));
    }

    #[test]
    fn test_configure_request_fullscreen_keeps_region() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.inject(WmEvent::FullscreenRequest {
            window: 0xa,
            action: StateAction::Add,
        });
        wm.gateway().clear();
        wm.inject(configure_request(0xa));

        let gw = wm.gateway();
        assert!(!gw.contains(&Request::Passthrough(0xa)));
        assert_eq!(gw.last_configure(0xa), Some((Rect::new(0, 0, 1920, 1080), 0)));
    }

    #[test]
    fn test_configure_request_transient_is_honored() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.gateway().transients.insert(0xb, 0xa);
        wm.inject(WmEvent::MapRequest { window: 0xb });
        wm.gateway().clear();
        wm.inject(configure_request(0xb));

        assert_eq!(wm.gateway().requests, vec![Request::Passthrough(0xb)]);
        let id = wm.registry().find_client_by_window(0xb).unwrap();
        assert_eq!(
            wm.registry().client(id).unwrap().geometry,
            Rect::new(5, 5, 100, 100)
        );
    }

    #[test]
    fn test_enter_focuses_client() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.inject(WmEvent::MapRequest { window: 0xb });

        wm.inject(enter(0xa, 1000, 10));
        assert_eq!(wm.focused(), Some(0xa));

        // Crossing from a child window is not a real enter
        wm.inject(WmEvent::Enter {
            window: 0xb,
            root_x: 10,
            root_y: 10,
            normal: true,
            inferior: true,
            synthetic: false,
        });
        assert_eq!(wm.focused(), Some(0xa));

        // Grab-induced crossings are ignored too
        wm.inject(WmEvent::Enter {
            window: 0xb,
            root_x: 10,
            root_y: 10,
            normal: false,
            inferior: false,
            synthetic: false,
        });
        assert_eq!(wm.focused(), Some(0xa));
    }

    #[test]
    fn test_synthetic_enter_does_not_steal_focus() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.inject(WmEvent::MapRequest { window: 0xb });
        assert_eq!(wm.focused(), Some(0xb));

        wm.inject(WmEvent::Enter {
            window: 0xa,
            root_x: 1000,
            root_y: 10,
            normal: true,
            inferior: false,
            synthetic: true,
        });
        assert_eq!(wm.focused(), Some(0xb));

        wm.inject(enter(0xa, 1000, 10));
        assert_eq!(wm.focused(), Some(0xa));
    }

    #[test]
    fn test_root_motion_switches_monitor() {
        let mut wm = dual_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });

        wm.inject(WmEvent::Motion {
            window: ROOT,
            root_x: 2500,
            root_y: 10,
        });
        let selected = wm.registry().selected_monitor();
        assert_eq!(wm.registry().monitor_index(selected), Some(1));
        assert_eq!(wm.focused(), None);

        // Motion reported on a client window is not ours to handle
        wm.inject(WmEvent::Motion {
            window: 0xa,
            root_x: 10,
            root_y: 10,
        });
        assert_eq!(wm.focused(), None);
    }

    #[test]
    fn test_focus_in_stealing_is_reverted() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.inject(WmEvent::MapRequest { window: 0xb });
        wm.gateway().clear();

        wm.inject(WmEvent::FocusIn { window: 0xa });
        assert_eq!(wm.gateway().requests, vec![Request::Focus(Some(0xb))]);

        wm.gateway().clear();
        wm.inject(WmEvent::FocusIn { window: 0xb });
        assert!(wm.gateway().requests.is_empty());
    }

    #[test]
    fn test_key_press_ignores_lock_modifiers() {
        let mut wm = single_head();
        for window in [0xa, 0xb, 0xc] {
            wm.inject(WmEvent::MapRequest { window });
        }
        // Mod4+j with CapsLock and NumLock held
        let state = 0x40 | u16::from(ModMask::LOCK) | u16::from(ModMask::M2);
        wm.inject(WmEvent::KeyPress {
            keysym: 0x6a,
            state,
        });
        assert_eq!(wm.focused(), Some(0xb));

        // Unbound combination does nothing
        wm.inject(WmEvent::KeyPress {
            keysym: 0x6a,
            state: 0x04,
        });
        assert_eq!(wm.focused(), Some(0xb));
    }

    #[test]
    fn test_keyboard_mapping_change_regrabs() {
        let mut wm = single_head();
        wm.gateway().clear();
        wm.inject(WmEvent::KeyboardMappingChanged);
        let gw = wm.gateway();
        assert_eq!(gw.requests[0], Request::UngrabKeys);
        assert!(matches!(gw.requests[1], Request::GrabKeys(n) if n > 0));
    }

    #[test]
    fn test_activate_request_reveals_hidden_client() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.inject(WmEvent::MapRequest { window: 0xb });
        wm.execute_action(crate::config::WmAction::HideWindow).unwrap();
        assert_eq!(wm.focused(), Some(0xa));

        wm.inject(WmEvent::ActivateRequest { window: 0xb });
        assert_eq!(wm.focused(), Some(0xb));
        assert!(wm.gateway().contains(&Request::Map(0xb)));
    }

    #[test]
    fn test_close_request_for_unmanaged_window_is_ignored() {
        let mut wm = single_head();
        wm.gateway().clear();
        wm.inject(WmEvent::CloseRequest { window: 0x42 });
        assert!(wm.gateway().requests.is_empty());
    }

    #[test]
    fn test_topology_change_adds_monitor() {
        let mut wm = single_head();
        wm.gateway().topology = vec![
            Rect::new(0, 0, 1920, 1080),
            Rect::new(1920, 0, 1280, 1024),
        ];
        wm.inject(WmEvent::TopologyChanged);
        assert_eq!(wm.registry().monitor_count(), 2);
    }

    #[test]
    fn test_errors_and_unknown_events_are_survivable() {
        let mut wm = single_head();
        wm.inject(WmEvent::ProtocolError(GatewayError::WindowGone(0x9)));
        wm.inject(WmEvent::ProtocolError(GatewayError::Protocol(
            "BadMatch".into(),
        )));
        wm.inject(WmEvent::Ignored("MapNotify"));
        wm.inject(WmEvent::Unhandled("ColormapNotify".into()));
        assert!(wm.registry().validate().is_empty());
    }

    #[test]
    fn test_handlers_tolerate_vanished_windows() {
        let mut wm = single_head();
        wm.inject(WmEvent::MapRequest { window: 0xa });
        wm.inject(WmEvent::MapRequest { window: 0xb });
        wm.gateway().gone.insert(0xb);

        // Requests to 0xb now fail; the dispatcher keeps going
        wm.inject(enter(0xa, 1000, 10));
        wm.inject(WmEvent::DestroyNotify { window: 0xb });
        assert_eq!(wm.stack(0), vec![0xa]);
        assert_eq!(wm.focused(), Some(0xa));
    }
}
