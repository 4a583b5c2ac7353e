//! Focus controller: keyboard focus, selection and cross-monitor moves.

use std::cmp::Reverse;

use anyhow::Result;
use x11rb::protocol::xproto::Window;

use crate::gateway::{Gateway, IgnoreGone, Property};
use crate::layout::Layout;
use crate::registry::ClientId;
use crate::state::StateTransition;
use crate::Wm;

impl<G: Gateway> Wm<G> {
    fn window_of(&self, id: ClientId) -> Option<Window> {
        self.registry.client(id).map(|c| c.window)
    }

    /// Selected client of the selected monitor if visible, else the first
    /// visible client there
    fn fallback_focus(&self) -> Option<ClientId> {
        let monitor = self.registry.monitor(self.registry.selected_monitor())?;
        let visible = |id: &ClientId| self.registry.client(*id).is_some_and(|c| c.is_visible);
        monitor
            .selected()
            .filter(visible)
            .or_else(|| monitor.clients().iter().copied().find(visible))
    }

    /// Give input focus to a client, or to the fallback when `target` is
    /// None or not visible. With nothing to focus, focus returns to root.
    pub fn focus(&mut self, target: Option<ClientId>) -> Result<()> {
        let target = target
            .filter(|&id| self.registry.client(id).is_some_and(|c| c.is_visible))
            .or_else(|| self.fallback_focus());
        let previous = self.registry.focused();

        if let Some(prev) = previous.filter(|&p| Some(p) != target) {
            if let Some(window) = self.window_of(prev) {
                self.gateway
                    .set_border_color(window, self.config.border_unfocused)
                    .ignore_gone()?;
            }
        }

        let window = match target.and_then(|id| self.registry.client(id).map(|c| (id, c))) {
            Some((id, client)) => {
                let (window, monitor, tiled) = (client.window, client.monitor, client.is_tiled());
                self.registry.select_monitor(monitor);
                self.registry.select_client(id);
                self.gateway
                    .set_border_color(window, self.config.border_focused)
                    .ignore_gone()?;
                // Monocle only places the selected client
                if tiled && self.layout_of(monitor) == Layout::Monocle {
                    self.arrange(monitor)?;
                }
                self.gateway.raise_window(window).ignore_gone()?;
                self.gateway.set_input_focus(Some(window)).ignore_gone()?;
                self.registry.set_focused(Some(id));
                Some(window)
            }
            None => {
                self.gateway.set_input_focus(None)?;
                self.registry.set_focused(None);
                None
            }
        };
        self.gateway.change_property(Property::ActiveWindow(window))?;

        let from = previous.and_then(|p| self.window_of(p));
        if from != window {
            log::debug!("Focus 0x{:x} -> 0x{:x}", from.unwrap_or(0), window.unwrap_or(0));
            self.tracer
                .trace_transition(&StateTransition::FocusChanged { from, to: window });
        }
        Ok(())
    }

    /// Focus a managed window by id, showing it first if hidden.
    /// Returns false if the window is not managed.
    pub fn focus_window(&mut self, window: Window) -> Result<bool> {
        let Some(id) = self.registry.find_client_by_window(window) else {
            return Ok(false);
        };
        if self.registry.client(id).is_some_and(|c| !c.is_visible) {
            self.show_client(id)?;
            if let Some(monitor) = self.registry.client(id).map(|c| c.monitor) {
                self.arrange(monitor)?;
            }
        }
        self.focus(Some(id))?;
        Ok(true)
    }

    /// Cycle focus through the visible clients in global order
    pub(crate) fn focus_step(&mut self, forward: bool) -> Result<()> {
        let visible: Vec<ClientId> = self
            .registry
            .all_clients()
            .into_iter()
            .filter(|&id| self.registry.client(id).is_some_and(|c| c.is_visible))
            .collect();
        if visible.is_empty() {
            return Ok(());
        }
        let len = visible.len();
        let current = self
            .registry
            .focused()
            .and_then(|f| visible.iter().position(|&id| id == f));
        let next = match (current, forward) {
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
            (None, true) => 0,
            (None, false) => len - 1,
        };
        self.focus(Some(visible[next]))
    }

    /// Pointer-driven focus at root coordinates.
    ///
    /// Keeps the current focus while the pointer is still inside it.
    /// Otherwise prefers a fullscreen client, then a transient, then the
    /// monitor's selection, then the topmost client in stacking order.
    pub fn focus_under_pointer(&mut self, x: i32, y: i32) -> Result<()> {
        let Some(monitor) = self.registry.monitor_at(x, y) else {
            return Ok(());
        };
        let monitor_changed = monitor != self.registry.selected_monitor();

        // `focus` keeps the selected monitor's selection equal to the focused client
        let focused = self.registry.focused();
        if let Some(client) = focused.and_then(|id| self.registry.client(id)) {
            if client.monitor == monitor && client.geometry.contains(x, y) {
                return Ok(());
            }
        }

        let Some(mon) = self.registry.monitor(monitor) else {
            return Ok(());
        };
        let selected = mon.selected();
        let region = mon.region;
        let candidate = mon
            .clients()
            .iter()
            .enumerate()
            .filter_map(|(idx, &id)| self.registry.client(id).map(|c| (idx, id, c)))
            .filter(|(_, _, c)| {
                let area = if c.is_fullscreen {
                    region.unwrap_or(c.geometry)
                } else {
                    c.geometry
                };
                c.is_visible && area.contains(x, y)
            })
            .max_by_key(|(idx, id, c)| {
                (
                    c.is_fullscreen,
                    c.is_transient,
                    Some(*id) == selected,
                    Reverse(*idx),
                )
            })
            .map(|(_, id, _)| id);

        match candidate {
            Some(id) if Some(id) != focused => self.focus(Some(id)),
            Some(_) => Ok(()),
            None if monitor_changed => {
                self.registry.select_monitor(monitor);
                self.focus(None)
            }
            None => Ok(()),
        }
    }

    /// Select the neighbouring monitor and focus its selection
    pub fn focus_monitor(&mut self, forward: bool) -> Result<()> {
        if self.registry.monitor_count() < 2 {
            return Ok(());
        }
        let next = self
            .registry
            .neighbour_monitor(self.registry.selected_monitor(), forward);
        self.registry.select_monitor(next);
        self.focus(None)
    }

    /// Move the focused client to the neighbouring monitor; focus follows it
    pub fn send_to_monitor(&mut self, forward: bool) -> Result<()> {
        if self.registry.monitor_count() < 2 {
            return Ok(());
        }
        let Some(id) = self.registry.focused() else {
            return Ok(());
        };
        let Some((window, from)) = self.registry.client(id).map(|c| (c.window, c.monitor)) else {
            return Ok(());
        };
        let to = self.registry.neighbour_monitor(from, forward);
        if !self.registry.move_client(id, to) {
            return Ok(());
        }
        self.tracer.trace_transition(&StateTransition::ClientMoved {
            window,
            from: self.registry.monitor_index(from).unwrap_or(0),
            to: self.registry.monitor_index(to).unwrap_or(0),
        });
        self.arrange(from)?;
        self.arrange(to)?;
        self.focus(Some(id))
    }
}
