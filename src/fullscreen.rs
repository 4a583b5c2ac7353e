//! Fullscreen state machine.
//!
//! A client is either `Normal` or `Fullscreen`. Entering fullscreen covers
//! the monitor region with no border; leaving hands the client back to the
//! layout, which recomputes its geometry from scratch.

use anyhow::Result;
use x11rb::protocol::xproto::Window;

use crate::gateway::{Gateway, IgnoreGone, Property};
use crate::layout::ResizeCommand;
use crate::state::{FullscreenState, StateAction, StateTransition};
use crate::Wm;

impl<G: Gateway> Wm<G> {
    /// Apply a `_NET_WM_STATE` fullscreen action to a window.
    /// Unmanaged windows and no-op transitions are ignored.
    pub fn set_fullscreen(&mut self, window: Window, action: StateAction) -> Result<()> {
        let Some(id) = self.registry.find_client_by_window(window) else {
            log::debug!("Fullscreen request for unmanaged window 0x{:x}", window);
            return Ok(());
        };
        let Some(client) = self.registry.client(id) else {
            return Ok(());
        };
        let current = client.fullscreen_state();
        let target = action.apply(current);
        if target == current {
            return Ok(());
        }
        let monitor = client.monitor;

        let entering = target == FullscreenState::Fullscreen;
        self.gateway
            .change_property(Property::Fullscreen(window, entering))
            .ignore_gone()?;
        if let Some(client) = self.registry.client_mut(id) {
            client.is_fullscreen = entering;
        }
        log::info!("Window 0x{:x} is now {:?}", window, target);
        self.tracer.trace_transition(&StateTransition::FullscreenChanged {
            window,
            state: target,
        });

        if entering {
            self.gateway.raise_window(window).ignore_gone()?;
            if let Some(region) = self.registry.monitor(monitor).and_then(|m| m.region) {
                self.apply_resize(ResizeCommand {
                    window,
                    cell: region,
                    border_width: 0,
                })?;
            }
            self.focus(Some(id))
        } else {
            self.arrange(monitor)
        }
    }

    /// Toggle fullscreen on `window`, or on the focused client
    pub fn toggle_fullscreen(&mut self, window: Option<Window>) -> Result<()> {
        match window.or_else(|| self.focused_window()) {
            Some(window) => self.set_fullscreen(window, StateAction::Toggle),
            None => Ok(()),
        }
    }
}
