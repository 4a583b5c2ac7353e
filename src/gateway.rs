//! Protocol gateway: the capability the decision core drives.
//!
//! Everything the window manager asks of the display server goes through the
//! [`Gateway`] trait, so the registry, focus, layout and dispatcher logic can
//! run against the real X11 connection or against the recording mock used by
//! the unit tests.

use thiserror::Error;
use x11rb::protocol::xproto::Window;

use crate::config::ParsedBinding;
use crate::event::{ConfigureRequest, WmEvent};
use crate::types::Rect;

/// Errors surfaced by gateway requests
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request referenced a window that no longer exists
    #[error("window 0x{0:x} no longer exists")]
    WindowGone(Window),
    /// The transport to the display server failed
    #[error("display connection failed: {0}")]
    Connection(String),
    /// Any other server-side error
    #[error("protocol request failed: {0}")]
    Protocol(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Treat a vanished window as a no-op at the call site
pub trait IgnoreGone<T> {
    fn ignore_gone(self) -> GatewayResult<Option<T>>;
}

impl<T> IgnoreGone<T> for GatewayResult<T> {
    fn ignore_gone(self) -> GatewayResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(GatewayError::WindowGone(window)) => {
                log::debug!("Ignoring request for vanished window 0x{:x}", window);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Properties the core publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property<'a> {
    /// `_NET_ACTIVE_WINDOW` on root
    ActiveWindow(Option<Window>),
    /// `_NET_CLIENT_LIST` on root
    ClientList(&'a [Window]),
    /// `_NET_WM_STATE_FULLSCREEN` membership on a client
    Fullscreen(Window, bool),
}

/// Send/receive primitives over opaque window handles
pub trait Gateway {
    /// The root window
    fn root(&self) -> Window;

    /// Next pending event, or None if the queue is empty
    fn next_event(&mut self) -> GatewayResult<Option<WmEvent>>;

    fn map_window(&mut self, window: Window) -> GatewayResult<()>;
    fn unmap_window(&mut self, window: Window) -> GatewayResult<()>;
    /// Forcibly destroy a client's window
    fn destroy_window(&mut self, window: Window) -> GatewayResult<()>;

    /// Move/resize a window; `geometry` excludes the border
    fn configure_window(
        &mut self,
        window: Window,
        geometry: Rect,
        border_width: u32,
    ) -> GatewayResult<()>;
    /// Place a window at the top of the stacking order
    fn raise_window(&mut self, window: Window) -> GatewayResult<()>;
    /// Apply a client's configure request verbatim
    fn configure_passthrough(&mut self, request: &ConfigureRequest) -> GatewayResult<()>;

    fn set_border_color(&mut self, window: Window, color: u32) -> GatewayResult<()>;
    /// Direct keyboard input to `window`, or back to root
    fn set_input_focus(&mut self, window: Option<Window>) -> GatewayResult<()>;
    fn change_property(&mut self, property: Property<'_>) -> GatewayResult<()>;

    /// Current geometry of a window (excluding border)
    fn query_geometry(&mut self, window: Window) -> GatewayResult<Rect>;
    /// Pointer position in root coordinates
    fn query_pointer(&mut self) -> GatewayResult<(i32, i32)>;
    /// Physical screen regions, in output order
    fn query_topology(&mut self) -> GatewayResult<Vec<Rect>>;
    /// Parent declared through WM_TRANSIENT_FOR
    fn transient_for(&mut self, window: Window) -> GatewayResult<Option<Window>>;
    fn window_title(&mut self, window: Window) -> String;
    /// Whether the client advertises WM_DELETE_WINDOW
    fn supports_delete(&mut self, window: Window) -> bool;
    /// Ask a client to close itself
    fn send_delete(&mut self, window: Window) -> GatewayResult<()>;

    /// Subscribe to the per-client events the core relies on
    fn select_client_events(&mut self, window: Window) -> GatewayResult<()>;
    fn grab_keys(&mut self, bindings: &[ParsedBinding]) -> GatewayResult<()>;
    fn ungrab_keys(&mut self) -> GatewayResult<()>;
    /// Already-mapped top-level windows eligible for management
    fn scan_windows(&mut self) -> GatewayResult<Vec<Window>>;

    /// Freeze delivery from other clients around a destructive sequence
    fn grab_exclusive(&mut self) -> GatewayResult<()>;
    fn release_exclusive(&mut self) -> GatewayResult<()>;
    /// Round-trip so later queries observe every request sent so far
    fn sync(&mut self) -> GatewayResult<()>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_gone_swallows_vanished_window() {
        let result: GatewayResult<u32> = Err(GatewayError::WindowGone(0x42));
        assert!(matches!(result.ignore_gone(), Ok(None)));

        let result: GatewayResult<u32> = Ok(7);
        assert!(matches!(result.ignore_gone(), Ok(Some(7))));

        let result: GatewayResult<u32> = Err(GatewayError::Protocol("BadMatch".into()));
        assert!(result.ignore_gone().is_err());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::WindowGone(0x1a);
        assert_eq!(err.to_string(), "window 0x1a no longer exists");
    }
}
