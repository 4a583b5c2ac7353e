//! Window property query functions.
//!
//! Stateless functions for querying and messaging X11 client windows.

use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::*;

use crate::ewmh::Atoms;

/// Get the window title from _NET_WM_NAME or WM_NAME.
pub fn get_window_title(conn: &impl Connection, atoms: &Atoms, window: Window) -> String {
    // Try _NET_WM_NAME first
    if let Ok(reply) = conn.get_property(
        false,
        window,
        atoms.net_wm_name,
        atoms.utf8_string,
        0,
        1024,
    ) {
        if let Ok(reply) = reply.reply() {
            if !reply.value.is_empty() {
                if let Ok(s) = String::from_utf8(reply.value) {
                    return s;
                }
            }
        }
    }

    // Fall back to WM_NAME
    if let Ok(reply) = conn.get_property(
        false,
        window,
        AtomEnum::WM_NAME,
        AtomEnum::STRING,
        0,
        1024,
    ) {
        if let Ok(reply) = reply.reply() {
            if !reply.value.is_empty() {
                if let Ok(s) = String::from_utf8(reply.value) {
                    return s;
                }
            }
        }
    }

    // Default title
    format!("0x{:x}", window)
}

/// Read WM_TRANSIENT_FOR. A zero or self-referencing parent counts as none.
pub fn get_transient_for(
    conn: &impl Connection,
    window: Window,
) -> Result<Option<Window>, ReplyError> {
    let reply = conn
        .get_property(
            false,
            window,
            AtomEnum::WM_TRANSIENT_FOR,
            AtomEnum::WINDOW,
            0,
            1,
        )?
        .reply()?;
    let parent = reply.value32().and_then(|mut values| values.next());
    Ok(parent.filter(|&p| p != 0 && p != window))
}

/// Check if a window supports the WM_DELETE_WINDOW protocol.
pub fn supports_delete_protocol(conn: &impl Connection, atoms: &Atoms, window: Window) -> bool {
    if let Ok(cookie) = conn.get_property(
        false,
        window,
        atoms.wm_protocols,
        AtomEnum::ATOM,
        0,
        32,
    ) {
        if let Ok(reply) = cookie.reply() {
            if let Some(protocol_atoms) = reply.value32() {
                return protocol_atoms.into_iter().any(|a| a == atoms.wm_delete_window);
            }
        }
    }
    false
}

/// Send WM_DELETE_WINDOW client message to request graceful close.
pub fn send_delete_window(
    conn: &impl Connection,
    atoms: &Atoms,
    window: Window,
) -> Result<(), ConnectionError> {
    let data = ClientMessageData::from([atoms.wm_delete_window, 0u32, 0u32, 0u32, 0u32]);
    let event = ClientMessageEvent {
        response_type: CLIENT_MESSAGE_EVENT,
        format: 32,
        sequence: 0,
        window,
        type_: atoms.wm_protocols,
        data,
    };
    conn.send_event(false, window, EventMask::NO_EVENT, event)?;
    conn.flush()?;
    Ok(())
}

/// Whether a top-level window found at startup should be managed.
///
/// Override-redirect windows (menus, tooltips) and windows that are not
/// viewable are left alone.
pub fn is_manageable(attrs: &GetWindowAttributesReply) -> bool {
    !attrs.override_redirect && attrs.map_state == MapState::VIEWABLE
}
