//! X11 implementation of the protocol gateway.
//!
//! Owns the connection, the interned atoms and the keyboard map. Every
//! request that targets a client window is checked, so a window destroyed
//! behind our back surfaces as `GatewayError::WindowGone` at the call site
//! instead of as an asynchronous error later.

use std::collections::HashMap;

use anyhow::{Context, Result};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::cookie::VoidCookie;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::xinerama::{self, ConnectionExt as _};
use x11rb::protocol::xproto::*;
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::x11_utils::X11Error;
use x11rb::CURRENT_TIME;

use crate::config::ParsedBinding;
use crate::event::{ConfigureRequest, WmEvent};
use crate::ewmh::Atoms;
use crate::gateway::{Gateway, GatewayError, GatewayResult, Property};
use crate::state::StateAction;
use crate::types::Rect;
use crate::window_query;

impl From<ConnectionError> for GatewayError {
    fn from(e: ConnectionError) -> Self {
        GatewayError::Connection(e.to_string())
    }
}

impl From<X11Error> for GatewayError {
    fn from(e: X11Error) -> Self {
        match e.error_kind {
            ErrorKind::Window | ErrorKind::Drawable => GatewayError::WindowGone(e.bad_value),
            kind => GatewayError::Protocol(format!(
                "{:?} (major opcode {}, value 0x{:x})",
                kind, e.major_opcode, e.bad_value
            )),
        }
    }
}

impl From<ReplyError> for GatewayError {
    fn from(e: ReplyError) -> Self {
        match e {
            ReplyError::ConnectionError(e) => e.into(),
            ReplyError::X11Error(e) => e.into(),
        }
    }
}

/// Keycode to keysym table from GetKeyboardMapping
#[derive(Debug, Default)]
struct KeyboardMap {
    min_keycode: Keycode,
    keysyms_per_keycode: usize,
    keysyms: Vec<u32>,
}

impl KeyboardMap {
    fn load(conn: &RustConnection) -> Result<Self, ReplyError> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;
        let mapping = conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)?
            .reply()?;
        Ok(Self {
            min_keycode,
            keysyms_per_keycode: mapping.keysyms_per_keycode as usize,
            keysyms: mapping.keysyms,
        })
    }

    /// First keysym of a keycode (unshifted)
    fn keysym(&self, keycode: Keycode) -> u32 {
        if keycode < self.min_keycode || self.keysyms_per_keycode == 0 {
            return 0;
        }
        let idx = (keycode - self.min_keycode) as usize * self.keysyms_per_keycode;
        self.keysyms.get(idx).copied().unwrap_or(0)
    }

    /// Build keysym -> keycode map, first keycode wins
    fn keycodes(&self) -> HashMap<u32, Keycode> {
        let mut keysym_to_keycode: HashMap<u32, Keycode> = HashMap::new();
        if self.keysyms_per_keycode == 0 {
            return keysym_to_keycode;
        }
        for (i, chunk) in self.keysyms.chunks(self.keysyms_per_keycode).enumerate() {
            for keysym in chunk {
                if *keysym != 0 {
                    keysym_to_keycode
                        .entry(*keysym)
                        .or_insert(self.min_keycode + i as u8);
                }
            }
        }
        keysym_to_keycode
    }
}

/// Gateway over a live X11 connection
pub struct X11Gateway {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
    atoms: Atoms,
    /// Window advertised through _NET_SUPPORTING_WM_CHECK
    check_window: Window,
    keyboard: KeyboardMap,
    has_randr: bool,
    has_xinerama: bool,
}

impl X11Gateway {
    /// Connect to the display named by $DISPLAY and become the window manager
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) =
            RustConnection::connect(None).context("Failed to connect to X11 server")?;

        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;

        log::info!(
            "Connected to X11, screen {}, root window 0x{:x}, {}x{}",
            screen_num,
            root,
            screen.width_in_pixels,
            screen.height_in_pixels
        );

        let atoms = Atoms::new(&conn)?;

        // Small check window for EWMH _NET_SUPPORTING_WM_CHECK
        let check_window = conn.generate_id()?;
        conn.create_window(
            0, // depth (copy from parent)
            check_window,
            root,
            -1, -1, 1, 1, 0, // x, y, w, h, border
            WindowClass::INPUT_ONLY,
            0, // visual (copy from parent)
            &CreateWindowAux::new(),
        )?;

        let has_randr = conn
            .extension_information(randr::X11_EXTENSION_NAME)?
            .is_some();
        let has_xinerama = conn
            .extension_information(xinerama::X11_EXTENSION_NAME)?
            .is_some();
        let keyboard = KeyboardMap::load(&conn).context("Failed to read keyboard mapping")?;

        let gateway = Self {
            conn,
            screen_num,
            root,
            atoms,
            check_window,
            keyboard,
            has_randr,
            has_xinerama,
        };
        gateway.become_wm()?;
        gateway.setup_ewmh()?;
        Ok(gateway)
    }

    fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    /// Become the window manager by requesting SubstructureRedirect on root
    fn become_wm(&self) -> Result<()> {
        let event_mask = EventMask::SUBSTRUCTURE_REDIRECT
            | EventMask::SUBSTRUCTURE_NOTIFY
            | EventMask::ENTER_WINDOW // For focus-follows-mouse
            | EventMask::POINTER_MOTION // Monitor tracking over empty root
            | EventMask::STRUCTURE_NOTIFY; // Root resize

        let result = self.conn.change_window_attributes(
            self.root,
            &ChangeWindowAttributesAux::new().event_mask(event_mask),
        );
        self.conn.flush()?;

        if let Err(e) = result?.check() {
            anyhow::bail!("Another window manager is already running! Error: {}", e);
        }

        if self.has_randr {
            self.conn
                .randr_select_input(self.root, randr::NotifyMask::SCREEN_CHANGE)?;
        }

        log::info!("Successfully became the window manager");
        Ok(())
    }

    /// Set up EWMH properties on root window
    fn setup_ewmh(&self) -> Result<()> {
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_supported,
            AtomEnum::ATOM,
            &self.atoms.supported(),
        )?;

        // Set _NET_SUPPORTING_WM_CHECK on root and check window
        for window in [self.root, self.check_window] {
            self.conn.change_property32(
                PropMode::REPLACE,
                window,
                self.atoms.net_supporting_wm_check,
                AtomEnum::WINDOW,
                &[self.check_window],
            )?;
        }

        self.conn.change_property8(
            PropMode::REPLACE,
            self.check_window,
            self.atoms.net_wm_name,
            self.atoms.utf8_string,
            b"mtwm",
        )?;

        // Initialize empty _NET_CLIENT_LIST
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_client_list,
            AtomEnum::WINDOW,
            &[],
        )?;

        self.conn.flush()?;
        log::info!("EWMH properties set up");
        Ok(())
    }

    /// Wait for a window-targeted request to complete
    fn checked(
        &self,
        cookie: Result<VoidCookie<'_, RustConnection>, ConnectionError>,
    ) -> GatewayResult<()> {
        cookie?.check()?;
        Ok(())
    }

    /// Grab a single key combination
    fn grab_key(&self, keycode: Keycode, modifiers: ModMask) -> GatewayResult<()> {
        // Grab with and without NumLock/CapsLock to handle those states
        let numlock = ModMask::M2;
        let capslock = ModMask::LOCK;

        for extra_mods in [
            ModMask::from(0u16),
            capslock,
            numlock,
            capslock | numlock,
        ] {
            self.conn.grab_key(
                false, // owner_events
                self.root,
                modifiers | extra_mods,
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?;
        }
        Ok(())
    }

    fn randr_regions(&self) -> GatewayResult<Vec<Rect>> {
        let reply = self.conn.randr_get_monitors(self.root, true)?.reply()?;
        Ok(reply
            .monitors
            .iter()
            .map(|m| Rect::new(m.x as i32, m.y as i32, m.width as u32, m.height as u32))
            .collect())
    }

    fn xinerama_regions(&self) -> GatewayResult<Vec<Rect>> {
        if self.conn.xinerama_is_active()?.reply()?.state == 0 {
            return Ok(Vec::new());
        }
        let reply = self.conn.xinerama_query_screens()?.reply()?;
        Ok(reply
            .screen_info
            .iter()
            .map(|s| Rect::new(s.x_org as i32, s.y_org as i32, s.width as u32, s.height as u32))
            .collect())
    }

    /// Decode a `_NET_WM_STATE` request; only the fullscreen state is honored
    fn state_request(&self, e: &ClientMessageEvent) -> WmEvent {
        let data = e.data.as_data32();
        let fullscreen = self.atoms.net_wm_state_fullscreen;
        if data[1] != fullscreen && data[2] != fullscreen {
            return WmEvent::Ignored("_NET_WM_STATE (non-fullscreen)");
        }
        match StateAction::from_code(data[0]) {
            Some(action) => WmEvent::FullscreenRequest {
                window: e.window,
                action,
            },
            None => WmEvent::Unhandled(format!("_NET_WM_STATE action {}", data[0])),
        }
    }

    /// Translate a raw X11 event into the core's event type
    fn translate(&mut self, event: Event) -> WmEvent {
        match event {
            Event::MapRequest(e) => WmEvent::MapRequest { window: e.window },
            Event::UnmapNotify(e) if e.event == self.root => {
                WmEvent::UnmapNotify { window: e.window }
            }
            Event::UnmapNotify(_) => WmEvent::Ignored("UnmapNotify (client echo)"),
            Event::DestroyNotify(e) => WmEvent::DestroyNotify { window: e.window },
            Event::ConfigureRequest(e) => WmEvent::ConfigureRequest(ConfigureRequest {
                window: e.window,
                aux: ConfigureWindowAux::from_configure_request(&e),
            }),
            Event::ConfigureNotify(e) if e.window == self.root => WmEvent::TopologyChanged,
            Event::RandrScreenChangeNotify(_) => WmEvent::TopologyChanged,
            Event::EnterNotify(e) => WmEvent::Enter {
                window: e.event,
                root_x: e.root_x as i32,
                root_y: e.root_y as i32,
                normal: e.mode == NotifyMode::NORMAL,
                inferior: e.detail == NotifyDetail::INFERIOR,
                synthetic: e.response_type & 0x80 != 0,
            },
            Event::MotionNotify(e) => WmEvent::Motion {
                window: e.event,
                root_x: e.root_x as i32,
                root_y: e.root_y as i32,
            },
            Event::FocusIn(e) => WmEvent::FocusIn { window: e.event },
            Event::KeyPress(e) => WmEvent::KeyPress {
                keysym: self.keyboard.keysym(e.detail),
                state: u16::from(e.state),
            },
            Event::MappingNotify(e) if e.request == Mapping::KEYBOARD => {
                match KeyboardMap::load(&self.conn) {
                    Ok(map) => self.keyboard = map,
                    Err(err) => log::warn!("Failed to reload keyboard mapping: {}", err),
                }
                WmEvent::KeyboardMappingChanged
            }
            Event::ClientMessage(e) if e.format == 32 => {
                if e.type_ == self.atoms.net_wm_state {
                    self.state_request(&e)
                } else if e.type_ == self.atoms.net_active_window {
                    WmEvent::ActivateRequest { window: e.window }
                } else if e.type_ == self.atoms.net_close_window {
                    WmEvent::CloseRequest { window: e.window }
                } else {
                    WmEvent::Ignored("ClientMessage (unsupported type)")
                }
            }
            Event::Error(e) => WmEvent::ProtocolError(e.into()),

            // Notifications we cause ourselves or never act on
            Event::MapNotify(_) => WmEvent::Ignored("MapNotify"),
            Event::CreateNotify(_) => WmEvent::Ignored("CreateNotify"),
            Event::ConfigureNotify(_) => WmEvent::Ignored("ConfigureNotify"),
            Event::ReparentNotify(_) => WmEvent::Ignored("ReparentNotify"),
            Event::MappingNotify(_) => WmEvent::Ignored("MappingNotify (pointer)"),
            Event::KeyRelease(_) => WmEvent::Ignored("KeyRelease"),
            Event::LeaveNotify(_) => WmEvent::Ignored("LeaveNotify"),
            Event::FocusOut(_) => WmEvent::Ignored("FocusOut"),
            Event::PropertyNotify(_) => WmEvent::Ignored("PropertyNotify"),
            Event::ClientMessage(_) => WmEvent::Ignored("ClientMessage (bad format)"),
            Event::RandrNotify(_) => WmEvent::Ignored("RandrNotify"),

            other => {
                let debug = format!("{:?}", other);
                let kind = debug.split('(').next().unwrap_or("unknown").to_string();
                WmEvent::Unhandled(kind)
            }
        }
    }
}

impl Gateway for X11Gateway {
    fn root(&self) -> Window {
        self.root
    }

    fn next_event(&mut self) -> GatewayResult<Option<WmEvent>> {
        self.conn.flush()?;
        match self.conn.poll_for_event()? {
            Some(event) => Ok(Some(self.translate(event))),
            None => Ok(None),
        }
    }

    fn map_window(&mut self, window: Window) -> GatewayResult<()> {
        self.checked(self.conn.map_window(window))
    }

    fn unmap_window(&mut self, window: Window) -> GatewayResult<()> {
        self.checked(self.conn.unmap_window(window))
    }

    fn destroy_window(&mut self, window: Window) -> GatewayResult<()> {
        self.checked(self.conn.kill_client(window))
    }

    fn configure_window(
        &mut self,
        window: Window,
        geometry: Rect,
        border_width: u32,
    ) -> GatewayResult<()> {
        let aux = ConfigureWindowAux::new()
            .x(geometry.x)
            .y(geometry.y)
            .width(geometry.width.max(1))
            .height(geometry.height.max(1))
            .border_width(border_width);
        self.checked(self.conn.configure_window(window, &aux))
    }

    fn raise_window(&mut self, window: Window) -> GatewayResult<()> {
        let aux = ConfigureWindowAux::new().stack_mode(StackMode::ABOVE);
        self.checked(self.conn.configure_window(window, &aux))
    }

    fn configure_passthrough(&mut self, request: &ConfigureRequest) -> GatewayResult<()> {
        self.checked(self.conn.configure_window(request.window, &request.aux))
    }

    fn set_border_color(&mut self, window: Window, color: u32) -> GatewayResult<()> {
        self.checked(self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(color),
        ))
    }

    fn set_input_focus(&mut self, window: Option<Window>) -> GatewayResult<()> {
        let target = window.unwrap_or(self.root);
        self.checked(
            self.conn
                .set_input_focus(InputFocus::POINTER_ROOT, target, CURRENT_TIME),
        )
    }

    fn change_property(&mut self, property: Property<'_>) -> GatewayResult<()> {
        match property {
            Property::ActiveWindow(Some(window)) => {
                self.conn.change_property32(
                    PropMode::REPLACE,
                    self.root,
                    self.atoms.net_active_window,
                    AtomEnum::WINDOW,
                    &[window],
                )?;
            }
            Property::ActiveWindow(None) => {
                self.conn
                    .delete_property(self.root, self.atoms.net_active_window)?;
            }
            Property::ClientList(windows) => {
                self.conn.change_property32(
                    PropMode::REPLACE,
                    self.root,
                    self.atoms.net_client_list,
                    AtomEnum::WINDOW,
                    windows,
                )?;
            }
            Property::Fullscreen(window, on) => {
                let value: &[u32] = if on {
                    &[self.atoms.net_wm_state_fullscreen]
                } else {
                    &[]
                };
                let cookie = self.conn.change_property32(
                    PropMode::REPLACE,
                    window,
                    self.atoms.net_wm_state,
                    AtomEnum::ATOM,
                    value,
                );
                return self.checked(cookie);
            }
        }
        Ok(())
    }

    fn query_geometry(&mut self, window: Window) -> GatewayResult<Rect> {
        let geom = self
            .conn
            .get_geometry(window)?
            .reply()
            .map_err(|e| match GatewayError::from(e) {
                GatewayError::WindowGone(_) => GatewayError::WindowGone(window),
                other => other,
            })?;
        Ok(Rect::new(
            geom.x as i32,
            geom.y as i32,
            geom.width as u32,
            geom.height as u32,
        ))
    }

    fn query_pointer(&mut self) -> GatewayResult<(i32, i32)> {
        let reply = self.conn.query_pointer(self.root)?.reply()?;
        Ok((reply.root_x as i32, reply.root_y as i32))
    }

    fn query_topology(&mut self) -> GatewayResult<Vec<Rect>> {
        let mut regions = Vec::new();
        if self.has_randr {
            match self.randr_regions() {
                Ok(found) => regions = found,
                Err(e) => log::warn!("RandR monitor query failed: {}", e),
            }
        }
        if regions.is_empty() && self.has_xinerama {
            match self.xinerama_regions() {
                Ok(found) => regions = found,
                Err(e) => log::warn!("Xinerama screen query failed: {}", e),
            }
        }

        // Cloned outputs report the same region twice
        let mut unique: Vec<Rect> = Vec::with_capacity(regions.len());
        for region in regions {
            if region.width > 0 && region.height > 0 && !unique.contains(&region) {
                unique.push(region);
            }
        }

        if unique.is_empty() {
            let screen = self.screen();
            unique.push(Rect::new(
                0,
                0,
                screen.width_in_pixels as u32,
                screen.height_in_pixels as u32,
            ));
        }
        Ok(unique)
    }

    fn transient_for(&mut self, window: Window) -> GatewayResult<Option<Window>> {
        window_query::get_transient_for(&self.conn, window).map_err(|e| match GatewayError::from(e) {
            GatewayError::WindowGone(_) => GatewayError::WindowGone(window),
            other => other,
        })
    }

    fn window_title(&mut self, window: Window) -> String {
        window_query::get_window_title(&self.conn, &self.atoms, window)
    }

    fn supports_delete(&mut self, window: Window) -> bool {
        window_query::supports_delete_protocol(&self.conn, &self.atoms, window)
    }

    fn send_delete(&mut self, window: Window) -> GatewayResult<()> {
        window_query::send_delete_window(&self.conn, &self.atoms, window)?;
        Ok(())
    }

    fn select_client_events(&mut self, window: Window) -> GatewayResult<()> {
        let mask = EventMask::ENTER_WINDOW | EventMask::FOCUS_CHANGE | EventMask::PROPERTY_CHANGE;
        self.checked(self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(mask),
        ))
    }

    fn grab_keys(&mut self, bindings: &[ParsedBinding]) -> GatewayResult<()> {
        let keycodes = self.keyboard.keycodes();
        for binding in bindings {
            if let Some(&keycode) = keycodes.get(&binding.keysym) {
                self.grab_key(keycode, ModMask::from(binding.modifiers))?;
                log::debug!(
                    "Grabbed keysym 0x{:x} (keycode {}, mods 0x{:x})",
                    binding.keysym,
                    keycode,
                    binding.modifiers
                );
            } else {
                log::warn!("Could not find keycode for keysym 0x{:x}", binding.keysym);
            }
        }
        self.conn.flush()?;
        Ok(())
    }

    fn ungrab_keys(&mut self) -> GatewayResult<()> {
        self.conn.ungrab_key(Grab::ANY, self.root, ModMask::ANY)?;
        Ok(())
    }

    fn scan_windows(&mut self) -> GatewayResult<Vec<Window>> {
        let tree = self.conn.query_tree(self.root)?.reply()?;

        let mut normal = Vec::new();
        let mut transient = Vec::new();
        for &window in &tree.children {
            let attrs = match self.conn.get_window_attributes(window)?.reply() {
                Ok(attrs) => attrs,
                // Destroyed between QueryTree and the attribute query
                Err(ReplyError::X11Error(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            if !window_query::is_manageable(&attrs) {
                continue;
            }
            match window_query::get_transient_for(&self.conn, window) {
                Ok(Some(_)) => transient.push(window),
                _ => normal.push(window),
            }
        }

        // Parents first so transients can find their monitor
        normal.extend(transient);
        Ok(normal)
    }

    fn grab_exclusive(&mut self) -> GatewayResult<()> {
        self.conn.grab_server()?;
        Ok(())
    }

    fn release_exclusive(&mut self) -> GatewayResult<()> {
        self.conn.ungrab_server()?;
        self.conn.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> GatewayResult<()> {
        self.conn.sync()?;
        Ok(())
    }
}
