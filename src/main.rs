//! mtwm - a master/stack tiling window manager for X11
//!
//! Keeps a registry of monitors and clients consistent with the X server's
//! asynchronous notifications and places windows with per-monitor layouts.

mod config;
mod event;
mod ewmh;
mod focus;
mod fullscreen;
mod gateway;
mod ipc;
mod ipc_handler;
mod layout;
mod monitor;
mod registry;
mod startup;
mod state;
mod tracing;
mod types;
mod window_query;
mod x11;

use std::collections::HashMap;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use x11rb::protocol::xproto::Window;

use config::{Config, LayoutConfig, ParsedBinding, WmAction};
use gateway::{Gateway, GatewayError, IgnoreGone, Property};
use ipc::IpcServer;
use layout::{Layout, ResizeCommand};
use registry::{Client, ClientId, MonitorId, Registry};
use startup::StartupManager;
use state::{StateTransition, UnmanageReason, WindowState};
use tracing::EventTracer;
use x11::X11Gateway;

/// Set in the environment of a re-executed window manager
const RESTART_ENV: &str = "MTWM_RESTARTED";

/// Main window manager state
pub struct Wm<G: Gateway> {
    gateway: G,
    registry: Registry,
    config: LayoutConfig,
    keybindings: HashMap<WmAction, ParsedBinding>,
    running: bool,
    restart_requested: bool,
    torn_down: bool,
    ipc: Option<IpcServer>,
    tracer: EventTracer,
    /// Raised by the SIGINT/SIGTERM handler
    shutdown: Arc<AtomicBool>,
}

impl<G: Gateway> Wm<G> {
    pub fn new(
        gateway: G,
        config: LayoutConfig,
        keybindings: HashMap<WmAction, ParsedBinding>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            gateway,
            registry: Registry::new(config.master_count),
            config,
            keybindings,
            running: true,
            restart_requested: false,
            torn_down: false,
            ipc: None,
            tracer: EventTracer::new(),
            shutdown,
        }
    }

    /// Synchronize monitors, grab keys and adopt already-mapped windows
    pub fn start(&mut self) -> Result<()> {
        self.update_geometry()?;
        let (x, y) = self.gateway.query_pointer()?;
        if let Some(monitor) = self.registry.monitor_at(x, y) {
            self.registry.select_monitor(monitor);
        }
        self.grab_keys()?;
        self.scan_existing_windows()?;
        Ok(())
    }

    /// Grab our keybindings
    fn grab_keys(&mut self) -> Result<()> {
        let bindings: Vec<ParsedBinding> = self.keybindings.values().copied().collect();
        self.gateway.ungrab_keys()?;
        self.gateway.grab_keys(&bindings)?;
        Ok(())
    }

    /// Manage any existing windows
    fn scan_existing_windows(&mut self) -> Result<()> {
        let windows = self.gateway.scan_windows()?;
        log::info!("Found {} existing window(s)", windows.len());
        for window in windows {
            if let Err(e) = self.manage(window) {
                log::warn!("Failed to adopt window 0x{:x}: {:#}", window, e);
            }
        }
        Ok(())
    }

    /// Re-query the physical topology and reconcile monitors with it
    pub fn update_geometry(&mut self) -> Result<()> {
        let regions = self.gateway.query_topology()?;
        let change = monitor::synchronize(&mut self.registry, &regions);
        if !change.is_empty() {
            log::info!(
                "Topology changed: {} monitor(s), +{} -{}, {} client(s) migrated",
                self.registry.monitor_count(),
                change.created,
                change.removed,
                change.migrated
            );
            self.tracer.trace_transition(&StateTransition::MonitorsChanged {
                created: change.created,
                removed: change.removed,
                migrated: change.migrated,
            });
        }
        self.arrange_all()?;
        if change.removed > 0 {
            // The selected monitor may have been dropped
            self.focus(self.registry.focused())?;
        }
        Ok(())
    }

    // =========================================================================
    // Client lifecycle
    // =========================================================================

    /// Start managing a window
    pub fn manage(&mut self, window: Window) -> Result<()> {
        if window == self.gateway.root() || self.registry.find_client_by_window(window).is_some() {
            return Ok(());
        }
        let Some(geometry) = self.gateway.query_geometry(window).ignore_gone()? else {
            return Ok(());
        };
        let parent = self.gateway.transient_for(window).ignore_gone()?.flatten();
        let parent_client = parent.and_then(|p| self.registry.find_client_by_window(p));

        let monitor = match parent_client.and_then(|p| self.registry.client(p)) {
            Some(parent) => parent.monitor,
            None => self
                .registry
                .find_monitor_for_window(window, Some((geometry.x, geometry.y))),
        };

        if self.gateway.select_client_events(window).ignore_gone()?.is_none() {
            return Ok(());
        }
        self.gateway
            .set_border_color(window, self.config.border_unfocused)
            .ignore_gone()?;

        let is_transient = parent.is_some();
        let id = self
            .registry
            .add_client(monitor, Client::new(window, geometry, is_transient));
        let monitor_index = self.registry.monitor_index(monitor).unwrap_or(0);
        log::info!(
            "Managing window 0x{:x} on monitor {}{}",
            window,
            monitor_index,
            if is_transient { " (transient)" } else { "" }
        );
        self.tracer.trace_transition(&StateTransition::ClientManaged {
            window,
            monitor: monitor_index,
        });

        if is_transient {
            // Keeps its own geometry, only the border is ours
            self.gateway
                .configure_window(window, geometry, self.config.border_width)
                .ignore_gone()?;
        }
        self.gateway.map_window(window).ignore_gone()?;
        self.arrange(monitor)?;
        self.publish_client_list()?;
        self.focus(Some(id))?;
        Ok(())
    }

    /// Stop managing a window; no-op if it is not managed
    pub fn unmanage(&mut self, window: Window, reason: UnmanageReason) -> Result<()> {
        let Some(id) = self.registry.find_client_by_window(window) else {
            return Ok(());
        };
        let was_focused = self.registry.focused() == Some(id);
        let Some(client) = self.registry.remove_client(id) else {
            return Ok(());
        };
        log::info!("Unmanaging window 0x{:x} ({:?})", window, reason);
        self.tracer
            .trace_transition(&StateTransition::ClientUnmanaged { window, reason });

        self.arrange(client.monitor)?;
        self.publish_client_list()?;
        if was_focused {
            self.focus(None)?;
        }
        Ok(())
    }

    fn publish_client_list(&mut self) -> Result<()> {
        let windows = self.registry.all_windows();
        self.gateway.change_property(Property::ClientList(&windows))?;
        Ok(())
    }

    // =========================================================================
    // Layout
    // =========================================================================

    fn layout_of(&self, monitor: MonitorId) -> Layout {
        self.registry
            .monitor(monitor)
            .and_then(|m| self.config.layouts.get(m.layout_index))
            .copied()
            .unwrap_or(Layout::Tile)
    }

    /// Run the monitor's layout and apply the resulting placements.
    /// Fullscreen clients are re-fitted to the region as well.
    pub fn arrange(&mut self, monitor: MonitorId) -> Result<()> {
        let Some(mon) = self.registry.monitor(monitor) else {
            return Ok(());
        };
        let Some(region) = mon.region else {
            return Ok(());
        };
        let layout = self.layout_of(monitor);
        let master_count = mon.master_count;
        let selected = mon
            .selected()
            .and_then(|id| self.registry.client(id))
            .map(|c| c.window);
        let fullscreen: Vec<Window> = mon
            .clients()
            .iter()
            .filter_map(|&id| self.registry.client(id))
            .filter(|c| c.is_fullscreen && c.is_visible)
            .map(|c| c.window)
            .collect();
        let windows: Vec<Window> = self
            .registry
            .tiled_clients(monitor)
            .into_iter()
            .filter_map(|id| self.registry.client(id).map(|c| c.window))
            .collect();

        let commands = layout.arrange(
            region,
            &windows,
            selected,
            master_count,
            self.config.border_width,
        );
        log::debug!(
            "Arranging {} client(s) with {} on {}x{}+{}+{}",
            windows.len(),
            layout.name(),
            region.width,
            region.height,
            region.x,
            region.y
        );
        for command in commands {
            self.apply_resize(command)?;
            if layout == Layout::Monocle {
                self.gateway.raise_window(command.window).ignore_gone()?;
            }
        }
        for window in fullscreen {
            self.apply_resize(ResizeCommand {
                window,
                cell: region,
                border_width: 0,
            })?;
        }
        Ok(())
    }

    fn arrange_all(&mut self) -> Result<()> {
        for monitor in self.registry.monitor_ids().to_vec() {
            self.arrange(monitor)?;
        }
        Ok(())
    }

    /// Send one placement and remember the outer cell
    fn apply_resize(&mut self, command: ResizeCommand) -> Result<()> {
        if let Some(id) = self.registry.find_client_by_window(command.window) {
            if let Some(client) = self.registry.client_mut(id) {
                client.geometry = command.cell;
            }
        }
        self.gateway
            .configure_window(command.window, command.geometry(), command.border_width)
            .ignore_gone()?;
        Ok(())
    }

    fn set_layout(&mut self, index: usize) -> Result<()> {
        let Some(&layout) = self.config.layouts.get(index) else {
            log::warn!("No layout at index {}", index);
            return Ok(());
        };
        let monitor = self.registry.selected_monitor();
        if let Some(mon) = self.registry.monitor_mut(monitor) {
            mon.layout_index = index;
        }
        let index = self.registry.monitor_index(monitor).unwrap_or(0);
        log::info!("Monitor {} layout {} {}", index, layout.symbol(), layout.name());
        self.tracer.trace_transition(&StateTransition::LayoutChanged {
            monitor: index,
            layout: layout.name().to_string(),
        });
        self.arrange(monitor)
    }

    fn cycle_layout(&mut self) -> Result<()> {
        let monitor = self.registry.selected_monitor();
        let current = self
            .registry
            .monitor(monitor)
            .map(|m| m.layout_index)
            .unwrap_or(0);
        self.set_layout((current + 1) % self.config.layouts.len().max(1))
    }

    fn set_master_count(&mut self, count: usize) -> Result<()> {
        let monitor = self.registry.selected_monitor();
        if let Some(mon) = self.registry.monitor_mut(monitor) {
            mon.master_count = count;
        }
        self.arrange(monitor)
    }

    fn adjust_master_count(&mut self, increase: bool) -> Result<()> {
        let monitor = self.registry.selected_monitor();
        let current = self
            .registry
            .monitor(monitor)
            .map(|m| m.master_count)
            .unwrap_or(0);
        let count = if increase {
            current + 1
        } else {
            current.saturating_sub(1)
        };
        self.set_master_count(count)
    }

    /// Swap the focused client into the master slot. When it is already
    /// master, the next tiled client takes its place.
    fn zoom(&mut self) -> Result<()> {
        let Some(id) = self.registry.focused() else {
            return Ok(());
        };
        let Some(client) = self.registry.client(id) else {
            return Ok(());
        };
        if !client.is_tiled() {
            return Ok(());
        }
        let monitor = client.monitor;
        let tiled = self.registry.tiled_clients(monitor);
        let target = if tiled.first() == Some(&id) {
            match tiled.get(1) {
                Some(&next) => next,
                None => return Ok(()),
            }
        } else {
            id
        };
        self.registry.zoom(target);
        self.arrange(monitor)?;
        self.focus(Some(target))
    }

    // =========================================================================
    // Visibility and closing
    // =========================================================================

    fn hide_focused(&mut self) -> Result<()> {
        let Some(id) = self.registry.focused() else {
            return Ok(());
        };
        let Some(client) = self.registry.client_mut(id) else {
            return Ok(());
        };
        client.is_visible = false;
        let (window, monitor) = (client.window, client.monitor);
        self.tracer.trace_transition(&StateTransition::VisibilityChanged {
            window,
            state: WindowState::Hidden,
        });
        self.gateway.unmap_window(window).ignore_gone()?;
        self.arrange(monitor)?;
        self.focus(None)
    }

    /// Re-map every hidden client of the selected monitor
    fn show_all(&mut self) -> Result<()> {
        let monitor = self.registry.selected_monitor();
        let hidden: Vec<ClientId> = self
            .registry
            .monitor(monitor)
            .map(|m| m.clients().to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter(|&id| self.registry.client(id).is_some_and(|c| !c.is_visible))
            .collect();
        if hidden.is_empty() {
            return Ok(());
        }
        for id in hidden {
            self.show_client(id)?;
        }
        self.arrange(monitor)?;
        if self.registry.focused().is_none() {
            self.focus(None)?;
        }
        Ok(())
    }

    fn show_client(&mut self, id: ClientId) -> Result<()> {
        let Some(client) = self.registry.client_mut(id) else {
            return Ok(());
        };
        if client.is_visible {
            return Ok(());
        }
        client.is_visible = true;
        let window = client.window;
        self.tracer.trace_transition(&StateTransition::VisibilityChanged {
            window,
            state: WindowState::Visible,
        });
        self.gateway.map_window(window).ignore_gone()?;
        Ok(())
    }

    /// Politely close a client, or destroy it if it does not speak
    /// WM_DELETE_WINDOW
    pub fn close_window(&mut self, window: Window) -> Result<()> {
        if self.registry.find_client_by_window(window).is_none() {
            return Ok(());
        }
        if self.gateway.supports_delete(window) {
            log::info!("Requesting close of window 0x{:x}", window);
            self.gateway.send_delete(window).ignore_gone()?;
            return Ok(());
        }

        log::info!("Destroying window 0x{:x}", window);
        self.gateway.grab_exclusive()?;
        let destroyed = self
            .gateway
            .destroy_window(window)
            .ignore_gone()
            .and_then(|_| self.gateway.sync());
        self.gateway.release_exclusive()?;
        destroyed?;
        Ok(())
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Execute a window manager action
    pub fn execute_action(&mut self, action: WmAction) -> Result<()> {
        log::debug!("Executing action {:?}", action);
        match action {
            WmAction::Spawn(command) => {
                startup::spawn_command(&command);
            }
            WmAction::FocusNext => self.focus_step(true)?,
            WmAction::FocusPrev => self.focus_step(false)?,
            WmAction::FocusMonitorNext => self.focus_monitor(true)?,
            WmAction::FocusMonitorPrev => self.focus_monitor(false)?,
            WmAction::SendToMonitorNext => self.send_to_monitor(true)?,
            WmAction::SendToMonitorPrev => self.send_to_monitor(false)?,
            WmAction::IncMaster => self.adjust_master_count(true)?,
            WmAction::DecMaster => self.adjust_master_count(false)?,
            WmAction::Zoom => self.zoom()?,
            WmAction::SetLayout(index) => self.set_layout(index)?,
            WmAction::CycleLayout => self.cycle_layout()?,
            WmAction::ToggleFullscreen => self.toggle_fullscreen(None)?,
            WmAction::HideWindow => self.hide_focused()?,
            WmAction::ShowAll => self.show_all()?,
            WmAction::CloseWindow => {
                if let Some(window) = self.focused_window() {
                    self.close_window(window)?;
                }
            }
            WmAction::Restart => {
                log::info!("Restarting window manager");
                self.restart_requested = true;
                self.running = false;
            }
            WmAction::Quit => {
                log::info!("Quitting window manager");
                self.running = false;
            }
        }
        Ok(())
    }

    fn focused_window(&self) -> Option<Window> {
        self.registry
            .focused()
            .and_then(|id| self.registry.client(id))
            .map(|c| c.window)
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    /// Dispatch every event currently queued. Returns how many were handled.
    fn dispatch_pending(&mut self) -> Result<usize> {
        let mut handled = 0;
        while self.running {
            let event = match self.gateway.next_event() {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(GatewayError::Connection(msg)) => {
                    anyhow::bail!("Lost connection to display server: {}", msg)
                }
                Err(e) => {
                    log::error!("Error polling for event: {}", e);
                    break;
                }
            };
            if let Err(e) = self.handle_event(event) {
                log::error!("Error handling event: {:#}", e);
            }
            handled += 1;
        }
        Ok(handled)
    }

    fn poll_ipc(&mut self) {
        // Take the server out to avoid borrow conflicts while handling
        let Some(ipc) = self.ipc.take() else {
            return;
        };
        let mut pending_commands = Vec::new();
        while let Some((cmd, client)) = ipc.poll() {
            pending_commands.push((cmd, client));
        }
        self.ipc = Some(ipc);

        for (cmd, mut client) in pending_commands {
            let response = self.handle_ipc(cmd);
            if let Err(e) = client.respond(response) {
                log::warn!("Failed to send IPC response: {}", e);
            }
        }
    }

    /// Main event loop
    pub fn run(&mut self) -> Result<()> {
        log::info!("Entering event loop");

        while self.running {
            if self.shutdown.load(Ordering::SeqCst) {
                log::info!("Termination signal received");
                self.running = false;
                break;
            }

            self.poll_ipc();

            if self.dispatch_pending()? == 0 {
                // No event, sleep briefly to avoid busy-waiting
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        log::info!("Exiting event loop");
        Ok(())
    }

    /// Release grabs, make every hidden client visible again and drop the
    /// active-window property. Runs at most once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        log::info!("Tearing down");

        if let Err(e) = self.gateway.release_exclusive() {
            log::warn!("Failed to release server grab: {}", e);
        }
        if let Err(e) = self.gateway.ungrab_keys() {
            log::warn!("Failed to release key grabs: {}", e);
        }
        for id in self.registry.all_clients() {
            let Some(client) = self.registry.client_mut(id) else {
                continue;
            };
            if client.is_visible {
                continue;
            }
            client.is_visible = true;
            let window = client.window;
            if let Err(e) = self.gateway.map_window(window).ignore_gone() {
                log::warn!("Failed to restore hidden window 0x{:x}: {}", window, e);
            }
        }
        if let Err(e) = self
            .gateway
            .set_input_focus(None)
            .and_then(|_| self.gateway.change_property(Property::ActiveWindow(None)))
            .and_then(|_| self.gateway.sync())
        {
            log::warn!("Failed to reset focus during teardown: {}", e);
        }
    }
}

impl<G: Gateway> Drop for Wm<G> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Replace this process with a fresh copy of the window manager
fn restart() -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    log::info!("Re-executing {:?}", exe);
    let err = Command::new(&exe).args(&args).env(RESTART_ENV, "1").exec();
    Err(err).with_context(|| format!("Failed to re-execute {:?}", exe))
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting mtwm - master/stack tiling window manager");

    // Load user configuration
    let user_config = Config::load();
    let config = LayoutConfig::from_config(&user_config);
    let keybindings = user_config.parse_keybindings();

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let flag = shutdown.clone();
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
            log::warn!("Failed to install signal handler: {}", e);
        }
    }

    let gateway = X11Gateway::connect()?;
    let mut wm = Wm::new(gateway, config, keybindings, shutdown);

    // Initialize IPC server (non-fatal if it fails)
    wm.ipc = match IpcServer::bind() {
        Ok(server) => Some(server),
        Err(e) => {
            log::warn!("Failed to start IPC server: {}. IPC will be disabled.", e);
            None
        }
    };

    wm.start()?;

    if std::env::var_os(RESTART_ENV).is_none() {
        StartupManager::new(&user_config.startup).spawn_all();
    }

    let result = wm.run();
    let restart_requested = wm.restart_requested;
    drop(wm);
    result?;

    if restart_requested {
        restart()?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::gateway::mock::{RecordingGateway, Request};
    use crate::types::Rect;

    #[test]
    fn test_start_synchronizes_and_adopts_existing_windows() {
        let mut gateway = RecordingGateway::single_head();
        gateway.existing = vec![0x10, 0x20];
        let wm = wm_with(gateway);

        assert_eq!(wm.registry().monitor_count(), 1);
        assert_eq!(wm.stack(0), vec![0x20, 0x10]);
        assert_eq!(wm.focused(), Some(0x20));
        assert!(wm.registry().validate().is_empty());
    }

    #[test]
    fn test_manage_places_on_monitor_under_top_left() {
        let mut wm = dual_head();
        wm.gateway()
            .geometries
            .insert(0x30, Rect::new(2000, 100, 400, 300));
        wm.manage(0x30).unwrap();

        assert_eq!(wm.stack(1), vec![0x30]);
        assert!(wm.stack(0).is_empty());
        assert_eq!(wm.focused(), Some(0x30));
        assert_eq!(
            wm.gateway().last_configure(0x30),
            Some((Rect::new(1920, 0, 1916, 1076), 2))
        );
    }

    #[test]
    fn test_manage_twice_is_ignored() {
        let mut wm = single_head();
        wm.manage(0x10).unwrap();
        wm.manage(0x10).unwrap();
        assert_eq!(wm.stack(0), vec![0x10]);
    }

    #[test]
    fn test_manage_vanished_window_is_noop() {
        let mut wm = single_head();
        wm.gateway().gone.insert(0x66);
        wm.manage(0x66).unwrap();
        assert!(wm.stack(0).is_empty());
    }

    #[test]
    fn test_transient_follows_parent_and_is_not_tiled() {
        let mut wm = dual_head();
        wm.gateway()
            .geometries
            .insert(0x10, Rect::new(2000, 0, 800, 600));
        wm.manage(0x10).unwrap();

        wm.gateway().transients.insert(0x11, 0x10);
        wm.gateway()
            .geometries
            .insert(0x11, Rect::new(10, 10, 300, 200));
        wm.gateway().clear();
        wm.manage(0x11).unwrap();

        assert_eq!(wm.stack(1), vec![0x11, 0x10]);
        // Keeps its own geometry, parent still fills the monitor
        assert_eq!(
            wm.gateway().last_configure(0x11),
            Some((Rect::new(10, 10, 300, 200), 2))
        );
        assert_eq!(
            wm.gateway().last_configure(0x10),
            Some((Rect::new(1920, 0, 1916, 1076), 2))
        );
    }

    #[test]
    fn test_tile_three_clients_through_gateway() {
        let mut wm = single_head();
        for window in [0xa, 0xb, 0xc] {
            wm.manage(window).unwrap();
        }
        assert_eq!(wm.stack(0), vec![0xc, 0xb, 0xa]);
        let gw = wm.gateway();
        assert_eq!(gw.last_configure(0xc), Some((Rect::new(0, 0, 956, 1076), 2)));
        assert_eq!(gw.last_configure(0xb), Some((Rect::new(960, 0, 956, 536), 2)));
        assert_eq!(gw.last_configure(0xa), Some((Rect::new(960, 540, 956, 536), 2)));
    }

    #[test]
    fn test_unmanage_relayouts_and_refocuses() {
        let mut wm = single_head();
        wm.manage(0xa).unwrap();
        wm.manage(0xb).unwrap();
        assert_eq!(wm.focused(), Some(0xb));

        wm.unmanage(0xb, UnmanageReason::ClientDestroyed).unwrap();
        assert_eq!(wm.stack(0), vec![0xa]);
        assert_eq!(wm.focused(), Some(0xa));
        assert_eq!(
            wm.gateway().last_configure(0xa),
            Some((Rect::new(0, 0, 1916, 1076), 2))
        );
        assert!(wm.gateway().contains(&Request::ClientList(vec![0xa])));

        // Second removal is a no-op
        wm.unmanage(0xb, UnmanageReason::ClientDestroyed).unwrap();
        wm.unmanage(0xa, UnmanageReason::ClientUnmapped).unwrap();
        assert_eq!(wm.focused(), None);
        assert!(wm.gateway().contains(&Request::ActiveWindow(None)));
    }

    #[test]
    fn test_topology_shrink_migrates_and_relayouts_once() {
        let mut wm = dual_head();
        wm.manage(0x1).unwrap();
        wm.gateway()
            .geometries
            .insert(0x2, Rect::new(2000, 0, 100, 100));
        wm.manage(0x2).unwrap();
        wm.gateway()
            .geometries
            .insert(0x3, Rect::new(2000, 0, 100, 100));
        wm.manage(0x3).unwrap();
        assert_eq!(wm.focused(), Some(0x3));

        wm.gateway().topology = vec![Rect::new(0, 0, 1920, 1080)];
        wm.gateway().clear();
        wm.update_geometry().unwrap();

        assert_eq!(wm.registry().monitor_count(), 1);
        assert_eq!(wm.stack(0), vec![0x1, 0x3, 0x2]);
        // One layout pass over monitor 0: one configure per client
        let configures = wm.gateway().configures();
        assert_eq!(configures.len(), 3);
        assert_eq!(configures[0], (0x1, Rect::new(0, 0, 956, 1076), 2));
        // Focus stays on the migrated client and is consistent again
        assert_eq!(wm.focused(), Some(0x3));
        assert!(wm.registry().validate().is_empty());
    }

    #[test]
    fn test_master_count_and_layout_actions() {
        let mut wm = single_head();
        for window in [0xa, 0xb, 0xc] {
            wm.manage(window).unwrap();
        }
        wm.execute_action(WmAction::IncMaster).unwrap();
        assert_eq!(
            wm.gateway().last_configure(0xb),
            Some((Rect::new(0, 540, 956, 536), 2))
        );

        wm.execute_action(WmAction::SetLayout(1)).unwrap();
        assert_eq!(
            wm.gateway().last_configure(0xc),
            Some((Rect::new(0, 0, 1920, 1080), 0))
        );

        // Out of range index is ignored
        wm.execute_action(WmAction::SetLayout(7)).unwrap();
        wm.execute_action(WmAction::CycleLayout).unwrap();
        let id = wm.registry().selected_monitor();
        assert_eq!(wm.registry().monitor(id).unwrap().layout_index, 0);
    }

    #[test]
    fn test_zoom_swaps_master() {
        let mut wm = single_head();
        for window in [0xa, 0xb, 0xc] {
            wm.manage(window).unwrap();
        }
        // 0xc is master and focused: zoom promotes the next one
        wm.execute_action(WmAction::Zoom).unwrap();
        assert_eq!(wm.stack(0), vec![0xb, 0xc, 0xa]);
        assert_eq!(wm.focused(), Some(0xb));
    }

    #[test]
    fn test_hide_and_show_all() {
        let mut wm = single_head();
        wm.manage(0xa).unwrap();
        wm.manage(0xb).unwrap();

        wm.execute_action(WmAction::HideWindow).unwrap();
        assert!(wm.gateway().contains(&Request::Unmap(0xb)));
        assert_eq!(wm.focused(), Some(0xa));
        assert_eq!(
            wm.gateway().last_configure(0xa),
            Some((Rect::new(0, 0, 1916, 1076), 2))
        );

        // The echo of our own unmap does not unmanage the client
        wm.inject(event::WmEvent::UnmapNotify { window: 0xb });
        assert_eq!(wm.stack(0), vec![0xb, 0xa]);

        wm.execute_action(WmAction::ShowAll).unwrap();
        assert!(wm.gateway().contains(&Request::Map(0xb)));
        assert_eq!(
            wm.gateway().last_configure(0xb),
            Some((Rect::new(0, 0, 956, 1076), 2))
        );
    }

    #[test]
    fn test_close_uses_delete_protocol_when_supported() {
        let mut wm = single_head();
        wm.manage(0xa).unwrap();
        wm.gateway().delete_supported.insert(0xa);
        wm.execute_action(WmAction::CloseWindow).unwrap();
        assert!(wm.gateway().contains(&Request::SendDelete(0xa)));
        assert!(!wm.gateway().contains(&Request::Destroy(0xa)));
    }

    #[test]
    fn test_close_destroys_inside_exclusive_bracket() {
        let mut wm = single_head();
        wm.manage(0xa).unwrap();
        wm.gateway().clear();
        wm.execute_action(WmAction::CloseWindow).unwrap();
        assert_eq!(
            wm.gateway().requests,
            vec![
                Request::GrabExclusive,
                Request::Destroy(0xa),
                Request::Sync,
                Request::ReleaseExclusive,
            ]
        );
    }

    #[test]
    fn test_quit_and_restart_stop_the_loop() {
        let mut wm = single_head();
        wm.execute_action(WmAction::Quit).unwrap();
        assert!(!wm.running);
        assert!(!wm.restart_requested);

        let mut wm = single_head();
        wm.execute_action(WmAction::Restart).unwrap();
        assert!(!wm.running);
        assert!(wm.restart_requested);
    }

    #[test]
    fn test_run_exits_on_shutdown_flag() {
        let mut wm = single_head();
        wm.shutdown.store(true, Ordering::SeqCst);
        wm.run().unwrap();
        assert!(!wm.running);
    }

    #[test]
    fn test_teardown_restores_hidden_clients_once() {
        let mut wm = single_head();
        wm.manage(0xa).unwrap();
        wm.execute_action(WmAction::HideWindow).unwrap();
        wm.gateway().clear();

        wm.teardown();
        let requests = wm.gateway().requests.clone();
        assert!(requests.contains(&Request::ReleaseExclusive));
        assert!(requests.contains(&Request::UngrabKeys));
        assert!(requests.contains(&Request::Map(0xa)));
        assert!(requests.contains(&Request::ActiveWindow(None)));

        wm.gateway().clear();
        wm.teardown();
        assert!(wm.gateway().requests.is_empty());
    }
}
