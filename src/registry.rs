//! Entity registry: managed clients, monitors and their containment.
//!
//! Clients and monitors live in slotmap arenas and refer to each other by key,
//! so removing an entity invalidates its handle instead of leaving a dangling
//! reference. Monitor order is kept separately from the arena because it is
//! meaningful (index 0 receives migrated clients, directional focus walks it).

use slotmap::{new_key_type, SlotMap};
use x11rb::protocol::xproto::Window;

use crate::state::{FullscreenState, StateViolation, ViolationKind};
use crate::types::Rect;

new_key_type! {
    /// Unique identifier for a managed client
    pub struct ClientId;
    /// Unique identifier for a monitor
    pub struct MonitorId;
}

/// One managed top-level window
#[derive(Debug, Clone)]
pub struct Client {
    /// X11 window handle (not owned)
    pub window: Window,
    /// Monitor whose client list holds this client
    pub monitor: MonitorId,
    /// Last outer geometry we placed (or observed) the window at
    pub geometry: Rect,
    pub is_fullscreen: bool,
    /// False while hidden by user action (mapped-but-hidden, not withdrawn)
    pub is_visible: bool,
    /// Declared WM_TRANSIENT_FOR at manage time
    pub is_transient: bool,
}

impl Client {
    pub fn new(window: Window, geometry: Rect, is_transient: bool) -> Self {
        Self {
            window,
            monitor: MonitorId::default(),
            geometry,
            is_fullscreen: false,
            is_visible: true,
            is_transient,
        }
    }

    /// Whether the layout engine places this client
    pub fn is_tiled(&self) -> bool {
        self.is_visible && !self.is_transient && !self.is_fullscreen
    }

    pub fn fullscreen_state(&self) -> FullscreenState {
        if self.is_fullscreen {
            FullscreenState::Fullscreen
        } else {
            FullscreenState::Normal
        }
    }
}

/// A screen region and the stack of clients assigned to it
#[derive(Debug)]
pub struct Monitor {
    /// Position and size on the root window; None until paired with a physical region
    pub region: Option<Rect>,
    /// Stacking/tiling order, index 0 is the master slot
    clients: Vec<ClientId>,
    selected: Option<ClientId>,
    /// Index into the layout registry
    pub layout_index: usize,
    pub master_count: usize,
}

impl Monitor {
    pub(crate) fn new(region: Option<Rect>, master_count: usize) -> Self {
        Self {
            region,
            clients: Vec::new(),
            selected: None,
            layout_index: 0,
            master_count,
        }
    }

    pub fn clients(&self) -> &[ClientId] {
        &self.clients
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains(&id)
    }

    /// The selected client, falling back to the master slot when the stored
    /// selection is no longer a member
    pub fn selected(&self) -> Option<ClientId> {
        match self.selected {
            Some(id) if self.clients.contains(&id) => Some(id),
            _ => self.clients.first().copied(),
        }
    }

    /// Select a member client
    pub fn select(&mut self, id: ClientId) {
        debug_assert!(
            self.clients.contains(&id),
            "selected client must belong to the monitor"
        );
        if self.clients.contains(&id) {
            self.selected = Some(id);
        }
    }

    fn attach_head(&mut self, id: ClientId) {
        self.clients.insert(0, id);
    }

    fn attach_tail(&mut self, id: ClientId) {
        self.clients.push(id);
    }

    fn detach(&mut self, id: ClientId) -> bool {
        let Some(idx) = self.clients.iter().position(|&c| c == id) else {
            return false;
        };
        self.clients.remove(idx);
        if self.selected == Some(id) {
            self.selected = self.clients.first().copied();
        }
        true
    }
}

/// Owns every client and monitor
#[derive(Debug)]
pub struct Registry {
    clients: SlotMap<ClientId, Client>,
    monitors: SlotMap<MonitorId, Monitor>,
    /// Stable monitor order
    order: Vec<MonitorId>,
    selected_monitor: Option<MonitorId>,
    /// The single active client
    focused: Option<ClientId>,
    default_master_count: usize,
}

impl Registry {
    /// Create a registry holding one monitor that has no region yet
    pub fn new(default_master_count: usize) -> Self {
        let mut registry = Self {
            clients: SlotMap::with_key(),
            monitors: SlotMap::with_key(),
            order: Vec::new(),
            selected_monitor: None,
            focused: None,
            default_master_count,
        };
        registry.push_monitor(None);
        registry
    }

    /// Create a registry with one monitor per region (for tests)
    #[cfg(test)]
    pub fn with_regions(regions: &[Rect], master_count: usize) -> Self {
        let mut registry = Self::new(master_count);
        crate::monitor::synchronize(&mut registry, regions);
        registry
    }

    // =========================================================================
    // Monitors
    // =========================================================================

    pub fn monitor(&self, id: MonitorId) -> Option<&Monitor> {
        self.monitors.get(id)
    }

    pub fn monitor_mut(&mut self, id: MonitorId) -> Option<&mut Monitor> {
        self.monitors.get_mut(id)
    }

    /// Monitor ids in their stable order
    pub fn monitor_ids(&self) -> &[MonitorId] {
        &self.order
    }

    pub fn monitor_count(&self) -> usize {
        self.order.len()
    }

    pub fn monitor_index(&self, id: MonitorId) -> Option<usize> {
        self.order.iter().position(|&m| m == id)
    }

    /// The selected monitor, defaulting to the first one
    pub fn selected_monitor(&self) -> MonitorId {
        match self.selected_monitor {
            Some(id) if self.monitors.contains_key(id) => id,
            _ => self.order[0],
        }
    }

    pub fn select_monitor(&mut self, id: MonitorId) -> bool {
        if self.monitors.contains_key(id) {
            self.selected_monitor = Some(id);
            true
        } else {
            false
        }
    }

    /// Find the monitor whose region contains a point
    pub fn monitor_at(&self, x: i32, y: i32) -> Option<MonitorId> {
        self.order.iter().copied().find(|&id| {
            self.monitors[id]
                .region
                .is_some_and(|region| region.contains(x, y))
        })
    }

    /// Neighbouring monitor in list order, wrapping around
    pub fn neighbour_monitor(&self, from: MonitorId, forward: bool) -> MonitorId {
        let len = self.order.len();
        let idx = self.monitor_index(from).unwrap_or(0);
        let next = if forward {
            (idx + 1) % len
        } else {
            (idx + len - 1) % len
        };
        self.order[next]
    }

    pub(crate) fn push_monitor(&mut self, region: Option<Rect>) -> MonitorId {
        let id = self
            .monitors
            .insert(Monitor::new(region, self.default_master_count));
        self.order.push(id);
        id
    }

    /// Drop a monitor, appending its clients to `into` in their current order.
    /// Returns the number of migrated clients.
    pub(crate) fn retire_monitor(&mut self, id: MonitorId, into: MonitorId) -> usize {
        if id == into || !self.monitors.contains_key(into) {
            return 0;
        }
        let Some(monitor) = self.monitors.remove(id) else {
            return 0;
        };
        self.order.retain(|&m| m != id);

        let migrated = monitor.clients.len();
        for client_id in monitor.clients {
            if let Some(client) = self.clients.get_mut(client_id) {
                client.monitor = into;
            }
            self.monitors[into].attach_tail(client_id);
        }
        if self.selected_monitor == Some(id) {
            self.selected_monitor = None;
        }
        migrated
    }

    // =========================================================================
    // Clients
    // =========================================================================

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    pub fn client_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// The focused client, if it still exists
    pub fn focused(&self) -> Option<ClientId> {
        self.focused.filter(|&id| self.clients.contains_key(id))
    }

    pub(crate) fn set_focused(&mut self, id: Option<ClientId>) {
        self.focused = id;
    }

    /// Insert a client at the head of a monitor's list and select it
    pub fn add_client(&mut self, monitor: MonitorId, mut client: Client) -> ClientId {
        let monitor = if self.monitors.contains_key(monitor) {
            monitor
        } else {
            self.selected_monitor()
        };
        client.monitor = monitor;
        let id = self.clients.insert(client);
        let mon = &mut self.monitors[monitor];
        mon.attach_head(id);
        mon.select(id);
        id
    }

    /// Remove a client from its monitor and the arena; no-op if absent
    pub fn remove_client(&mut self, id: ClientId) -> Option<Client> {
        let client = self.clients.remove(id)?;
        if let Some(monitor) = self.monitors.get_mut(client.monitor) {
            monitor.detach(id);
        }
        if self.focused == Some(id) {
            self.focused = None;
        }
        Some(client)
    }

    /// Make a client the selected one of its monitor
    pub fn select_client(&mut self, id: ClientId) -> bool {
        let Some(monitor) = self.clients.get(id).map(|c| c.monitor) else {
            return false;
        };
        match self.monitors.get_mut(monitor) {
            Some(mon) if mon.contains(id) => {
                mon.select(id);
                true
            }
            _ => false,
        }
    }

    /// Move a client to the head of another monitor's list
    pub fn move_client(&mut self, id: ClientId, to: MonitorId) -> bool {
        let Some(from) = self.clients.get(id).map(|c| c.monitor) else {
            return false;
        };
        if from == to || !self.monitors.contains_key(to) {
            return false;
        }
        if let Some(mon) = self.monitors.get_mut(from) {
            mon.detach(id);
        }
        self.clients[id].monitor = to;
        let mon = &mut self.monitors[to];
        mon.attach_head(id);
        mon.select(id);
        true
    }

    /// Move a client to the master slot of its monitor
    pub fn zoom(&mut self, id: ClientId) -> bool {
        let Some(monitor) = self.clients.get(id).map(|c| c.monitor) else {
            return false;
        };
        let Some(mon) = self.monitors.get_mut(monitor) else {
            return false;
        };
        match mon.clients.iter().position(|&c| c == id) {
            Some(0) | None => false,
            Some(idx) => {
                mon.clients.remove(idx);
                mon.clients.insert(0, id);
                true
            }
        }
    }

    /// Linear scan of every monitor's client list
    pub fn find_client_by_window(&self, window: Window) -> Option<ClientId> {
        self.order.iter().find_map(|&m| {
            self.monitors[m]
                .clients
                .iter()
                .copied()
                .find(|&c| self.clients.get(c).is_some_and(|c| c.window == window))
        })
    }

    /// Resolve the monitor that owns (or should own) a window.
    ///
    /// Managed windows resolve to their monitor; otherwise the window's
    /// top-left point is tested against monitor regions, defaulting to the
    /// selected monitor.
    pub fn find_monitor_for_window(
        &self,
        window: Window,
        top_left: Option<(i32, i32)>,
    ) -> MonitorId {
        if let Some(id) = self.find_client_by_window(window) {
            return self.clients[id].monitor;
        }
        top_left
            .and_then(|(x, y)| self.monitor_at(x, y))
            .unwrap_or_else(|| self.selected_monitor())
    }

    /// Every client in monitor order, then stacking order
    pub fn all_clients(&self) -> Vec<ClientId> {
        self.order
            .iter()
            .flat_map(|&m| self.monitors[m].clients.iter().copied())
            .collect()
    }

    /// Every managed window in monitor order, then stacking order
    pub fn all_windows(&self) -> Vec<Window> {
        self.all_clients()
            .into_iter()
            .filter_map(|id| self.clients.get(id).map(|c| c.window))
            .collect()
    }

    /// Clients of a monitor that the layout engine places, in stacking order
    pub fn tiled_clients(&self, monitor: MonitorId) -> Vec<ClientId> {
        self.monitors
            .get(monitor)
            .map(|mon| {
                mon.clients
                    .iter()
                    .copied()
                    .filter(|&id| self.clients.get(id).is_some_and(Client::is_tiled))
                    .collect()
            })
            .unwrap_or_default()
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Check every cross-entity invariant
    pub fn validate(&self) -> Vec<StateViolation> {
        let mut violations = Vec::new();
        let mut push = |kind: ViolationKind, description: String| {
            violations.push(StateViolation { kind, description });
        };

        if self.order.is_empty() {
            push(ViolationKind::NoMonitors, "monitor list is empty".to_string());
            return violations;
        }

        let mut seen: std::collections::HashMap<ClientId, usize> =
            std::collections::HashMap::new();
        for (idx, &m) in self.order.iter().enumerate() {
            let mon = &self.monitors[m];
            for &c in &mon.clients {
                *seen.entry(c).or_insert(0) += 1;
                match self.clients.get(c) {
                    Some(client) if client.monitor != m => push(
                        ViolationKind::StaleMonitorReference,
                        format!("client 0x{:x} listed by monitor {} but points elsewhere", client.window, idx),
                    ),
                    None => push(
                        ViolationKind::StaleMonitorReference,
                        format!("monitor {} lists a removed client {:?}", idx, c),
                    ),
                    _ => {}
                }
            }
            if let Some(sel) = mon.selected {
                if !mon.clients.contains(&sel) {
                    push(
                        ViolationKind::SelectionOutsideMonitor,
                        format!("monitor {} selects a client it does not hold", idx),
                    );
                }
            }
        }

        let mut windows = std::collections::HashSet::new();
        for (id, client) in &self.clients {
            match seen.get(&id).copied().unwrap_or(0) {
                0 => push(
                    ViolationKind::OrphanedClient,
                    format!("client 0x{:x} is in no monitor list", client.window),
                ),
                1 => {}
                n => push(
                    ViolationKind::DuplicateClient,
                    format!("client 0x{:x} listed {} times", client.window, n),
                ),
            }
            if !windows.insert(client.window) {
                push(
                    ViolationKind::DuplicateWindow,
                    format!("window 0x{:x} managed twice", client.window),
                );
            }
        }

        if let Some(focused) = self.focused {
            match self.clients.get(focused) {
                None => push(
                    ViolationKind::InvalidFocus,
                    "focused client no longer exists".to_string(),
                ),
                Some(client) => {
                    let selmon = self.selected_monitor();
                    let selected = self.monitors[selmon].selected();
                    if client.monitor != selmon || selected != Some(focused) {
                        push(
                            ViolationKind::InvalidFocus,
                            format!(
                                "focused client 0x{:x} is not the selection of the selected monitor",
                                client.window
                            ),
                        );
                    }
                }
            }
        }

        violations
    }
}
