//! Configuration file support for mtwm.
//!
//! Loads settings from ~/.config/mtwm/config.toml if it exists,
//! otherwise uses sensible defaults.
//!
//! Also provides `LayoutConfig` - the runtime configuration struct with
//! resolved color values and layout parameters.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::layout::Layout;

// =============================================================================
// Runtime Configuration (resolved values)
// =============================================================================

/// Runtime layout configuration with resolved values.
///
/// Constructed once from the file-based config types at startup.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    /// Border width for tiled clients
    pub border_width: u32,
    /// Initial master count of every monitor
    pub master_count: usize,
    /// Layout registry, indexed by a monitor's layout index
    pub layouts: Vec<Layout>,
    /// Border color for focused window
    pub border_focused: u32,
    /// Border color for unfocused window
    pub border_unfocused: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            border_width: 2,
            master_count: 1,
            layouts: vec![Layout::Tile, Layout::Monocle],
            border_focused: 0x5294e2,   // Blue
            border_unfocused: 0x3a3a3a, // Gray
        }
    }
}

impl LayoutConfig {
    /// Resolve runtime values from the file config
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();

        let mut layouts: Vec<Layout> = config
            .appearance
            .layouts
            .iter()
            .filter_map(|name| {
                let layout = Layout::from_name(name);
                if layout.is_none() {
                    log::warn!("Unknown layout '{}' in config, skipping", name);
                }
                layout
            })
            .collect();
        if layouts.is_empty() {
            layouts = defaults.layouts.clone();
        }

        let border_width = if config.appearance.border_width == 0 {
            log::warn!("border_width must be non-zero, using {}", defaults.border_width);
            defaults.border_width
        } else {
            config.appearance.border_width
        };

        Self {
            border_width,
            master_count: config.appearance.master_count,
            layouts,
            border_focused: parse_color(&config.colors.border_focused)
                .unwrap_or(defaults.border_focused),
            border_unfocused: parse_color(&config.colors.border_unfocused)
                .unwrap_or(defaults.border_unfocused),
        }
    }
}

// =============================================================================
// File-based Configuration (TOML parsing)
// =============================================================================

/// Top-level configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub appearance: AppearanceConfig,
    pub colors: ColorConfig,
    pub keybindings: KeybindingConfig,
    pub exec: ExecConfig,
    pub startup: StartupConfig,
}

/// Exec keybindings (key combo -> command to run)
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecConfig {
    #[serde(flatten)]
    pub bindings: HashMap<String, String>,
}

/// Commands spawned once after the initial window scan
#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
pub struct StartupConfig {
    pub commands: Vec<String>,
}

/// Appearance settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppearanceConfig {
    pub border_width: u32,
    pub master_count: usize,
    /// Ordered layout names ("tile", "monocle")
    pub layouts: Vec<String>,
}

/// Color settings (hex strings like "#5294e2")
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    pub border_focused: String,
    pub border_unfocused: String,
}

/// Keybinding configuration (strings like "Mod4+Return")
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KeybindingConfig {
    pub focus_next: Option<String>,
    pub focus_prev: Option<String>,
    pub focus_monitor_next: Option<String>,
    pub focus_monitor_prev: Option<String>,
    pub send_to_monitor_next: Option<String>,
    pub send_to_monitor_prev: Option<String>,
    pub inc_master: Option<String>,
    pub dec_master: Option<String>,
    pub zoom: Option<String>,
    pub layout_1: Option<String>,
    pub layout_2: Option<String>,
    pub layout_3: Option<String>,
    pub cycle_layout: Option<String>,
    pub toggle_fullscreen: Option<String>,
    pub hide_window: Option<String>,
    pub show_all: Option<String>,
    pub close_window: Option<String>,
    pub restart: Option<String>,
    pub quit: Option<String>,
}

/// Parsed keybinding (ready for X11 grab)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedBinding {
    pub keysym: u32,
    pub modifiers: u16,
}

/// Window manager action
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WmAction {
    Spawn(String),
    FocusNext,
    FocusPrev,
    FocusMonitorNext,
    FocusMonitorPrev,
    SendToMonitorNext,
    SendToMonitorPrev,
    IncMaster,
    DecMaster,
    Zoom,
    /// Select a layout by registry index
    SetLayout(usize),
    CycleLayout,
    ToggleFullscreen,
    HideWindow,
    ShowAll,
    CloseWindow,
    Restart,
    Quit,
}

impl Config {
    /// Load config from default path (~/.config/mtwm/config.toml)
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mtwm")
            .join("config.toml")
    }

    /// Load config from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse config: {}", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Parse keybindings into action -> ParsedBinding map
    pub fn parse_keybindings(&self) -> HashMap<WmAction, ParsedBinding> {
        let mut bindings = HashMap::new();

        let mut insert = |action: WmAction, key_str: &Option<String>| {
            if let Some(s) = key_str {
                if let Some(parsed) = parse_key_binding(s) {
                    bindings.insert(action, parsed);
                } else {
                    log::warn!("Failed to parse keybinding: {}", s);
                }
            }
        };

        let keys = &self.keybindings;
        insert(WmAction::FocusNext, &keys.focus_next);
        insert(WmAction::FocusPrev, &keys.focus_prev);
        insert(WmAction::FocusMonitorNext, &keys.focus_monitor_next);
        insert(WmAction::FocusMonitorPrev, &keys.focus_monitor_prev);
        insert(WmAction::SendToMonitorNext, &keys.send_to_monitor_next);
        insert(WmAction::SendToMonitorPrev, &keys.send_to_monitor_prev);
        insert(WmAction::IncMaster, &keys.inc_master);
        insert(WmAction::DecMaster, &keys.dec_master);
        insert(WmAction::Zoom, &keys.zoom);
        insert(WmAction::SetLayout(0), &keys.layout_1);
        insert(WmAction::SetLayout(1), &keys.layout_2);
        insert(WmAction::SetLayout(2), &keys.layout_3);
        insert(WmAction::CycleLayout, &keys.cycle_layout);
        insert(WmAction::ToggleFullscreen, &keys.toggle_fullscreen);
        insert(WmAction::HideWindow, &keys.hide_window);
        insert(WmAction::ShowAll, &keys.show_all);
        insert(WmAction::CloseWindow, &keys.close_window);
        insert(WmAction::Restart, &keys.restart);
        insert(WmAction::Quit, &keys.quit);

        // Parse exec bindings (key combo -> command)
        for (key_combo, command) in &self.exec.bindings {
            if let Some(parsed) = parse_key_binding(key_combo) {
                bindings.insert(WmAction::Spawn(command.clone()), parsed);
            } else {
                log::warn!("Failed to parse exec keybinding: {}", key_combo);
            }
        }

        bindings
    }
}

/// Parse a key binding string like "Mod4+Shift+h" into keysym and modifiers
pub fn parse_key_binding(s: &str) -> Option<ParsedBinding> {
    let parts: Vec<&str> = s.split('+').collect();
    if parts.is_empty() {
        return None;
    }

    let mut modifiers: u16 = 0;
    let key_part = parts.last()?;

    // X11 modifier masks
    const SHIFT_MASK: u16 = 1;
    const CONTROL_MASK: u16 = 4;
    const MOD1_MASK: u16 = 8; // Alt
    const MOD4_MASK: u16 = 64; // Super/Win

    for part in &parts[..parts.len() - 1] {
        match part.to_lowercase().as_str() {
            "mod4" | "super" | "win" => modifiers |= MOD4_MASK,
            "shift" => modifiers |= SHIFT_MASK,
            "control" | "ctrl" => modifiers |= CONTROL_MASK,
            "mod1" | "alt" => modifiers |= MOD1_MASK,
            _ => {
                log::warn!("Unknown modifier: {}", part);
            }
        }
    }

    let keysym = key_to_keysym(key_part)?;
    Some(ParsedBinding { keysym, modifiers })
}

/// Convert key name to X11 keysym
fn key_to_keysym(key: &str) -> Option<u32> {
    let lower = key.to_lowercase();
    // Latin letters and digits map to their ASCII code
    if lower.len() == 1 {
        let c = lower.as_bytes()[0];
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            return Some(c as u32);
        }
    }
    match lower.as_str() {
        "return" | "enter" => Some(0xff0d),
        "tab" => Some(0xff09),
        "escape" | "esc" => Some(0xff1b),
        "space" => Some(0x20),
        "backspace" => Some(0xff08),
        "delete" => Some(0xffff),
        "comma" | "," => Some(0x2c),
        "period" | "." => Some(0x2e),
        "minus" | "-" => Some(0x2d),
        "page_up" | "pageup" | "pgup" | "prior" => Some(0xff55),
        "page_down" | "pagedown" | "pgdn" | "next" => Some(0xff56),
        "left" => Some(0xff51),
        "up" => Some(0xff52),
        "right" => Some(0xff53),
        "down" => Some(0xff54),
        "home" => Some(0xff50),
        "end" => Some(0xff57),
        // Function keys F1-F12
        f if f.len() > 1 && f.starts_with('f') => match f[1..].parse::<u32>() {
            Ok(n @ 1..=12) => Some(0xffbe + n - 1),
            _ => {
                log::warn!("Unknown key: {}", key);
                None
            }
        },
        _ => {
            log::warn!("Unknown key: {}", key);
            None
        }
    }
}

/// Parse hex color string (e.g., "#5294e2" or "5294e2") to u32
pub fn parse_color(s: &str) -> Option<u32> {
    let s = s.trim_start_matches('#');
    u32::from_str_radix(s, 16).ok()
}

impl Default for ExecConfig {
    fn default() -> Self {
        let mut bindings = HashMap::new();
        bindings.insert("Mod4+Shift+Return".to_string(), "xterm".to_string());
        bindings.insert("Mod4+p".to_string(), "dmenu_run".to_string());
        Self { bindings }
    }
}

impl Default for AppearanceConfig {
    fn default() -> Self {
        Self {
            border_width: 2,
            master_count: 1,
            layouts: vec!["tile".to_string(), "monocle".to_string()],
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            border_focused: "#5294e2".to_string(),
            border_unfocused: "#3a3a3a".to_string(),
        }
    }
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        Self {
            focus_next: Some("Mod4+j".to_string()),
            focus_prev: Some("Mod4+k".to_string()),
            focus_monitor_next: Some("Mod4+period".to_string()),
            focus_monitor_prev: Some("Mod4+comma".to_string()),
            send_to_monitor_next: Some("Mod4+Shift+period".to_string()),
            send_to_monitor_prev: Some("Mod4+Shift+comma".to_string()),
            inc_master: Some("Mod4+i".to_string()),
            dec_master: Some("Mod4+d".to_string()),
            zoom: Some("Mod4+Return".to_string()),
            layout_1: Some("Mod4+t".to_string()),
            layout_2: Some("Mod4+m".to_string()),
            layout_3: None,
            cycle_layout: Some("Mod4+space".to_string()),
            toggle_fullscreen: Some("Mod4+f".to_string()),
            hide_window: Some("Mod4+minus".to_string()),
            show_all: Some("Mod4+Shift+s".to_string()),
            close_window: Some("Mod4+Shift+c".to_string()),
            restart: Some("Mod4+Control+r".to_string()),
            quit: Some("Mod4+Shift+q".to_string()),
        }
    }
}
