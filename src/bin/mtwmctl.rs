//! mtwmctl - Command-line interface to control mtwm
//!
//! Sends one JSON command over the window manager's Unix socket and prints
//! the JSON reply.
//!
//! # Examples
//!
//! ```bash
//! # Get full state as JSON
//! mtwmctl state
//!
//! # Focus a specific window
//! mtwmctl focus 0x1a00003
//!
//! # Move the focused window to the next monitor
//! mtwmctl send-to-monitor next
//!
//! # Switch the selected monitor to monocle
//! mtwmctl layout 1
//!
//! # Validate state invariants
//! mtwmctl validate
//! ```

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

/// Get the socket path for this display
fn socket_path() -> PathBuf {
    let display = std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string());
    let sanitized = display.replace([':', '.'], "_");
    PathBuf::from(format!("/tmp/mtwm{}.sock", sanitized))
}

/// mtwmctl - Control the mtwm window manager
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Socket path (default: /tmp/mtwm_$DISPLAY.sock)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Output raw JSON without pretty-printing
    #[arg(long, global = true)]
    raw: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    Next,
    Prev,
}

impl Direction {
    fn forward(self) -> bool {
        matches!(self, Direction::Next)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Get full WM state as JSON
    State,

    /// Get every monitor with its client stack
    Monitors,

    /// Get list of all managed windows
    Windows,

    /// Get currently focused window ID
    Focused,

    /// Validate WM state invariants
    Validate,

    /// Get recent event log
    EventLog {
        /// Number of events to retrieve
        #[arg(short, long)]
        count: Option<usize>,
    },

    /// Focus a specific window by ID
    Focus {
        /// Window ID (decimal or hex with 0x prefix)
        window: String,
    },

    /// Focus the next client
    FocusNext,

    /// Focus the previous client
    FocusPrev,

    /// Select the next or previous monitor
    FocusMonitor {
        #[arg(value_enum, default_value = "next")]
        direction: Direction,
    },

    /// Move the focused window to the next or previous monitor
    SendToMonitor {
        #[arg(value_enum, default_value = "next")]
        direction: Direction,
    },

    /// Select a layout on the selected monitor (0 = tile, 1 = monocle)
    Layout {
        index: usize,
    },

    /// Set how many clients share the master area
    MasterCount {
        count: usize,
    },

    /// Toggle fullscreen state for a window
    Fullscreen {
        /// Window ID (uses focused if not specified)
        window: Option<String>,
    },

    /// Close the focused window
    Close,

    /// Quit the window manager
    Quit,
}

fn main() {
    let cli = Cli::parse();
    let socket_path = cli.socket.unwrap_or_else(socket_path);

    // Build the command JSON
    let command = match &cli.command {
        Commands::State => serde_json::json!({"command": "get_state"}),
        Commands::Monitors => serde_json::json!({"command": "get_monitors"}),
        Commands::Windows => serde_json::json!({"command": "get_windows"}),
        Commands::Focused => serde_json::json!({"command": "get_focused"}),
        Commands::Validate => serde_json::json!({"command": "validate_state"}),
        Commands::EventLog { count } => {
            serde_json::json!({"command": "get_event_log", "count": count})
        }
        Commands::Focus { window } => {
            let window_id = parse_window_id(window);
            serde_json::json!({"command": "focus_window", "window": window_id})
        }
        Commands::FocusNext => serde_json::json!({"command": "focus_next"}),
        Commands::FocusPrev => serde_json::json!({"command": "focus_prev"}),
        Commands::FocusMonitor { direction } => {
            serde_json::json!({"command": "focus_monitor", "forward": direction.forward()})
        }
        Commands::SendToMonitor { direction } => {
            serde_json::json!({"command": "send_to_monitor", "forward": direction.forward()})
        }
        Commands::Layout { index } => {
            serde_json::json!({"command": "set_layout", "index": index})
        }
        Commands::MasterCount { count } => {
            serde_json::json!({"command": "set_master_count", "count": count})
        }
        Commands::Fullscreen { window } => {
            let window_id = window.as_ref().map(|w| parse_window_id(w));
            serde_json::json!({"command": "toggle_fullscreen", "window": window_id})
        }
        Commands::Close => serde_json::json!({"command": "close_window"}),
        Commands::Quit => serde_json::json!({"command": "quit"}),
    };

    // Connect and send command
    if let Err(e) = send_command(&socket_path, &command, cli.raw) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_window_id(s: &str) -> u32 {
    let parsed = match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.unwrap_or_else(|_| {
        eprintln!("Invalid window ID: {}", s);
        std::process::exit(1);
    })
}

fn send_command(socket_path: &Path, command: &Value, raw: bool) -> std::io::Result<()> {
    let mut stream = UnixStream::connect(socket_path).map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("Failed to connect to mtwm at {:?}: {}. Is mtwm running?", socket_path, e),
        )
    })?;

    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    let json = serde_json::to_string(command)?;
    writeln!(stream, "{}", json)?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response = String::new();
    reader.read_line(&mut response)?;

    let value: Value = serde_json::from_str(&response).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, format!("Invalid JSON response: {}", e))
    })?;

    if value.get("status").and_then(Value::as_str) == Some("error") {
        let code = value.get("code").and_then(|v| v.as_str()).unwrap_or("unknown");
        let message = value.get("message").and_then(|v| v.as_str()).unwrap_or("Unknown error");
        eprintln!("Error [{}]: {}", code, message);
        std::process::exit(1);
    }

    if raw {
        println!("{}", response.trim());
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }

    Ok(())
}
