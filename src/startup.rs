//! Process launching: key-bound spawns and startup commands.
//!
//! Spawned programs are fire-and-forget. They are detached into their own
//! session so they survive a restart or exit of the window manager, and are
//! never waited on.

use std::process::Command;

use crate::config::StartupConfig;

/// Build a command from a command line, expanding a leading `~`
fn build_command(command: &str) -> Option<Command> {
    let expanded = shellexpand::tilde(command);
    let parts: Vec<&str> = expanded.split_whitespace().collect();
    let (program, args) = parts.split_first()?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Some(cmd)
}

/// Spawn a command line detached from the window manager.
/// Returns false if the command is empty or failed to start.
pub fn spawn_command(command: &str) -> bool {
    let Some(mut cmd) = build_command(command) else {
        log::warn!("Refusing to spawn empty command");
        return false;
    };

    // Detach from mtwm's process group so apps survive if mtwm exits
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            cmd.pre_exec(|| {
                // Create new session to detach from terminal
                libc::setsid();
                Ok(())
            });
        }
    }

    match cmd.spawn() {
        Ok(child) => {
            log::info!("Spawned '{}' (pid {})", command, child.id());
            true
        }
        Err(e) => {
            log::warn!("Failed to spawn '{}': {}", command, e);
            false
        }
    }
}

/// Runs the configured startup commands once
pub struct StartupManager {
    pending: Vec<String>,
}

impl StartupManager {
    pub fn new(config: &StartupConfig) -> Self {
        Self {
            pending: config.commands.clone(),
        }
    }

    /// Spawn all pending commands; later calls do nothing
    pub fn spawn_all(&mut self) -> usize {
        let mut spawned = 0;
        for command in self.pending.drain(..) {
            log::info!("Startup: spawning '{}'", command);
            if spawn_command(&command) {
                spawned += 1;
            }
        }
        spawned
    }
}
