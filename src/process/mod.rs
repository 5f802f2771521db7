#[cfg(target_os = "linux")]
mod process_linux;

#[cfg(target_os = "linux")]
pub use process_linux::*;

#[cfg(not(target_os = "linux"))]
mod process_stub;

#[cfg(not(target_os = "linux"))]
pub use process_stub::*;

mod command_line;

pub use command_line::CommandLineAgent;

use std::process::{Child, Stdio};

use anyhow::Context;

/// Resource limits applied to a contained process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Limits {
    /// Maximum available memory in bytes. Non-positive means no restriction.
    pub max_memory: i64,
    /// Maximum number of pids inside the cgroup. Non-positive means no restriction.
    pub max_pids: i64,
    /// Comma separated cpu ranges ("1-5,7"). Empty string means no restriction.
    pub cpus: String,
}

fn create_process(command: &str, args: &[String]) -> anyhow::Result<Child> {
    std::process::Command::new(command)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("command '{command}' not found"))
}
