//! Is a debugger watching us?
//!
//! Crash handling stays out of the way when it is: the debugger wants the
//! fault, not a reporter.

use std::sync::OnceLock;

const DEBUGGER_NAMES: &[&str] = &["gdb", "lldb", "rust-gdb", "rust-lldb", "gdbserver"];

static DEBUGGED: OnceLock<bool> = OnceLock::new();

/// Cached for the life of the process.
pub fn being_debugged() -> bool {
    *DEBUGGED.get_or_init(detect)
}

fn detect() -> bool {
    if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
        if tracer_pid(&status).is_some_and(|pid| pid != 0) {
            return true;
        }
    }
    let ppid = nix::unistd::getppid();
    parent_name(ppid.as_raw())
        .map(|name| is_debugger_name(&name))
        .unwrap_or(false)
}

fn parent_name(ppid: i32) -> Option<String> {
    let exe = std::fs::read_link(format!("/proc/{}/exe", ppid)).ok()?;
    exe.file_name().map(|n| n.to_string_lossy().into_owned())
}

pub fn is_debugger_name(name: &str) -> bool {
    DEBUGGER_NAMES.contains(&name)
}

/// `TracerPid:` from a `/proc/<pid>/status` body.
fn tracer_pid(status: &str) -> Option<i32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|v| v.trim().parse().ok())
}
