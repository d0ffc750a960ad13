//! Directory and file locations used by the bootstrap layer.
//!
//! Everything that needs "where does X live" goes through here so the
//! dispatch endpoint, the reporter launch and the legacy cleanup agree.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::{CrashConfig, InstanceConfig};

/// Name of the per-user state directory under $HOME.
pub const VIEWER_HOME_DIR: &str = ".viewer";

/// Stack trace file written by old crash handlers; removed at startup.
pub const LEGACY_STACK_TRACE: &str = "stack_trace.log";

/// `~/.viewer`
pub fn viewer_home() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(VIEWER_HOME_DIR))
}

/// `~/.viewer/logs`, or `<tmp>/viewer-logs` without a home directory.
pub fn logs_dir() -> PathBuf {
    viewer_home()
        .map(|h| h.join("logs"))
        .unwrap_or_else(|| std::env::temp_dir().join("viewer-logs"))
}

/// Where crash dumps are written and where the reporter looks for them.
pub fn dump_dir(crash: &CrashConfig) -> PathBuf {
    crash.dump_dir.clone().unwrap_or_else(logs_dir)
}

/// Absolute path of the running executable.
pub fn executable_path() -> Result<PathBuf> {
    std::env::current_exe().context("Failed to resolve current executable")
}

/// Directory containing the running executable.
pub fn executable_dir() -> Result<PathBuf> {
    let exe = executable_path()?;
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("Executable has no parent directory: {}", exe.display()))
}

/// Base name of the running executable.
pub fn executable_name() -> Result<String> {
    let exe = executable_path()?;
    exe.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Executable has no file name: {}", exe.display()))
}

/// Session-scoped directory holding the coordination endpoint.
///
/// Order: configured directory, `$XDG_RUNTIME_DIR`, then `<tmp>/viewer-<uid>`.
pub fn session_runtime_dir(instance: &InstanceConfig) -> PathBuf {
    if let Some(dir) = &instance.runtime_dir {
        return dir.clone();
    }
    dirs::runtime_dir().unwrap_or_else(|| {
        let uid = unsafe { libc::getuid() };
        std::env::temp_dir().join(format!("viewer-{}", uid))
    })
}

/// Create `dir` (and parents) if missing, restricted to the current user.
///
/// An existing directory must be owned by the current user and carry no
/// group or other permission bits; anything else is refused.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    use std::os::unix::fs::{DirBuilderExt, MetadataExt};

    if !dir.is_dir() {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }

    let meta = std::fs::metadata(dir)
        .with_context(|| format!("Failed to stat directory: {}", dir.display()))?;
    let uid = unsafe { libc::getuid() };
    if meta.uid() != uid {
        bail!(
            "Directory {} is owned by uid {}, expected {}",
            dir.display(),
            meta.uid(),
            uid
        );
    }
    if meta.mode() & 0o077 != 0 {
        bail!(
            "Directory {} is accessible to other users (mode {:o})",
            dir.display(),
            meta.mode() & 0o777
        );
    }
    Ok(())
}

/// Turn an endpoint name into a single safe file name component.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`, so a service name plus an
/// object path cannot escape the runtime directory.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim_matches('/')
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
