//! Process environment hygiene done before anything else starts.

use std::path::Path;

use viewer_config::path::LEGACY_STACK_TRACE;
use viewer_config::{log_boot_debug, log_boot_warn};

pub const PRELOAD_VAR: &str = "LD_PRELOAD";

/// Drop any preload override so helper processes start clean.
///
/// Returns whether something was removed.
pub fn scrub_preload() -> bool {
    match std::env::var_os(PRELOAD_VAR) {
        Some(value) => {
            log_boot_debug!(
                "Clearing preload override",
                value = tracing::field::debug(&value)
            );
            std::env::remove_var(PRELOAD_VAR);
            true
        }
        None => false,
    }
}

/// Delete the stack trace file left behind by older crash handlers.
pub fn remove_legacy_artifacts(logs_dir: &Path) -> bool {
    let path = logs_dir.join(LEGACY_STACK_TRACE);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            log_boot_debug!(
                "Removed legacy stack trace",
                path = tracing::field::display(path.display())
            );
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log_boot_warn!(
                "Could not remove legacy stack trace",
                path = tracing::field::display(path.display()),
                error = tracing::field::display(&e)
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_legacy_stack_trace() {
        let dir = TempDir::new().unwrap();
        let trace = dir.path().join(LEGACY_STACK_TRACE);
        std::fs::write(&trace, b"#0 0xdeadbeef in ??\n").unwrap();
        std::fs::write(dir.path().join("viewer.log"), b"keep me").unwrap();

        assert!(remove_legacy_artifacts(dir.path()));
        assert!(!trace.exists());
        assert!(dir.path().join("viewer.log").exists());

        // Nothing left to do the second time.
        assert!(!remove_legacy_artifacts(dir.path()));
    }

    #[test]
    fn test_remove_legacy_in_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(!remove_legacy_artifacts(&dir.path().join("nope")));
    }
}
