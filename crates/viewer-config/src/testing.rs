//! Test environment abstraction for isolated testing.
//!
//! Provides `TestEnvironment` to manage:
//! - Isolated session runtime directories (one endpoint namespace per test)
//! - Temporary dump, log and executable directories
//! - Fake reporter executables
//!
//! # Usage
//!
//! ```ignore
//! use viewer_config::testing::TestEnvironment;
//!
//! #[test]
//! fn test_something() {
//!     let env = TestEnvironment::new().unwrap();
//!     let instance = env.instance_config();
//!     // instance.runtime_dir is private to this test
//! }
//! ```

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;

use crate::{CrashConfig, InstanceConfig};

/// Atomic counter for unique test IDs
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated test environment with unique paths
pub struct TestEnvironment {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Session runtime directory holding endpoints
    pub runtime_dir: PathBuf,
    /// Crash dump directory
    pub dump_dir: PathBuf,
    /// Log directory
    pub logs_dir: PathBuf,
    /// Stand-in for the directory of the viewer executable
    pub exe_dir: PathBuf,
    /// Unique test ID
    pub test_id: u32,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub fn new() -> anyhow::Result<Self> {
        let test_id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();

        let runtime_dir = root.join("run");
        let dump_dir = root.join("dumps");
        let logs_dir = root.join("logs");
        let exe_dir = root.join("bin");

        for dir in [&runtime_dir, &dump_dir, &logs_dir, &exe_dir] {
            std::fs::create_dir_all(dir)?;
        }
        // The coordination endpoint refuses a runtime dir others can enter.
        std::fs::set_permissions(&runtime_dir, std::fs::Permissions::from_mode(0o700))?;

        Ok(Self {
            _temp_dir: temp_dir,
            runtime_dir,
            dump_dir,
            logs_dir,
            exe_dir,
            test_id,
        })
    }

    /// Instance settings pointing at this environment's runtime directory
    /// with short timeouts.
    pub fn instance_config(&self) -> InstanceConfig {
        InstanceConfig {
            enabled: true,
            service_name: format!("com.example.viewer.test{}", self.test_id),
            object_path: "/app".to_string(),
            runtime_dir: Some(self.runtime_dir.clone()),
            call_timeout_ms: 1_000,
            dispatch_timeout_ms: 500,
        }
    }

    /// Crash settings pointing at this environment's dump directory.
    pub fn crash_config(&self) -> CrashConfig {
        CrashConfig {
            dump_dir: Some(self.dump_dir.clone()),
            grid_id: "test-grid".to_string(),
            app_title: "Viewer Test".to_string(),
            ..CrashConfig::default()
        }
    }

    /// Write an executable shell script into `exe_dir` and return its path.
    pub fn install_script(&self, name: &str, body: &str) -> anyhow::Result<PathBuf> {
        let path = self.exe_dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(path)
    }

    /// Create a file with content relative to the environment root
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.root().join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        self._temp_dir.path()
    }
}
