//! # viewer-config
//!
//! Configuration management for the viewer bootstrap layer.
//!
//! Loads configuration from:
//! 1. `~/.viewer/config.toml` (global)
//! 2. `.viewer/config.toml` (local, overrides global section by section)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod path;
pub mod testing;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;
use tracing::debug;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> RwLockReadGuard<'static, Config> {
    // A poisoned lock still holds a fully written config.
    CONFIG.read().unwrap_or_else(|e| e.into_inner())
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(|e| e.into_inner()) = new_config;
    Ok(())
}

/// Replace the global config, e.g. after applying command-line overrides.
pub fn replace(new_config: Config) {
    *CONFIG.write().unwrap_or_else(|e| e.into_inner()) = new_config;
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML render error: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub instance: InstanceConfig,
    pub crash: CrashConfig,
    pub plugin: PluginConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global_path = Self::global_config_path();
        let mut config =
            Self::load_layered(global_path.as_deref(), Path::new(".viewer/config.toml"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read `global` then merge `local` over it; either may be missing.
    pub fn load_layered(global: Option<&Path>, local: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::read_file(global_path)?;
            }
        }

        if local.exists() {
            debug!("Loading local config from {:?}", local);
            let contents = std::fs::read_to_string(local)?;
            config.merge_str(&contents)?;
        }

        Ok(config)
    }

    /// Load a single explicit config file, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.viewer/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        path::viewer_home().map(|h| h.join("config.toml"))
    }

    /// Merge a TOML document over this config. Every section present in the
    /// document replaces the current section; absent sections are kept.
    pub fn merge_str(&mut self, contents: &str) -> Result<(), ConfigError> {
        let table: toml::Table = toml::from_str(contents)?;
        if let Some(section) = table.get("instance") {
            self.instance = section.clone().try_into()?;
        }
        if let Some(section) = table.get("crash") {
            self.crash = section.clone().try_into()?;
        }
        if let Some(section) = table.get("plugin") {
            self.plugin = section.clone().try_into()?;
        }
        if let Some(section) = table.get("logging") {
            self.logging = section.clone().try_into()?;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(grid) = lookup("VIEWER_GRID") {
            self.crash.grid_id = grid;
        }
        if let Some(dir) = lookup("VIEWER_DUMP_DIR") {
            self.crash.dump_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("VIEWER_RUNTIME_DIR") {
            self.instance.runtime_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = lookup("VIEWER_SINGLE_INSTANCE") {
            self.instance.enabled = !matches!(flag.as_str(), "0" | "false" | "no" | "off");
        }
        if let Some(ms) = lookup("VIEWER_CALL_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.instance.call_timeout_ms = ms;
            }
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

/// Single-instance coordination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Coordinate with other instances at all
    pub enabled: bool,
    /// Well-known service name of the dispatch endpoint
    pub service_name: String,
    /// Object path of the dispatch endpoint
    pub object_path: String,
    /// Session runtime directory (None = $XDG_RUNTIME_DIR or a per-user tmp dir)
    pub runtime_dir: Option<PathBuf>,
    /// Bound on a forwarded call (connect + send + reply)
    pub call_timeout_ms: u64,
    /// Bound on a single navigation dispatch inside the service
    pub dispatch_timeout_ms: u64,
}

impl InstanceConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "com.secondlife.ViewerAppAPIService".to_string(),
            object_path: "/com/secondlife/ViewerAppAPI".to_string(),
            runtime_dir: None,
            call_timeout_ms: 5_000,
            dispatch_timeout_ms: 2_000,
        }
    }
}

/// Crash interception and reporter launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    /// Install the fault interceptor and fatal signal hooks
    pub enabled: bool,
    /// Reporter executable name, resolved next to the viewer executable
    pub reporter_name: String,
    /// Dump directory (None = logs directory)
    pub dump_dir: Option<PathBuf>,
    /// Grid identifier passed as `-user`
    pub grid_id: String,
    /// Application title passed as `-name`
    pub app_title: String,
    /// Signal raised by the fault interceptor
    pub trap_signal: String,
    /// Leave faults to an attached debugger
    pub skip_when_debugged: bool,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reporter_name: "linux-crash-logger.bin".to_string(),
            dump_dir: None,
            grid_id: "agni".to_string(),
            app_title: "Second Life".to_string(),
            trap_signal: "SIGSEGV".to_string(),
            skip_when_debugged: true,
        }
    }
}

/// Media plugin autodetection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub enabled: bool,
    /// Directories probed in order; the first match wins
    pub search_paths: Vec<PathBuf>,
    pub manifest_name: String,
    pub library_name: String,
    /// Variable receiving the plugin library path
    pub path_var: String,
    /// Variable receiving the plugin version
    pub version_var: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_paths: vec![
                PathBuf::from("/usr/lib64/chromium-browser/PepperFlash/"),
                PathBuf::from("/usr/lib32/chromium-browser/PepperFlash/"),
                PathBuf::from("/opt/google/chrome/PepperFlash/"),
                PathBuf::from("/usr/lib/chromium/PepperFlash/"),
                PathBuf::from("/usr/lib64/chromium/PepperFlash/"),
                PathBuf::from("/opt/viewer/PepperFlash/"),
            ],
            manifest_name: "manifest.json".to_string(),
            library_name: "libpepflashplayer.so".to_string(),
            path_var: "VIEWER_MEDIA_PLUGIN".to_string(),
            version_var: "VIEWER_MEDIA_PLUGIN_VERSION".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.instance.service_name.is_empty());
        assert!(config.instance.object_path.starts_with('/'));
        assert_eq!(config.crash.reporter_name, "linux-crash-logger.bin");
        assert_eq!(config.instance.call_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml().unwrap();
        assert!(toml_str.contains("[instance]"));
        assert!(toml_str.contains("[crash]"));
        assert!(toml_str.contains("linux-crash-logger.bin"));
    }

    #[test]
    fn test_merge_replaces_present_sections_only() {
        let mut config = Config::default();
        config.crash.grid_id = "aditi".to_string();
        config
            .merge_str(
                r#"
[instance]
service_name = "com.example.viewer"
object_path = "/app"
"#,
            )
            .unwrap();
        assert_eq!(config.instance.service_name, "com.example.viewer");
        assert_eq!(config.instance.object_path, "/app");
        // untouched section keeps its value
        assert_eq!(config.crash.grid_id, "aditi");
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("VIEWER_GRID", "aditi"),
            ("VIEWER_DUMP_DIR", "/tmp/dumps"),
            ("VIEWER_SINGLE_INSTANCE", "0"),
            ("VIEWER_CALL_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.crash.grid_id, "aditi");
        assert_eq!(config.crash.dump_dir, Some(PathBuf::from("/tmp/dumps")));
        assert!(!config.instance.enabled);
        assert_eq!(config.instance.call_timeout_ms, 250);
    }

    #[test]
    fn test_bad_timeout_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(|k| (k == "VIEWER_CALL_TIMEOUT_MS").then(|| "soon".to_string()));
        assert_eq!(config.instance.call_timeout_ms, 5_000);
    }
}
