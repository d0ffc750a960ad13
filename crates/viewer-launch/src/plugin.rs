//! Media plugin autodetection.
//!
//! Probes a fixed list of directories for a plugin manifest plus shared
//! library built for this architecture, and exports where it was found.
//! Best effort: nothing here can fail startup.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use viewer_config::{log_plugin_info, log_plugin_warn, PluginConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub library: PathBuf,
    pub version: String,
    pub arch: String,
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    version: String,
    #[serde(rename = "x-ppapi-arch", default)]
    arch: String,
}

/// Architecture tag the manifest must carry for this build.
pub fn host_arch() -> &'static str {
    if cfg!(target_pointer_width = "64") {
        "x64"
    } else {
        "ia32"
    }
}

/// First directory in `config.search_paths` holding a plugin for `arch`.
pub fn probe(config: &PluginConfig, arch: &str) -> Option<PluginInfo> {
    config
        .search_paths
        .iter()
        .find_map(|dir| probe_dir(dir, config, arch))
}

fn probe_dir(dir: &Path, config: &PluginConfig, arch: &str) -> Option<PluginInfo> {
    let manifest_path = dir.join(&config.manifest_name);
    let library = dir.join(&config.library_name);
    if !manifest_path.is_file() || !library.is_file() {
        return None;
    }

    let contents = match std::fs::read_to_string(&manifest_path) {
        Ok(c) => c,
        Err(e) => {
            log_plugin_warn!(
                "Cannot open plugin manifest",
                path = tracing::field::display(manifest_path.display()),
                error = tracing::field::display(&e)
            );
            return None;
        }
    };
    let manifest: Manifest = serde_json::from_str(&contents).ok()?;

    if manifest.arch != arch {
        log_plugin_warn!(
            "Plugin arch mismatch",
            expected = arch,
            found = manifest.arch.as_str()
        );
        return None;
    }

    Some(PluginInfo {
        library,
        version: manifest.version,
        arch: manifest.arch,
    })
}

/// Variables to set given what is already in the environment.
///
/// Returns nothing when both are already set: the probe is skipped.
/// Never includes a variable that is already set.
pub fn planned_exports<F>(config: &PluginConfig, arch: &str, lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    let has_path = lookup(&config.path_var).is_some();
    let has_version = lookup(&config.version_var).is_some();
    if has_path && has_version {
        return Vec::new();
    }

    let Some(info) = probe(config, arch) else {
        return Vec::new();
    };
    log_plugin_info!(
        "Found media plugin",
        arch = info.arch.as_str(),
        version = info.version.as_str(),
        library = tracing::field::display(info.library.display())
    );

    let mut exports = Vec::new();
    if !has_path {
        exports.push((
            config.path_var.clone(),
            info.library.display().to_string(),
        ));
    }
    if !has_version {
        exports.push((config.version_var.clone(), info.version));
    }
    exports
}

/// Probe and export into the process environment.
pub fn export_plugin_vars(config: &PluginConfig) -> Vec<(String, String)> {
    if !config.enabled {
        return Vec::new();
    }
    let exports = planned_exports(config, host_arch(), |name| std::env::var(name).ok());
    for (name, value) in &exports {
        std::env::set_var(name, value);
    }
    exports
}
