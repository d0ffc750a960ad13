use std::fmt;
use std::path::{Path, PathBuf};

use viewer_config::path::sanitize_component;
use viewer_config::InstanceConfig;

/// Well-known name under which the first instance registers.
///
/// Constant per build; every process of the same build derives the same
/// endpoint from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceIdentity {
    pub service_name: String,
    pub object_path: String,
}

impl InstanceIdentity {
    pub fn new(service_name: impl Into<String>, object_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            object_path: object_path.into(),
        }
    }

    pub fn from_config(config: &InstanceConfig) -> Self {
        Self::new(&config.service_name, &config.object_path)
    }

    /// File name stem shared by the socket and lock files.
    pub fn endpoint_stem(&self) -> String {
        format!(
            "{}-{}",
            sanitize_component(&self.service_name),
            sanitize_component(&self.object_path)
        )
    }

    /// Endpoint files for this identity inside `runtime_dir`.
    pub fn endpoint_in(&self, runtime_dir: &Path) -> Endpoint {
        let stem = self.endpoint_stem();
        Endpoint {
            runtime_dir: runtime_dir.to_path_buf(),
            socket_path: runtime_dir.join(format!("{}.sock", stem)),
            lock_path: runtime_dir.join(format!("{}.lock", stem)),
        }
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.service_name, self.object_path)
    }
}

/// Resolved on-disk location of an identity's endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub runtime_dir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
}
