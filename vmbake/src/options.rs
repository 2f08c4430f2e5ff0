//! Configuration for vmbake.

use std::path::PathBuf;

use dirs::home_dir;
use serde::{Deserialize, Serialize};

use crate::backend::local::layout::dirs as const_dirs;
use crate::constants::{defaults, envs as const_envs, filenames};

/// What the local backend does with the working image of a failed build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Delete the working image.
    #[default]
    Discard,
    /// Move it under `failed/` with a marker file, for debugging.
    Retain,
}

/// Options for the local build backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BakeOptions {
    /// Root of all vmbake state (images, builds, locks, logs).
    ///
    /// Default: `$VMBAKE_HOME`, else `~/.vmbake`
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,

    /// Pristine disk every build starts from.
    ///
    /// Default: `<home_dir>/base.qcow2`
    #[serde(default)]
    pub base_image: Option<PathBuf>,

    /// Discard or retain the disk of failed builds.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Give the customization appliance network access.
    ///
    /// Installing packages and pre-pulling images need it.
    /// Default: true
    #[serde(default = "default_network")]
    pub network: bool,

    /// Memory for the customization appliance, in MiB.
    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,

    /// Kubernetes minor release (e.g. "1.30") to install and pre-pull.
    #[serde(default = "default_kubernetes_version")]
    pub kubernetes_version: String,

    /// Directory searched for `qemu-img` and `virt-customize` before `PATH`.
    ///
    /// Default: `$VMBAKE_TOOLS_DIR`
    #[serde(default = "default_tools_dir")]
    pub tools_dir: Option<PathBuf>,
}

fn default_home_dir() -> PathBuf {
    std::env::var(const_envs::VMBAKE_HOME)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let mut path = home_dir().unwrap_or_else(|| PathBuf::from("."));
            path.push(const_dirs::VMBAKE_DIR);
            path
        })
}

fn default_network() -> bool {
    true
}

fn default_memory_mib() -> u32 {
    defaults::MEMORY_MIB
}

fn default_kubernetes_version() -> String {
    defaults::KUBERNETES_VERSION.to_string()
}

fn default_tools_dir() -> Option<PathBuf> {
    std::env::var_os(const_envs::VMBAKE_TOOLS_DIR).map(PathBuf::from)
}

impl Default for BakeOptions {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            base_image: None,
            failure_policy: FailurePolicy::default(),
            network: default_network(),
            memory_mib: default_memory_mib(),
            kubernetes_version: default_kubernetes_version(),
            tools_dir: default_tools_dir(),
        }
    }
}

impl BakeOptions {
    /// Options rooted at `home_dir`, everything else default.
    pub fn with_home(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: home_dir.into(),
            ..Default::default()
        }
    }

    /// Resolved path of the base image.
    pub fn base_image_path(&self) -> PathBuf {
        self.base_image
            .clone()
            .unwrap_or_else(|| self.home_dir.join(filenames::BASE_IMAGE))
    }
}
