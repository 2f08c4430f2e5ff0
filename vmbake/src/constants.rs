//! Constants for vmbake
//!
//! Centralized location for environment variables, file names, external
//! tools and default values.

pub mod envs {
    /// Overrides the default home directory (`~/.vmbake`).
    pub const VMBAKE_HOME: &str = "VMBAKE_HOME";

    /// Directory searched for host tools before `PATH`.
    pub const VMBAKE_TOOLS_DIR: &str = "VMBAKE_TOOLS_DIR";
}

/// Host tools driven by the local backend
pub mod tools {
    pub const QEMU_IMG: &str = "qemu-img";
    pub const VIRT_CUSTOMIZE: &str = "virt-customize";
}

/// File naming patterns
pub mod filenames {
    /// Base image used when none is configured, relative to home.
    pub const BASE_IMAGE: &str = "base.qcow2";

    /// Working disk inside a build directory.
    pub const WORK_DISK: &str = "disk.qcow2";

    /// Extension of persisted images.
    pub const IMAGE_EXT: &str = "qcow2";

    /// Marker written into retained failed builds.
    pub const FAILED_MARKER: &str = "FAILED";

    /// Rolling log file prefix under `logs/`.
    pub const LOG_FILE: &str = "vmbake.log";
}

/// Build defaults
pub mod defaults {
    /// Memory given to the customization appliance, in MiB.
    pub const MEMORY_MIB: u32 = 2048;

    /// Kubernetes minor release installed and pre-pulled.
    pub const KUBERNETES_VERSION: &str = "1.30";

    /// Default tracing filter when RUST_LOG is unset.
    pub const LOG_FILTER: &str = "info";
}
