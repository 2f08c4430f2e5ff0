use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use vmbake::constants::envs;
use vmbake::{BakeOptions, BuildLog, FailurePolicy, LocalBackend};

use crate::commands::{build::BuildArgs, newimage::NewImageArgs};

#[derive(Parser, Debug)]
#[command(name = "vmbake", version, about = "Build reusable VM base disk images")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalFlags,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a base VM disk image
    Newimage(NewImageArgs),
    /// Build a VM disk image from a YAML or JSON config file
    Build(BuildArgs),
}

#[derive(Args, Debug)]
pub struct GlobalFlags {
    /// Directory holding images, builds and logs
    #[arg(long, global = true, env = envs::VMBAKE_HOME)]
    pub home: Option<PathBuf>,

    /// Base disk image every build starts from [default: <home>/base.qcow2]
    #[arg(long, global = true, value_name = "PATH")]
    pub base_image: Option<PathBuf>,

    /// Keep the disk of a failed build under <home>/failed for inspection
    #[arg(long, global = true)]
    pub keep_failed: bool,

    /// Do not give the build appliance network access
    #[arg(long, global = true)]
    pub no_network: bool,

    /// Memory for the build appliance
    #[arg(long, global = true, value_name = "MIB")]
    pub memory: Option<u32>,

    /// Kubernetes release channel to install, e.g. 1.30
    #[arg(long, global = true, value_name = "VERSION")]
    pub kubernetes_version: Option<String>,

    /// Print build progress and tool output to stdout
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Stop the build between steps after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl GlobalFlags {
    pub fn options(&self) -> BakeOptions {
        let mut options = match &self.home {
            Some(home) => BakeOptions::with_home(home),
            None => BakeOptions::default(),
        };

        options.base_image = self.base_image.clone();
        if self.keep_failed {
            options.failure_policy = FailurePolicy::Retain;
        }
        if self.no_network {
            options.network = false;
        }
        if let Some(memory) = self.memory {
            options.memory_mib = memory;
        }
        if let Some(version) = &self.kubernetes_version {
            options.kubernetes_version = version.clone();
        }

        options
    }

    pub fn create_backend(&self) -> anyhow::Result<LocalBackend> {
        Ok(LocalBackend::new(self.options())?)
    }

    pub fn build_log(&self) -> Option<BuildLog> {
        self.verbose.then(BuildLog::stdout)
    }

    /// Token cancelled on Ctrl-C or when `--timeout` expires.
    pub fn cancellation(&self) -> CancellationToken {
        let token = CancellationToken::new();

        let on_signal = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, stopping after the current step...");
                on_signal.cancel();
            }
        });

        if let Some(secs) = self.timeout {
            let on_timeout = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                tracing::warn!(timeout_secs = secs, "Build timed out");
                on_timeout.cancel();
            });
        }

        token
    }
}
