use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Args};
use vmbake::{ImageConfig, Step};

#[derive(Args, Debug)]
pub struct NewImageArgs {
    /// Name of the new disk image
    #[arg(long)]
    pub name: String,

    /// Path to a shell script to customize the disk image
    #[arg(long, value_name = "PATH")]
    pub script: Option<PathBuf>,

    /// Install prerequisites for Kubernetes cluster setup
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub install_k8s: bool,

    /// Pre-pull container images required to run Kubernetes
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub prepull_k8s: bool,
}

impl NewImageArgs {
    /// Steps in fixed order: install, pre-pull, then the custom script.
    pub fn image_config(&self) -> ImageConfig {
        let mut config = ImageConfig::new(&self.name);
        if self.install_k8s {
            config = config.with_step(Step::install_k8s());
        }
        if self.prepull_k8s {
            config = config.with_step(Step::prepull_k8s_images());
        }
        if let Some(script) = &self.script {
            config = config.with_step(Step::run_script(script));
        }
        config
    }
}

pub async fn execute(args: NewImageArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let config = args.image_config();
    config
        .validate()
        .context("Cannot create image with these flags")?;

    super::run_build(&config, global).await
}
