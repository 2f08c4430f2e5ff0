use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use vmbake::ImageConfig;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Image config file (YAML or JSON)
    #[arg(short, long, value_name = "PATH")]
    pub file: PathBuf,

    /// Override the image name from the config file
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn execute(args: BuildArgs, global: &crate::cli::GlobalFlags) -> anyhow::Result<()> {
    let mut config = ImageConfig::from_file(&args.file)?;
    if let Some(name) = args.name {
        config.name = name;
    }

    config
        .validate()
        .with_context(|| format!("Invalid image config in {}", args.file.display()))?;

    super::run_build(&config, global).await
}
