pub mod build;
pub mod newimage;

use anyhow::Context;
use vmbake::{ImageConfig, ImagePipeline};

use crate::cli::GlobalFlags;

/// Build a validated configuration with the local backend.
async fn run_build(config: &ImageConfig, global: &GlobalFlags) -> anyhow::Result<()> {
    let backend = global.create_backend()?;
    let mut log = global.build_log();

    println!("Creating VM base image {:?}...", config.name);

    let image = ImagePipeline::new(&backend)
        .with_cancellation(global.cancellation())
        .build(config, log.as_mut())
        .await
        .context("Creating image")?;

    println!(
        "Created VM base image {:?} at {}",
        image.name(),
        image.path().display()
    );

    Ok(())
}
