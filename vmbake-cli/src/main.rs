mod cli;
mod commands;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use vmbake::backend::local::layout::dirs;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logs_dir = cli.global.options().home_dir.join(dirs::LOGS_DIR);
    let _log_guard = vmbake::init_logging(&logs_dir, None)
        .with_context(|| format!("initializing logs in {}", logs_dir.display()))?;

    match cli.command {
        Commands::Newimage(args) => commands::newimage::execute(args, &cli.global).await,
        Commands::Build(args) => commands::build::execute(args, &cli.global).await,
    }
}
