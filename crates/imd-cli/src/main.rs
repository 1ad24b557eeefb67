//! imd-bootstrap - libimobiledevice dependency installer CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use imd_cli::cmd;
use imd_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Usage errors exit 1, not clap's 2
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };
    let quiet = cli.quiet;

    match cli.command {
        Commands::Install {
            platform,
            manifest,
            jobs,
            verbose,
        } => {
            cmd::install::install(&platform, manifest.as_deref(), jobs, verbose, quiet).await
        }
        Commands::Platform { platform } => cmd::platform::platform(&platform),
        Commands::Completions { shell } => {
            cmd::completions::completions(shell);
            Ok(())
        }
    }
}
