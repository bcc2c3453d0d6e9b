mod cli;
mod commands;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(&cli.log_level);

    let config = || commands::load_config(cli.config.as_deref());

    match &cli.command {
        Commands::Keygen(args) => commands::keys::keygen(args)?,
        Commands::Issue(args) => commands::tokens::issue(&config()?, args)?,
        Commands::Verify(args) => commands::tokens::verify(&config()?, args)?,
        Commands::Authenticate(args) => commands::tokens::authenticate(&config()?, args).await?,
        Commands::Revoke(args) => commands::tokens::revoke(&config()?, args).await?,
        Commands::Status(args) => commands::tokens::status(&config()?, args).await?,
        Commands::Migrate => commands::ledger::migrate(&config()?).await?,
        Commands::Sweep => commands::ledger::sweep(&config()?).await?,
    }

    Ok(())
}
