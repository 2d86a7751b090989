use clap::Parser;

use overseer::adapter::inbound::cli::command::{CheckCommand, Cli, Commands};
use overseer::adapter::inbound::cli::output::{self, OutputConfig};
use overseer::adapter::inbound::cli::{check, run, status};
use overseer::error::Result;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    output::configure(OutputConfig::new(cli.json, cli.quiet, cli.verbose));

    if let Err(e) = dispatch(cli).await {
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run::execute(&args).await,
        Commands::Status(args) => status::execute(&args),
        Commands::Check(CheckCommand::Config(args)) => check::execute_config(&args.config),
    }
}
