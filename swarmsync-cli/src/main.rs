use anyhow::Result;
use clap::Parser;
use swarmsync_cli::cli::Cli;
use swarmsync_cli::commands::{self, Commands, FATAL_EXIT_CODE, Outcome};
use swarmsync_cli::config::SwarmConfig;

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> Result<Outcome> {
    let config = SwarmConfig::load(cli.config.as_deref(), &cli.overrides())?;
    match cli.command() {
        Commands::Deploy { service, .. } => {
            commands::deploy::handle_deploy(&config, service.as_deref(), cli.format).await
        }
        Commands::List { service } => {
            commands::list::handle_list(&config, service.as_deref(), cli.format).await
        }
        Commands::Cleanup { service, yes } => {
            commands::cleanup::handle_cleanup(&config, &service, yes, cli.format).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("❌ {e:#}");
            FATAL_EXIT_CODE
        }
    };
    std::process::exit(code);
}
