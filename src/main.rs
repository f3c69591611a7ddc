use clap::Parser;
use owo_colors::{set_override, unset_override};
use tracing::debug;

use pkgstream::adapter::inbound::cli::command::{CheckCommand, Cli, ColorChoice, Commands};
use pkgstream::adapter::inbound::cli::output::{self, OutputConfig};
use pkgstream::adapter::inbound::cli::{check, serve, tail};
use pkgstream::infrastructure::config::settings::Config;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    output::configure(OutputConfig::new(cli.json, cli.quiet));
    match cli.color {
        ColorChoice::Always => set_override(true),
        ColorChoice::Never => set_override(false),
        ColorChoice::Auto => unset_override(),
    }

    if let Err(e) = run(cli).await {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_or_default(cli.config.as_deref())?;
    config.init_logging();
    debug!(command = ?cli.command, "pkgstream starting");

    match &cli.command {
        Commands::Serve(args) => serve::execute(&config, args).await?,
        Commands::Tail(args) => tail::execute(&config, args).await?,
        Commands::Check(CheckCommand::Env) => check::execute_env(&config)?,
        Commands::Check(CheckCommand::Config) => {
            check::execute_config(&config, cli.config.as_deref())?;
        }
        Commands::Check(CheckCommand::Health) => check::execute_health(&config).await?,
    }

    Ok(())
}
