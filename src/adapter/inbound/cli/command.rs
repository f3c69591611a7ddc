//! Command-line interface definitions.
//!
//! Defines the CLI structure for pkgstream using `clap`. The binary runs the
//! relay, tails a relay as a resumable consumer, and performs diagnostic
//! checks against the environment and the remote log.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Live package-publish stream relay and consumer
#[derive(Parser, Debug)]
#[command(name = "pkgstream")]
#[command(version, about)]
pub struct Cli {
    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a configuration file (defaults to ./pkgstream.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay server (foreground)
    Serve(ServeArgs),

    /// Follow a relay and print packages as they are published
    Tail(TailArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Arguments for `pkgstream serve`.
#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    /// Socket address to listen on (overrides relay.bind)
    #[arg(long)]
    pub bind: Option<String>,
}

/// Arguments for `pkgstream tail`.
#[derive(Parser, Debug, Default)]
pub struct TailArgs {
    /// Relay stream URL (overrides consumer.endpoint)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Resume after this sequence number
    #[arg(long)]
    pub from_sequence: Option<u64>,
}

/// Subcommands for `pkgstream check`.
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Report which stream credentials are present
    Env,
    /// Validate the configuration file
    Config,
    /// Probe the remote log with a single-record read
    Health,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "pkgstream");
    }

    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["pkgstream", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve(ServeArgs { bind: None })));
        assert!(!cli.json);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_serve_bind() {
        let cli = Cli::try_parse_from(["pkgstream", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
    }

    #[test]
    fn test_parse_tail_resume() {
        let cli = Cli::try_parse_from([
            "pkgstream",
            "tail",
            "--endpoint",
            "http://localhost:8080/streams/oss/api/stream",
            "--from-sequence",
            "41",
        ])
        .unwrap();
        let Commands::Tail(args) = cli.command else {
            panic!("expected tail");
        };
        assert_eq!(args.from_sequence, Some(41));
        assert!(args.endpoint.is_some());
    }

    #[test]
    fn test_parse_tail_rejects_negative_sequence() {
        assert!(Cli::try_parse_from(["pkgstream", "tail", "--from-sequence", "-1"]).is_err());
    }

    #[test]
    fn test_parse_check_subcommands() {
        let cli = Cli::try_parse_from(["pkgstream", "check", "env"]).unwrap();
        assert!(matches!(cli.command, Commands::Check(CheckCommand::Env)));

        let cli = Cli::try_parse_from(["pkgstream", "check", "health"]).unwrap();
        assert!(matches!(cli.command, Commands::Check(CheckCommand::Health)));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["pkgstream", "check", "env", "--json", "--config", "x.toml"])
                .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn test_parse_color_never() {
        let cli = Cli::try_parse_from(["pkgstream", "--color", "never", "serve"]).unwrap();
        assert!(matches!(cli.color, ColorChoice::Never));
    }
}
