//! LocAudit CLI - Main Entry Point
//!
//! Runs translation coverage and visual regression audits over pages
//! captured by the browser layer.

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod output;

use commands::{classify, config, run};

/// LocAudit - localized page coverage and visual regression checks
#[derive(Parser)]
#[command(name = "locaudit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit every page in a capture manifest
    Run(run::RunArgs),

    /// Validate a configuration file and print the effective settings
    CheckConfig(config::CheckConfigArgs),

    /// Classify sample strings with the configured detector
    Classify(classify::ClassifyArgs),
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let code = match cli.command {
        Commands::Run(args) => run::execute(args).await?,
        Commands::CheckConfig(args) => config::execute(args)?,
        Commands::Classify(args) => classify::execute(args)?,
    };

    Ok(code.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::PathBuf;
    use test_case::test_case;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::parse_from([
            "locaudit",
            "--log-format",
            "json",
            "run",
            "--config",
            "locaudit.yaml",
            "--pages",
            "captures/manifest.yaml",
            "--update-baselines",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("locaudit.yaml"));
                assert_eq!(args.pages, PathBuf::from("captures/manifest.yaml"));
                assert!(args.update_baselines);
                assert!(args.output.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test_case(&["locaudit", "run", "--config", "c.yaml"] ; "run without pages")]
    #[test_case(&["locaudit", "classify", "--config", "c.yaml"] ; "classify without text")]
    #[test_case(&["locaudit", "check-config"] ; "check without config")]
    fn test_missing_arguments_are_rejected(args: &[&str]) {
        assert!(Cli::try_parse_from(args).is_err());
    }
}
