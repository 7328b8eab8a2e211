//! Triage CLI - classifier-guided prioritization of simulator test cases.
//!
//! Runs the online adaptive triage loop against the configured generator,
//! simulator and classifier toolkit, or replays selection policies against
//! a corpus of already-executed tests.
//!
//! # Usage
//!
//! ```bash
//! # Online run with a 60 minute budget
//! triage online --time-budget 60 --bulk-size 10
//!
//! # Compare random and model-guided policies on executed tests
//! triage offline --input ./executed --rounds 30 --ratio 0.45
//!
//! # Convert executed tests into a balanced training dataset
//! triage dataset --input ./executed --output training.csv --balanced
//!
//! # Score the toolkit's models at 40/50/60/80% training splits
//! triage evaluate-models --input ./executed --dataset roads
//!
//! # View configuration
//! triage config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Triage - classifier-guided prioritization of simulator test cases.
#[derive(Parser, Debug)]
#[command(name = "triage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate, filter and execute test cases within a time budget
    Online(cli::online::OnlineArgs),

    /// Evaluate random and classifier-guided policies on executed tests
    Offline(cli::offline::OfflineArgs),

    /// Convert executed test files into a labeled training dataset
    Dataset(cli::dataset::DatasetArgs),

    /// Score the toolkit's models on hold-out splits of executed tests
    EvaluateModels(cli::evaluate::EvaluateArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match triage_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `triage config path`."
            );
            triage_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Triage v{}", triage_core::VERSION);

    match cli.command {
        Commands::Online(args) => cli::online::execute(config, args).await,
        Commands::Offline(args) => cli::offline::execute(config, args).await,
        Commands::Dataset(args) => cli::dataset::execute(config, args).await,
        Commands::EvaluateModels(args) => cli::evaluate::execute(config, args).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
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
    fn test_parse_offline_flags() {
        let cli = Cli::try_parse_from([
            "triage", "offline", "--input", "./tests", "--rounds", "5", "--ratio", "0.3",
        ])
        .unwrap();
        match cli.command {
            Commands::Offline(args) => {
                assert_eq!(args.rounds, Some(5));
                assert_eq!(args.ratio, Some(0.3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_evaluate_models_ratios() {
        let cli = Cli::try_parse_from([
            "triage",
            "evaluate-models",
            "--input",
            "./tests",
            "--ratios",
            "0.4,0.8",
        ])
        .unwrap();
        match cli.command {
            Commands::EvaluateModels(args) => {
                assert_eq!(args.ratios, vec![0.4, 0.8]);
                assert_eq!(args.dataset, "dataset");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_offline_requires_input() {
        assert!(Cli::try_parse_from(["triage", "offline"]).is_err());
    }
}
