//! The `triage online` command: the budget-bounded adaptive triage loop.

use clap::Args;
use std::path::PathBuf;
use triage_core::output::write_json;
use triage_core::{
    CommandClassifier, CommandGenerator, CommandSimulator, Config, OnlineOptions, OnlineResult,
    OnlineRunner,
};

use super::expand_path;

/// Arguments for the `online` command.
#[derive(Args, Debug, Default)]
pub struct OnlineArgs {
    /// Seed training dataset (CSV); skips the cold start
    #[arg(long)]
    pub init_data: Option<PathBuf>,

    /// Output directory for artifacts, run log and results
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Time budget in minutes
    #[arg(long)]
    pub time_budget: Option<u64>,

    /// Candidates generated and classified per batch
    #[arg(long)]
    pub bulk_size: Option<usize>,

    /// Executed cases per round
    #[arg(long)]
    pub round_size: Option<usize>,

    /// Model to train and query
    #[arg(long)]
    pub model: Option<String>,

    /// Retrain after every round
    #[arg(long, conflicts_with = "no_adaptive")]
    pub adaptive: bool,

    /// Never retrain after the initial model
    #[arg(long)]
    pub no_adaptive: bool,
}

/// Apply CLI overrides to the loaded configuration.
fn apply_overrides(config: &mut Config, args: &OnlineArgs) {
    if let Some(path) = &args.init_data {
        config.online.init_data = Some(expand_path(path));
    }
    if let Some(dir) = &args.output {
        config.general.output_dir = expand_path(dir);
    }
    if let Some(mins) = args.time_budget {
        config.online.time_budget_mins = mins;
    }
    if let Some(n) = args.bulk_size {
        config.online.bulk_size = n;
    }
    if let Some(n) = args.round_size {
        config.online.round_size = n;
    }
    if let Some(model) = &args.model {
        config.online.model = model.clone();
    }
    if args.adaptive {
        config.online.adaptive = true;
    }
    if args.no_adaptive {
        config.online.adaptive = false;
    }
}

/// Execute the online command.
pub async fn execute(mut config: Config, args: OnlineArgs) -> anyhow::Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    if let Some(path) = &config.online.init_data {
        if !path.is_file() {
            anyhow::bail!("Seed dataset does not exist: {:?}", path);
        }
    }

    let output_dir = config.output_dir();
    let work_dir = output_dir.join("work");
    std::fs::create_dir_all(&work_dir)?;
    tracing::info!("Writing run artifacts to {:?}", output_dir);

    let retry = config.retry_policy();
    let extractor = config.features.set.extractor();
    tracing::debug!("Feature set: {}", extractor.name());

    let generator = CommandGenerator::new(&config.harness, &work_dir, extractor, retry.delay);
    let simulator = CommandSimulator::new(&config.harness, &work_dir);
    let classifier = CommandClassifier::new(config.classifier.clone(), output_dir.join("models"));

    let mut runner = OnlineRunner::new(
        OnlineOptions::from_config(&config),
        &output_dir,
        Box::new(generator),
        Box::new(simulator),
        Box::new(classifier),
    );
    let result = runner.run().await?;

    let results_path = output_dir.join("results.json");
    write_json(&results_path, &result)?;
    tracing::info!("Results written to {:?}", results_path);

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &OnlineResult) {
    let precisions: Vec<f64> = result
        .rounds
        .iter()
        .filter_map(|r| r.unsafe_precision)
        .collect();
    let mean_precision = if precisions.is_empty() {
        "n/a".to_string()
    } else {
        format!("{:.3}", precisions.iter().sum::<f64>() / precisions.len() as f64)
    };

    println!();
    println!("  Online run complete");
    println!("  ───────────────────────────────");
    println!("  Generated:        {}", result.generated_tests);
    println!("  Executed:         {}", result.tested_files);
    println!("  Unsafe found:     {}", result.unsafe_cases);
    println!("  Predicted safe:   {}", result.predicted_as_safe);
    println!("  Rounds:           {}", result.rounds.len());
    println!("  Mean precision:   {mean_precision}");
    println!("  Simulation time:  {:.1}s", result.time_test_run);
    println!();
}
