//! The `triage offline` command: policy replay over executed tests.
//!
//! Loads the corpus, splits it into a balanced training set and an
//! evaluation set, trains every configured model on the training set and
//! runs the four selection policies over the evaluation set.

use clap::Args;
use std::path::PathBuf;
use triage_core::offline::{report_file_name, train_models};
use triage_core::online::TRAINING_FILE;
use triage_core::output::write_json;
use triage_core::{
    CommandClassifier, Config, Corpus, Evaluator, OfflineOptions, OfflineReport, SafetyLabel,
};

use super::{expand_path, require_dir};

/// Arguments for the `offline` command.
#[derive(Args, Debug, Default)]
pub struct OfflineArgs {
    /// Directory of executed test files
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Output directory for the training set, models and report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Rounds averaged per policy
    #[arg(long)]
    pub rounds: Option<usize>,

    /// Unsafe share of the evaluation set
    #[arg(long)]
    pub ratio: Option<f64>,

    /// Share of the scarcer label used for training
    #[arg(long)]
    pub train_ratio: Option<f64>,

    /// Executed cases per round (fixed policies)
    #[arg(long)]
    pub num_tests: Option<usize>,

    /// Unsafe cases to reach per round (reach policies)
    #[arg(long)]
    pub num_unsafe: Option<usize>,

    /// Seed for the split, rebalancing and policy sampling
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Apply CLI overrides to the loaded configuration.
fn apply_overrides(config: &mut Config, args: &OfflineArgs) {
    if let Some(dir) = &args.output {
        config.general.output_dir = expand_path(dir);
    }
    if let Some(n) = args.rounds {
        config.offline.rounds = n;
    }
    if let Some(r) = args.ratio {
        config.offline.ratio = r;
    }
    if let Some(r) = args.train_ratio {
        config.offline.train_ratio = r;
    }
    if let Some(n) = args.num_tests {
        config.offline.num_tests = n;
    }
    if let Some(n) = args.num_unsafe {
        config.offline.num_unsafe = n;
    }
    if args.seed.is_some() {
        config.offline.seed = args.seed;
    }
}

/// Execute the offline command.
pub async fn execute(mut config: Config, args: OfflineArgs) -> anyhow::Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    let input = expand_path(&args.input);
    require_dir(&input)?;

    let extractor = config.features.set.extractor();
    let corpus = Corpus::load_dir(&input, extractor.as_ref());
    if corpus.is_empty() {
        anyhow::bail!("No usable executed test files found in {:?}", input);
    }

    let options = OfflineOptions::from_config(&config);
    tracing::info!("Offline evaluation seed: {}", options.seed);

    let (training, evaluation) =
        corpus.split(config.offline.train_ratio, config.offline.ratio, options.seed);

    let output_dir = config.output_dir();
    std::fs::create_dir_all(&output_dir)?;
    let dataset = training.to_dataset().rebalance(options.seed);
    dataset.write_csv(&output_dir.join(TRAINING_FILE))?;

    let mut classifier =
        CommandClassifier::new(config.classifier.clone(), output_dir.join("models"));
    let models = classifier.model_names().to_vec();
    let handles = train_models(&mut classifier, &models, &dataset).await?;

    let mut evaluator = Evaluator::new(&evaluation, options);
    let progress = create_progress_bar(evaluator.total_rounds(handles.len()));
    let report = evaluator
        .evaluate(&classifier, &handles, || progress.inc(1))
        .await;
    progress.finish_and_clear();
    let report = report?;

    let report_path = output_dir.join(report_file_name(options.rounds, config.offline.ratio));
    write_json(&report_path, &report)?;
    tracing::info!("Report written to {:?}", report_path);

    print_summary(&evaluation, &report);
    Ok(())
}

/// Create a progress bar over all policy rounds.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rounds ({percent}%)",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb
}

fn print_summary(evaluation: &Corpus, report: &OfflineReport) {
    let avg = |agg: &triage_core::AggregateResult, key: &str| {
        agg.average(key)
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "-".to_string())
    };

    println!();
    println!(
        "  Evaluation set: {} cases ({} unsafe)",
        evaluation.len(),
        evaluation.count(SafetyLabel::Unsafe)
    );
    println!("  ───────────────────────────────────────────────");
    println!(
        "  random-fixed   cost {:>10}  unsafe {:>6}",
        avg(&report.random_fixed, "total_cost"),
        avg(&report.random_fixed, "num_unsafe")
    );
    println!(
        "  random-reach   cost {:>10}  tests  {:>6}",
        avg(&report.random_reach, "total_cost"),
        avg(&report.random_reach, "num_tests")
    );
    for (model, agg) in &report.model_fixed {
        println!(
            "  model-fixed    cost {:>10}  unsafe {:>6}  missed unsafe {:>6}  {model}",
            avg(agg, "total_costs"),
            avg(agg, "num_unsafe_file_tested"),
            avg(agg, "num_missed_unsafe_tests")
        );
    }
    for (model, agg) in &report.model_reach {
        println!(
            "  model-reach    cost {:>10}  safe   {:>6}  missed unsafe {:>6}  {model}",
            avg(agg, "total_costs"),
            avg(agg, "num_safe_file_tested"),
            avg(agg, "num_missed_unsafe_tests")
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = Config::default();
        let args = OfflineArgs {
            input: PathBuf::from("tests"),
            rounds: Some(5),
            ratio: Some(0.3),
            seed: Some(9),
            ..Default::default()
        };
        apply_overrides(&mut config, &args);

        assert_eq!(config.offline.rounds, 5);
        assert_eq!(config.offline.ratio, 0.3);
        assert_eq!(config.offline.seed, Some(9));
        assert_eq!(config.offline.num_tests, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_fails_validation() {
        let mut config = Config::default();
        let args = OfflineArgs {
            ratio: Some(1.0),
            ..Default::default()
        };
        apply_overrides(&mut config, &args);
        assert!(config.validate().is_err());
    }
}
