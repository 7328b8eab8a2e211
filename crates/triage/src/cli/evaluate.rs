//! The `triage evaluate-models` command: hold-out scoring at several splits.

use clap::Args;
use std::path::PathBuf;
use triage_core::{CommandClassifier, Config, Corpus, ModelEvaluation};

use super::{expand_path, require_dir};

/// Arguments for the `evaluate-models` command.
#[derive(Args, Debug, Default)]
pub struct EvaluateArgs {
    /// Directory of executed test files
    #[arg(short, long, required = true)]
    pub input: PathBuf,

    /// Output directory for the dataset, split and results files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Prefix of every written file
    #[arg(short, long, default_value = "dataset")]
    pub dataset: String,

    /// Training fractions, comma separated
    #[arg(long, value_delimiter = ',')]
    pub ratios: Vec<f64>,

    /// Seed for the per-split shuffles
    #[arg(long, default_value = "0")]
    pub seed: u64,
}

fn apply_overrides(config: &mut Config, args: &EvaluateArgs) {
    if let Some(dir) = &args.output {
        config.general.output_dir = expand_path(dir);
    }
    if !args.ratios.is_empty() {
        config.classifier.evaluation_ratios = args.ratios.clone();
    }
}

/// Execute the evaluate-models command.
pub async fn execute(mut config: Config, args: EvaluateArgs) -> anyhow::Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    let input = expand_path(&args.input);
    require_dir(&input)?;

    let extractor = config.features.set.extractor();
    let dataset = Corpus::load_dir(&input, extractor.as_ref()).to_dataset();
    if dataset.is_empty() {
        anyhow::bail!("No usable executed test files found in {:?}", input);
    }

    let output_dir = config.output_dir();
    let classifier = CommandClassifier::new(config.classifier.clone(), output_dir.join("models"));
    let evaluation = ModelEvaluation::new(
        &output_dir,
        &args.dataset,
        config.classifier.evaluation_ratios.clone(),
        args.seed,
    );
    let run = evaluation.run(&dataset, &classifier).await?;

    println!();
    println!("Model evaluation");
    println!("  Dataset:   {} ({} records)", run.complete.display(), dataset.len());
    for split in &run.splits {
        println!(
            "  {:<14} {} training / {} test",
            split.split, split.training_records, split.test_records
        );
    }
    println!("  Results:   {}", run.results.display());
    Ok(())
}
