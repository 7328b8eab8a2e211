//! The `triage dataset` command: executed test files to a training CSV.

use clap::Args;
use std::path::PathBuf;
use triage_core::{Config, Corpus, SafetyLabel};

use super::{expand_path, require_dir};

/// Arguments for the `dataset` command.
#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// Directory of executed test files
    #[arg(short, long)]
    pub input: PathBuf,

    /// CSV file to write
    #[arg(short, long)]
    pub output: PathBuf,

    /// Resample to equal safe/unsafe counts
    #[arg(long)]
    pub balanced: bool,

    /// Seed for --balanced resampling
    #[arg(long, default_value = "0")]
    pub seed: u64,
}

/// Execute the dataset command.
pub async fn execute(config: Config, args: DatasetArgs) -> anyhow::Result<()> {
    let input = expand_path(&args.input);
    require_dir(&input)?;
    let output = expand_path(&args.output);

    let extractor = config.features.set.extractor();
    let corpus = Corpus::load_dir(&input, extractor.as_ref());
    let mut dataset = corpus.to_dataset();
    if args.balanced {
        dataset = dataset.rebalance(args.seed);
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    dataset.write_csv(&output)?;
    tracing::info!("Dataset written to {:?}", output);

    println!(
        "Wrote {} records ({} safe, {} unsafe) to {}",
        dataset.len(),
        dataset.count(SafetyLabel::Safe),
        dataset.count(SafetyLabel::Unsafe),
        output.display()
    );
    Ok(())
}
