//! Generator and simulator adapters that shell out to external programs.
//!
//! Argument templates may contain `{input}` and `{output}` placeholders,
//! which are replaced with per-call file paths inside the work directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::features::FeatureExtractor;
use crate::types::{ExecutionOutcome, TestCase};

use super::{Generator, Simulator};

/// Substitute `{key}` placeholders in an argument template, then expand `~`.
pub fn expand_args(template: &[String], vars: &[(&str, &Path)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let filled = vars.iter().fold(arg.clone(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), &value.to_string_lossy())
            });
            shellexpand::tilde(&filled).into_owned()
        })
        .collect()
}

/// Run a program to completion, failing on spawn errors or non-zero exit.
pub async fn run_command(program: &str, args: &[String]) -> Result<std::process::Output, HarnessError> {
    tracing::debug!("Running {program} {}", args.join(" "));
    let output = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| HarnessError::Command {
            program: program.to_string(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(HarnessError::Command {
            program: program.to_string(),
            message: format!("{}: {}", output.status, stderr.trim()),
        });
    }
    Ok(output)
}

/// Generates road documents by running an external generator program.
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    extractor: Arc<dyn FeatureExtractor>,
    retry_delay: Duration,
    counter: u64,
}

impl CommandGenerator {
    pub fn new(
        config: &HarnessConfig,
        work_dir: impl Into<PathBuf>,
        extractor: Arc<dyn FeatureExtractor>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            program: config.generator_program.clone(),
            args: config.generator_args.clone(),
            work_dir: work_dir.into(),
            extractor,
            retry_delay,
            counter: 0,
        }
    }

    async fn try_generate(&self, id: &str) -> Result<TestCase, HarnessError> {
        let output = self.work_dir.join(format!("{id}.json"));
        let args = expand_args(&self.args, &[("output", output.as_path())]);
        run_command(&self.program, &args).await?;

        let failed = |message: String| HarnessError::Command {
            program: self.program.clone(),
            message,
        };
        let content = tokio::fs::read_to_string(&output)
            .await
            .map_err(|e| failed(format!("reading {output:?}: {e}")))?;
        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| failed(format!("parsing {output:?}: {e}")))?;
        let features = self
            .extractor
            .extract(&document)
            .map_err(|e| failed(format!("features of {output:?}: {e}")))?;
        let _ = tokio::fs::remove_file(&output).await;
        Ok(TestCase::new(id, document, features))
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate(&mut self) -> TestCase {
        let id = format!("candidate_{}", self.counter);
        self.counter += 1;
        loop {
            match self.try_generate(&id).await {
                Ok(case) => return case,
                Err(e) => {
                    tracing::warn!("Generator failed for {id}, retrying: {e}");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

/// Executes test documents by running an external simulator program.
///
/// The program reads the document at `{input}` and writes the executed
/// document (with an `execution` block) to `{output}`.
pub struct CommandSimulator {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
}

impl CommandSimulator {
    pub fn new(config: &HarnessConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: config.simulator_program.clone(),
            args: config.simulator_args.clone(),
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl Simulator for CommandSimulator {
    async fn execute(&mut self, case: &TestCase) -> Result<ExecutionOutcome, HarnessError> {
        let failed = |message: String| HarnessError::Execution {
            case: case.id.clone(),
            message,
        };
        let input = self.work_dir.join(format!("{}.json", case.id));
        let output = self.work_dir.join(format!("{}.exec.json", case.id));
        let body = serde_json::to_string(&case.document).map_err(|e| failed(e.to_string()))?;
        tokio::fs::write(&input, body)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let args = expand_args(&self.args, &[("input", input.as_path()), ("output", output.as_path())]);
        let run = run_command(&self.program, &args).await;
        let _ = tokio::fs::remove_file(&input).await;
        run.map_err(|e| failed(e.to_string()))?;

        let content = tokio::fs::read_to_string(&output)
            .await
            .map_err(|e| failed(format!("reading {output:?}: {e}")))?;
        let _ = tokio::fs::remove_file(&output).await;
        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| failed(e.to_string()))?;
        let execution = document
            .get("execution")
            .cloned()
            .ok_or_else(|| failed("no execution block in simulator output".to_string()))?;
        serde_json::from_value(execution).map_err(|e| failed(format!("execution: {e}")))
    }
}
