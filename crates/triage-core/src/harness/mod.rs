//! Test generator and simulator interfaces, plus the execution retry policy.
//!
//! Execution is the only long-blocking step of a run. A failed execution is
//! retried with a fixed delay until it succeeds; the case is never dropped
//! unless the policy allows cancelling once the run budget has expired.

pub mod command;

pub use command::{CommandGenerator, CommandSimulator};

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::HarnessError;
use crate::types::{ExecutionOutcome, TestCase};

/// Produces candidate test cases. Infallible: a generator deals with its
/// own failures.
#[async_trait]
pub trait Generator: Send {
    async fn generate(&mut self) -> TestCase;
}

/// Executes a test case and reports the ground-truth outcome.
///
/// Implementations must release any exclusive simulator resource before
/// returning, whether or not execution succeeded.
#[async_trait]
pub trait Simulator: Send {
    async fn execute(&mut self, case: &TestCase) -> Result<ExecutionOutcome, HarnessError>;
}

/// Fixed-delay retry for failed executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub delay: Duration,
    /// Give up once the run deadline has passed
    pub cancel_at_deadline: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(30),
            cancel_at_deadline: false,
        }
    }
}

/// Execute `case`, retrying failures with a fixed delay.
///
/// Returns `HarnessError::Cancelled` only when the policy allows
/// cancellation and `deadline` has passed after a failed attempt.
pub async fn execute_with_retry(
    simulator: &mut dyn Simulator,
    case: &TestCase,
    policy: &RetryPolicy,
    deadline: Option<Instant>,
) -> Result<ExecutionOutcome, HarnessError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match simulator.execute(case).await {
            Ok(outcome) => {
                if attempt > 1 {
                    tracing::info!("Test {} executed after {attempt} attempts", case.id);
                }
                return Ok(outcome);
            }
            Err(e) => {
                tracing::error!("Error running test {} (attempt {attempt}): {e}", case.id);
                if policy.cancel_at_deadline && deadline.is_some_and(|d| Instant::now() >= d) {
                    tracing::warn!("Budget expired, abandoning test {}", case.id);
                    return Err(HarnessError::Cancelled {
                        case: case.id.clone(),
                    });
                }
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}
