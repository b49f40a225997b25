//! Job trait and error types.
//!
//! A `Job` is the unit of work the scheduler invokes once per trading day.
//! It takes no arguments and reports only success or failure; the scheduler
//! never retries and never inspects a return value beyond that.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during job execution.
#[derive(Debug, Error)]
pub enum JobError {
    /// Job execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// External command exited with a non-zero code.
    #[error("command exited with code {code}")]
    CommandFailed {
        /// Exit code of the command (-1 if terminated by a signal).
        code: i32,
        /// Captured standard error output.
        stderr: String,
    },

    /// Job ran past its own deadline.
    #[error("job timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// The unit of work driven by the scheduler.
///
/// # Example
///
/// ```
/// use quotidien::{Job, JobError};
/// use async_trait::async_trait;
///
/// struct IngestDailyBars;
///
/// #[async_trait]
/// impl Job for IngestDailyBars {
///     fn name(&self) -> &str {
///         "ingest_daily_bars"
///     }
///
///     async fn execute(&self) -> Result<(), JobError> {
///         // fetch, transform, persist...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync {
    /// Returns the name of this job, used in log records.
    fn name(&self) -> &str;

    /// Execute the job.
    ///
    /// Runs to completion within the scheduler's single control flow; the
    /// scheduler blocks on it and imposes no timeout of its own.
    async fn execute(&self) -> Result<(), JobError>;

    /// Optional description for display/logging purposes.
    fn description(&self) -> Option<&str> {
        None
    }
}
