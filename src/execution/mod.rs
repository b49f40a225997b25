//! External command job implementation.
//!
//! [`CommandJob`] wraps an external executable so it can be driven by the
//! scheduler: the typical deployment runs a data-ingestion or prediction
//! script once per trading day. Output is captured and logged line by line;
//! a non-zero exit code is a job failure.
//!
//! ```
//! use quotidien::CommandJob;
//! use std::time::Duration;
//!
//! let job = CommandJob::builder("python3")
//!     .name("futures_update")
//!     .args(["update.py", "--incremental"])
//!     .env("DB_HOST", "localhost")
//!     .timeout(Duration::from_secs(3600))
//!     .build();
//! ```

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::core::job::{Job, JobError};

/// A job that executes an external command.
#[derive(Debug, Clone)]
pub struct CommandJob {
    /// Job name (used for identification in logs)
    name: String,
    /// Program to execute
    program: String,
    /// Command arguments
    args: Vec<String>,
    /// Environment variables
    env: Vec<(String, String)>,
    /// Working directory
    working_dir: Option<PathBuf>,
    /// Execution timeout
    timeout: Option<Duration>,
}

impl CommandJob {
    /// Create a new builder for a command job.
    pub fn builder(program: impl Into<String>) -> CommandJobBuilder {
        CommandJobBuilder::new(program)
    }

    /// Get the program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Get the working directory.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Get the timeout duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<(), JobError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = match self.timeout {
            Some(duration) => timeout(duration, cmd.output())
                .await
                .map_err(|_| JobError::Timeout(duration))?
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?,
            None => cmd
                .output()
                .await
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stdout.trim().lines().filter(|l| !l.is_empty()) {
            debug!(job = %self.name, "stdout: {}", line);
        }
        for line in stderr.trim().lines().filter(|l| !l.is_empty()) {
            warn!(job = %self.name, "stderr: {}", line);
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(JobError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.into_owned(),
            })
        }
    }

    fn description(&self) -> Option<&str> {
        Some(&self.program)
    }
}

/// Builder for [`CommandJob`].
pub struct CommandJobBuilder {
    name: Option<String>,
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandJobBuilder {
    /// Create a new builder for the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            name: None,
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Set the job name (defaults to the program name).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an execution timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the job.
    pub fn build(self) -> CommandJob {
        let name = self.name.unwrap_or_else(|| self.program.clone());
        CommandJob {
            name,
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            timeout: self.timeout,
        }
    }
}
