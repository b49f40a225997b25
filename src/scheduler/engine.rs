//! Scheduler engine implementation.
//!
//! The scheduler is responsible for:
//! - Running the injected job once per trading day, inside the window
//! - Enforcing the lifetime and execution budget
//! - Reacting to shutdown requests within one second
//! - Rotating the log file across period boundaries
//! - Event emission and heartbeat reporting

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::core::calendar::is_trading_day;
use crate::core::job::{Job, JobError};
use crate::core::schedule::{FailurePolicy, ScheduleConfig};
use crate::events::{Event, EventBus};
use crate::logging::LogRotator;
use crate::shutdown::ShutdownFlag;

/// Granularity at which every wait polls the shutdown flag. Bounds shutdown
/// latency to one second.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest single wait between loop iterations (non-trading days, long
/// pre-window stretches, missed windows).
const MAX_WAIT_CHUNK: Duration = Duration::from_secs(3600);

/// Wait between checks once today's attempt is done.
const POST_EXECUTION_WAIT: Duration = Duration::from_secs(300);

/// Why the scheduler stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopCause {
    /// The configured lifetime elapsed.
    LifetimeExpired,
    /// The execution budget was spent.
    ExecutionsExhausted,
    /// An operator signal requested shutdown.
    ShutdownRequested,
    /// The job failed under the fail-fast policy.
    JobFailed(String),
}

impl StopCause {
    /// Whether this cause should map to a non-zero process exit.
    pub fn is_failure(&self) -> bool {
        matches!(self, StopCause::JobFailed(_))
    }
}

/// Final account of a scheduler run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Why the run ended.
    pub cause: StopCause,
    /// Number of successful executions.
    pub executions: u32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
}

impl RunSummary {
    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> Duration {
        (self.ended_at - self.started_at).to_std().unwrap_or_default()
    }
}

/// Mutable loop state, owned exclusively by the scheduler.
///
/// Nothing here survives a process restart: a restarted scheduler starts
/// from zero executions and may run again on a day that already ran.
#[derive(Debug, Default)]
struct ScheduleState {
    /// Successful executions so far.
    execution_count: u32,
    /// Date of the most recent successful execution.
    last_execution_date: Option<NaiveDate>,
    /// Date of the most recent attempt, successful or not. Gates the
    /// at-most-once-per-day trigger so a failed attempt under
    /// `ContinueNextWindow` is not hot-retried inside the same window.
    last_attempt_date: Option<NaiveDate>,
}

/// Daily scheduler for a single job.
///
/// ```no_run
/// use quotidien::{Job, JobError, ScheduleConfig, Scheduler};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct Noop;
///
/// #[async_trait]
/// impl Job for Noop {
///     fn name(&self) -> &str { "noop" }
///     async fn execute(&self) -> Result<(), JobError> { Ok(()) }
/// }
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ScheduleConfig::builder(17, 10).lifetime_days(40).build()?;
/// let summary = Scheduler::new(config, Arc::new(Noop)).run().await;
/// println!("ran {} times", summary.executions);
/// # Ok(())
/// # }
/// ```
pub struct Scheduler {
    config: ScheduleConfig,
    job: Arc<dyn Job>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownFlag,
    event_bus: Arc<EventBus>,
    rotator: Option<Arc<LogRotator>>,
    run_immediately: bool,
    state: ScheduleState,
}

impl Scheduler {
    /// Create a scheduler over the real wall clock.
    pub fn new(config: ScheduleConfig, job: Arc<dyn Job>) -> Self {
        Self {
            config,
            job,
            clock: Arc::new(SystemClock),
            shutdown: ShutdownFlag::new(),
            event_bus: Arc::new(EventBus::new()),
            rotator: None,
            run_immediately: false,
            state: ScheduleState::default(),
        }
    }

    /// Replace the clock (used by tests to run on virtual time).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a shutdown flag, typically the one a
    /// [`crate::ShutdownCoordinator`] sets from signal handlers.
    pub fn with_shutdown_flag(mut self, flag: ShutdownFlag) -> Self {
        self.shutdown = flag;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Attach a log rotator, consulted once per loop iteration.
    pub fn with_log_rotator(mut self, rotator: Arc<LogRotator>) -> Self {
        self.rotator = Some(rotator);
        self
    }

    /// Force one execution at startup regardless of window or weekday.
    pub fn with_run_immediately(mut self, run_immediately: bool) -> Self {
        self.run_immediately = run_immediately;
        self
    }

    /// A handle to this scheduler's shutdown flag.
    pub fn shutdown_flag(&self) -> ShutdownFlag {
        self.shutdown.clone()
    }

    /// Drive the wait/execute loop to termination.
    pub async fn run(mut self) -> RunSummary {
        let started_at = self.clock.now();
        let lifetime =
            chrono::Duration::from_std(self.config.lifetime()).unwrap_or(chrono::Duration::MAX);
        let end_time = started_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        info!(
            job = self.job.name(),
            start = %started_at,
            end = %end_time,
            window_hour = self.config.execution_hour(),
            window_minute = self.config.execution_minute(),
            window_minutes = self.config.window_tolerance_minutes(),
            max_executions = self.config.max_executions(),
            timezone = %self.config.timezone(),
            "scheduler started"
        );

        if self.run_immediately {
            info!("run-immediately requested, executing before entering the loop");
            if let Err(error) = self.execute_once(started_at, end_time).await {
                return self
                    .finish(StopCause::JobFailed(error.to_string()), started_at)
                    .await;
            }
        }

        let cause = loop {
            let now = self.clock.now();
            if self.shutdown.is_requested() {
                break StopCause::ShutdownRequested;
            }
            if now >= end_time {
                break StopCause::LifetimeExpired;
            }
            if self.state.execution_count >= self.config.max_executions() {
                break StopCause::ExecutionsExhausted;
            }

            let today = self.config.local_date(now);
            if let Some(rotator) = &self.rotator {
                if let Some(rotation) = rotator.ensure_current_period(today) {
                    info!(
                        previous = ?rotation.previous,
                        current = %rotation.current,
                        "log file rotated"
                    );
                    self.event_bus
                        .emit(Event::log_rotated(rotation.previous, rotation.current, now))
                        .await;
                }
            }

            if !is_trading_day(today) {
                debug!(date = %today, "not a trading day");
                self.heartbeat(started_at, end_time).await;
                self.interruptible_sleep(MAX_WAIT_CHUNK).await;
                continue;
            }

            if self.config.should_execute_at(now) && self.state.last_attempt_date != Some(today) {
                match self.execute_once(started_at, end_time).await {
                    Ok(()) => continue,
                    Err(error) => break StopCause::JobFailed(error.to_string()),
                }
            }

            if self.state.last_attempt_date == Some(today) {
                self.interruptible_sleep(POST_EXECUTION_WAIT).await;
                continue;
            }

            match self.config.time_until_window(now) {
                Some(remaining) => {
                    debug!(
                        wait_secs = remaining.as_secs(),
                        "waiting for today's execution window"
                    );
                    self.heartbeat(started_at, end_time).await;
                    self.interruptible_sleep(remaining.min(MAX_WAIT_CHUNK)).await;
                }
                None => {
                    // Past today's window without an attempt: the day is
                    // missed for planning purposes.
                    debug!(date = %today, "today's window already passed");
                    self.heartbeat(started_at, end_time).await;
                    self.interruptible_sleep(MAX_WAIT_CHUNK).await;
                }
            }
        };

        self.finish(cause, started_at).await
    }

    /// Run the job once and account for the outcome.
    ///
    /// Returns `Err` only when the failure must terminate the scheduler.
    async fn execute_once(
        &mut self,
        started_at: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), JobError> {
        let began = self.clock.now();
        let today = self.config.local_date(began);
        let index = self.state.execution_count + 1;

        info!(
            job = self.job.name(),
            execution = index,
            max_executions = self.config.max_executions(),
            date = %today,
            "starting job execution"
        );
        self.event_bus
            .emit(Event::execution_started(index, today, began))
            .await;

        let result = self.job.execute().await;
        let finished = self.clock.now();
        let duration = (finished - began).to_std().unwrap_or_default();
        self.state.last_attempt_date = Some(today);

        match result {
            Ok(()) => {
                self.state.execution_count = index;
                self.state.last_execution_date = Some(today);
                info!(
                    job = self.job.name(),
                    execution = index,
                    duration_secs = duration.as_secs(),
                    "job execution completed"
                );
                self.event_bus
                    .emit(Event::execution_completed(index, today, duration, finished))
                    .await;
                self.heartbeat(started_at, end_time).await;
                match self.config.next_execution_after(finished, end_time) {
                    Some(next) => info!(next = %next, "next execution window"),
                    None => info!("no further execution windows before the lifetime ends"),
                }
                Ok(())
            }
            Err(error) => {
                error!(
                    job = self.job.name(),
                    execution = index,
                    error = %error,
                    detail = ?error,
                    duration_secs = duration.as_secs(),
                    "job execution failed"
                );
                self.event_bus
                    .emit(Event::execution_failed(error.to_string(), duration, finished))
                    .await;
                match self.config.failure_policy() {
                    FailurePolicy::FailFast => Err(error),
                    FailurePolicy::ContinueNextWindow => {
                        warn!("continuing past failed execution, next attempt at the next trading day's window");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Emit a progress record: executions so far, elapsed and remaining time.
    async fn heartbeat(&self, started_at: DateTime<Utc>, end_time: DateTime<Utc>) {
        let now = self.clock.now();
        let elapsed = (now - started_at).to_std().unwrap_or_default();
        let remaining = (end_time - now).to_std().unwrap_or_default();
        info!(
            executions = self.state.execution_count,
            max_executions = self.config.max_executions(),
            elapsed_secs = elapsed.as_secs(),
            remaining_secs = remaining.as_secs(),
            "heartbeat"
        );
        self.event_bus
            .emit(Event::heartbeat(
                self.state.execution_count,
                self.config.max_executions(),
                elapsed,
                remaining,
                now,
            ))
            .await;
    }

    /// Sleep up to `total`, polling the shutdown flag every second.
    ///
    /// Returns true when the sleep was cut short by a shutdown request.
    async fn interruptible_sleep(&self, total: Duration) -> bool {
        let deadline = self.clock.now()
            + chrono::Duration::from_std(total).unwrap_or_else(|_| chrono::Duration::zero());
        loop {
            if self.shutdown.is_requested() {
                return true;
            }
            let now = self.clock.now();
            if now >= deadline {
                return false;
            }
            let remaining = (deadline - now).to_std().unwrap_or_default();
            self.clock
                .sleep(remaining.min(SHUTDOWN_POLL_INTERVAL))
                .await;
        }
    }

    /// Log the final summary and build the run account.
    async fn finish(self, cause: StopCause, started_at: DateTime<Utc>) -> RunSummary {
        let ended_at = self.clock.now();
        let summary = RunSummary {
            cause,
            executions: self.state.execution_count,
            started_at,
            ended_at,
        };
        let elapsed_secs = summary.elapsed().as_secs();

        match &summary.cause {
            StopCause::ShutdownRequested => info!(
                executions = summary.executions,
                elapsed_secs,
                last_execution = ?self.state.last_execution_date,
                "scheduler stopped by signal"
            ),
            StopCause::LifetimeExpired => info!(
                executions = summary.executions,
                elapsed_secs,
                last_execution = ?self.state.last_execution_date,
                "scheduler completed normally, lifetime expired"
            ),
            StopCause::ExecutionsExhausted => info!(
                executions = summary.executions,
                elapsed_secs,
                last_execution = ?self.state.last_execution_date,
                "scheduler completed normally, execution budget spent"
            ),
            StopCause::JobFailed(error) => error!(
                error = %error,
                executions = summary.executions,
                elapsed_secs,
                last_execution = ?self.state.last_execution_date,
                "scheduler terminated by job failure"
            ),
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingJob, RecordingJob, SimulatedClock};
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn config_17_10() -> ScheduleConfig {
        ScheduleConfig::builder(17, 10).build().unwrap()
    }

    #[tokio::test]
    async fn test_executes_immediately_when_started_inside_window() {
        // 2024-03-04 is a Monday; 17:11 is inside the 17:10-17:15 window.
        let clock = SimulatedClock::new(utc(2024, 3, 4, 17, 11, 0));
        let job = RecordingJob::new(clock.clone());
        let config = ScheduleConfig::builder(17, 10).max_executions(1).build().unwrap();

        let summary = Scheduler::new(config, job.clone())
            .with_clock(clock)
            .run()
            .await;

        assert_eq!(summary.cause, StopCause::ExecutionsExhausted);
        assert_eq!(summary.executions, 1);
        assert_eq!(job.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_run_immediately_forces_execution_outside_window() {
        // Saturday morning: neither a trading day nor inside the window.
        let clock = SimulatedClock::new(utc(2024, 3, 9, 8, 0, 0));
        let job = RecordingJob::new(clock.clone());
        let config = ScheduleConfig::builder(17, 10).max_executions(1).build().unwrap();

        let summary = Scheduler::new(config, job.clone())
            .with_clock(clock)
            .with_run_immediately(true)
            .run()
            .await;

        assert_eq!(summary.cause, StopCause::ExecutionsExhausted);
        assert_eq!(job.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_run_immediately_failure_is_fatal_under_fail_fast() {
        let clock = SimulatedClock::new(utc(2024, 3, 9, 8, 0, 0));
        // Fails from the first invocation.
        let job = FailingJob::new(0);
        let config = config_17_10();

        let summary = Scheduler::new(config, job.clone())
            .with_clock(clock)
            .with_run_immediately(true)
            .run()
            .await;

        assert!(matches!(summary.cause, StopCause::JobFailed(_)));
        assert_eq!(summary.executions, 0);
        assert_eq!(job.call_count(), 1);
    }

    #[tokio::test]
    async fn test_lifetime_expires_without_any_window() {
        // Start after today's window; lifetime ends before tomorrow's.
        let clock = SimulatedClock::new(utc(2024, 3, 4, 18, 0, 0));
        let job = RecordingJob::new(clock.clone());
        let config = ScheduleConfig::builder(17, 10)
            .lifetime(Duration::from_secs(6 * 3600))
            .build()
            .unwrap();

        let summary = Scheduler::new(config, job.clone())
            .with_clock(clock)
            .run()
            .await;

        assert_eq!(summary.cause, StopCause::LifetimeExpired);
        assert_eq!(summary.executions, 0);
        assert_eq!(job.invocation_count(), 0);
        assert!(summary.ended_at >= summary.started_at);
    }

    #[tokio::test]
    async fn test_shutdown_before_first_execution() {
        let clock = SimulatedClock::new(utc(2024, 3, 4, 8, 0, 0));
        let job = RecordingJob::new(clock.clone());
        let config = config_17_10();

        let scheduler = Scheduler::new(config, job.clone()).with_clock(clock.clone());
        let flag = scheduler.shutdown_flag();
        clock.request_shutdown_at(utc(2024, 3, 4, 9, 0, 0), flag);

        let summary = scheduler.run().await;

        assert_eq!(summary.cause, StopCause::ShutdownRequested);
        assert_eq!(job.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_continue_policy_survives_a_failed_day() {
        // Fails on the second invocation, succeeds otherwise.
        let clock = SimulatedClock::new(utc(2024, 3, 4, 17, 10, 0));
        let job = FailingJob::new(1).succeed_again_after(2);
        let config = ScheduleConfig::builder(17, 10)
            .failure_policy(FailurePolicy::ContinueNextWindow)
            .max_executions(2)
            .build()
            .unwrap();

        let summary = Scheduler::new(config, job.clone())
            .with_clock(clock)
            .run()
            .await;

        // Monday succeeds, Tuesday fails and is skipped, Wednesday succeeds.
        assert_eq!(summary.cause, StopCause::ExecutionsExhausted);
        assert_eq!(summary.executions, 2);
        assert_eq!(job.call_count(), 3);
    }
}
