//! Testing utilities for users of the quotidien library.
//!
//! This module provides helpers for testing scheduler behavior:
//!
//! - [`SimulatedClock`]: virtual time, so a forty-day schedule runs in
//!   milliseconds
//! - [`RecordingJob`]: records every invocation instant
//! - [`FailingJob`]: succeeds a configured number of times, then fails

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::core::job::{Job, JobError};
use crate::shutdown::ShutdownFlag;

/// A clock that advances only when slept on.
///
/// `sleep` advances virtual time by the requested duration and yields to
/// the runtime, so scheduler loops driven by this clock run to completion
/// almost instantly while observing the same instants a real run would.
///
/// A shutdown trigger can be armed at a specific instant to exercise
/// signal handling mid-sleep:
///
/// ```
/// use quotidien::testing::SimulatedClock;
/// use quotidien::ShutdownFlag;
/// use chrono::{TimeZone, Utc};
///
/// let clock = SimulatedClock::new(Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap());
/// let flag = ShutdownFlag::new();
/// clock.request_shutdown_at(Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(), flag);
/// ```
pub struct SimulatedClock {
    now: Mutex<DateTime<Utc>>,
    shutdown_trigger: Mutex<Option<(DateTime<Utc>, ShutdownFlag)>>,
}

impl SimulatedClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(start),
            shutdown_trigger: Mutex::new(None),
        })
    }

    /// Move the clock forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += chrono::Duration::from_std(duration).expect("duration out of range");
    }

    /// Arm `flag` to be requested once virtual time reaches `at`.
    pub fn request_shutdown_at(&self, at: DateTime<Utc>, flag: ShutdownFlag) {
        *self.shutdown_trigger.lock().expect("trigger lock poisoned") = Some((at, flag));
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }

    async fn sleep(&self, duration: Duration) {
        let now = {
            let mut now = self.now.lock().expect("clock lock poisoned");
            *now += chrono::Duration::from_std(duration).expect("duration out of range");
            *now
        };
        if let Some((at, flag)) = &*self.shutdown_trigger.lock().expect("trigger lock poisoned") {
            if now >= *at {
                flag.request();
            }
        }
        // Stay cooperative so concurrent tasks make progress.
        tokio::task::yield_now().await;
    }
}

/// A job that records the instant of every invocation.
pub struct RecordingJob {
    clock: Arc<dyn Clock>,
    invocations: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingJob {
    /// Create a recording job reading timestamps from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            invocations: Mutex::new(Vec::new()),
        })
    }

    /// Instants at which the job was invoked, in order.
    pub fn invocation_times(&self) -> Vec<DateTime<Utc>> {
        self.invocations.lock().expect("lock poisoned").clone()
    }

    /// Number of invocations so far.
    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().expect("lock poisoned").len()
    }
}

#[async_trait]
impl Job for RecordingJob {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(&self) -> Result<(), JobError> {
        let now = self.clock.now();
        self.invocations.lock().expect("lock poisoned").push(now);
        Ok(())
    }
}

/// A job that succeeds `succeed_for` times, then fails.
///
/// By default it keeps failing forever; [`FailingJob::succeed_again_after`]
/// bounds the failing stretch so later invocations succeed again.
pub struct FailingJob {
    succeed_for: u32,
    recover_after: Option<u32>,
    calls: AtomicU32,
}

impl FailingJob {
    /// Create a job whose first `succeed_for` invocations succeed.
    pub fn new(succeed_for: u32) -> Arc<Self> {
        Arc::new(Self {
            succeed_for,
            recover_after: None,
            calls: AtomicU32::new(0),
        })
    }

    /// Make invocations after the `recover_after`-th succeed again.
    pub fn succeed_again_after(self: Arc<Self>, recover_after: u32) -> Arc<Self> {
        Arc::new(Self {
            succeed_for: self.succeed_for,
            recover_after: Some(recover_after),
            calls: AtomicU32::new(self.calls.load(Ordering::SeqCst)),
        })
    }

    /// Number of times this job has been invoked.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for FailingJob {
    fn name(&self) -> &str {
        "failing"
    }

    async fn execute(&self) -> Result<(), JobError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fails =
            index > self.succeed_for && self.recover_after.map_or(true, |until| index <= until);
        if fails {
            Err(JobError::ExecutionFailed(format!(
                "intentional test failure on invocation {index}"
            )))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[tokio::test]
    async fn test_simulated_clock_advances_on_sleep() {
        let clock = SimulatedClock::new(utc(2024, 3, 4, 8, 0, 0));
        clock.sleep(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), utc(2024, 3, 4, 8, 1, 30));
    }

    #[tokio::test]
    async fn test_simulated_clock_advance_without_sleep() {
        let clock = SimulatedClock::new(utc(2024, 3, 4, 8, 0, 0));
        clock.advance(Duration::from_secs(3600));
        assert_eq!(clock.now(), utc(2024, 3, 4, 9, 0, 0));
    }

    #[tokio::test]
    async fn test_shutdown_trigger_fires_when_time_is_reached() {
        let clock = SimulatedClock::new(utc(2024, 3, 4, 8, 0, 0));
        let flag = ShutdownFlag::new();
        clock.request_shutdown_at(utc(2024, 3, 4, 8, 0, 30), flag.clone());

        clock.sleep(Duration::from_secs(10)).await;
        assert!(!flag.is_requested());

        clock.sleep(Duration::from_secs(30)).await;
        assert!(flag.is_requested());
    }

    #[tokio::test]
    async fn test_recording_job_stamps_invocations() {
        let clock = SimulatedClock::new(utc(2024, 3, 4, 17, 10, 0));
        let job = RecordingJob::new(clock.clone());

        job.execute().await.unwrap();
        clock.advance(Duration::from_secs(60));
        job.execute().await.unwrap();

        let times = job.invocation_times();
        assert_eq!(times.len(), 2);
        assert_eq!(times[0], utc(2024, 3, 4, 17, 10, 0));
        assert_eq!(times[1], utc(2024, 3, 4, 17, 11, 0));
        assert_eq!(job.invocation_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_job_fails_after_configured_successes() {
        let job = FailingJob::new(1);
        assert!(job.execute().await.is_ok());
        assert!(job.execute().await.is_err());
        assert!(job.execute().await.is_err());
        assert_eq!(job.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failing_job_can_recover() {
        let job = FailingJob::new(1).succeed_again_after(2);
        assert!(job.execute().await.is_ok());
        assert!(job.execute().await.is_err());
        assert!(job.execute().await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_job_with_zero_successes_fails_immediately() {
        let job = FailingJob::new(0);
        let err = job.execute().await.unwrap_err();
        assert!(err.to_string().contains("invocation 1"));
    }
}
