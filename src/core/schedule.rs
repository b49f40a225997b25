//! Schedule configuration and execution-window computation.
//!
//! A [`ScheduleConfig`] describes when the daily job may run: the target
//! hour and minute, the tolerance window after that instant, the scheduler
//! lifetime, the execution budget, and the timezone in which the window and
//! the trading-day calendar are evaluated.

use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::calendar::is_trading_day;

/// How far `next_execution_after` scans before giving up.
///
/// Seven calendar days always cross at least one trading day in a
/// Monday–Friday calendar, so a longer horizon would never find anything
/// the shorter one missed.
const NEXT_EXECUTION_SCAN_DAYS: i64 = 7;

/// Errors that can occur when building a schedule configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Execution hour outside 0–23.
    #[error("invalid execution hour: {0} (expected 0-23)")]
    InvalidHour(u32),

    /// Execution minute outside 0–59.
    #[error("invalid execution minute: {0} (expected 0-59)")]
    InvalidMinute(u32),

    /// Window tolerance outside 1–60 minutes.
    #[error("invalid window tolerance: {0} minutes (expected 1-60)")]
    InvalidTolerance(u32),

    /// Zero maximum executions.
    #[error("max executions cannot be zero")]
    ZeroMaxExecutions,

    /// Zero or unrepresentable lifetime.
    #[error("invalid lifetime: {0:?}")]
    InvalidLifetime(Duration),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// What the scheduler does when a job execution fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Terminate the scheduler on the first failure (the default).
    #[default]
    FailFast,
    /// Log the failure and wait for the next trading day's window.
    ContinueNextWindow,
}

/// Immutable schedule configuration, created once at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Hour of the daily execution window (0-23).
    execution_hour: u32,
    /// Minute the window opens (0-59).
    execution_minute: u32,
    /// Minutes the window stays open after it opens.
    window_tolerance_minutes: u32,
    /// How long the scheduler lives, measured from its start instant.
    lifetime: Duration,
    /// Maximum number of successful executions.
    max_executions: u32,
    /// What to do when the job fails.
    failure_policy: FailurePolicy,
    /// Timezone in which the window and calendar are evaluated.
    timezone: Tz,
}

impl ScheduleConfig {
    /// Create a builder for a window opening at `hour:minute`.
    pub fn builder(hour: u32, minute: u32) -> ScheduleConfigBuilder {
        ScheduleConfigBuilder::new(hour, minute)
    }

    /// Hour of the execution window.
    pub fn execution_hour(&self) -> u32 {
        self.execution_hour
    }

    /// Minute the execution window opens.
    pub fn execution_minute(&self) -> u32 {
        self.execution_minute
    }

    /// Width of the execution window in minutes.
    pub fn window_tolerance_minutes(&self) -> u32 {
        self.window_tolerance_minutes
    }

    /// Scheduler lifetime.
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Maximum number of successful executions.
    pub fn max_executions(&self) -> u32 {
        self.max_executions
    }

    /// Failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Timezone the schedule is evaluated in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The date of `instant` in the schedule's timezone.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    /// Check whether `now` falls inside today's execution window.
    ///
    /// True iff today is a trading day, the hour matches, and the minute is
    /// within `[execution_minute, execution_minute + tolerance)`. The window
    /// never crosses the hour boundary: a window opening at :58 with a
    /// 5-minute tolerance closes at the top of the hour.
    pub fn should_execute_at(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        if !is_trading_day(local.date_naive()) {
            return false;
        }
        local.hour() == self.execution_hour
            && local.minute() >= self.execution_minute
            && local.minute() < self.execution_minute + self.window_tolerance_minutes
    }

    /// Find the next execution instant strictly after `from`'s date.
    ///
    /// Scans forward day by day, starting tomorrow, for at most seven
    /// calendar days, and returns the first trading day's window-opening
    /// instant that is not later than `end_time`. Returns `None` when the
    /// scan passes `end_time` or exhausts the horizon.
    pub fn next_execution_after(
        &self,
        from: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let start_date = self.local_date(from);
        for offset in 1..=NEXT_EXECUTION_SCAN_DAYS {
            let date = start_date + chrono::Duration::days(offset);
            if !is_trading_day(date) {
                continue;
            }
            let Some(at) = self.window_start_on(date) else {
                continue;
            };
            if at > end_time {
                return None;
            }
            return Some(at);
        }
        None
    }

    /// Time remaining until today's window opens, if it has not opened yet.
    ///
    /// Returns `None` once the window has opened (or on a day where the
    /// window instant does not exist, which only happens inside a DST gap).
    pub fn time_until_window(&self, now: DateTime<Utc>) -> Option<Duration> {
        let start = self.window_start_on(self.local_date(now))?;
        if now < start {
            (start - now).to_std().ok()
        } else {
            None
        }
    }

    /// The instant the window opens on `date`, in UTC.
    fn window_start_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let naive = date.and_hms_opt(self.execution_hour, self.execution_minute, 0)?;
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Builder for [`ScheduleConfig`].
///
/// Defaults match the production deployments this scheduler consolidates:
/// a 5-minute window, a 40-day lifetime, and a 30-execution budget.
pub struct ScheduleConfigBuilder {
    execution_hour: u32,
    execution_minute: u32,
    window_tolerance_minutes: u32,
    lifetime: Duration,
    max_executions: u32,
    failure_policy: FailurePolicy,
    timezone: String,
}

impl ScheduleConfigBuilder {
    /// Create a builder for a window opening at `hour:minute`.
    pub fn new(hour: u32, minute: u32) -> Self {
        Self {
            execution_hour: hour,
            execution_minute: minute,
            window_tolerance_minutes: 5,
            lifetime: Duration::from_secs(40 * 24 * 3600),
            max_executions: 30,
            failure_policy: FailurePolicy::default(),
            timezone: "UTC".to_string(),
        }
    }

    /// Set the window tolerance in minutes.
    pub fn tolerance_minutes(mut self, minutes: u32) -> Self {
        self.window_tolerance_minutes = minutes;
        self
    }

    /// Set the scheduler lifetime.
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the scheduler lifetime in whole days.
    pub fn lifetime_days(mut self, days: u32) -> Self {
        self.lifetime = Duration::from_secs(u64::from(days) * 24 * 3600);
        self
    }

    /// Set the maximum number of successful executions.
    pub fn max_executions(mut self, max: u32) -> Self {
        self.max_executions = max;
        self
    }

    /// Set the failure policy.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the timezone by IANA name (e.g. "Asia/Shanghai").
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<ScheduleConfig, ConfigError> {
        if self.execution_hour > 23 {
            return Err(ConfigError::InvalidHour(self.execution_hour));
        }
        if self.execution_minute > 59 {
            return Err(ConfigError::InvalidMinute(self.execution_minute));
        }
        if self.window_tolerance_minutes == 0 || self.window_tolerance_minutes > 60 {
            return Err(ConfigError::InvalidTolerance(self.window_tolerance_minutes));
        }
        if self.max_executions == 0 {
            return Err(ConfigError::ZeroMaxExecutions);
        }
        if self.lifetime.is_zero() || chrono::Duration::from_std(self.lifetime).is_err() {
            return Err(ConfigError::InvalidLifetime(self.lifetime));
        }
        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))?;

        Ok(ScheduleConfig {
            execution_hour: self.execution_hour,
            execution_minute: self.execution_minute,
            window_tolerance_minutes: self.window_tolerance_minutes,
            lifetime: self.lifetime,
            max_executions: self.max_executions,
            failure_policy: self.failure_policy,
            timezone,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ScheduleConfig {
        ScheduleConfig::builder(17, 10).build().unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let config = config();
        assert_eq!(config.execution_hour(), 17);
        assert_eq!(config.execution_minute(), 10);
        assert_eq!(config.window_tolerance_minutes(), 5);
        assert_eq!(config.max_executions(), 30);
        assert_eq!(config.failure_policy(), FailurePolicy::FailFast);
        assert_eq!(config.timezone(), chrono_tz::UTC);
        assert_eq!(config.lifetime(), Duration::from_secs(40 * 24 * 3600));
    }

    #[test]
    fn test_builder_rejects_invalid_hour() {
        let result = ScheduleConfig::builder(24, 0).build();
        assert!(matches!(result, Err(ConfigError::InvalidHour(24))));
    }

    #[test]
    fn test_builder_rejects_invalid_minute() {
        let result = ScheduleConfig::builder(17, 60).build();
        assert!(matches!(result, Err(ConfigError::InvalidMinute(60))));
    }

    #[test]
    fn test_builder_rejects_zero_tolerance() {
        let result = ScheduleConfig::builder(17, 10).tolerance_minutes(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidTolerance(0))));
    }

    #[test]
    fn test_builder_rejects_zero_max_executions() {
        let result = ScheduleConfig::builder(17, 10).max_executions(0).build();
        assert!(matches!(result, Err(ConfigError::ZeroMaxExecutions)));
    }

    #[test]
    fn test_builder_rejects_zero_lifetime() {
        let result = ScheduleConfig::builder(17, 10)
            .lifetime(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidLifetime(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_timezone() {
        let result = ScheduleConfig::builder(17, 10)
            .timezone("Invalid/Timezone")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidTimezone(_))));
    }

    #[test]
    fn test_window_boundaries() {
        let config = config();
        // 2024-03-04 is a Monday.
        assert!(!config.should_execute_at(utc(2024, 3, 4, 17, 9, 59)));
        assert!(config.should_execute_at(utc(2024, 3, 4, 17, 10, 0)));
        assert!(config.should_execute_at(utc(2024, 3, 4, 17, 12, 30)));
        assert!(config.should_execute_at(utc(2024, 3, 4, 17, 14, 59)));
        assert!(!config.should_execute_at(utc(2024, 3, 4, 17, 15, 0)));
    }

    #[test]
    fn test_window_requires_matching_hour() {
        let config = config();
        assert!(!config.should_execute_at(utc(2024, 3, 4, 16, 12, 0)));
        assert!(!config.should_execute_at(utc(2024, 3, 4, 18, 12, 0)));
    }

    #[test]
    fn test_window_closed_on_weekend() {
        let config = config();
        // Saturday and Sunday, inside the nominal window.
        assert!(!config.should_execute_at(utc(2024, 3, 9, 17, 12, 0)));
        assert!(!config.should_execute_at(utc(2024, 3, 10, 17, 12, 0)));
    }

    #[test]
    fn test_window_truncated_at_hour_boundary() {
        let config = ScheduleConfig::builder(17, 58)
            .tolerance_minutes(5)
            .build()
            .unwrap();
        assert!(config.should_execute_at(utc(2024, 3, 4, 17, 59, 0)));
        // 18:00 would be within 58 + 5 minutes, but the hour no longer matches.
        assert!(!config.should_execute_at(utc(2024, 3, 4, 18, 0, 0)));
    }

    #[test]
    fn test_window_in_configured_timezone() {
        let config = ScheduleConfig::builder(9, 30)
            .timezone("America/New_York")
            .build()
            .unwrap();
        // 2024-01-15 is a Monday; 14:32 UTC is 09:32 in New York (EST).
        assert!(config.should_execute_at(utc(2024, 1, 15, 14, 32, 0)));
        assert!(!config.should_execute_at(utc(2024, 1, 15, 9, 32, 0)));
    }

    #[test]
    fn test_next_execution_skips_weekend() {
        let config = config();
        let end = utc(2024, 12, 31, 0, 0, 0);
        // From Friday 2024-03-08 the next window is Monday 2024-03-11.
        let next = config
            .next_execution_after(utc(2024, 3, 8, 18, 0, 0), end)
            .unwrap();
        assert_eq!(next, utc(2024, 3, 11, 17, 10, 0));
    }

    #[test]
    fn test_next_execution_is_tomorrow_midweek() {
        let config = config();
        let end = utc(2024, 12, 31, 0, 0, 0);
        let next = config
            .next_execution_after(utc(2024, 3, 4, 17, 16, 0), end)
            .unwrap();
        assert_eq!(next, utc(2024, 3, 5, 17, 10, 0));
    }

    #[test]
    fn test_next_execution_respects_end_time() {
        let config = config();
        // End time before tomorrow's window: nothing qualifies.
        let next =
            config.next_execution_after(utc(2024, 3, 4, 17, 16, 0), utc(2024, 3, 5, 12, 0, 0));
        assert!(next.is_none());
    }

    #[test]
    fn test_next_execution_exactly_at_end_time_qualifies() {
        let config = config();
        let next =
            config.next_execution_after(utc(2024, 3, 4, 17, 16, 0), utc(2024, 3, 5, 17, 10, 0));
        assert_eq!(next, Some(utc(2024, 3, 5, 17, 10, 0)));
    }

    #[test]
    fn test_time_until_window_before_opening() {
        let config = config();
        let remaining = config.time_until_window(utc(2024, 3, 4, 8, 0, 0)).unwrap();
        assert_eq!(remaining, Duration::from_secs((9 * 60 + 10) * 60));
    }

    #[test]
    fn test_time_until_window_after_opening() {
        let config = config();
        assert!(config.time_until_window(utc(2024, 3, 4, 17, 10, 0)).is_none());
        assert!(config.time_until_window(utc(2024, 3, 4, 20, 0, 0)).is_none());
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = ScheduleConfig::builder(17, 10)
            .timezone("Asia/Shanghai")
            .max_executions(30)
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: ScheduleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.execution_hour(), 17);
        assert_eq!(back.timezone(), chrono_tz::Asia::Shanghai);
    }
}
