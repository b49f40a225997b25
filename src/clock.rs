//! Clock abstraction.
//!
//! The scheduler reads time and sleeps exclusively through the [`Clock`]
//! trait, so the whole wait/execute loop can be driven on virtual time in
//! tests (see [`crate::testing::SimulatedClock`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of time for the scheduler.
#[async_trait]
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_clock_advances() {
        let clock = SystemClock;
        let before = clock.now();
        clock.sleep(Duration::from_millis(20)).await;
        let after = clock.now();
        assert!(after > before);
    }
}
