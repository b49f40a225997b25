//! quotidien - run one job per trading day, for a bounded stretch of days.
//!
//! A [`Scheduler`] owns a single [`Job`] and invokes it at most once per
//! trading day (Monday–Friday), inside a narrow daily window such as
//! 17:10–17:15, until its lifetime or execution budget runs out. Every wait
//! polls a shutdown flag at one-second granularity, so SIGINT/SIGTERM stop
//! the process within a second, and the active log file rotates by day or
//! month while the process keeps running.
//!
//! ```no_run
//! use quotidien::{CommandJob, ScheduleConfig, Scheduler, ShutdownCoordinator};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScheduleConfig::builder(17, 10)
//!     .lifetime_days(40)
//!     .max_executions(30)
//!     .build()?;
//!
//! let job = CommandJob::builder("python3").arg("update.py").build();
//!
//! let coordinator = ShutdownCoordinator::new();
//! coordinator.install()?;
//!
//! let summary = Scheduler::new(config, Arc::new(job))
//!     .with_shutdown_flag(coordinator.flag())
//!     .run()
//!     .await;
//! println!("executed {} time(s)", summary.executions);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod core;
pub mod events;
pub mod execution;
pub mod logging;
pub mod pidfile;
pub mod scheduler;
pub mod shutdown;
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use core::calendar::is_trading_day;
pub use core::job::{Job, JobError};
pub use core::schedule::{ConfigError, FailurePolicy, ScheduleConfig, ScheduleConfigBuilder};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{CommandJob, CommandJobBuilder};
pub use logging::{LogRotator, RotatingWriter, Rotation, RotationPeriod};
pub use pidfile::PidFile;
pub use scheduler::{RunSummary, Scheduler, StopCause};
pub use shutdown::{ShutdownCoordinator, ShutdownFlag};
