//! The wait/execute loop that drives a job once per trading day.

mod engine;

pub use engine::{RunSummary, Scheduler, StopCause};
