//! Core domain types: the trading-day calendar, the schedule configuration
//! with its execution-window arithmetic, and the job trait.

pub mod calendar;
pub mod job;
pub mod schedule;
