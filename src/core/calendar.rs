//! Trading-day calendar.
//!
//! A trading day is any Monday through Friday. Public holidays are not
//! consulted; this is a documented limitation of the calendar, not an
//! oversight to patch around elsewhere.

use chrono::{Datelike, NaiveDate, Weekday};

/// Check whether a date is a trading day (Monday–Friday).
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}
