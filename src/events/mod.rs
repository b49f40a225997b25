//! Scheduler lifecycle events and event handling.
//!
//! This module provides event emission for the scheduler's wait/execute
//! cycle, enabling observability into executions, heartbeats, and log
//! rotations without coupling consumers to the engine.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Lifecycle events emitted while the scheduler runs.
///
/// Timestamps come from the scheduler's injected clock, so simulated runs
/// produce coherent event streams.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job execution is starting.
    ExecutionStarted {
        /// 1-based execution number.
        index: u32,
        /// Trading day the execution belongs to.
        date: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    /// A job execution completed successfully.
    ExecutionCompleted {
        /// 1-based execution number.
        index: u32,
        /// Trading day the execution belongs to.
        date: NaiveDate,
        duration: Duration,
        timestamp: DateTime<Utc>,
    },

    /// A job execution failed.
    ExecutionFailed {
        error: String,
        duration: Duration,
        timestamp: DateTime<Utc>,
    },

    /// Periodic progress report, emitted whether or not a job ran.
    Heartbeat {
        /// Successful executions so far.
        executions: u32,
        /// Execution budget.
        max_executions: u32,
        /// Time since the scheduler started.
        elapsed: Duration,
        /// Time until the lifetime expires.
        remaining: Duration,
        timestamp: DateTime<Utc>,
    },

    /// The active log file switched to a new period.
    LogRotated {
        /// Previous period key, `None` for the initial open.
        previous: Option<String>,
        /// New period key.
        current: String,
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::ExecutionStarted { timestamp, .. } => *timestamp,
            Event::ExecutionCompleted { timestamp, .. } => *timestamp,
            Event::ExecutionFailed { timestamp, .. } => *timestamp,
            Event::Heartbeat { timestamp, .. } => *timestamp,
            Event::LogRotated { timestamp, .. } => *timestamp,
        }
    }

    /// Create an ExecutionStarted event.
    pub fn execution_started(index: u32, date: NaiveDate, timestamp: DateTime<Utc>) -> Self {
        Event::ExecutionStarted {
            index,
            date,
            timestamp,
        }
    }

    /// Create an ExecutionCompleted event.
    pub fn execution_completed(
        index: u32,
        date: NaiveDate,
        duration: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Event::ExecutionCompleted {
            index,
            date,
            duration,
            timestamp,
        }
    }

    /// Create an ExecutionFailed event.
    pub fn execution_failed(
        error: impl Into<String>,
        duration: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Event::ExecutionFailed {
            error: error.into(),
            duration,
            timestamp,
        }
    }

    /// Create a Heartbeat event.
    pub fn heartbeat(
        executions: u32,
        max_executions: u32,
        elapsed: Duration,
        remaining: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Event::Heartbeat {
            executions,
            max_executions,
            elapsed,
            remaining,
            timestamp,
        }
    }

    /// Create a LogRotated event.
    pub fn log_rotated(
        previous: Option<String>,
        current: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Event::LogRotated {
            previous,
            current: current.into(),
            timestamp,
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
