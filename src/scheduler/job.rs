use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;

/// Work executed when a job fires; arguments are bound in the closure
pub type JobCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure as a [`JobCallback`]
pub fn callback<F, Fut>(f: F) -> JobCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trigger {
    /// Fires every `every` until removed; first at `start_at`, or one period
    /// after registration
    Interval {
        every: Duration,
        start_at: Option<DateTime<Utc>>,
    },

    /// Fires once, `delay` after `start_at` (registration time by default)
    Once {
        delay: Duration,
        start_at: Option<DateTime<Utc>>,
    },
}

impl Trigger {
    pub fn every(every: Duration) -> Self {
        Trigger::Interval {
            every,
            start_at: None,
        }
    }

    pub fn once_after(delay: Duration) -> Self {
        Trigger::Once {
            delay,
            start_at: None,
        }
    }

    pub fn is_recurring(&self) -> bool {
        matches!(self, Trigger::Interval { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its next fire time
    Scheduled,
    Running,

    /// One-shot job that has run; stays registered until removed
    Finished,
}

/// Snapshot of one registered job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub trigger: Trigger,
    pub status: JobStatus,

    /// `None` once a one-shot job has fired
    pub next_run_time: Option<DateTime<Utc>>,

    /// Completed and in-progress runs of this registration
    pub runs: u64,
}
