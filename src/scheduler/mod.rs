//! Job scheduler
//!
//! Recurring and one-shot jobs keyed by id. Each registered job has a timer
//! task that waits for its fire time; every firing runs on its own task and
//! holds a permit of the shared worker pool plus the job's run lock, so
//! independent jobs overlap but a job id is never re-entered while a previous
//! firing is still running (a later recurring firing is skipped, a one-shot
//! firing waits).
//!
//! One scheduler is built at startup and its handle cloned into every
//! component that adds or removes jobs.

pub mod job;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

pub use job::{JobCallback, JobInfo, JobStatus, Trigger, callback};

/// Worker pool size used by [`Scheduler::default`]
pub const DEFAULT_WORKERS: usize = 10;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job {0}: interval must be greater than zero")]
    ZeroInterval(String),

    #[error("job {0}: trigger period out of range")]
    OutOfRange(String),
}

struct JobEntry {
    trigger: Trigger,
    callback: JobCallback,
    generation: u64,
    period: Option<TimeDelta>,
    next_run_time: Option<DateTime<Utc>>,
    status: JobStatus,
    runs: u64,
    timer: JoinHandle<()>,
}

impl JobEntry {
    fn info(&self, id: &str) -> JobInfo {
        JobInfo {
            id: id.to_string(),
            trigger: self.trigger,
            status: self.status,
            next_run_time: self.next_run_time,
            runs: self.runs,
        }
    }
}

#[derive(Default)]
struct State {
    jobs: HashMap<String, JobEntry>,
    run_locks: HashMap<String, Arc<AsyncMutex<()>>>,
    next_generation: u64,
}

struct Inner {
    state: Mutex<State>,
    workers: Arc<Semaphore>,
    started: watch::Sender<bool>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        // a panic while holding the lock cannot leave the maps half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Cloneable scheduler handle
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl Scheduler {
    /// Scheduler with a pool of `workers` concurrent job runs
    ///
    /// Nothing fires before [`initiate`](Self::initiate).
    pub fn new(workers: usize) -> Self {
        let (started, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                workers: Arc::new(Semaphore::new(workers.max(1))),
                started,
            }),
        }
    }

    /// Starts firing jobs; returns `false` if already started
    pub fn initiate(&self) -> bool {
        let was_started = self.inner.started.send_replace(true);
        if was_started {
            debug!("scheduler already started");
        } else {
            info!(jobs = self.len(), "scheduler started");
        }
        !was_started
    }

    pub fn is_started(&self) -> bool {
        *self.inner.started.borrow()
    }

    /// Registers `callback` under `id`, replacing any job with that id
    #[instrument(skip_all, fields(job_id = %id))]
    pub fn add_job(
        &self,
        id: &str,
        trigger: Trigger,
        callback: JobCallback,
    ) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let out_of_range = || SchedulerError::OutOfRange(id.to_string());
        let (period, first_run) = match trigger {
            Trigger::Interval { every, start_at } => {
                if every.is_zero() {
                    return Err(SchedulerError::ZeroInterval(id.to_string()));
                }
                let period = TimeDelta::from_std(every).map_err(|_| out_of_range())?;
                let first_run = match start_at {
                    Some(start_at) => start_at,
                    None => now.checked_add_signed(period).ok_or_else(out_of_range)?,
                };
                // the following run must be representable too
                first_run.checked_add_signed(period).ok_or_else(out_of_range)?;
                (Some(period), first_run)
            }
            Trigger::Once { delay, start_at } => {
                let delay = TimeDelta::from_std(delay).map_err(|_| out_of_range())?;
                let first_run = start_at
                    .unwrap_or(now)
                    .checked_add_signed(delay)
                    .ok_or_else(out_of_range)?;
                (None, first_run)
            }
        };

        let mut state = self.inner.state();
        state.next_generation += 1;
        let generation = state.next_generation;

        let timer = tokio::spawn(drive(
            Arc::downgrade(&self.inner),
            self.inner.started.subscribe(),
            id.to_string(),
            generation,
        ));
        state
            .run_locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())));

        let replaced = state.jobs.insert(
            id.to_string(),
            JobEntry {
                trigger,
                callback,
                generation,
                period,
                next_run_time: Some(first_run),
                status: JobStatus::Scheduled,
                runs: 0,
                timer,
            },
        );

        match replaced {
            Some(old) => {
                old.timer.abort();
                debug!(next_run_time = %first_run, "job replaced");
            }
            None => debug!(next_run_time = %first_run, "job added"),
        }
        Ok(())
    }

    /// Cancels a job; unknown ids are ignored
    ///
    /// A firing already in progress is not interrupted.
    pub fn remove_job(&self, id: &str) -> bool {
        let mut state = self.inner.state();
        let Some(entry) = state.jobs.remove(id) else {
            trace!(job_id = id, "remove_job: no such job");
            return false;
        };
        entry.timer.abort();

        if state
            .run_locks
            .get(id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            state.run_locks.remove(id);
        }
        debug!(job_id = id, "job removed");
        true
    }

    pub fn get_job(&self, id: &str) -> Option<JobInfo> {
        self.inner.state().jobs.get(id).map(|entry| entry.info(id))
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        let state = self.inner.state();
        let mut jobs: Vec<_> = state.jobs.iter().map(|(id, entry)| entry.info(id)).collect();
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    pub fn len(&self) -> usize {
        self.inner.state().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every job and stops firing
    ///
    /// Firings already in progress run to completion.
    pub fn shutdown(&self) {
        self.inner.started.send_replace(false);
        let mut state = self.inner.state();
        for (_, entry) in state.jobs.drain() {
            entry.timer.abort();
        }
        state.run_locks.clear();
        info!("scheduler shut down");
    }
}

/// Timer loop of one job registration
async fn drive(inner: Weak<Inner>, mut started: watch::Receiver<bool>, id: String, generation: u64) {
    if started.wait_for(|started| *started).await.is_err() {
        return;
    }

    loop {
        let next = {
            let Some(inner) = inner.upgrade() else { return };
            let state = inner.state();
            let next = match state.jobs.get(&id) {
                Some(entry) if entry.generation == generation => entry.next_run_time,
                _ => return,
            };
            next
        };
        let Some(next) = next else { return };

        if let Ok(wait) = (next - Utc::now()).to_std() {
            tokio::time::sleep(wait).await;
        }

        let Some(inner) = inner.upgrade() else { return };
        let (callback, run_lock, recurring) = {
            let mut state = inner.state();
            let run_lock = state.run_locks.get(&id).cloned();
            let Some(entry) = state.jobs.get_mut(&id).filter(|e| e.generation == generation) else {
                return;
            };

            entry.next_run_time = entry.period.and_then(|period| {
                let now = Utc::now();
                match next.checked_add_signed(period) {
                    Some(following) if following > now => Some(following),
                    _ => now.checked_add_signed(period),
                }
            });
            if entry.period.is_some() && entry.next_run_time.is_none() {
                error!(job_id = %id, "next run time out of range, job stops firing");
            }
            (entry.callback.clone(), run_lock, entry.period.is_some())
        };

        if let Some(run_lock) = run_lock {
            tokio::spawn(run(inner.clone(), id.clone(), generation, callback, run_lock, recurring));
        }

        if !recurring {
            return;
        }
    }
}

/// One firing: takes the run lock and a worker permit, then runs the callback
///
/// A recurring firing that finds the previous run still in progress is
/// skipped; the next period covers it. A one-shot firing has no next period,
/// so it waits for the lock instead.
async fn run(
    inner: Arc<Inner>,
    id: String,
    generation: u64,
    callback: JobCallback,
    run_lock: Arc<AsyncMutex<()>>,
    recurring: bool,
) {
    let guard = match run_lock.clone().try_lock_owned() {
        Ok(guard) => guard,
        Err(_) if recurring => {
            warn!(job_id = %id, "previous run still in progress, skipping");
            return;
        }
        Err(_) => {
            debug!(job_id = %id, "previous run still in progress, waiting");
            run_lock.clone().lock_owned().await
        }
    };
    let Ok(_permit) = inner.workers.clone().acquire_owned().await else {
        return;
    };

    // removed or replaced while waiting
    let current = update(&inner, &id, generation, |entry| {
        entry.status = JobStatus::Running;
        entry.runs += 1;
    });
    if !current {
        trace!(job_id = %id, "job no longer registered, firing dropped");
        drop(guard);
        release_run_lock(&inner, &id, &run_lock);
        return;
    }
    trace!(job_id = %id, "job running");

    // run on its own task so a panicking callback only loses this firing
    if let Err(e) = tokio::spawn(callback()).await {
        error!(job_id = %id, "job failed: {e}");
    }

    update(&inner, &id, generation, |entry| {
        entry.status = if entry.trigger.is_recurring() {
            JobStatus::Scheduled
        } else {
            JobStatus::Finished
        };
    });

    drop(guard);
    release_run_lock(&inner, &id, &run_lock);
}

/// Drops the run lock of a job removed while it was running
fn release_run_lock(inner: &Inner, id: &str, run_lock: &Arc<AsyncMutex<()>>) {
    let mut state = inner.state();
    if state.jobs.contains_key(id) {
        return;
    }
    // one reference in the map, one held by the caller
    if state
        .run_locks
        .get(id)
        .is_some_and(|lock| Arc::ptr_eq(lock, run_lock) && Arc::strong_count(lock) == 2)
    {
        state.run_locks.remove(id);
    }
}

/// Applies `f` if `id` is still registered under `generation`
fn update(inner: &Inner, id: &str, generation: u64, f: impl FnOnce(&mut JobEntry)) -> bool {
    let mut state = inner.state();
    match state.jobs.get_mut(id).filter(|e| e.generation == generation) {
        Some(entry) => {
            f(entry);
            true
        }
        None => false,
    }
}
