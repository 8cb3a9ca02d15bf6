//! Scheduler
//!
//! Fires flows on cron schedules:
//!
//! - [`cron`]: expression parsing and next-fire computation
//! - [`Scheduler`]: the registration table and ticking loop
//!
//! Each schedule fires in its own timezone, records a [`ScheduleRun`] for
//! every firing, and never overlaps itself: while a run is pending or
//! running, due instants are recorded as skipped instead of started.

pub mod cron;

pub use cron::{common_presets, CronError, CronExpression, CronField};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::future::BoxFuture;
use log::{error, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::store::{RunOutcome, Schedule, ScheduleRun, ScheduleStatus, ScheduleStore, StoreError};

/// Reason recorded when a due instant is skipped by the overlap guard.
pub const SKIP_REASON_BUSY: &str = "Previous execution still running";

/// What an execution callback reports back when a fired flow finishes.
pub struct RunReport {
    pub execution_id: Option<Uuid>,
    pub outcome: RunOutcome,
    pub error: Option<String>,
}

impl RunReport {
    pub fn success(execution_id: Uuid) -> Self {
        Self {
            execution_id: Some(execution_id),
            outcome: RunOutcome::Success,
            error: None,
        }
    }

    pub fn failure(execution_id: Option<Uuid>, error: impl Into<String>) -> Self {
        Self {
            execution_id,
            outcome: RunOutcome::Failure,
            error: Some(error.into()),
        }
    }
}

/// Callback the scheduler invokes to actually run a schedule's flow.
///
/// Decouples the scheduler from flow loading and the engine: the embedding
/// application decides how a schedule's flow name maps to a definition.
pub type ExecutionFunc = Arc<dyn Fn(Schedule) -> BoxFuture<'static, RunReport> + Send + Sync>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Cron(#[from] CronError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One registered schedule: its parsed expression, resolved timezone and
/// the next instant it is due.
struct Job {
    expr: CronExpression,
    timezone: Tz,
    next_at: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<Uuid, Job>,
    running: bool,
}

/// Cron scheduler for flows.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use flowrunner::scheduler::{RunReport, Scheduler};
/// use flowrunner::store::{MemoryStore, Schedule};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = Arc::new(MemoryStore::new());
///     let scheduler = Arc::new(Scheduler::new(
///         store,
///         Arc::new(|schedule| {
///             Box::pin(async move {
///                 println!("would run flow '{}'", schedule.flow_name);
///                 RunReport::success(uuid::Uuid::new_v4())
///             })
///         }),
///     ));
///
///     scheduler.add(Schedule::new("nightly", "smoke", "0 2 * * *"))?;
///     scheduler.start();
///     Ok(())
/// }
/// ```
pub struct Scheduler {
    store: Arc<dyn ScheduleStore>,
    execute: ExecutionFunc,
    registry: Mutex<Registry>,
    shutdown: CancellationToken,
    tick: Duration,
}

impl Scheduler {
    pub fn new(store: Arc<dyn ScheduleStore>, execute: ExecutionFunc) -> Self {
        Self {
            store,
            execute,
            registry: Mutex::new(Registry::default()),
            shutdown: CancellationToken::new(),
            tick: Duration::from_secs(1),
        }
    }

    /// Overrides the tick interval. Mostly useful in tests.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers all active schedules from the store and starts the
    /// ticking loop. Idempotent: a no-op while already running. Returns
    /// immediately.
    pub fn start(self: &Arc<Self>) {
        {
            let mut registry = self.lock();
            if registry.running {
                return;
            }
            registry.running = true;
        }

        if let Err(e) = self.load() {
            error!("Failed to load schedules: {}", e);
        }

        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.tick);
            info!("Scheduler started (tick {:?})", scheduler.tick);
            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => {
                        info!("Scheduler stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = scheduler.check_due() {
                            error!("Scheduler tick failed: {}", e);
                        }
                    }
                }
            }
        });
    }

    /// Stops the ticking loop. In-flight executions are not interrupted.
    pub fn stop(&self) {
        self.lock().running = false;
        self.shutdown.cancel();
    }

    /// True while the ticking loop is active.
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Validates and persists a new schedule, registering it for firing
    /// when active.
    pub fn add(&self, schedule: Schedule) -> Result<(), SchedulerError> {
        let expr = CronExpression::parse(&schedule.cron_expr)?;
        self.store.create_schedule(schedule.clone())?;

        if schedule.status == ScheduleStatus::Active {
            self.register(&schedule, expr)?;
        }
        info!("Added schedule '{}' ({})", schedule.name, schedule.cron_expr);
        Ok(())
    }

    /// Replaces a schedule's definition, re-validating its expression and
    /// recomputing its next fire time.
    pub fn update(&self, schedule: Schedule) -> Result<(), SchedulerError> {
        let expr = CronExpression::parse(&schedule.cron_expr)?;
        self.store.update_schedule(schedule.clone())?;

        self.lock().jobs.remove(&schedule.id);
        if schedule.status == ScheduleStatus::Active {
            self.register(&schedule, expr)?;
        } else {
            self.store.set_next_run(schedule.id, None)?;
        }
        Ok(())
    }

    /// Unregisters and deletes a schedule along with its run history.
    pub fn remove(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.lock().jobs.remove(&id);
        self.store.delete_schedule(id)?;
        info!("Removed schedule {}", id);
        Ok(())
    }

    /// Pauses a schedule: it stops firing but stays registered in the
    /// store and can still be triggered manually.
    pub fn pause(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.store.set_schedule_status(id, ScheduleStatus::Paused)?;
        self.store.set_next_run(id, None)?;
        self.lock().jobs.remove(&id);
        info!("Paused schedule {}", id);
        Ok(())
    }

    /// Resumes a paused schedule from the current time; missed instants
    /// are not backfilled.
    pub fn resume(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.store.set_schedule_status(id, ScheduleStatus::Active)?;
        let schedule = self.store.get_schedule(id)?;
        let expr = CronExpression::parse(&schedule.cron_expr)?;
        self.register(&schedule, expr)?;
        info!("Resumed schedule '{}'", schedule.name);
        Ok(())
    }

    /// Fires a schedule immediately, regardless of its cron expression or
    /// paused state. The overlap guard still applies: returns the run that
    /// was recorded, which is skipped when a previous run is still going.
    pub fn trigger(&self, id: Uuid) -> Result<ScheduleRun, SchedulerError> {
        let schedule = self.store.get_schedule(id)?;
        self.fire(schedule, Utc::now())
    }

    pub fn is_registered(&self, id: Uuid) -> bool {
        self.lock().jobs.contains_key(&id)
    }

    pub fn registered_count(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Registers every active schedule found in the store.
    fn load(&self) -> Result<(), SchedulerError> {
        for schedule in self.store.list_schedules()? {
            if schedule.status != ScheduleStatus::Active {
                continue;
            }
            match CronExpression::parse(&schedule.cron_expr) {
                Ok(expr) => self.register(&schedule, expr)?,
                Err(e) => error!("Schedule '{}' has a bad expression: {}", schedule.name, e),
            }
        }
        Ok(())
    }

    fn register(&self, schedule: &Schedule, expr: CronExpression) -> Result<(), SchedulerError> {
        let timezone = resolve_timezone(&schedule.timezone, &schedule.name);
        let next_at = match next_fire(&expr, timezone, Utc::now()) {
            Some(next) => next,
            None => {
                warn!("Schedule '{}' has no future fire time", schedule.name);
                self.store.set_next_run(schedule.id, None)?;
                return Ok(());
            }
        };

        self.store.set_next_run(schedule.id, Some(next_at))?;
        self.lock().jobs.insert(
            schedule.id,
            Job {
                expr,
                timezone,
                next_at,
            },
        );
        Ok(())
    }

    /// Fires every due job and advances its next fire time.
    fn check_due(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();

        // Collect outside the lock so firing doesn't hold it
        let due: Vec<(Uuid, DateTime<Utc>)> = {
            let mut registry = self.lock();
            let mut due = Vec::new();
            for (id, job) in registry.jobs.iter_mut() {
                if job.next_at <= now {
                    due.push((*id, job.next_at));
                    if let Some(next) = next_fire(&job.expr, job.timezone, now) {
                        job.next_at = next;
                    }
                }
            }
            due
        };

        // One failing schedule must not stop the others from firing
        for (id, scheduled_for) in due {
            if let Err(e) = self.fire_due(id, scheduled_for) {
                error!("Schedule {} failed to fire: {}", id, e);
            }
        }
        Ok(())
    }

    fn fire_due(&self, id: Uuid, scheduled_for: DateTime<Utc>) -> Result<(), SchedulerError> {
        let schedule = self.store.get_schedule(id)?;
        if let Some(job) = self.lock().jobs.get(&id) {
            self.store.set_next_run(id, Some(job.next_at))?;
        }
        self.fire(schedule, scheduled_for)?;
        Ok(())
    }

    /// Starts (or skips) one run of a schedule. The execution itself is
    /// spawned and does not block the caller.
    fn fire(&self, schedule: Schedule, scheduled_for: DateTime<Utc>) -> Result<ScheduleRun, SchedulerError> {
        let run = if schedule.allow_overlap {
            self.store.create_run(schedule.id, scheduled_for)?
        } else {
            match self.store.create_run_if_idle(schedule.id, scheduled_for)? {
                Some(run) => run,
                None => {
                    warn!(
                        "Schedule '{}' skipped: previous run still in progress",
                        schedule.name
                    );
                    return Ok(self
                        .store
                        .record_skipped_run(schedule.id, scheduled_for, SKIP_REASON_BUSY)?);
                }
            }
        };

        info!("Schedule '{}' firing flow '{}'", schedule.name, schedule.flow_name);

        let store = self.store.clone();
        let execute = self.execute.clone();
        let run_id = run.id;
        let name = schedule.name.clone();
        tokio::spawn(async move {
            if let Err(e) = store.mark_run_started(run_id) {
                error!("Failed to mark run started for '{}': {}", name, e);
            }
            let report = (execute)(schedule).await;
            if let Some(e) = &report.error {
                warn!("Schedule '{}' run failed: {}", name, e);
            }
            if let Err(e) =
                store.mark_run_completed(run_id, report.outcome, report.execution_id, report.error)
            {
                error!("Failed to record run outcome for '{}': {}", name, e);
            }
        });

        Ok(run)
    }
}

/// Resolves an IANA timezone name, falling back to UTC when the name is
/// empty or unknown.
fn resolve_timezone(name: &str, schedule_name: &str) -> Tz {
    if name.is_empty() {
        return Tz::UTC;
    }
    match name.parse() {
        Ok(tz) => tz,
        Err(_) => {
            warn!(
                "Schedule '{}': unknown timezone '{}', falling back to UTC",
                schedule_name, name
            );
            Tz::UTC
        }
    }
}

/// Next fire instant after `now`, computed in the schedule's timezone and
/// returned in UTC.
fn next_fire(expr: &CronExpression, tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expr.next_after(&now.with_timezone(&tz))
        .map(|next| next.with_timezone(&Utc))
}

/// Previews the next `count` fire instants of an expression in a timezone,
/// without registering anything. Unknown timezones fall back to UTC.
pub fn next_run_times(
    expr: &str,
    timezone: &str,
    count: usize,
) -> Result<Vec<DateTime<Utc>>, CronError> {
    let expr = CronExpression::parse(expr)?;
    let tz = resolve_timezone(timezone, "(preview)");
    Ok(expr
        .next_run_times(&Utc::now().with_timezone(&tz), count)
        .into_iter()
        .map(|t| t.with_timezone(&Utc))
        .collect())
}
