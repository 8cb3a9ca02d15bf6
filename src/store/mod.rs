//! Storage
//!
//! Trait-based persistence for schedules, run history and executions.
//! The in-memory implementation backs tests and single-process use; the
//! traits are the seam a database-backed store would implement.

pub mod memory;
pub mod model;

pub use memory::MemoryStore;
pub use model::{
    Execution, ExecutionStatus, RunOutcome, RunStatus, Schedule, ScheduleRun, ScheduleStats,
    ScheduleStatus, StepPhase, StepResult, StepStatus,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("schedule {0} not found")]
    ScheduleNotFound(Uuid),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),
}

/// Persistence operations for schedules and their run history.
pub trait ScheduleStore: Send + Sync {
    fn create_schedule(&self, schedule: Schedule) -> Result<(), StoreError>;
    fn get_schedule(&self, id: Uuid) -> Result<Schedule, StoreError>;
    fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError>;
    fn update_schedule(&self, schedule: Schedule) -> Result<(), StoreError>;
    fn delete_schedule(&self, id: Uuid) -> Result<(), StoreError>;

    fn set_schedule_status(&self, id: Uuid, status: ScheduleStatus) -> Result<(), StoreError>;

    /// Records the next instant the schedule is due to fire.
    fn set_next_run(&self, id: Uuid, at: Option<DateTime<Utc>>) -> Result<(), StoreError>;

    /// Creates a pending run unconditionally. Used for schedules that
    /// allow overlapping runs.
    fn create_run(
        &self,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<ScheduleRun, StoreError>;

    /// Atomically creates a pending run for a schedule, unless a
    /// non-terminal run already exists. Returns `None` when busy.
    ///
    /// This is the overlap guard: at most one run per schedule can be
    /// pending or running at any time.
    fn create_run_if_idle(
        &self,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<ScheduleRun>, StoreError>;

    /// Marks a pending run as running and stamps the schedule's
    /// last-run time.
    fn mark_run_started(&self, run_id: Uuid) -> Result<(), StoreError>;

    /// Records the terminal outcome of a run, attaching the execution it
    /// produced (when one was created) and any error.
    fn mark_run_completed(
        &self,
        run_id: Uuid,
        outcome: RunOutcome,
        execution_id: Option<Uuid>,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Records a run that was skipped instead of started, with the reason.
    fn record_skipped_run(
        &self,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
        reason: &str,
    ) -> Result<ScheduleRun, StoreError>;

    /// Most recent runs for a schedule, newest first.
    fn list_runs(&self, schedule_id: Uuid, limit: usize) -> Result<Vec<ScheduleRun>, StoreError>;

    /// The non-terminal run for a schedule, if any.
    fn get_active_run(&self, schedule_id: Uuid) -> Result<Option<ScheduleRun>, StoreError>;

    /// Aggregate counters over a schedule's run history.
    fn run_stats(&self, schedule_id: Uuid) -> Result<ScheduleStats, StoreError>;
}

/// Persistence operations for flow executions.
pub trait ExecutionStore: Send + Sync {
    fn create_execution(&self, execution: Execution) -> Result<(), StoreError>;

    /// Replaces the stored record. The engine calls this after every step,
    /// so observers see progress before the execution finishes.
    fn update_execution(&self, execution: Execution) -> Result<(), StoreError>;

    fn get_execution(&self, id: Uuid) -> Result<Execution, StoreError>;

    /// Most recent executions, newest first.
    fn list_executions(&self, limit: usize) -> Result<Vec<Execution>, StoreError>;
}
