//! In-memory store.
//!
//! Backs tests and single-process runs. One mutex guards all tables, which
//! is what makes [`ScheduleStore::create_run_if_idle`] an atomic
//! check-and-insert.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{
    Execution, RunOutcome, RunStatus, Schedule, ScheduleRun, ScheduleStats, ScheduleStatus,
};
use super::{ExecutionStore, ScheduleStore, StoreError};

#[derive(Default)]
struct Tables {
    schedules: HashMap<Uuid, Schedule>,
    runs: HashMap<Uuid, ScheduleRun>,
    executions: HashMap<Uuid, Execution>,
}

/// Thread-safe in-memory implementation of both store traits.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn insert_pending_run(
    tables: &mut Tables,
    schedule_id: Uuid,
    scheduled_for: DateTime<Utc>,
) -> ScheduleRun {
    let run = ScheduleRun {
        id: Uuid::new_v4(),
        schedule_id,
        status: RunStatus::Pending,
        scheduled_for,
        started_at: None,
        finished_at: None,
        execution_id: None,
        reason: None,
    };
    tables.runs.insert(run.id, run.clone());
    run
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A poisoned lock still holds consistent data for our usage
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ScheduleStore for MemoryStore {
    fn create_schedule(&self, schedule: Schedule) -> Result<(), StoreError> {
        self.lock().schedules.insert(schedule.id, schedule);
        Ok(())
    }

    fn get_schedule(&self, id: Uuid) -> Result<Schedule, StoreError> {
        self.lock()
            .schedules
            .get(&id)
            .cloned()
            .ok_or(StoreError::ScheduleNotFound(id))
    }

    fn list_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let mut schedules: Vec<Schedule> = self.lock().schedules.values().cloned().collect();
        schedules.sort_by_key(|s| s.created_at);
        Ok(schedules)
    }

    fn update_schedule(&self, mut schedule: Schedule) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if !tables.schedules.contains_key(&schedule.id) {
            return Err(StoreError::ScheduleNotFound(schedule.id));
        }
        schedule.updated_at = Utc::now();
        tables.schedules.insert(schedule.id, schedule);
        Ok(())
    }

    fn delete_schedule(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.lock();
        tables
            .schedules
            .remove(&id)
            .ok_or(StoreError::ScheduleNotFound(id))?;
        tables.runs.retain(|_, run| run.schedule_id != id);
        Ok(())
    }

    fn set_schedule_status(&self, id: Uuid, status: ScheduleStatus) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let schedule = tables
            .schedules
            .get_mut(&id)
            .ok_or(StoreError::ScheduleNotFound(id))?;
        schedule.status = status;
        schedule.updated_at = Utc::now();
        Ok(())
    }

    fn set_next_run(&self, id: Uuid, at: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let schedule = tables
            .schedules
            .get_mut(&id)
            .ok_or(StoreError::ScheduleNotFound(id))?;
        schedule.next_run_at = at;
        Ok(())
    }

    fn create_run(
        &self,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<ScheduleRun, StoreError> {
        let mut tables = self.lock();
        if !tables.schedules.contains_key(&schedule_id) {
            return Err(StoreError::ScheduleNotFound(schedule_id));
        }
        Ok(insert_pending_run(&mut tables, schedule_id, scheduled_for))
    }

    fn create_run_if_idle(
        &self,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
    ) -> Result<Option<ScheduleRun>, StoreError> {
        let mut tables = self.lock();
        if !tables.schedules.contains_key(&schedule_id) {
            return Err(StoreError::ScheduleNotFound(schedule_id));
        }

        let busy = tables
            .runs
            .values()
            .any(|run| run.schedule_id == schedule_id && !run.status.is_terminal());
        if busy {
            return Ok(None);
        }

        Ok(Some(insert_pending_run(&mut tables, schedule_id, scheduled_for)))
    }

    fn mark_run_started(&self, run_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let run = tables
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;

        let now = Utc::now();
        run.status = RunStatus::Running;
        run.started_at = Some(now);

        let schedule_id = run.schedule_id;
        if let Some(schedule) = tables.schedules.get_mut(&schedule_id) {
            schedule.last_run_at = Some(now);
        }
        Ok(())
    }

    fn mark_run_completed(
        &self,
        run_id: Uuid,
        outcome: RunOutcome,
        execution_id: Option<Uuid>,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let run = tables
            .runs
            .get_mut(&run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;

        run.status = outcome.into();
        run.finished_at = Some(Utc::now());
        run.execution_id = execution_id;
        run.reason = error;
        Ok(())
    }

    fn record_skipped_run(
        &self,
        schedule_id: Uuid,
        scheduled_for: DateTime<Utc>,
        reason: &str,
    ) -> Result<ScheduleRun, StoreError> {
        let mut tables = self.lock();
        if !tables.schedules.contains_key(&schedule_id) {
            return Err(StoreError::ScheduleNotFound(schedule_id));
        }

        let now = Utc::now();
        let run = ScheduleRun {
            id: Uuid::new_v4(),
            schedule_id,
            status: RunStatus::Skipped,
            scheduled_for,
            started_at: Some(now),
            finished_at: Some(now),
            execution_id: None,
            reason: Some(reason.to_string()),
        };
        tables.runs.insert(run.id, run.clone());
        Ok(run)
    }

    fn list_runs(&self, schedule_id: Uuid, limit: usize) -> Result<Vec<ScheduleRun>, StoreError> {
        let mut runs: Vec<ScheduleRun> = self
            .lock()
            .runs
            .values()
            .filter(|run| run.schedule_id == schedule_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.scheduled_for.cmp(&a.scheduled_for));
        runs.truncate(limit);
        Ok(runs)
    }

    fn get_active_run(&self, schedule_id: Uuid) -> Result<Option<ScheduleRun>, StoreError> {
        Ok(self
            .lock()
            .runs
            .values()
            .find(|run| run.schedule_id == schedule_id && !run.status.is_terminal())
            .cloned())
    }

    fn run_stats(&self, schedule_id: Uuid) -> Result<ScheduleStats, StoreError> {
        let tables = self.lock();
        let mut stats = ScheduleStats::default();

        for run in tables.runs.values() {
            if run.schedule_id != schedule_id {
                continue;
            }
            stats.total += 1;
            match run.status {
                RunStatus::Success => stats.succeeded += 1,
                RunStatus::Failure => stats.failed += 1,
                RunStatus::Skipped => stats.skipped += 1,
                RunStatus::Pending | RunStatus::Running => {}
            }
        }
        Ok(stats)
    }
}

impl ExecutionStore for MemoryStore {
    fn create_execution(&self, execution: Execution) -> Result<(), StoreError> {
        self.lock().executions.insert(execution.id, execution);
        Ok(())
    }

    fn update_execution(&self, execution: Execution) -> Result<(), StoreError> {
        let mut tables = self.lock();
        if !tables.executions.contains_key(&execution.id) {
            return Err(StoreError::ExecutionNotFound(execution.id));
        }
        tables.executions.insert(execution.id, execution);
        Ok(())
    }

    fn get_execution(&self, id: Uuid) -> Result<Execution, StoreError> {
        self.lock()
            .executions
            .get(&id)
            .cloned()
            .ok_or(StoreError::ExecutionNotFound(id))
    }

    fn list_executions(&self, limit: usize) -> Result<Vec<Execution>, StoreError> {
        let mut executions: Vec<Execution> = self.lock().executions.values().cloned().collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        executions.truncate(limit);
        Ok(executions)
    }
}
