//! Persistence Model
//!
//! Records tracked across runs: schedules, their run history, and flow
//! executions with per-step results. All timestamps are UTC.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flow::OutputData;

/// Lifecycle state of a schedule.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    /// Fires on its cron expression
    Active,
    /// Retained but not fired automatically; manual triggers still work
    Paused,
    /// Retained for history only
    Disabled,
}

/// A registered cron schedule for a flow.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Name of the flow this schedule runs
    pub flow_name: String,

    /// Cron expression (5 fields, optional seconds field, or @descriptor)
    pub cron_expr: String,

    /// IANA timezone name; empty means UTC
    #[serde(default)]
    pub timezone: String,

    /// Variables passed to every execution this schedule starts
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// When true, a due instant fires even while a previous run is still
    /// pending or running
    #[serde(default)]
    pub allow_overlap: bool,

    pub status: ScheduleStatus,

    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Creates an active schedule with fresh identity and timestamps.
    pub fn new(name: impl Into<String>, flow_name: impl Into<String>, cron_expr: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            flow_name: flow_name.into(),
            cron_expr: cron_expr.into(),
            timezone: String::new(),
            variables: HashMap::new(),
            allow_overlap: false,
            status: ScheduleStatus::Active,
            next_run_at: None,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// State of one scheduled run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failure,
    Skipped,
}

impl RunStatus {
    /// Pending and Running runs block a new run of the same schedule.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending | RunStatus::Running)
    }
}

/// Terminal outcome reported when a run's execution finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
}

impl From<RunOutcome> for RunStatus {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Success => RunStatus::Success,
            RunOutcome::Failure => RunStatus::Failure,
        }
    }
}

/// One firing of a schedule, successful or not.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScheduleRun {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub status: RunStatus,

    /// The cron instant this run was fired for
    pub scheduled_for: DateTime<Utc>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Execution this run produced, once known
    pub execution_id: Option<Uuid>,

    /// Failure or skip reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Aggregate run history for one schedule.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ScheduleStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// State of a flow execution.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Passed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// The phase a step ran in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    Setup,
    Main,
    Teardown,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StepPhase::Setup => "setup",
            StepPhase::Main => "main",
            StepPhase::Teardown => "teardown",
        };
        f.write_str(label)
    }
}

/// Outcome of one step.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
    /// Not run because an earlier step aborted the phase
    Skipped,
}

/// The recorded result of one step attempt sequence.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StepResult {
    pub step_id: String,
    pub name: String,
    pub phase: StepPhase,
    pub status: StepStatus,

    /// Attempts actually made (1 unless the step retried)
    pub attempts: u32,

    /// Output data the action produced, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One execution of a flow, with incremental per-step results.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Execution {
    pub id: Uuid,
    pub flow_name: String,
    pub status: ExecutionStatus,

    /// What started this execution (e.g. "manual", "schedule:<id>")
    #[serde(default)]
    pub trigger: String,

    /// Main-step counters; setup and teardown steps are excluded
    pub steps_total: usize,
    pub steps_passed: usize,
    pub steps_failed: usize,

    /// Results for all steps across phases, in execution order
    #[serde(default)]
    pub steps: Vec<StepResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Creates a pending execution for a flow with the given number of
    /// main steps.
    pub fn new(flow_name: impl Into<String>, trigger: impl Into<String>, steps_total: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow_name: flow_name.into(),
            status: ExecutionStatus::Pending,
            trigger: trigger.into(),
            steps_total,
            steps_passed: 0,
            steps_failed: 0,
            steps: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_terminality() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Success.is_terminal());
        assert!(RunStatus::Failure.is_terminal());
        assert!(RunStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_execution_status_terminality() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Passed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_schedule_defaults() {
        let schedule = Schedule::new("nightly", "checkout-smoke", "0 2 * * *");
        assert_eq!(schedule.status, ScheduleStatus::Active);
        assert!(!schedule.allow_overlap);
        assert!(schedule.timezone.is_empty());
        assert!(schedule.next_run_at.is_none());
    }

    #[test]
    fn test_run_outcome_conversion() {
        assert_eq!(RunStatus::from(RunOutcome::Success), RunStatus::Success);
        assert_eq!(RunStatus::from(RunOutcome::Failure), RunStatus::Failure);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ExecutionStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");

        let status: RunStatus = serde_json::from_str("\"skipped\"").unwrap();
        assert_eq!(status, RunStatus::Skipped);
    }
}
