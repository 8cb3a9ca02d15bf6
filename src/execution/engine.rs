//! Flow Execution Engine
//!
//! Orchestrates one flow execution from start to finish:
//! - Setup, main and teardown phases in order
//! - Teardown runs even when setup or main steps fail, and on cancellation
//! - Incremental persistence: the execution record is updated after every
//!   step, so observers can watch progress
//! - Pass/fail counters over main steps only

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::flow::{FlowDefinition, Step};
use crate::store::{Execution, ExecutionStatus, ExecutionStore, StepPhase, StepResult, StepStatus, StoreError};

use super::actions::ActionRegistry;
use super::context::VariableContext;
use super::step::execute_step;

/// Flow execution engine.
///
/// Holds the action registry and the execution store; each call to
/// [`Engine::execute`] runs one flow to completion.
///
/// # Example
///
/// ```rust,no_run
/// use std::collections::HashMap;
/// use std::sync::Arc;
/// use flowrunner::execution::{ActionRegistry, Engine};
/// use flowrunner::flow::load_flow;
/// use flowrunner::store::MemoryStore;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let flow = load_flow("checkout.yaml")?;
///     let engine = Engine::new(Arc::new(MemoryStore::new()), ActionRegistry::with_builtins());
///
///     let execution = engine
///         .execute(&flow, HashMap::new(), "manual", CancellationToken::new())
///         .await?;
///     println!("{}: {:?}", execution.flow_name, execution.status);
///     Ok(())
/// }
/// ```
pub struct Engine {
    store: Arc<dyn ExecutionStore>,
    registry: Arc<ActionRegistry>,
}

impl Engine {
    pub fn new(store: Arc<dyn ExecutionStore>, registry: ActionRegistry) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
        }
    }

    /// The action registry this engine dispatches through.
    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Runs a flow to completion and returns the final execution record.
    ///
    /// `variables` are caller-provided parameters; they win over the flow's
    /// `env` block on name collisions. `trigger` labels what started the
    /// run (e.g. "manual" or "schedule:<id>"). Cancelling the token stops
    /// the run after the current step; teardown still executes.
    ///
    /// The returned `Result` is only about persistence: a failed flow still
    /// comes back as `Ok` with a `Failed` status.
    pub async fn execute(
        &self,
        flow: &FlowDefinition,
        variables: HashMap<String, String>,
        trigger: &str,
        cancel: CancellationToken,
    ) -> Result<Execution, StoreError> {
        let mut execution = Execution::new(&flow.name, trigger, flow.steps.len());
        self.store.create_execution(execution.clone())?;

        info!(
            "Executing flow '{}' ({} setup, {} main, {} teardown steps)",
            flow.name,
            flow.setup.len(),
            flow.steps.len(),
            flow.teardown.len()
        );

        execution.status = ExecutionStatus::Running;
        self.store.update_execution(execution.clone())?;

        let mut ctx = VariableContext::new(&variables, &flow.env);
        let mut fatal_error: Option<String> = None;
        let mut cancelled = false;

        // Setup phase: first failure aborts the run
        for step in &flow.setup {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let result = self
                .run_step(&mut execution, step, StepPhase::Setup, &mut ctx, &cancel)
                .await?;

            if result.status == StepStatus::Failed && !step.continue_on_error {
                fatal_error = Some(phase_error(&result));
                break;
            }
        }

        // Main phase, skipped entirely when setup failed or was cancelled
        if fatal_error.is_none() && !cancelled {
            let mut aborted = false;
            for step in &flow.steps {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                if aborted {
                    self.record_skipped(&mut execution, step, StepPhase::Main)?;
                    continue;
                }

                let result = self
                    .run_step(&mut execution, step, StepPhase::Main, &mut ctx, &cancel)
                    .await?;

                match result.status {
                    StepStatus::Passed => execution.steps_passed += 1,
                    StepStatus::Failed => {
                        execution.steps_failed += 1;
                        if !step.continue_on_error {
                            fatal_error = Some(phase_error(&result));
                            aborted = true;
                        }
                    }
                    StepStatus::Skipped => {}
                }
                self.store.update_execution(execution.clone())?;
            }
        }

        // Teardown always runs; failures are recorded but don't stop it
        for step in &flow.teardown {
            let result = self
                .run_step(&mut execution, step, StepPhase::Teardown, &mut ctx, &cancel)
                .await?;

            if result.status == StepStatus::Failed && !step.continue_on_error {
                warn!("Teardown step '{}' failed", result.step_id);
                if fatal_error.is_none() && !cancelled {
                    fatal_error = Some(phase_error(&result));
                }
            }
        }

        execution.status = if cancelled || cancel.is_cancelled() {
            ExecutionStatus::Cancelled
        } else if fatal_error.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Passed
        };
        execution.error = fatal_error;
        execution.finished_at = Some(Utc::now());
        self.store.update_execution(execution.clone())?;

        match execution.status {
            ExecutionStatus::Passed => info!(
                "Flow '{}' passed ({}/{} steps)",
                flow.name, execution.steps_passed, execution.steps_total
            ),
            ExecutionStatus::Cancelled => warn!("Flow '{}' cancelled", flow.name),
            _ => error!(
                "Flow '{}' failed: {}",
                flow.name,
                execution.error.as_deref().unwrap_or("unknown error")
            ),
        }

        Ok(execution)
    }

    /// Runs one step, records its result, and feeds its output back into
    /// the interpolation context.
    async fn run_step(
        &self,
        execution: &mut Execution,
        step: &Step,
        phase: StepPhase,
        ctx: &mut VariableContext,
        cancel: &CancellationToken,
    ) -> Result<StepResult, StoreError> {
        // Teardown ignores cancellation so cleanup always completes
        let result = if phase == StepPhase::Teardown {
            execute_step(step, phase, ctx, &self.registry).await
        } else {
            tokio::select! {
                result = execute_step(step, phase, ctx, &self.registry) => result,
                _ = cancel.cancelled() => cancelled_result(step, phase),
            }
        };

        if result.status == StepStatus::Passed && !step.id.is_empty() {
            if let Some(output) = &result.output {
                ctx.set_step_output(&step.id, output.clone());

                // Declared extractions overlay friendly keys on the raw output
                for (key, path) in &step.output {
                    match ctx.step_output_path(&step.id, path).cloned() {
                        Some(value) => ctx.set_step_output_key(&step.id, key, value),
                        None => warn!(
                            "Step '{}': output path '{}' not found for key '{}'",
                            step.id, path, key
                        ),
                    }
                }
            }
        }

        execution.steps.push(result.clone());
        self.store.update_execution(execution.clone())?;
        Ok(result)
    }

    fn record_skipped(
        &self,
        execution: &mut Execution,
        step: &Step,
        phase: StepPhase,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        execution.steps.push(StepResult {
            step_id: step.id.clone(),
            name: step.name.clone(),
            phase,
            status: StepStatus::Skipped,
            attempts: 0,
            output: None,
            error: None,
            started_at: now,
            finished_at: now,
        });
        self.store.update_execution(execution.clone())
    }
}

fn phase_error(result: &StepResult) -> String {
    format!(
        "{} step '{}' failed: {}",
        result.phase,
        result.step_id,
        result.error.as_deref().unwrap_or("unknown error")
    )
}

fn cancelled_result(step: &Step, phase: StepPhase) -> StepResult {
    let now = Utc::now();
    StepResult {
        step_id: step.id.clone(),
        name: step.name.clone(),
        phase,
        status: StepStatus::Failed,
        attempts: 0,
        output: None,
        error: Some("cancelled".to_string()),
        started_at: now,
        finished_at: now,
    }
}
