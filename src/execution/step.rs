//! Step Executor
//!
//! Runs a single step: interpolates its configuration, dispatches to the
//! action handler, applies the per-attempt timeout, retries per the step's
//! retry policy, and evaluates assertions against the action output.
//!
//! Assertions are evaluated inside the attempt loop, so a retrying step can
//! wait out eventually-consistent state (e.g. polling until a resource
//! appears).

use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};

use super::actions::ActionRegistry;
use super::assertions::Evaluator;
use super::context::VariableContext;
use super::interpolate::{interpolate, interpolate_value};
use crate::flow::{parse_duration, OutputData, RetryBackoff, Step};
use crate::store::{StepPhase, StepResult, StepStatus};

/// Runs one step to completion and records the outcome.
///
/// Never returns an error: failure is captured in the result's status so
/// the engine can apply phase semantics (`continue_on_error`, teardown
/// tolerance) uniformly.
pub async fn execute_step(
    step: &Step,
    phase: StepPhase,
    ctx: &VariableContext,
    registry: &ActionRegistry,
) -> StepResult {
    let started_at = Utc::now();
    let step_id = display_id(step);

    let mut result = StepResult {
        step_id: step_id.clone(),
        name: interpolate(&step.name, ctx),
        phase,
        status: StepStatus::Failed,
        attempts: 0,
        output: None,
        error: None,
        started_at,
        finished_at: started_at,
    };

    let kind = step.action.handler_key();
    let handler = match registry.get(kind) {
        Some(handler) => handler,
        None => {
            result.error = Some(format!("no handler registered for action '{}'", kind));
            result.finished_at = Utc::now();
            return result;
        }
    };

    let timeout = match step.timeout.as_deref().map(parse_duration).transpose() {
        Ok(timeout) => timeout,
        Err(e) => {
            result.error = Some(format!("invalid timeout: {}", e));
            result.finished_at = Utc::now();
            return result;
        }
    };

    let (max_attempts, base_delay, backoff) = match retry_parameters(step) {
        Ok(params) => params,
        Err(e) => {
            result.error = Some(e);
            result.finished_at = Utc::now();
            return result;
        }
    };

    let config = interpolate_value(&step.action.config_value(), ctx);

    let mut last_error = String::new();
    for attempt in 1..=max_attempts {
        result.attempts = attempt;

        if attempt > 1 {
            let delay = delay_for_attempt(base_delay, backoff, attempt);
            debug!(
                "Step '{}' attempt {}/{} after {:?}",
                step_id, attempt, max_attempts, delay
            );
            tokio::time::sleep(delay).await;
        }

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, handler.execute(config.clone())).await
            {
                Ok(outcome) => outcome.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {:?}", limit)),
            },
            None => handler.execute(config.clone()).await.map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(output) => match check_assertions(step, &output) {
                Ok(()) => {
                    result.status = StepStatus::Passed;
                    result.output = Some(output);
                    result.finished_at = Utc::now();
                    return result;
                }
                Err(e) => {
                    // Keep the output that failed assertions for diagnostics
                    result.output = Some(output);
                    last_error = e;
                }
            },
            Err(e) => last_error = e,
        }

        if attempt < max_attempts {
            warn!(
                "Step '{}' attempt {}/{} failed: {}",
                step_id, attempt, max_attempts, last_error
            );
        }
    }

    result.error = Some(if max_attempts > 1 {
        format!("after {} attempts: {}", max_attempts, last_error)
    } else {
        last_error
    });
    result.finished_at = Utc::now();
    result
}

/// Step id used for reporting; anonymous steps get a positional fallback
/// from the engine, but a lone step run outside a flow still needs a label.
fn display_id(step: &Step) -> String {
    if step.id.is_empty() {
        format!("({})", step.action.handler_key())
    } else {
        step.id.clone()
    }
}

fn retry_parameters(step: &Step) -> Result<(u32, Duration, RetryBackoff), String> {
    let Some(retry) = &step.retry else {
        return Ok((1, Duration::ZERO, RetryBackoff::Fixed));
    };

    let delay = match &retry.delay {
        Some(delay) => parse_duration(delay).map_err(|e| format!("invalid retry delay: {}", e))?,
        None => Duration::ZERO,
    };

    Ok((retry.max_attempts.max(1), delay, retry.backoff))
}

/// Wait before the given attempt (attempt numbering starts at 1; the first
/// retry is attempt 2 and waits the base delay).
fn delay_for_attempt(base: Duration, backoff: RetryBackoff, attempt: u32) -> Duration {
    match backoff {
        RetryBackoff::Fixed => base,
        RetryBackoff::Exponential => base.saturating_mul(1u32 << (attempt - 2).min(16)),
    }
}

fn check_assertions(step: &Step, output: &OutputData) -> Result<(), String> {
    Evaluator::new(output)
        .evaluate_all(&step.assertions)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::actions::{ActionError, ActionHandler};
    use crate::flow::{Action, DelayConfig, LogConfig, PluginConfig, RetryPolicy};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails a fixed number of times before succeeding.
    struct FlakyHandler {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ActionHandler for FlakyHandler {
        async fn execute(&self, _config: Value) -> Result<OutputData, ActionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(ActionError::failed(format!("transient error {}", call)));
            }
            let mut output = OutputData::new();
            output.insert("call".to_string(), json!(call));
            Ok(output)
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl ActionHandler for SlowHandler {
        async fn execute(&self, _config: Value) -> Result<OutputData, ActionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(OutputData::new())
        }
    }

    fn plugin_step(id: &str, kind: &str) -> Step {
        Step::new(
            id,
            Action::Plugin(PluginConfig {
                kind: kind.to_string(),
                params: Value::Null,
            }),
        )
    }

    fn registry_with(kind: &str, handler: Arc<dyn ActionHandler>) -> ActionRegistry {
        let mut registry = ActionRegistry::with_builtins();
        registry.register(kind, handler);
        registry
    }

    #[tokio::test]
    async fn test_successful_step() {
        let step = Step::new(
            "note",
            Action::Log(LogConfig {
                message: "hello".to_string(),
                level: None,
            }),
        );
        let ctx = VariableContext::default();
        let registry = ActionRegistry::with_builtins();

        let result = execute_step(&step, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Passed);
        assert_eq!(result.attempts, 1);
        assert!(result.output.is_some());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_missing_handler_fails() {
        let step = plugin_step("p", "kafka.produce");
        let ctx = VariableContext::default();
        let registry = ActionRegistry::with_builtins();

        let result = execute_step(&step, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.error.unwrap().contains("kafka.produce"));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = registry_with(
            "flaky",
            Arc::new(FlakyHandler {
                failures: 2,
                calls: calls.clone(),
            }),
        );
        let step = plugin_step("poll", "flaky").with_retry(RetryPolicy::fixed(3, "5ms"));
        let ctx = VariableContext::default();

        let result = execute_step(&step, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Passed);
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = registry_with(
            "flaky",
            Arc::new(FlakyHandler {
                failures: 10,
                calls: calls.clone(),
            }),
        );
        let step = plugin_step("poll", "flaky").with_retry(RetryPolicy::fixed(3, "1ms"));
        let ctx = VariableContext::default();

        let result = execute_step(&step, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(result.error.unwrap().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = registry_with(
            "flaky",
            Arc::new(FlakyHandler {
                failures: 10,
                calls: calls.clone(),
            }),
        );
        let step = plugin_step("once", "flaky");
        let ctx = VariableContext::default();

        let result = execute_step(&step, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_bounds_each_attempt() {
        let registry = registry_with("slow", Arc::new(SlowHandler));
        let step = plugin_step("s", "slow").with_timeout("20ms");
        let ctx = VariableContext::default();

        let result = execute_step(&step, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Failed);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_assertions_checked_against_output() {
        let calls = Arc::new(AtomicU32::new(0));
        let registry = registry_with("counter", Arc::new(FlakyHandler { failures: 0, calls }));

        let passing = plugin_step("c", "counter").with_assertion("call == 1");
        let ctx = VariableContext::default();
        let result = execute_step(&passing, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Passed);
    }

    #[tokio::test]
    async fn test_assertion_failure_retries() {
        // Output `call` increments per attempt; assertion passes on the third
        let calls = Arc::new(AtomicU32::new(0));
        let registry = registry_with("counter", Arc::new(FlakyHandler { failures: 0, calls }));

        let step = plugin_step("c", "counter")
            .with_assertion("call == 3")
            .with_retry(RetryPolicy::fixed(5, "1ms"));
        let ctx = VariableContext::default();

        let result = execute_step(&step, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Passed);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_config_interpolated_before_dispatch() {
        let mut ctx = VariableContext::default();
        ctx.set("WAIT", "1ms");

        let step = Step::new(
            "wait",
            Action::Delay(DelayConfig {
                duration: "${WAIT}".to_string(),
            }),
        );
        let registry = ActionRegistry::with_builtins();

        let result = execute_step(&step, StepPhase::Main, &ctx, &registry).await;
        assert_eq!(result.status, StepStatus::Passed);
    }

    #[test]
    fn test_exponential_delay_progression() {
        let base = Duration::from_millis(100);
        assert_eq!(
            delay_for_attempt(base, RetryBackoff::Exponential, 2),
            Duration::from_millis(100)
        );
        assert_eq!(
            delay_for_attempt(base, RetryBackoff::Exponential, 3),
            Duration::from_millis(200)
        );
        assert_eq!(
            delay_for_attempt(base, RetryBackoff::Exponential, 4),
            Duration::from_millis(400)
        );
        assert_eq!(
            delay_for_attempt(base, RetryBackoff::Fixed, 4),
            Duration::from_millis(100)
        );
    }
}
