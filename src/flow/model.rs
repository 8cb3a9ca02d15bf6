//! Flow Data Model
//!
//! Core data structures representing test flows and their steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! flow:
//!   name: checkout-smoke
//!   env:
//!     BASE_URL: https://staging.example.com
//!   steps:
//!     - id: create_user
//!       action: http_request
//!       config:
//!         method: POST
//!         url: ${BASE_URL}/users
//!         body:
//!           email: user-${RANDOM_ID}@example.com
//!       output:
//!         user_id: body.id
//!
//!     - id: fetch_user
//!       action: http_request
//!       config:
//!         method: GET
//!         url: ${BASE_URL}/users/${create_user.user_id}
//!       assertions:
//!         - status == 200
//!       retry:
//!         max_attempts: 3
//!         delay: 500ms
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output data captured from a step, consumable by later steps.
pub type OutputData = serde_json::Map<String, Value>;

/// A complete flow definition: setup, main and teardown steps plus metadata.
///
/// This is an immutable snapshot consumed by one execution. The engine
/// never mutates it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FlowDefinition {
    /// Human-readable flow name
    pub name: String,

    /// Optional description of what the flow verifies
    #[serde(default)]
    pub description: String,

    /// Free-form tags for filtering and reporting
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Flow-scoped variables, available to interpolation in every step
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Steps executed before the main steps; a failure here aborts the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<Step>,

    /// Main steps, executed in order
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Steps that always run after the main steps, even on failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<Step>,
}

impl FlowDefinition {
    /// Creates an empty flow with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tags: Vec::new(),
            env: HashMap::new(),
            setup: Vec::new(),
            steps: Vec::new(),
            teardown: Vec::new(),
        }
    }

    /// Total number of steps across all phases.
    pub fn total_steps(&self) -> usize {
        self.setup.len() + self.steps.len() + self.teardown.len()
    }
}

/// A single step within a flow.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Step {
    /// Unique identifier, used as the namespace for output references
    #[serde(default)]
    pub id: String,

    /// Human-readable name for reporting
    #[serde(default)]
    pub name: String,

    /// The action this step performs, with its kind-specific configuration
    #[serde(flatten)]
    pub action: Action,

    /// Assertions evaluated against the action output (e.g. `status == 200`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<String>,

    /// Named output extraction: friendly key -> dot path into the result
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output: HashMap<String, String>,

    /// Retry policy applied when the action fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Timeout bounding a single attempt (e.g. "30s"), not the retry sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// When true, a failure of this step does not abort the owning run
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Step {
    /// Creates a new step with the given id and action.
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: id.into().trim().to_string(),
            name: String::new(),
            action,
            assertions: Vec::new(),
            output: HashMap::new(),
            retry: None,
            timeout: None,
            continue_on_error: false,
        }
    }

    /// Sets the human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Adds an assertion expression.
    pub fn with_assertion(mut self, expr: impl Into<String>) -> Self {
        self.assertions.push(expr.into());
        self
    }

    /// Declares an output extraction (friendly key -> dot path).
    pub fn with_output(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.output.insert(key.into(), path.into());
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// Marks the step as tolerated on failure.
    pub fn tolerate_failure(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// The action a step performs.
///
/// Serialized adjacently tagged so the YAML keeps the `action:` / `config:`
/// shape while the Rust side gets a closed set of typed payloads. Plugin
/// actions carry their own kind name and dispatch by it.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "action", content = "config", rename_all = "snake_case")]
pub enum Action {
    HttpRequest(HttpConfig),
    Delay(DelayConfig),
    Assert(AssertConfig),
    Log(LogConfig),
    Plugin(PluginConfig),
}

impl Action {
    /// The registry key this action dispatches under.
    ///
    /// Built-in kinds use their tag name; plugin actions dispatch by the
    /// plugin kind they name (e.g. "kafka.produce").
    pub fn handler_key(&self) -> &str {
        match self {
            Action::HttpRequest(_) => "http_request",
            Action::Delay(_) => "delay",
            Action::Assert(_) => "assert",
            Action::Log(_) => "log",
            Action::Plugin(config) => &config.kind,
        }
    }

    /// Serializes the kind-specific configuration payload.
    pub fn config_value(&self) -> Value {
        let result = match self {
            Action::HttpRequest(c) => serde_json::to_value(c),
            Action::Delay(c) => serde_json::to_value(c),
            Action::Assert(c) => serde_json::to_value(c),
            Action::Log(c) => serde_json::to_value(c),
            Action::Plugin(c) => serde_json::to_value(c),
        };
        result.unwrap_or(Value::Null)
    }
}

/// Configuration for an HTTP request action.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpConfig {
    /// HTTP method (GET, POST, ...)
    pub method: String,

    /// Target URL, interpolated before dispatch
    pub url: String,

    /// Request headers
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// JSON request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Configuration for a delay action.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DelayConfig {
    /// How long to wait, as a duration string (e.g. "100ms", "2s", "1m")
    pub duration: String,
}

/// Configuration for a standalone assertion action.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AssertConfig {
    /// Data to assert against (usually an interpolated step reference)
    pub data: Value,

    /// Assertion expressions evaluated against `data`
    #[serde(default)]
    pub assertions: Vec<String>,
}

/// Configuration for a log action.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogConfig {
    /// Message to log, interpolated before emission
    pub message: String,

    /// Log level: "debug", "info" (default), "warn" or "error"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Configuration for a custom plugin action.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PluginConfig {
    /// Plugin kind name, also the dispatch key (e.g. "kafka.produce")
    pub kind: String,

    /// Kind-specific parameters passed through to the plugin handler
    #[serde(default)]
    pub params: Value,
}

/// Retry behavior for a step.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (minimum 1)
    pub max_attempts: u32,

    /// Wait between attempts, as a duration string (e.g. "500ms")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<String>,

    /// Backoff strategy applied to the delay between attempts
    #[serde(default)]
    pub backoff: RetryBackoff,
}

impl RetryPolicy {
    /// Creates a fixed-delay policy.
    pub fn fixed(max_attempts: u32, delay: impl Into<String>) -> Self {
        Self {
            max_attempts,
            delay: Some(delay.into()),
            backoff: RetryBackoff::Fixed,
        }
    }

    /// Creates an exponential-backoff policy.
    pub fn exponential(max_attempts: u32, delay: impl Into<String>) -> Self {
        Self {
            max_attempts,
            delay: Some(delay.into()),
            backoff: RetryBackoff::Exponential,
        }
    }
}

/// Backoff strategy between retry attempts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryBackoff {
    #[default]
    Fixed,
    Exponential,
}

/// Parses a duration string of the form `<number><unit>`.
///
/// Supported units: `ms`, `s`, `m`, `h`. Mirrors the subset of Go-style
/// duration strings the flow format accepts.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{}' is missing a unit (ms, s, m, h)", s))?;

    let (value, unit) = s.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration value in '{}'", s))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("unknown duration unit '{}' in '{}'", unit, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_step(id: &str) -> Step {
        Step::new(
            id,
            Action::Log(LogConfig {
                message: "hello".to_string(),
                level: None,
            }),
        )
    }

    #[test]
    fn test_step_creation() {
        let step = log_step("greet")
            .with_name("Greeting")
            .with_retry(RetryPolicy::fixed(3, "10ms"))
            .with_timeout("5s");

        assert_eq!(step.id, "greet");
        assert_eq!(step.name, "Greeting");
        assert_eq!(step.retry.as_ref().unwrap().max_attempts, 3);
        assert_eq!(step.timeout.as_deref(), Some("5s"));
        assert!(!step.continue_on_error);
    }

    #[test]
    fn test_action_handler_key() {
        let http = Action::HttpRequest(HttpConfig {
            method: "GET".to_string(),
            url: "https://example.com".to_string(),
            headers: HashMap::new(),
            body: None,
        });
        assert_eq!(http.handler_key(), "http_request");

        let plugin = Action::Plugin(PluginConfig {
            kind: "kafka.produce".to_string(),
            params: serde_json::json!({"topic": "events"}),
        });
        assert_eq!(plugin.handler_key(), "kafka.produce");
    }

    #[test]
    fn test_step_yaml_shape() {
        let yaml = r#"
id: create_user
action: http_request
config:
  method: POST
  url: https://example.com/users
  body:
    email: test@example.com
output:
  user_id: body.id
retry:
  max_attempts: 3
  delay: 500ms
  backoff: exponential
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(step.id, "create_user");
        match &step.action {
            Action::HttpRequest(config) => {
                assert_eq!(config.method, "POST");
                assert!(config.body.is_some());
            }
            other => panic!("expected http_request, got {:?}", other),
        }
        assert_eq!(step.output.get("user_id").unwrap(), "body.id");

        let retry = step.retry.unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.backoff, RetryBackoff::Exponential);
    }

    #[test]
    fn test_step_roundtrip() {
        let step = log_step("roundtrip").with_assertion("message exists");
        let yaml = serde_yaml::to_string(&step).unwrap();
        let back: Step = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(back.id, "roundtrip");
        assert_eq!(back.assertions, vec!["message exists"]);
        assert_eq!(back.action.handler_key(), "log");
    }

    #[test]
    fn test_flow_total_steps() {
        let mut flow = FlowDefinition::new("test");
        flow.setup.push(log_step("s1"));
        flow.steps.push(log_step("m1"));
        flow.steps.push(log_step("m2"));
        flow.teardown.push(log_step("t1"));

        assert_eq!(flow.total_steps(), 4);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10d").is_err());
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn test_config_value_serialization() {
        let delay = Action::Delay(DelayConfig {
            duration: "2s".to_string(),
        });
        let value = delay.config_value();
        assert_eq!(value.get("duration").unwrap(), "2s");
    }
}
