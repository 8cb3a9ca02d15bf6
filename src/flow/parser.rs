//! Flow Parser
//!
//! Handles loading and parsing flow definitions from YAML files.
//! Accepts both a top-level `flow:` wrapper (the canonical format) and a
//! bare definition.

use std::collections::HashSet;
use std::error::Error;
use std::fs;

use log::{debug, info};
use serde::Deserialize;

use super::model::{parse_duration, FlowDefinition};

/// Wrapper for the canonical `flow:` document shape.
#[derive(Deserialize)]
struct FlowWrapper {
    flow: FlowDefinition,
}

/// Loads a flow definition from a YAML file.
///
/// This function:
/// 1. Reads and parses the YAML file (wrapped or bare)
/// 2. Validates step ids, retry policies and timeouts
///
/// # Example
///
/// ```rust,no_run
/// use flowrunner::flow::load_flow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let flow = load_flow("checkout.yaml")?;
///     println!("Loaded '{}' with {} steps", flow.name, flow.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_flow(path: &str) -> Result<FlowDefinition, Box<dyn Error>> {
    info!("Loading flow from: {}", path);

    let content = fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read flow file '{}': {}. Check that the file exists and is readable.",
            path, e
        )
    })?;

    debug!("YAML content loaded ({} bytes)", content.len());

    let flow = parse_flow(&content)?;

    info!(
        "Parsed flow '{}': {} setup, {} main, {} teardown steps",
        flow.name,
        flow.setup.len(),
        flow.steps.len(),
        flow.teardown.len()
    );

    Ok(flow)
}

/// Parses a flow definition from a YAML string.
pub fn parse_flow(content: &str) -> Result<FlowDefinition, Box<dyn Error>> {
    let flow = match serde_yaml::from_str::<FlowWrapper>(content) {
        Ok(wrapper) => wrapper.flow,
        Err(_) => serde_yaml::from_str::<FlowDefinition>(content)
            .map_err(|e| format!("Failed to parse flow YAML: {}. Check the file format.", e))?,
    };

    validate_flow(&flow)?;
    Ok(flow)
}

/// Validates the structure of a flow definition.
///
/// Checks that the name is present, step ids are unique across all phases,
/// and duration strings (retry delay, timeout) are well formed.
pub fn validate_flow(flow: &FlowDefinition) -> Result<(), String> {
    if flow.name.trim().is_empty() {
        return Err("flow name is required".to_string());
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let phases = [&flow.setup, &flow.steps, &flow.teardown];

    for steps in phases {
        for step in steps.iter() {
            // Anonymous steps get positional ids at execution time
            if !step.id.is_empty() && !seen.insert(step.id.as_str()) {
                return Err(format!("duplicate step id '{}'", step.id));
            }

            if let Some(retry) = &step.retry {
                if retry.max_attempts == 0 {
                    return Err(format!(
                        "step '{}': retry max_attempts must be at least 1",
                        step.id
                    ));
                }
                if let Some(delay) = &retry.delay {
                    parse_duration(delay)
                        .map_err(|e| format!("step '{}': invalid retry delay: {}", step.id, e))?;
                }
            }

            if let Some(timeout) = &step.timeout {
                parse_duration(timeout)
                    .map_err(|e| format!("step '{}': invalid timeout: {}", step.id, e))?;
            }
        }
    }

    Ok(())
}

/// Saves a flow definition to a YAML file.
pub fn save_flow(flow: &FlowDefinition, path: &str) -> Result<(), Box<dyn Error>> {
    let yaml = serde_yaml::to_string(flow)?;
    fs::write(path, yaml)?;
    info!("Flow saved to: {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WRAPPED_FLOW: &str = r#"
flow:
  name: smoke
  description: Minimal smoke flow
  env:
    BASE_URL: https://example.com
  steps:
    - id: wait
      action: delay
      config:
        duration: 10ms
    - id: note
      action: log
      config:
        message: done waiting
"#;

    #[test]
    fn test_parse_wrapped_flow() {
        let flow = parse_flow(WRAPPED_FLOW).unwrap();
        assert_eq!(flow.name, "smoke");
        assert_eq!(flow.steps.len(), 2);
        assert_eq!(flow.env.get("BASE_URL").unwrap(), "https://example.com");
    }

    #[test]
    fn test_parse_bare_flow() {
        let yaml = r#"
name: bare
steps:
  - id: note
    action: log
    config:
      message: hi
"#;
        let flow = parse_flow(yaml).unwrap();
        assert_eq!(flow.name, "bare");
        assert_eq!(flow.steps.len(), 1);
    }

    #[test]
    fn test_parse_flow_missing_name() {
        let yaml = r#"
name: ""
steps: []
"#;
        assert!(parse_flow(yaml).is_err());
    }

    #[test]
    fn test_parse_flow_duplicate_ids() {
        let yaml = r#"
name: dup
steps:
  - id: same
    action: log
    config:
      message: one
  - id: same
    action: log
    config:
      message: two
"#;
        let err = parse_flow(yaml).unwrap_err().to_string();
        assert!(err.contains("duplicate step id"));
    }

    #[test]
    fn test_parse_flow_duplicate_across_phases() {
        let yaml = r#"
name: dup
setup:
  - id: shared
    action: log
    config:
      message: setup
steps:
  - id: shared
    action: log
    config:
      message: main
"#;
        assert!(parse_flow(yaml).is_err());
    }

    #[test]
    fn test_parse_flow_invalid_retry_delay() {
        let yaml = r#"
name: badretry
steps:
  - id: s1
    action: log
    config:
      message: hi
    retry:
      max_attempts: 3
      delay: soon
"#;
        let err = parse_flow(yaml).unwrap_err().to_string();
        assert!(err.contains("invalid retry delay"));
    }

    #[test]
    fn test_parse_flow_zero_attempts() {
        let yaml = r#"
name: zero
steps:
  - id: s1
    action: log
    config:
      message: hi
    retry:
      max_attempts: 0
"#;
        assert!(parse_flow(yaml).is_err());
    }

    #[test]
    fn test_parse_flow_invalid_yaml() {
        assert!(parse_flow("this is not valid yaml: [[[").is_err());
    }

    #[test]
    fn test_load_flow_file_not_found() {
        assert!(load_flow("/nonexistent/path/flow.yaml").is_err());
    }

    #[test]
    fn test_load_and_save_roundtrip() {
        use tempfile::tempdir;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("smoke.yaml");
        std::fs::write(&path, WRAPPED_FLOW).unwrap();

        let flow = load_flow(path.to_str().unwrap()).unwrap();

        let out_path = temp_dir.path().join("saved.yaml");
        save_flow(&flow, out_path.to_str().unwrap()).unwrap();

        let reloaded = load_flow(out_path.to_str().unwrap()).unwrap();
        assert_eq!(reloaded.name, flow.name);
        assert_eq!(reloaded.steps.len(), flow.steps.len());
    }
}
