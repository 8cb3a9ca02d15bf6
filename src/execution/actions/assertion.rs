//! Standalone assertion action.
//!
//! Evaluates assertion expressions against a provided data value, which is
//! usually an interpolated reference to an earlier step's output. Useful
//! when a check belongs at a later point in the flow than the step that
//! produced the data.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ActionError, ActionHandler};
use crate::execution::assertions::Evaluator;
use crate::flow::{AssertConfig, OutputData};

pub struct AssertHandler;

#[async_trait]
impl ActionHandler for AssertHandler {
    async fn execute(&self, config: Value) -> Result<OutputData, ActionError> {
        let config: AssertConfig = serde_json::from_value(config)
            .map_err(|e| ActionError::invalid(format!("assert: {}", e)))?;

        // Scalars are wrapped so expressions can address them as `value`
        let data = match config.data {
            Value::Object(map) => map,
            other => {
                let mut map = OutputData::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        Evaluator::new(&data)
            .evaluate_all(&config.assertions)
            .map_err(|e| ActionError::failed(e.to_string()))?;

        let mut output = OutputData::new();
        output.insert("passed".to_string(), json!(config.assertions.len()));
        Ok(output)
    }
}
