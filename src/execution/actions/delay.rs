//! Delay action: pauses the flow for a configured duration.

use async_trait::async_trait;
use log::debug;
use serde_json::{json, Value};

use super::{ActionError, ActionHandler};
use crate::flow::{parse_duration, DelayConfig, OutputData};

pub struct DelayHandler;

#[async_trait]
impl ActionHandler for DelayHandler {
    async fn execute(&self, config: Value) -> Result<OutputData, ActionError> {
        let config: DelayConfig = serde_json::from_value(config)
            .map_err(|e| ActionError::invalid(format!("delay: {}", e)))?;

        let duration = parse_duration(&config.duration)
            .map_err(|e| ActionError::invalid(format!("delay: {}", e)))?;

        debug!("Delaying for {:?}", duration);
        tokio::time::sleep(duration).await;

        let mut output = OutputData::new();
        output.insert("duration_ms".to_string(), json!(duration.as_millis() as u64));
        Ok(output)
    }
}
