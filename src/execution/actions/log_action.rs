//! Log action: emits an interpolated message into the run output.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::{json, Value};

use super::{ActionError, ActionHandler};
use crate::flow::{LogConfig, OutputData};

pub struct LogHandler;

#[async_trait]
impl ActionHandler for LogHandler {
    async fn execute(&self, config: Value) -> Result<OutputData, ActionError> {
        let config: LogConfig = serde_json::from_value(config)
            .map_err(|e| ActionError::invalid(format!("log: {}", e)))?;

        let level = config.level.as_deref().unwrap_or("info");
        match level {
            "debug" => debug!("{}", config.message),
            "info" => info!("{}", config.message),
            "warn" => warn!("{}", config.message),
            "error" => error!("{}", config.message),
            other => {
                return Err(ActionError::invalid(format!("unknown log level '{}'", other)));
            }
        }

        let mut output = OutputData::new();
        output.insert("message".to_string(), json!(config.message));
        output.insert("level".to_string(), json!(level));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_output() {
        let handler = LogHandler;
        let output = handler
            .execute(json!({"message": "all good", "level": "warn"}))
            .await
            .unwrap();

        assert_eq!(output.get("message").unwrap(), &json!("all good"));
        assert_eq!(output.get("level").unwrap(), &json!("warn"));
    }

    #[tokio::test]
    async fn test_default_level_is_info() {
        let handler = LogHandler;
        let output = handler.execute(json!({"message": "hi"})).await.unwrap();
        assert_eq!(output.get("level").unwrap(), &json!("info"));
    }

    #[tokio::test]
    async fn test_unknown_level_rejected() {
        let handler = LogHandler;
        let err = handler
            .execute(json!({"message": "hi", "level": "loud"}))
            .await;
        assert!(matches!(err, Err(ActionError::InvalidConfig(_))));
    }
}
