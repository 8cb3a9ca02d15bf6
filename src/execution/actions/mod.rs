//! Action Handlers
//!
//! Each action kind is implemented by an [`ActionHandler`] registered in an
//! [`ActionRegistry`]. The step executor looks handlers up by the step's
//! action key and calls them with the already-interpolated configuration.
//!
//! Built-in kinds: `http_request`, `delay`, `assert`, `log`. Custom kinds
//! can be registered under any name, including dotted plugin names like
//! `kafka.produce`.

mod assertion;
mod delay;
mod http;
mod log_action;

pub use assertion::AssertHandler;
pub use delay::DelayHandler;
pub use http::HttpHandler;
pub use log_action::LogHandler;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::flow::OutputData;

/// An action that could not run or reported failure.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("invalid action config: {0}")]
    InvalidConfig(String),

    #[error("action failed: {0}")]
    Failed(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ActionError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ActionError::InvalidConfig(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        ActionError::Failed(msg.into())
    }
}

/// A single action implementation.
///
/// Handlers receive the interpolated configuration payload and return the
/// output data later steps may reference.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, config: Value) -> Result<OutputData, ActionError>;
}

/// Maps action kind names to their handlers.
pub struct ActionRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in handlers installed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("http_request", Arc::new(HttpHandler::new()));
        registry.register("delay", Arc::new(DelayHandler));
        registry.register("assert", Arc::new(AssertHandler));
        registry.register("log", Arc::new(LogHandler));
        registry
    }

    /// Registers a handler under the given kind name, replacing any
    /// existing handler for that kind.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Looks up the handler for an action kind.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered kind names, for diagnostics.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl ActionHandler for EchoHandler {
        async fn execute(&self, config: Value) -> Result<OutputData, ActionError> {
            let mut output = OutputData::new();
            output.insert("echo".to_string(), config);
            Ok(output)
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = ActionRegistry::with_builtins();
        assert_eq!(registry.kinds(), vec!["assert", "delay", "http_request", "log"]);
    }

    #[test]
    fn test_unknown_kind() {
        let registry = ActionRegistry::with_builtins();
        assert!(registry.get("kafka.produce").is_none());
    }

    #[tokio::test]
    async fn test_custom_handler_dispatch() {
        let mut registry = ActionRegistry::with_builtins();
        registry.register("custom.echo", Arc::new(EchoHandler));

        let handler = registry.get("custom.echo").unwrap();
        let output = handler.execute(json!({"ping": 1})).await.unwrap();
        assert_eq!(output.get("echo").unwrap(), &json!({"ping": 1}));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ActionRegistry::new();
        registry.register("x", Arc::new(EchoHandler));
        registry.register("x", Arc::new(EchoHandler));
        assert_eq!(registry.kinds().len(), 1);
    }
}
