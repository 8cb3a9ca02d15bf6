//! FlowRunner - Test Flow Scheduling and Execution
//!
//! A library and CLI for defining API test flows in YAML, running them with
//! retries, assertions and variable interpolation, and firing them on cron
//! schedules.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`flow`]: Data structures and parsing for flow definitions
//! - [`execution`]: Engine, step executor, actions and interpolation
//! - [`scheduler`]: Cron parsing and the schedule firing loop
//! - [`store`]: Persistence traits plus the in-memory implementation
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use flowrunner::execution::{ActionRegistry, Engine};
//! use flowrunner::load_flow;
//! use flowrunner::store::MemoryStore;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a flow from YAML
//!     let flow = load_flow("checkout.yaml")?;
//!
//!     // Run it once
//!     let engine = Engine::new(Arc::new(MemoryStore::new()), ActionRegistry::with_builtins());
//!     let execution = engine
//!         .execute(&flow, HashMap::new(), "manual", CancellationToken::new())
//!         .await?;
//!
//!     println!("{}: {:?}", execution.flow_name, execution.status);
//!     Ok(())
//! }
//! ```

pub mod execution;
pub mod flow;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use execution::{ActionRegistry, Engine};
pub use flow::model::{FlowDefinition, Step};
pub use flow::parser::load_flow;
pub use scheduler::Scheduler;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "FlowRunner";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "FlowRunner");
    }

    #[test]
    fn test_module_exports_flow() {
        let flow = FlowDefinition::new("exported");
        assert_eq!(flow.name, "exported");
        assert_eq!(flow.total_steps(), 0);
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
