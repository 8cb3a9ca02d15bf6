//! Flow Execution
//!
//! Everything involved in running a flow:
//!
//! - [`engine`]: orchestrates setup/main/teardown phases for one execution
//! - [`step`]: runs a single step with timeout, retry and assertions
//! - [`actions`]: action handlers and the dispatch registry
//! - [`context`]: variable and step-output bindings for interpolation
//! - [`interpolate`]: `${...}` / `{{...}}` placeholder resolution
//! - [`assertions`]: `path op literal` expression evaluation

pub mod actions;
pub mod assertions;
pub mod context;
pub mod engine;
pub mod interpolate;
pub mod step;

pub use actions::{ActionError, ActionHandler, ActionRegistry};
pub use assertions::{AssertionError, Evaluator};
pub use context::VariableContext;
pub use engine::Engine;
pub use interpolate::{interpolate, interpolate_value};
pub use step::execute_step;
