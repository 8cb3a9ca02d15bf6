//! Flow Definitions
//!
//! Data structures and parsing for declarative test flows:
//!
//! - [`model`]: flow, step, action and retry-policy types
//! - [`parser`]: YAML loading and structural validation

pub mod model;
pub mod parser;

pub use model::{
    parse_duration, Action, AssertConfig, DelayConfig, FlowDefinition, HttpConfig, LogConfig,
    OutputData, PluginConfig, RetryBackoff, RetryPolicy, Step,
};
pub use parser::load_flow;
