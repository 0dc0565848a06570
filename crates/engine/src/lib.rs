//! `engine` crate — task runner, workflow orchestrator, and the workflow
//! registry that dispatches runs.

pub mod error;
pub mod executor;
pub mod models;
pub mod task;
pub mod workflow;

pub use error::EngineError;
pub use executor::{WorkflowEngine, WorkflowOutcome};
pub use models::{TaskDefinition, WorkflowDefinition};
pub use task::{Task, TaskStatus};
pub use workflow::{should_skip, TaskSummary, Workflow, WorkflowSummary};

pub use tasks::Context;
