//! `tasks` crate — the `ExecutableTask` trait and built-in task kinds.
//!
//! Every task kind, built-in or custom, must implement
//! [`ExecutableTask`]. The engine crate dispatches execution through this
//! trait object, and [`TaskRegistry`] resolves kinds by their string tag.

pub mod builtin;
pub mod error;
pub mod mock;
pub mod registry;
pub mod template;
pub mod traits;

pub use error::TaskError;
pub use registry::{TaskFactory, TaskRegistry};
pub use traits::{Context, ExecutableTask};
