//! Domain models for nested-todos.
//!
//! # Core Concepts
//!
//! - [`Todo`]: The only stored entity. Todos nest through `parent_id` and are
//!   always owned by exactly one user.
//! - [`TodoWithChildren`]: Transient tree view built from a flat list of todos.
//! - [`CreateTodoInput`] / [`UpdateTodoInput`]: Sanitized write payloads, the
//!   output of the validator.
//! - [`CallerIdentity`]: The authenticated user every store operation is scoped to.

mod identity;
mod todo;

pub use identity::*;
pub use todo::*;
