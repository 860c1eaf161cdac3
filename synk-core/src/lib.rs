//! synk core library: task records, the persisted task document, errors.
//!
//! - [`types`]: [`Task`] and its newtypes
//! - [`error`]: [`StoreError`]
//! - [`store`]: [`TaskStore`], load / save / add / remove / update

pub mod error;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::{TaskStore, TASKS_FILE};
pub use types::{StoredDateTime, Task, TaskId, TaskUpdate};
