//! # synk-sync
//!
//! One-directional copy-if-newer mirroring.
//!
//! Call [`SyncEngine::sync`] to mirror a file or directory into a destination
//! parent directory. Per-file failures are collected in the returned
//! [`SyncResult`]; only failing to start the batch is an error.

pub mod copy;
pub mod engine;
pub mod error;
pub mod result;

pub use engine::SyncEngine;
pub use error::SyncError;
pub use result::{FileError, FileErrorKind, SyncResult};
