//! Domain types for the task document.
//!
//! All path fields use `PathBuf`. Date-times are local and naive, matching the
//! ISO-8601 strings kept on disk.

use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Format used when writing date-times: second precision, `T` separator.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const ACCEPTED_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque, immutable task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// A fresh random (v4) UUID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A date-time exactly as stored in the task document.
///
/// Parsing is deferred to [`StoredDateTime::parse`] so that one malformed
/// record does not make the whole document unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredDateTime(pub String);

impl StoredDateTime {
    pub fn parse(&self) -> Result<NaiveDateTime, StoreError> {
        let raw = self.0.trim();
        ACCEPTED_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .ok_or_else(|| StoreError::InvalidDateTime {
                value: self.0.clone(),
            })
    }
}

impl From<NaiveDateTime> for StoredDateTime {
    fn from(dt: NaiveDateTime) -> Self {
        Self(dt.format(DATETIME_FORMAT).to_string())
    }
}

impl fmt::Display for StoredDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Drop sub-second precision.
pub fn whole_seconds(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_nanosecond(0).unwrap_or(dt)
}

/// Current local wall-clock time.
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One schedulable sync job, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub source_path: PathBuf,
    /// Parent directory; the source is mirrored to `destination_path/<source name>`.
    pub destination_path: PathBuf,
    /// Next trigger instant. For repeats only the time of day is authoritative.
    #[serde(default)]
    pub scheduled_datetime: StoredDateTime,
    #[serde(default)]
    pub is_repeat: bool,
    /// Inert saved source/destination pair; never scheduled.
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub last_ran: Option<NaiveDateTime>,
}

impl Task {
    pub fn one_time(source: PathBuf, destination: PathBuf, at: NaiveDateTime) -> Self {
        Self::new(source, destination, at, false, false)
    }

    pub fn repeating(source: PathBuf, destination: PathBuf, at: NaiveDateTime) -> Self {
        Self::new(source, destination, at, true, false)
    }

    pub fn template(source: PathBuf, destination: PathBuf, saved_at: NaiveDateTime) -> Self {
        Self::new(source, destination, saved_at, false, true)
    }

    fn new(
        source: PathBuf,
        destination: PathBuf,
        at: NaiveDateTime,
        is_repeat: bool,
        is_template: bool,
    ) -> Self {
        Self {
            id: TaskId::generate(),
            source_path: source,
            destination_path: destination,
            scheduled_datetime: StoredDateTime::from(whole_seconds(at)),
            is_repeat,
            is_template,
            last_ran: None,
        }
    }

    pub fn scheduled(&self) -> Result<NaiveDateTime, StoreError> {
        self.scheduled_datetime.parse()
    }

    pub fn apply(&mut self, update: &TaskUpdate) {
        if let Some(at) = update.scheduled_datetime {
            self.scheduled_datetime = StoredDateTime::from(whole_seconds(at));
        }
        if let Some(ran) = update.last_ran {
            self.last_ran = Some(whole_seconds(ran));
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub scheduled_datetime: Option<NaiveDateTime>,
    pub last_ran: Option<NaiveDateTime>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
