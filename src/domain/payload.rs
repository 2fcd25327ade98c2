//! Typed views over envelope payloads.
//!
//! The feed core treats `data` as opaque. Consumers that want structure
//! decode it into one of these types, usually through
//! [`super::event_bus::typed`].

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TelemetryError;

/// Lifecycle status shared by builds and their tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Queued, not started yet.
    Pending,
    /// Currently executing.
    Running,
    /// Stopped with a non-zero exit code.
    Failed,
    /// Completed successfully.
    Finished,
    /// Stopped on request.
    Aborted,
}

impl BuildStatus {
    /// Returns `true` once no further log lines or updates are expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Finished | Self::Aborted)
    }

    /// Returns the status as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Finished => "finished",
            Self::Aborted => "aborted",
        }
    }
}

/// Status of one task inside a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    /// Task index within the job.
    pub id: u32,
    /// Task status.
    pub status: BuildStatus,
}

/// Payload of a `build:update:<id>` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildUpdate {
    /// Build number.
    pub id: u64,
    /// Job name.
    pub name: String,
    /// Overall build status.
    pub status: BuildStatus,
    /// Per-task statuses.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tasks: Vec<TaskState>,
    /// Build parameters, one map per declared parameter.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub params: Vec<HashMap<String, String>>,
    /// Names of collected artifacts.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub artifacts: Vec<String>,
}

/// Payload of a `build:log:<id>` envelope: one output line of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Task that produced the line.
    pub task_id: u32,
    /// Line number within the task; 0 is the command itself.
    pub id: u64,
    /// Line text.
    pub data: String,
}

/// Decodes a payload value into `T`.
///
/// # Errors
///
/// Returns [`TelemetryError::Payload`] if the value does not match `T`.
pub fn decode<T>(value: &serde_json::Value) -> Result<T, TelemetryError>
where
    T: for<'de> Deserialize<'de>,
{
    T::deserialize(value).map_err(|e| TelemetryError::Payload(e.to_string()))
}

/// The server serializes empty collections as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
