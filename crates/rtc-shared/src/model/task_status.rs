//! `TaskStatus` — the lightweight, high-frequency view of worker state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::task_id::{Lifespan, TaskId, TaskInstanceId};
use crate::errors::Failure;

/// Lifecycle state of a remote task, as reported by the worker.
///
/// `Planned -> Running -> {Finished|Canceled|Aborted|Failed}`. The four
/// states after `Running` are terminal and absorbing: [`TaskState::is_done`]
/// is the gate the rest of the controller uses to stop applying updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Planned,
    Running,
    Finished,
    Canceled,
    Aborted,
    Failed,
}

impl TaskState {
    /// True for any of the four terminal states.
    pub fn is_done(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Canceled | TaskState::Aborted | TaskState::Failed
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Planned => "PLANNED",
            TaskState::Running => "RUNNING",
            TaskState::Finished => "FINISHED",
            TaskState::Canceled => "CANCELED",
            TaskState::Aborted => "ABORTED",
            TaskState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// Small, poll-friendly record of a task's current state.
///
/// This is the payload of `GET /{taskId}/status` and is what
/// `StatusFetcher` long-polls for. It intentionally excludes the heavier
/// fields ([`super::TaskInfo`] carries those) so the high-frequency poll
/// stays cheap to serialize on the worker side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub instance_id: TaskInstanceId,
    pub version: u64,
    pub state: TaskState,
    pub self_uri: String,
    pub node_id: String,
    pub completed_driver_groups: HashSet<Lifespan>,
    pub failures: Vec<Failure>,
    pub queued_drivers: u64,
    pub running_drivers: u64,
    pub output_buffer_overutilized: bool,
    pub physical_written_bytes: u64,
    pub memory_reservation_bytes: u64,
    pub system_memory_bytes: u64,
    pub full_gc_count: u64,
    pub full_gc_time_millis: u64,
}

impl TaskStatus {
    /// A synthetic status for a task that has not yet contacted a worker.
    pub fn planned(task_id: TaskId, instance_id: TaskInstanceId, self_uri: impl Into<String>) -> Self {
        Self {
            task_id,
            instance_id,
            version: 0,
            state: TaskState::Planned,
            self_uri: self_uri.into(),
            node_id: String::new(),
            completed_driver_groups: HashSet::new(),
            failures: Vec::new(),
            queued_drivers: 0,
            running_drivers: 0,
            output_buffer_overutilized: false,
            physical_written_bytes: 0,
            memory_reservation_bytes: 0,
            system_memory_bytes: 0,
            full_gc_count: 0,
            full_gc_time_millis: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_done() {
        assert!(TaskState::Finished.is_done());
        assert!(TaskState::Canceled.is_done());
        assert!(TaskState::Aborted.is_done());
        assert!(TaskState::Failed.is_done());
    }

    #[test]
    fn non_terminal_states_are_not_done() {
        assert!(!TaskState::Planned.is_done());
        assert!(!TaskState::Running.is_done());
    }

    #[test]
    fn planned_status_starts_at_version_zero() {
        let status = TaskStatus::planned(
            TaskId::new("q", 0, 0, 0),
            TaskInstanceId::from("initial"),
            "http://worker/task/1",
        );
        assert_eq!(status.version, 0);
        assert_eq!(status.state, TaskState::Planned);
    }
}
